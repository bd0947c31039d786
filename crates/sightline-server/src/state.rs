//! Shared application state.

use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::registry::Registry;

/// Per-process state injected into every route. The registry is the only
/// mutable piece; config and dispatcher are read-only after startup.
pub struct AppState {
    pub config: Config,
    pub registry: Registry,
    pub dispatcher: Dispatcher,
}

impl AppState {
    pub fn new(config: Config) -> std::io::Result<Self> {
        let registry = Registry::new(&config.staging_dir)?;
        let dispatcher = Dispatcher::new(config.clone());
        Ok(Self {
            config,
            registry,
            dispatcher,
        })
    }
}
