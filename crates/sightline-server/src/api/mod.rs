//! API routes for the sightline server.

pub mod error;
mod routes;

pub use error::ApiError;

use crate::config::Config;
use axum::Router;

pub fn routes(config: &Config) -> Router<std::sync::Arc<crate::state::AppState>> {
    routes::create_router(config)
}
