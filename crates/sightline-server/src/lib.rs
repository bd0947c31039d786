//! Shared library surface for sightline server modules and tests.

pub mod api;
pub mod config;
pub mod dispatch;
pub mod loops;
pub mod registry;
pub mod state;
