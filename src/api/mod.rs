//! HTTP surface over the dispatcher and operator settings.

pub mod routes;

pub use routes::{AppState, api_routes};
