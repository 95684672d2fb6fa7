//! HTTP server wiring: axum router, state, and handlers.

pub mod routes;

pub use routes::{build_router, AppState};
