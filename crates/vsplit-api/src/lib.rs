//! Axum HTTP API server.
//!
//! Endpoints: multipart job submission, live SSE progress, fragment and
//! bulk zip download, explicit cleanup, session snapshot, health.

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
