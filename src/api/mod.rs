//! HTTP API module: transaction, budget, balance and health endpoints.

pub mod error;
pub mod handlers;
pub mod routes;

pub use error::{ApiError, ErrorBody};
pub use handlers::AppState;
pub use routes::{create_router, ApiDoc};
