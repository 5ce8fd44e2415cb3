//! Actual-HTTP: a small REST wrapper around an Actual budget server.
//!
//! Every credentialed request opens its own session with the server using the
//! `x-actual-*` headers, performs one or two operations, and releases the
//! session before the response is written.
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from environment
//! - [`error`]: Unified error types
//! - [`credentials`]: Header extraction and normalization
//! - [`budget`]: Transaction, budget and account types
//! - [`actual`]: Session interface, HTTP client and mock
//! - [`api`]: HTTP routes and handlers
//! - [`metrics`]: Prometheus counters
//! - [`utils`]: Utility functions

pub mod actual;
pub mod api;
pub mod budget;
pub mod config;
pub mod credentials;
pub mod error;
pub mod metrics;
pub mod utils;

pub use config::Config;
pub use error::{AppError, Result};
