//! Actual budget server access.
//!
//! This module handles:
//! - The session call interface
//! - Request-scoped session release
//! - HTTP client for the Actual server
//! - Mock backend for testing

pub mod client;
pub mod mock;
pub mod scope;
pub mod session;

pub use client::{ActualBackend, ActualSession};
pub use mock::{MockBackend, MockConfig};
pub use scope::SessionScope;
pub use session::{BudgetBackend, BudgetSession};
