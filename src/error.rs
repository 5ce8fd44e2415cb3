//! Unified error types for the Actual HTTP wrapper.

use thiserror::Error;

/// Process-level error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration loading error.
    #[error("configuration error: {0}")]
    Config(#[from] envy::Error),

    /// Configuration loaded but failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Session with the budgeting server failed.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the remote budgeting server or while talking to it.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Login, file lookup or host resolution failed.
    #[error("could not establish session: {0}")]
    Open(String),

    /// The server answered with a non-success status.
    #[error("budget server returned HTTP {status}: {body}")]
    Remote {
        /// HTTP status code.
        status: u16,
        /// Response body, verbatim.
        body: String,
    },

    /// Response could not be decoded.
    #[error("failed to decode budget server response: {0}")]
    Decode(String),

    /// No budget exists for the requested month.
    #[error("no budget found for month {0}")]
    MonthNotFound(String),

    /// Operation attempted after the session was released.
    #[error("session already closed")]
    Closed,

    /// Catch-all failure reported by a session implementation.
    #[error("{0}")]
    Operation(String),

    /// HTTP request failed.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Request-shape errors detected before any external call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required header was not sent.
    #[error("missing required header: {0}")]
    MissingHeader(&'static str),

    /// A header was sent but is not valid text.
    #[error("header {0} is not valid UTF-8")]
    InvalidHeader(&'static str),

    /// Year, month and day do not form a calendar date.
    #[error("invalid date: year={year}, month={month}, day={day}")]
    InvalidDate {
        /// Requested year.
        year: i32,
        /// Requested month.
        month: u32,
        /// Requested day.
        day: u32,
    },

    /// Body or path could not be parsed.
    #[error("{0}")]
    Malformed(String),
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, AppError>;
