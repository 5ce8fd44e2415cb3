//! Application configuration loaded from environment variables.

use serde::Deserialize;
use url::Url;

use crate::error::SessionError;

/// Server configuration, loaded once at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // === Server Configuration ===
    /// Address the HTTP server binds to.
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub rust_log: String,

    // === Outbound HTTP ===
    /// Timeout for every request to the budgeting server.
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,

    // === Metrics ===
    /// Serve Prometheus metrics on `metrics_port`.
    #[serde(default)]
    pub metrics_enabled: bool,

    /// Prometheus exporter port.
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5007
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_http_timeout_ms() -> u64 {
    30_000
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            rust_log: default_log_level(),
            http_timeout_ms: default_http_timeout_ms(),
            metrics_enabled: false,
            metrics_port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from environment, reading .env file first.
    pub fn load() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Filter directive for the log subscriber.
    pub fn log_directive(&self, verbose: bool) -> String {
        if verbose {
            "actual_http=debug,info".to_string()
        } else {
            self.rust_log.clone()
        }
    }

    /// Check if the configuration is valid.
    pub fn validate(&self) -> Result<(), String> {
        if self.port == 0 {
            return Err("PORT must be non-zero".to_string());
        }

        if self.http_timeout_ms == 0 {
            return Err("HTTP_TIMEOUT_MS must be non-zero".to_string());
        }

        if self.metrics_enabled && self.metrics_port == self.port {
            return Err("METRICS_PORT must differ from PORT".to_string());
        }

        Ok(())
    }
}

/// Location of the remote budgeting server.
///
/// Read from the environment on every session open so the target can be
/// changed without restarting the process.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceTarget {
    /// Base URL of the Actual server (`ACTUAL_HOST`).
    pub actual_host: String,
}

impl ServiceTarget {
    /// Read `ACTUAL_HOST` from the current environment.
    pub fn from_env() -> Result<Self, SessionError> {
        envy::from_env::<Self>()
            .map_err(|e| SessionError::Open(format!("ACTUAL_HOST is not configured: {}", e)))
    }

    /// Parse the host into a base URL that paths can be joined onto.
    pub fn base_url(&self) -> Result<Url, SessionError> {
        let mut raw = self.actual_host.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        Url::parse(&raw).map_err(|e| {
            SessionError::Open(format!("invalid ACTUAL_HOST {:?}: {}", self.actual_host, e))
        })
    }
}
