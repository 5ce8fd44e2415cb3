//! Per-request credentials taken from `x-actual-*` headers.

use std::fmt;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;

use crate::api::error::ApiError;
use crate::error::ValidationError;

/// Server password header.
pub const PASSWORD_HEADER: &str = "x-actual-password";
/// End-to-end encryption password header.
pub const ENCRYPTION_PASSWORD_HEADER: &str = "x-actual-encryption-password";
/// Budget file (sync id) header.
pub const FILE_HEADER: &str = "x-actual-file";

/// Credentials for one session against the budgeting server.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Server password.
    pub password: String,
    /// File encryption password, `None` for unencrypted files.
    pub encryption_password: Option<String>,
    /// Budget file identifier.
    pub file: String,
}

impl Credentials {
    /// Build credentials from raw header values.
    pub fn new(
        password: impl Into<String>,
        encryption_password: Option<&str>,
        file: impl Into<String>,
    ) -> Self {
        Self {
            password: password.into(),
            encryption_password: normalize_encryption_password(encryption_password),
            file: file.into(),
        }
    }

    /// Extract credentials from request headers.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, ValidationError> {
        let password = required_header(headers, PASSWORD_HEADER)?;
        let file = required_header(headers, FILE_HEADER)?;
        let encryption_password = optional_header(headers, ENCRYPTION_PASSWORD_HEADER)?;

        Ok(Self::new(password, encryption_password, file))
    }
}

// Passwords never reach logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("password", &"<redacted>")
            .field(
                "encryption_password",
                &self.encryption_password.as_ref().map(|_| "<redacted>"),
            )
            .field("file", &self.file)
            .finish()
    }
}

/// Collapse the textual "no value" sentinels to `None`.
///
/// Absent, empty, and any casing of `none` mean "not encrypted". Other values
/// are kept verbatim, including surrounding whitespace.
pub fn normalize_encryption_password(raw: Option<&str>) -> Option<String> {
    match raw {
        None => None,
        Some(value) if value.is_empty() || value.eq_ignore_ascii_case("none") => None,
        Some(value) => Some(value.to_string()),
    }
}

fn required_header<'a>(
    headers: &'a HeaderMap,
    name: &'static str,
) -> Result<&'a str, ValidationError> {
    optional_header(headers, name)?.ok_or(ValidationError::MissingHeader(name))
}

fn optional_header<'a>(
    headers: &'a HeaderMap,
    name: &'static str,
) -> Result<Option<&'a str>, ValidationError> {
    headers
        .get(name)
        .map(|value| value.to_str().map_err(|_| ValidationError::InvalidHeader(name)))
        .transpose()
}

#[async_trait]
impl<S> FromRequestParts<S> for Credentials
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers)?)
    }
}
