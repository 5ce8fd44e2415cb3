//! Request-scoped session guard.

use std::ops::{Deref, DerefMut};

use tracing::{debug, instrument, warn};

use super::session::{BudgetBackend, BudgetSession};
use crate::credentials::Credentials;
use crate::error::SessionError;
use crate::metrics;

/// Owns a session for the lifetime of one request.
///
/// The session is closed exactly once when the guard is dropped, whether the
/// handler returned, bailed out with `?`, panicked, or had its future
/// cancelled.
pub struct SessionScope {
    session: Box<dyn BudgetSession>,
    file: String,
}

impl SessionScope {
    /// Open a session through `backend`.
    #[instrument(skip_all, fields(file = %credentials.file))]
    pub async fn open(
        backend: &dyn BudgetBackend,
        credentials: &Credentials,
    ) -> Result<Self, SessionError> {
        match backend.open(credentials).await {
            Ok(session) => {
                metrics::record_session_opened();
                debug!("Session opened");
                Ok(Self {
                    session,
                    file: credentials.file.clone(),
                })
            }
            Err(e) => {
                metrics::record_session_failed();
                warn!(error = %e, "Failed to open session");
                Err(match e {
                    SessionError::Open(_) => e,
                    other => SessionError::Open(other.to_string()),
                })
            }
        }
    }

    /// Budget file this session is bound to.
    pub fn file(&self) -> &str {
        &self.file
    }
}

impl Deref for SessionScope {
    type Target = dyn BudgetSession;

    fn deref(&self) -> &Self::Target {
        self.session.as_ref()
    }
}

impl DerefMut for SessionScope {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.session.as_mut()
    }
}

impl Drop for SessionScope {
    fn drop(&mut self) {
        self.session.close();
        metrics::record_session_closed();
        debug!(file = %self.file, "Session released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actual::mock::{MockBackend, MockConfig};
    use chrono::NaiveDate;

    fn creds() -> Credentials {
        Credentials::new("pw", None, "budget")
    }

    #[tokio::test]
    async fn drop_closes_once_on_success() {
        let backend = MockBackend::new();
        {
            let mut scope = SessionScope::open(&backend, &creds()).await.unwrap();
            assert_eq!(scope.file(), "budget");
            scope.accounts().await.unwrap();
        }

        assert_eq!(backend.opened(), 1);
        assert_eq!(backend.closed(), 1);
    }

    #[tokio::test]
    async fn drop_closes_once_on_error() {
        let backend = MockBackend::with_config(MockConfig {
            fail_budget: true,
            ..Default::default()
        });

        async fn run(backend: &MockBackend) -> Result<(), SessionError> {
            let mut scope = SessionScope::open(backend, &creds()).await?;
            let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
            scope.budget_history(date).await?;
            Ok(())
        }

        assert!(run(&backend).await.is_err());
        assert_eq!(backend.opened(), 1);
        assert_eq!(backend.closed(), 1);
    }

    #[test]
    fn drop_closes_when_future_is_cancelled() {
        let backend = MockBackend::with_config(MockConfig {
            latency_ms: 60_000,
            ..Default::default()
        });

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();

        rt.block_on(async {
            let work = async {
                let mut scope = SessionScope::open(&backend, &creds()).await?;
                Ok::<_, SessionError>(scope.accounts().await?)
            };
            let timed = tokio::time::timeout(std::time::Duration::from_millis(20), work).await;
            assert!(timed.is_err());
        });

        assert_eq!(backend.opened(), 1);
        assert_eq!(backend.closed(), 1);
    }

    #[tokio::test]
    async fn open_failure_is_distinguishable() {
        let backend = MockBackend::with_config(MockConfig {
            fail_open: true,
            ..Default::default()
        });

        let err = SessionScope::open(&backend, &creds()).await.err().unwrap();
        assert!(matches!(err, SessionError::Open(_)));
        assert!(err.to_string().starts_with("could not establish session"));
        assert_eq!(backend.opened(), 0);
        assert_eq!(backend.closed(), 0);
    }
}
