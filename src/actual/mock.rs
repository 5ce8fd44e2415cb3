//! Mock budgeting backend for unit testing.
//!
//! This module provides an in-process backend that can be used in tests
//! without a running Actual server. It counts session opens and closes so
//! tests can check that every session is released.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::NaiveDate;

use super::session::{BudgetBackend, BudgetSession};
use crate::budget::{Account, BudgetHistory, NewTransaction, TransactionId};
use crate::credentials::Credentials;
use crate::error::SessionError;

/// Configuration for mock backend behavior.
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    /// Accounts to return; `None` simulates a query that yields nothing.
    pub accounts: Option<Vec<Account>>,
    /// Budget history to return.
    pub history: BudgetHistory,
    /// Whether to fail session opens.
    pub fail_open: bool,
    /// Whether to fail transaction staging.
    pub fail_create: bool,
    /// Whether to fail commits.
    pub fail_commit: bool,
    /// Whether to fail every commit after the first one in a session.
    pub fail_later_commits: bool,
    /// Whether to fail rule runs.
    pub fail_rules: bool,
    /// Whether to fail budget history requests.
    pub fail_budget: bool,
    /// Whether to fail account requests.
    pub fail_accounts: bool,
    /// Whether account requests panic instead of returning.
    pub panic_accounts: bool,
    /// Simulated latency for session operations in milliseconds.
    pub latency_ms: u64,
}

#[derive(Debug, Default)]
struct Recorded {
    credentials: Vec<Credentials>,
    committed: Vec<NewTransaction>,
    rule_runs: Vec<Vec<TransactionId>>,
    budget_requests: Vec<NaiveDate>,
}

/// Mock backend for testing.
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    config: MockConfig,
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
    recorded: Arc<Mutex<Recorded>>,
}

impl MockBackend {
    /// Create a new mock backend with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock backend with custom configuration.
    pub fn with_config(config: MockConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Sessions successfully opened so far.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Sessions closed so far.
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Credentials passed to every open attempt.
    pub fn credentials(&self) -> Vec<Credentials> {
        self.recorded().credentials.clone()
    }

    /// Transactions pushed by successful commits.
    pub fn committed(&self) -> Vec<NewTransaction> {
        self.recorded().committed.clone()
    }

    /// Transaction ids passed to each rule run.
    pub fn rule_runs(&self) -> Vec<Vec<TransactionId>> {
        self.recorded().rule_runs.clone()
    }

    /// Dates passed to budget history requests.
    pub fn budget_requests(&self) -> Vec<NaiveDate> {
        self.recorded().budget_requests.clone()
    }

    fn recorded(&self) -> MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl BudgetBackend for MockBackend {
    async fn open(&self, credentials: &Credentials) -> Result<Box<dyn BudgetSession>, SessionError> {
        self.recorded().credentials.push(credentials.clone());

        if self.config.fail_open {
            return Err(SessionError::Open("Mock login failure".to_string()));
        }

        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSession {
            backend: self.clone(),
            staged: Vec::new(),
            commits: 0,
            closed: false,
        }))
    }
}

/// Session handed out by [`MockBackend`].
#[derive(Debug)]
pub struct MockSession {
    backend: MockBackend,
    staged: Vec<NewTransaction>,
    commits: usize,
    closed: bool,
}

impl MockSession {
    async fn delay(&self) -> Result<(), SessionError> {
        let latency = self.backend.config.latency_ms;
        if latency > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(latency)).await;
        }
        if self.closed {
            return Err(SessionError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl BudgetSession for MockSession {
    async fn create_transaction(
        &mut self,
        transaction: NewTransaction,
    ) -> Result<TransactionId, SessionError> {
        self.delay().await?;
        if self.backend.config.fail_create {
            return Err(SessionError::Operation(
                "Mock create_transaction failure".to_string(),
            ));
        }
        self.staged.push(transaction);
        Ok(TransactionId::new())
    }

    async fn commit(&mut self) -> Result<(), SessionError> {
        self.delay().await?;
        self.commits += 1;
        let config = &self.backend.config;
        if config.fail_commit || (config.fail_later_commits && self.commits > 1) {
            return Err(SessionError::Operation("Mock commit failure".to_string()));
        }
        let staged = std::mem::take(&mut self.staged);
        self.backend.recorded().committed.extend(staged);
        Ok(())
    }

    async fn run_rules(&mut self, transactions: &[TransactionId]) -> Result<(), SessionError> {
        self.delay().await?;
        self.backend
            .recorded()
            .rule_runs
            .push(transactions.to_vec());
        if self.backend.config.fail_rules {
            return Err(SessionError::Operation("Mock rules failure".to_string()));
        }
        Ok(())
    }

    async fn budget_history(&mut self, as_of: NaiveDate) -> Result<BudgetHistory, SessionError> {
        self.delay().await?;
        self.backend.recorded().budget_requests.push(as_of);
        if self.backend.config.fail_budget {
            return Err(SessionError::Operation("Mock budget failure".to_string()));
        }
        Ok(self.backend.config.history.clone())
    }

    async fn accounts(&mut self) -> Result<Option<Vec<Account>>, SessionError> {
        self.delay().await?;
        if self.backend.config.fail_accounts {
            return Err(SessionError::Operation("Mock accounts failure".to_string()));
        }
        if self.backend.config.panic_accounts {
            panic!("Mock accounts panic");
        }
        Ok(self.backend.config.accounts.clone())
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.staged.clear();
            self.backend.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}
