//! Call interface to the remote budgeting server.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::budget::{Account, BudgetHistory, NewTransaction, TransactionId};
use crate::credentials::Credentials;
use crate::error::SessionError;

/// Opens sessions against a budgeting server.
///
/// Implementations hold no per-request state; every call to [`open`] yields an
/// independent session owned by the caller.
///
/// [`open`]: BudgetBackend::open
#[async_trait]
pub trait BudgetBackend: Send + Sync + 'static {
    /// Log in and select the budget file named in `credentials`.
    async fn open(&self, credentials: &Credentials) -> Result<Box<dyn BudgetSession>, SessionError>;
}

/// A live, credentialed connection to one budget file.
#[async_trait]
pub trait BudgetSession: Send {
    /// Stage a transaction. It is not persisted until [`commit`](Self::commit).
    async fn create_transaction(
        &mut self,
        transaction: NewTransaction,
    ) -> Result<TransactionId, SessionError>;

    /// Push staged changes to the server.
    async fn commit(&mut self) -> Result<(), SessionError>;

    /// Apply the file's rules to the given transactions.
    async fn run_rules(&mut self, transactions: &[TransactionId]) -> Result<(), SessionError>;

    /// Budget history as of `as_of`.
    async fn budget_history(&mut self, as_of: NaiveDate) -> Result<BudgetHistory, SessionError>;

    /// All accounts, in server order. `None` when the server has nothing to report.
    async fn accounts(&mut self) -> Result<Option<Vec<Account>>, SessionError>;

    /// Release the session. Uncommitted changes are discarded.
    fn close(&mut self);
}
