//! HTTP API handlers.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::Json;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use super::error::{ApiError, ErrorBody};
use crate::actual::{BudgetBackend, SessionScope};
use crate::budget::{month_key, AccountBalanceView, BudgetQuery, TransactionRequest};
use crate::credentials::Credentials;
use crate::error::SessionError;
use crate::metrics::{self, LatencyTimer};

/// Acknowledgement returned by `POST /transaction/add`.
pub const TRANSACTION_ADDED: &str = "Transaction added";

/// Soft-empty message for `GET /accounts/balances`.
pub const NO_ACCOUNTS: &str = "No accounts found or query failed";

/// Application state shared with handlers.
#[derive(Clone)]
pub struct AppState {
    /// Opens one session per request.
    pub backend: Arc<dyn BudgetBackend>,
}

impl AppState {
    /// Create new app state.
    pub fn new(backend: impl BudgetBackend) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Always "healthy".
    pub status: String,
    /// Always "API is running".
    pub message: String,
}

/// Returned instead of an empty list when there are no accounts.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct NoAccounts {
    pub error: String,
}

/// Body of `GET /accounts/balances`.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum BalancesResponse {
    Balances(Vec<AccountBalanceView>),
    Empty(NoAccounts),
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// Add a transaction dated today, then apply the file's rules.
#[utoipa::path(
    post,
    path = "/transaction/add",
    request_body = TransactionRequest,
    params(
        ("x-actual-password" = String, Header, description = "Server password"),
        ("x-actual-encryption-password" = Option<String>, Header, description = "File encryption password"),
        ("x-actual-file" = String, Header, description = "Budget file id"),
    ),
    responses(
        (status = 200, description = "Transaction committed", body = String),
        (status = 422, description = "Invalid request", body = ErrorBody),
        (status = 500, description = "Budget server error", body = ErrorBody),
    )
)]
pub async fn add_transaction(
    State(state): State<AppState>,
    credentials: Credentials,
    payload: Result<Json<TransactionRequest>, JsonRejection>,
) -> Result<Json<&'static str>, ApiError> {
    let _timer = LatencyTimer::new("/transaction/add");
    let Json(request) = payload?;

    let mut session = SessionScope::open(state.backend.as_ref(), &credentials).await?;
    let transaction = request.to_new_transaction(today());
    debug!(
        file = %session.file(),
        account = %transaction.account,
        payee = %transaction.payee,
        amount = %transaction.amount,
        "Creating transaction"
    );

    let id = session.create_transaction(transaction).await?;
    session.commit().await?;
    metrics::inc_transactions_added();

    // The transaction is already committed; rules only enrich it.
    match session.run_rules(&[id]).await {
        Ok(()) => info!(%id, "Rules ran successfully"),
        Err(e) => {
            metrics::inc_rule_runs_failed();
            warn!(%id, error = %e, "Error running rules");
        }
    }
    session.commit().await?;

    Ok(Json(TRANSACTION_ADDED))
}

/// Budget for the given month.
#[utoipa::path(
    get,
    path = "/budget/{year}/{month}",
    params(
        ("year" = i32, Path, description = "Calendar year"),
        ("month" = u32, Path, description = "Month, 1-12"),
        ("x-actual-password" = String, Header, description = "Server password"),
        ("x-actual-encryption-password" = Option<String>, Header, description = "File encryption password"),
        ("x-actual-file" = String, Header, description = "Budget file id"),
    ),
    responses(
        (status = 200, description = "Budget fields for the month"),
        (status = 422, description = "Invalid date or headers", body = ErrorBody),
        (status = 500, description = "Budget server error", body = ErrorBody),
    )
)]
pub async fn budget_for_month(
    State(state): State<AppState>,
    credentials: Credentials,
    path: Result<Path<(i32, u32)>, PathRejection>,
) -> Result<Json<Map<String, Value>>, ApiError> {
    let _timer = LatencyTimer::new("/budget/{year}/{month}");
    let Path((year, month)) = path?;
    budget_snapshot(&state, &credentials, BudgetQuery::for_month(year, month)).await
}

/// Budget for the current month.
#[utoipa::path(
    get,
    path = "/budget/current",
    params(
        ("x-actual-password" = String, Header, description = "Server password"),
        ("x-actual-encryption-password" = Option<String>, Header, description = "File encryption password"),
        ("x-actual-file" = String, Header, description = "Budget file id"),
    ),
    responses(
        (status = 200, description = "Budget fields for the current month"),
        (status = 422, description = "Invalid headers", body = ErrorBody),
        (status = 500, description = "Budget server error", body = ErrorBody),
    )
)]
pub async fn current_budget(
    State(state): State<AppState>,
    credentials: Credentials,
) -> Result<Json<Map<String, Value>>, ApiError> {
    let _timer = LatencyTimer::new("/budget/current");
    budget_snapshot(&state, &credentials, BudgetQuery::current(today())).await
}

async fn budget_snapshot(
    state: &AppState,
    credentials: &Credentials,
    query: BudgetQuery,
) -> Result<Json<Map<String, Value>>, ApiError> {
    // Validate before touching the server.
    let date = query.date()?;

    let mut session = SessionScope::open(state.backend.as_ref(), credentials).await?;
    debug!(file = %session.file(), %date, "Fetching budget history");
    let history = session.budget_history(date).await?;
    let month = history
        .from_month(date)
        .ok_or_else(|| SessionError::MonthNotFound(month_key(date)))?;

    Ok(Json(month.as_map()))
}

/// Balance of every account, in server order.
#[utoipa::path(
    get,
    path = "/accounts/balances",
    params(
        ("x-actual-password" = String, Header, description = "Server password"),
        ("x-actual-encryption-password" = Option<String>, Header, description = "File encryption password"),
        ("x-actual-file" = String, Header, description = "Budget file id"),
    ),
    responses(
        (status = 200, description = "Account balances, or an `error` field when none were found", body = Vec<AccountBalanceView>),
        (status = 422, description = "Invalid headers", body = ErrorBody),
        (status = 500, description = "Budget server error", body = ErrorBody),
    )
)]
pub async fn account_balances(
    State(state): State<AppState>,
    credentials: Credentials,
) -> Result<Json<BalancesResponse>, ApiError> {
    let _timer = LatencyTimer::new("/accounts/balances");
    let mut session = SessionScope::open(state.backend.as_ref(), &credentials).await?;

    let accounts = match session.accounts().await? {
        Some(accounts) if !accounts.is_empty() => accounts,
        _ => {
            return Ok(Json(BalancesResponse::Empty(NoAccounts {
                error: NO_ACCOUNTS.to_string(),
            })))
        }
    };

    let balances = accounts
        .iter()
        .map(|account| {
            debug!(account = %account.name, balance = ?account.balance, "Account");
            AccountBalanceView::from(account)
        })
        .collect();

    Ok(Json(BalancesResponse::Balances(balances)))
}

/// Health check handler - always returns 200.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        message: "API is running".to_string(),
    })
}
