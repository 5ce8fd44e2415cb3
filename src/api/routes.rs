//! HTTP API route definitions.

use axum::{
    routing::{get, post},
    Json, Router,
};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use super::error::{panic_response, ErrorBody};
use super::handlers::{
    self, account_balances, add_transaction, budget_for_month, current_budget, health, AppState,
    HealthResponse, NoAccounts,
};
use crate::budget::{AccountBalanceView, TransactionRequest};

/// OpenAPI description of the service.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Actual-HTTP",
        description = "Simple API wrapper for ActualBudget",
        version = "1.0.0"
    ),
    paths(
        handlers::add_transaction,
        handlers::budget_for_month,
        handlers::current_budget,
        handlers::account_balances,
        handlers::health,
    ),
    components(schemas(
        TransactionRequest,
        AccountBalanceView,
        ErrorBody,
        HealthResponse,
        NoAccounts
    ))
)]
pub struct ApiDoc;

async fn openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Create the API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/transaction/add", post(add_transaction))
        .route("/budget/current", get(current_budget))
        .route("/budget/:year/:month", get(budget_for_month))
        .route("/accounts/balances", get(account_balances))
        .route("/health", get(health))
        .route("/openapi.json", get(openapi))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actual::MockBackend;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let app = create_router(AppState::new(MockBackend::new()));

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn openapi_lists_every_route() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&str> = doc.paths.paths.keys().map(String::as_str).collect();

        for expected in [
            "/transaction/add",
            "/budget/{year}/{month}",
            "/budget/current",
            "/accounts/balances",
            "/health",
        ] {
            assert!(paths.contains(&expected), "missing {}", expected);
        }
        assert_eq!(doc.info.title, "Actual-HTTP");
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let app = create_router(AppState::new(MockBackend::new()));

        let response = app
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
