//! HTTP API over the archive
//!
//! Read routes mirror the CLI listings; `POST /balances` appends a manually
//! reported balance. Storage calls are blocking and run on the blocking pool.
//! A file-backed server opens the archive per request, so `sfa sync` can
//! write between requests.

use std::sync::Arc;

use archiver_core::adapters::duckdb::ArchiveHandle;
use archiver_core::services::{NewBalance, QueryService};
use archiver_core::{AccountBasic, Balance, Error as CoreError};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;

pub struct AppState {
    pub archive: ArchiveHandle,
}

#[derive(Debug)]
pub enum ApiError {
    Core(CoreError),
    BadRequest(String),
    Internal(String),
}

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        ApiError::Core(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, msg) = match self {
            ApiError::Core(e) => {
                let status = match &e {
                    CoreError::NotFound(_) => StatusCode::NOT_FOUND,
                    CoreError::Conflict(_) => StatusCode::CONFLICT,
                    CoreError::Validation(_) => StatusCode::BAD_REQUEST,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                if status.is_server_error() {
                    tracing::error!(error = %e, "request failed");
                }
                (status, e.to_string())
            }
            ApiError::BadRequest(reason) => (StatusCode::BAD_REQUEST, reason),
            ApiError::Internal(reason) => (StatusCode::INTERNAL_SERVER_ERROR, reason),
        };
        (status, Json(json!({ "error": msg }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Serialize)]
struct AccountView {
    id: String,
    bank: String,
    name: String,
    currency: String,
}

#[derive(Serialize)]
struct TransactionView {
    id: String,
    posted: DateTime<Utc>,
    amount: Decimal,
    description: String,
    transacted_at: DateTime<Utc>,
    account: AccountBasic,
}

#[derive(Serialize)]
struct BalanceView {
    id: String,
    balance: Decimal,
    available_balance: Decimal,
    balance_date: DateTime<Utc>,
    account: AccountBasic,
}

pub fn app_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health_check", get(health_check))
        .route("/accounts", get(list_accounts))
        .route("/transactions", get(list_transactions))
        .route("/balances", get(list_balances).post(create_balance))
        .with_state(state)
}

/// Run a blocking storage call off the async workers
async fn blocking<T, F>(state: Arc<AppState>, f: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce(&QueryService) -> archiver_core::domain::result::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        state
            .archive
            .with_repository(|repo| f(&QueryService::new(Arc::clone(repo))))
    })
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(ApiError::from)
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn list_accounts(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<AccountView>>> {
    let accounts = blocking(state, |q| q.accounts()).await?;
    Ok(Json(
        accounts
            .into_iter()
            .map(|a| AccountView {
                id: a.id,
                bank: a.bank,
                name: a.name,
                currency: a.currency,
            })
            .collect(),
    ))
}

async fn list_transactions(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<TransactionView>>> {
    let entries = blocking(state, |q| q.transactions(None)).await?;
    Ok(Json(
        entries
            .into_iter()
            .map(|e| TransactionView {
                id: e.transaction.id,
                posted: e.transaction.posted,
                amount: e.transaction.amount,
                description: e.transaction.description,
                transacted_at: e.transaction.transacted_at,
                account: e.account,
            })
            .collect(),
    ))
}

async fn list_balances(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<BalanceView>>> {
    let entries = blocking(state, |q| q.balances(None)).await?;
    Ok(Json(
        entries
            .into_iter()
            .map(|e| BalanceView {
                id: e.balance.id,
                balance: e.balance.balance,
                available_balance: e.balance.available_balance,
                balance_date: e.balance.balance_date,
                account: e.account,
            })
            .collect(),
    ))
}

async fn create_balance(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<NewBalance>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Balance>)> {
    let Json(new) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let created = blocking(state, move |q| q.create_balance(new)).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use archiver_core::adapters::duckdb::DuckDbRepository;
    use archiver_core::{Account, QueryResult, Transaction};
    use axum::{
        body::{to_bytes, Body},
        http::{header, Method, Request},
    };
    use chrono::TimeZone;
    use tower::ServiceExt;

    fn test_router() -> Router {
        let repo = Arc::new(DuckDbRepository::open_in_memory().unwrap());
        repo.ensure_schema().unwrap();

        let day = |d| Utc.with_ymd_and_hms(2025, 6, d, 0, 0, 0).unwrap();
        let checking = Account::new("acct-1", "Zeta Bank", "Checking", "USD").with_transactions(vec![
            Transaction::new("t1", "acct-1", day(1), Decimal::new(-1250, 2), "Groceries"),
            Transaction::new("t2", "acct-1", day(3), Decimal::new(300000, 2), "Payroll"),
        ]);
        let savings = Account::new("acct-2", "Alpha Credit Union", "Savings", "USD").with_balances(vec![
            Balance::new("acct-2:1", "acct-2", Decimal::new(50000, 2), None, day(2)),
        ]);
        repo.persist(QueryResult::new(vec![checking, savings]), false)
            .unwrap();

        app_router(Arc::new(AppState {
            archive: ArchiveHandle::shared(repo),
        }))
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_balance(body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/balances")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_check_ok() {
        let (status, body) = send(test_router(), get_request("/health_check")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn accounts_ordered_by_bank() {
        let (status, body) = send(test_router(), get_request("/accounts")).await;
        assert_eq!(status, StatusCode::OK);

        let banks: Vec<_> = body.as_array().unwrap().iter().map(|a| a["bank"].clone()).collect();
        assert_eq!(banks, vec![json!("Alpha Credit Union"), json!("Zeta Bank")]);
        assert_eq!(body[0]["currency"], "USD");
        assert!(body[0].get("transactions").is_none());
    }

    #[tokio::test]
    async fn transactions_newest_first_with_account() {
        let (status, body) = send(test_router(), get_request("/transactions")).await;
        assert_eq!(status, StatusCode::OK);

        let rows = body.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["id"], "t2");
        assert_eq!(rows[0]["account"]["bank"], "Zeta Bank");
        assert_eq!(rows[1]["id"], "t1");
    }

    #[tokio::test]
    async fn balances_list() {
        let (status, body) = send(test_router(), get_request("/balances")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["id"], "acct-2:1");
        assert_eq!(body[0]["account"]["name"], "Savings");
    }

    #[tokio::test]
    async fn create_balance_then_conflict() {
        let app = test_router();
        let payload = json!({
            "id": "manual-1",
            "account_id": "acct-1",
            "balance": "1200.50",
            "balance_date": "2025-06-10T00:00:00Z"
        });

        let (status, body) = send(app.clone(), post_balance(payload.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["id"], "manual-1");
        assert_eq!(body["available_balance"], body["balance"]);

        let (status, body) = send(app, post_balance(payload)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn create_balance_unknown_account() {
        let payload = json!({
            "account_id": "missing",
            "balance": "1.00",
            "balance_date": "2025-06-10T00:00:00Z"
        });
        let (status, _) = send(test_router(), post_balance(payload)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn create_balance_invalid_body() {
        let (status, body) = send(test_router(), post_balance(json!({"balance": "x"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn file_archive_is_released_between_requests() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("archive.duckdb");
        let app = app_router(Arc::new(AppState {
            archive: ArchiveHandle::file(&path),
        }));

        let (status, body) = send(app.clone(), get_request("/accounts")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));

        // A sync writes while the server is idle
        let writer = DuckDbRepository::new(&path).unwrap();
        writer
            .persist(
                QueryResult::new(vec![Account::new("acct-9", "Late Bank", "Checking", "USD")]),
                false,
            )
            .unwrap();
        drop(writer);

        let (status, body) = send(app, get_request("/accounts")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["id"], "acct-9");
    }
}
