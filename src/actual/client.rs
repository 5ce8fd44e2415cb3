//! Actual server client over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument, warn};
use url::Url;

use super::session::{BudgetBackend, BudgetSession};
use crate::budget::{Account, BudgetHistory, NewTransaction, TransactionId};
use crate::config::{Config, ServiceTarget};
use crate::credentials::Credentials;
use crate::error::SessionError;

const TOKEN_HEADER: &str = "X-ACTUAL-TOKEN";
const FILE_ID_HEADER: &str = "X-ACTUAL-FILE-ID";
const ENCRYPTION_HEADER: &str = "X-ACTUAL-ENCRYPTION-PASSWORD";

/// Where the server address comes from.
#[derive(Debug, Clone)]
enum Target {
    /// `ACTUAL_HOST`, re-read on every open.
    Env,
    /// Fixed address.
    Fixed(String),
}

/// Opens HTTP sessions against an Actual server.
#[derive(Debug, Clone)]
pub struct ActualBackend {
    /// HTTP client shared by all sessions; it holds no per-session state.
    http: reqwest::Client,
    target: Target,
}

/// Common `{status, data, reason}` response wrapper.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    status: Option<String>,
    data: Option<T>,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest<'a> {
    login_method: &'static str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginData {
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileInfo {
    #[serde(default)]
    deleted: Option<Value>,
    #[serde(default)]
    encrypt_meta: Option<EncryptMeta>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EncryptMeta {
    #[serde(default)]
    key_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct StagedTransaction<'a> {
    id: TransactionId,
    #[serde(flatten)]
    transaction: &'a NewTransaction,
}

#[derive(Debug, Serialize)]
struct TransactionBatch<'a> {
    transactions: Vec<StagedTransaction<'a>>,
}

#[derive(Debug, Serialize)]
struct RuleRun<'a> {
    transactions: &'a [TransactionId],
}

impl ActualBackend {
    /// Backend that reads `ACTUAL_HOST` on every session open.
    pub fn from_env(config: &Config) -> Result<Self, SessionError> {
        Ok(Self {
            http: build_http(config)?,
            target: Target::Env,
        })
    }

    /// Backend bound to a fixed server address.
    pub fn with_host(config: &Config, host: impl Into<String>) -> Result<Self, SessionError> {
        Ok(Self {
            http: build_http(config)?,
            target: Target::Fixed(host.into()),
        })
    }

    fn base_url(&self) -> Result<Url, SessionError> {
        let target = match &self.target {
            Target::Env => ServiceTarget::from_env()?,
            Target::Fixed(host) => ServiceTarget {
                actual_host: host.clone(),
            },
        };
        target.base_url()
    }

    #[instrument(skip_all)]
    async fn login(&self, base: &Url, password: &str) -> Result<String, SessionError> {
        let url = join(base, &["account", "login"])?;
        let response = self
            .http
            .post(url)
            .json(&LoginRequest {
                login_method: "password",
                password,
            })
            .send()
            .await
            .map_err(|e| SessionError::Open(format!("budget server unreachable: {}", e)))?;

        let status = response.status();
        let body: Envelope<LoginData> = response
            .json()
            .await
            .map_err(|e| SessionError::Open(format!("invalid login response: {}", e)))?;

        if !status.is_success() || body.status.as_deref() != Some("ok") {
            return Err(SessionError::Open(format!(
                "login failed: {}",
                body.reason.unwrap_or_else(|| format!("HTTP {}", status))
            )));
        }

        body.data
            .and_then(|d| d.token)
            .ok_or_else(|| SessionError::Open("login failed: no token returned".to_string()))
    }

    #[instrument(skip(self, base, token))]
    async fn file_info(&self, base: &Url, token: &str, file: &str) -> Result<FileInfo, SessionError> {
        let url = join(base, &["sync", "get-user-file-info"])?;
        let response = self
            .http
            .get(url)
            .header(TOKEN_HEADER, token)
            .header(FILE_ID_HEADER, file)
            .send()
            .await
            .map_err(|e| SessionError::Open(format!("budget server unreachable: {}", e)))?;

        let status = response.status();
        let body: Envelope<FileInfo> = response
            .json()
            .await
            .map_err(|e| SessionError::Open(format!("invalid file info response: {}", e)))?;

        if !status.is_success() || body.status.as_deref() != Some("ok") {
            return Err(SessionError::Open(format!(
                "budget file {} not found: {}",
                file,
                body.reason.unwrap_or_else(|| format!("HTTP {}", status))
            )));
        }

        body.data
            .ok_or_else(|| SessionError::Open(format!("budget file {} not found", file)))
    }
}

#[async_trait]
impl BudgetBackend for ActualBackend {
    #[instrument(skip_all, fields(file = %credentials.file))]
    async fn open(&self, credentials: &Credentials) -> Result<Box<dyn BudgetSession>, SessionError> {
        let base = self.base_url()?;
        let token = self.login(&base, &credentials.password).await?;
        let info = self.file_info(&base, &token, &credentials.file).await?;

        if info.deleted.as_ref().is_some_and(is_truthy) {
            return Err(SessionError::Open(format!(
                "budget file {} has been deleted",
                credentials.file
            )));
        }

        let encrypted = info
            .encrypt_meta
            .as_ref()
            .and_then(|m| m.key_id.as_ref())
            .is_some();
        if encrypted && credentials.encryption_password.is_none() {
            return Err(SessionError::Open(
                "file is encrypted but no encryption password was provided".to_string(),
            ));
        }

        debug!(encrypted, "Logged in to budget server");

        Ok(Box::new(ActualSession {
            http: self.http.clone(),
            base,
            token: Some(token),
            file: credentials.file.clone(),
            encryption_password: credentials.encryption_password.clone(),
            staged: Vec::new(),
        }))
    }
}

/// Session against one budget file.
pub struct ActualSession {
    http: reqwest::Client,
    base: Url,
    /// `None` once closed.
    token: Option<String>,
    file: String,
    encryption_password: Option<String>,
    staged: Vec<(TransactionId, NewTransaction)>,
}

impl ActualSession {
    fn file_endpoint(&self, tail: &[&str]) -> Result<Url, SessionError> {
        let mut segments = vec!["api", "files", self.file.as_str()];
        segments.extend_from_slice(tail);
        join(&self.base, &segments)
    }

    fn authed(&self, builder: RequestBuilder) -> Result<RequestBuilder, SessionError> {
        let token = self.token.as_deref().ok_or(SessionError::Closed)?;
        let builder = builder
            .header(TOKEN_HEADER, token)
            .header(FILE_ID_HEADER, &self.file);
        Ok(match &self.encryption_password {
            Some(password) => builder.header(ENCRYPTION_HEADER, password),
            None => builder,
        })
    }

    async fn fetch<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<Option<T>, SessionError> {
        let response = check(self.authed(builder)?.send().await?).await?;
        let body: Envelope<T> = response
            .json()
            .await
            .map_err(|e| SessionError::Decode(e.to_string()))?;
        Ok(body.data)
    }
}

#[async_trait]
impl BudgetSession for ActualSession {
    async fn create_transaction(
        &mut self,
        transaction: NewTransaction,
    ) -> Result<TransactionId, SessionError> {
        if self.token.is_none() {
            return Err(SessionError::Closed);
        }
        let id = TransactionId::new();
        debug!(%id, account = %transaction.account, amount = %transaction.amount, "Staged transaction");
        self.staged.push((id, transaction));
        Ok(id)
    }

    #[instrument(skip(self), fields(file = %self.file, staged = self.staged.len()))]
    async fn commit(&mut self) -> Result<(), SessionError> {
        if self.staged.is_empty() {
            return Ok(());
        }

        let url = self.file_endpoint(&["transactions"])?;
        let request = {
            let batch = TransactionBatch {
                transactions: self
                    .staged
                    .iter()
                    .map(|(id, transaction)| StagedTransaction {
                        id: *id,
                        transaction,
                    })
                    .collect(),
            };
            self.authed(self.http.post(url))?.json(&batch)
        };
        check(request.send().await?).await?;

        self.staged.clear();
        Ok(())
    }

    #[instrument(skip(self), fields(file = %self.file))]
    async fn run_rules(&mut self, transactions: &[TransactionId]) -> Result<(), SessionError> {
        let url = self.file_endpoint(&["rules", "run"])?;
        let request = self
            .authed(self.http.post(url))?
            .json(&RuleRun { transactions });
        check(request.send().await?).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(file = %self.file))]
    async fn budget_history(&mut self, as_of: NaiveDate) -> Result<BudgetHistory, SessionError> {
        let url = self.file_endpoint(&["budget-history"])?;
        let as_of = as_of.format("%Y-%m-%d").to_string();
        let request = self.http.get(url).query(&[("as_of", as_of.as_str())]);
        self.fetch(request)
            .await?
            .ok_or_else(|| SessionError::Decode("budget history response has no data".to_string()))
    }

    #[instrument(skip(self), fields(file = %self.file))]
    async fn accounts(&mut self) -> Result<Option<Vec<Account>>, SessionError> {
        let url = self.file_endpoint(&["accounts"])?;
        self.fetch(self.http.get(url)).await
    }

    fn close(&mut self) {
        if self.token.take().is_none() {
            return;
        }
        if !self.staged.is_empty() {
            warn!(
                file = %self.file,
                discarded = self.staged.len(),
                "Closing session with uncommitted changes"
            );
            self.staged.clear();
        }
    }
}

fn build_http(config: &Config) -> Result<reqwest::Client, SessionError> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_millis(config.http_timeout_ms))
        .connect_timeout(Duration::from_secs(10))
        .build()?)
}

/// Append path segments to `base`, percent-encoding each one.
fn join(base: &Url, segments: &[&str]) -> Result<Url, SessionError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| SessionError::Open(format!("{} cannot be used as a base URL", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

async fn check(response: Response) -> Result<Response, SessionError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(SessionError::Remote {
        status: status.as_u16(),
        body,
    })
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty() && s != "0",
        Value::Null => false,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mock_login(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/account/login"))
            .and(body_json(json!({"loginMethod": "password", "password": "hunter2"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"status": "ok", "data": {"token": "tok-1"}})),
            )
            .mount(server)
            .await;
    }

    async fn mock_file(server: &MockServer, encrypt_meta: Value) {
        Mock::given(method("GET"))
            .and(path("/sync/get-user-file-info"))
            .and(header(TOKEN_HEADER, "tok-1"))
            .and(header(FILE_ID_HEADER, "budget-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "ok",
                "data": {"deleted": 0, "fileId": "budget-1", "encryptMeta": encrypt_meta}
            })))
            .mount(server)
            .await;
    }

    fn backend(server: &MockServer) -> ActualBackend {
        ActualBackend::with_host(&Config::default(), server.uri()).unwrap()
    }

    fn creds(encryption_password: Option<&str>) -> Credentials {
        Credentials::new("hunter2", encryption_password, "budget-1")
    }

    fn transaction() -> NewTransaction {
        NewTransaction {
            date: NaiveDate::from_ymd_opt(2024, 5, 17).unwrap(),
            account: "Checking".to_string(),
            payee: "Grocer".to_string(),
            category: Some("Food".to_string()),
            amount: dec!(-42.10),
            notes: None,
            cleared: true,
        }
    }

    #[tokio::test]
    async fn wrong_password_fails_open() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/account/login"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(json!({"status": "error", "reason": "invalid-password"})),
            )
            .mount(&server)
            .await;

        let err = backend(&server).open(&creds(None)).await.err().unwrap();
        assert!(matches!(err, SessionError::Open(_)));
        assert!(err.to_string().contains("invalid-password"));
    }

    #[tokio::test]
    async fn unknown_file_fails_open() {
        let server = MockServer::start().await;
        mock_login(&server).await;
        Mock::given(method("GET"))
            .and(path("/sync/get-user-file-info"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(json!({"status": "error", "reason": "file-not-found"})),
            )
            .mount(&server)
            .await;

        let err = backend(&server).open(&creds(None)).await.err().unwrap();
        assert!(err.to_string().contains("file-not-found"));
    }

    #[tokio::test]
    async fn encrypted_file_requires_password() {
        let server = MockServer::start().await;
        mock_login(&server).await;
        mock_file(&server, json!({"keyId": "key-1"})).await;

        let err = backend(&server).open(&creds(None)).await.err().unwrap();
        assert!(err.to_string().contains("encrypted"));

        assert!(backend(&server).open(&creds(Some("secret123"))).await.is_ok());
    }

    #[tokio::test]
    async fn unreachable_server_fails_open() {
        let backend = ActualBackend::with_host(&Config::default(), "http://127.0.0.1:9").unwrap();

        let err = backend.open(&creds(None)).await.err().unwrap();
        assert!(matches!(err, SessionError::Open(_)));
    }

    #[tokio::test]
    async fn commit_sends_staged_batch() {
        let server = MockServer::start().await;
        mock_login(&server).await;
        mock_file(&server, Value::Null).await;
        Mock::given(method("POST"))
            .and(path("/api/files/budget-1/transactions"))
            .and(header(TOKEN_HEADER, "tok-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
            .expect(1)
            .mount(&server)
            .await;

        let mut session = backend(&server).open(&creds(None)).await.unwrap();
        let id = session.create_transaction(transaction()).await.unwrap();
        session.commit().await.unwrap();
        // Nothing left to send.
        session.commit().await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let commit = requests
            .iter()
            .find(|r| r.url.path() == "/api/files/budget-1/transactions")
            .unwrap();
        let body: Value = serde_json::from_slice(&commit.body).unwrap();
        assert_eq!(body["transactions"][0]["id"], json!(id));
        assert_eq!(body["transactions"][0]["amount"], "-42.10");
        assert_eq!(body["transactions"][0]["date"], "2024-05-17");
        assert_eq!(body["transactions"][0]["cleared"], true);
    }

    #[tokio::test]
    async fn remote_errors_carry_status() {
        let server = MockServer::start().await;
        mock_login(&server).await;
        mock_file(&server, Value::Null).await;
        Mock::given(method("POST"))
            .and(path("/api/files/budget-1/rules/run"))
            .respond_with(ResponseTemplate::new(500).set_body_string("rule engine exploded"))
            .mount(&server)
            .await;

        let mut session = backend(&server).open(&creds(None)).await.unwrap();
        let err = session.run_rules(&[TransactionId::new()]).await.err().unwrap();
        match err {
            SessionError::Remote { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "rule engine exploded");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn budget_history_passes_date() {
        let server = MockServer::start().await;
        mock_login(&server).await;
        mock_file(&server, Value::Null).await;
        Mock::given(method("GET"))
            .and(path("/api/files/budget-1/budget-history"))
            .and(query_param("as_of", "2024-05-01"))
            .and(header(ENCRYPTION_HEADER, "secret123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"months": [{"month": "2024-05", "budgeted": 300}]}
            })))
            .mount(&server)
            .await;

        let mut session = backend(&server).open(&creds(Some("secret123"))).await.unwrap();
        let history = session
            .budget_history(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap())
            .await
            .unwrap();
        assert_eq!(history.months.len(), 1);
        assert_eq!(history.months[0].month, "2024-05");
    }

    #[tokio::test]
    async fn accounts_null_is_none() {
        let server = MockServer::start().await;
        mock_login(&server).await;
        mock_file(&server, Value::Null).await;
        Mock::given(method("GET"))
            .and(path("/api/files/budget-1/accounts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": null})))
            .mount(&server)
            .await;

        let mut session = backend(&server).open(&creds(None)).await.unwrap();
        assert_eq!(session.accounts().await.unwrap(), None);
    }

    #[tokio::test]
    async fn closed_session_rejects_work() {
        let server = MockServer::start().await;
        mock_login(&server).await;
        mock_file(&server, Value::Null).await;

        let mut session = backend(&server).open(&creds(None)).await.unwrap();
        session.create_transaction(transaction()).await.unwrap();
        session.close();

        assert!(matches!(
            session.create_transaction(transaction()).await,
            Err(SessionError::Closed)
        ));
        assert!(matches!(session.accounts().await, Err(SessionError::Closed)));
    }

    #[test]
    fn join_encodes_segments() {
        let base = Url::parse("http://localhost:5006/").unwrap();
        let url = join(&base, &["api", "files", "a b/c", "accounts"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:5006/api/files/a%20b%2Fc/accounts");
    }
}
