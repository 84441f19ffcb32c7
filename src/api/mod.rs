pub mod types;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::{multipart, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use types::{
    BenchmarkLabel, BenchmarkLabelIn, BenchmarkLabelList, Conversation, ConversationDetail,
    DatasetDetail, DatasetIndexReport, DatasetIndexRequest, DatasetSearchRequest, DatasetSummary,
    LoginResponse, Message, Role, SearchMode, SearchRequest, SearchResponse, User,
};

/// Normalized failure taxonomy for every remote call. The client never leaks
/// raw transport errors to callers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not authenticated: {0}")]
    Auth(String),
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("server error ({status}): {detail}")]
    Server { status: u16, detail: String },
}

/// Explicitly injected credential state. Only [`SearchClient::login`] writes
/// the token and only [`SearchClient::logout`] clears it; everything else
/// reads it when attaching the Authorization header.
#[derive(Debug, Default)]
pub struct SessionContext {
    token: Mutex<Option<String>>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(&self) -> Option<String> {
        self.token.lock().unwrap().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.lock().unwrap().is_some()
    }

    fn store_token(&self, token: String) {
        *self.token.lock().unwrap() = Some(token);
    }

    fn clear_token(&self) {
        *self.token.lock().unwrap() = None;
    }
}

/// Typed boundary to the search comparison service.
pub struct SearchClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
    session: Arc<SessionContext>,
}

impl SearchClient {
    pub fn new(config: &ClientConfig, session: Arc<SessionContext>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.clone(),
            timeout: config.timeout,
            session,
        }
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Attach the bearer token when one is stored. A missing token is not an
    /// error here; the server answers 401 and that maps to [`ApiError::Auth`].
    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match self.session.token() {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// Server error bodies carry a `detail` field; fall back to the
    /// caller-supplied message when the body is not parsable JSON or lacks it.
    fn extract_detail(body: Option<String>, fallback: &str) -> String {
        body.as_deref()
            .and_then(|text| serde_json::from_str::<serde_json::Value>(text).ok())
            .and_then(|value| {
                value
                    .get("detail")
                    .and_then(|d| d.as_str())
                    .map(str::to_owned)
            })
            .unwrap_or_else(|| fallback.to_string())
    }

    async fn send_checked(
        &self,
        req: RequestBuilder,
        fallback: &str,
    ) -> Result<reqwest::Response, ApiError> {
        let resp = req.timeout(self.timeout).send().await.map_err(|e| {
            if e.is_timeout() {
                ApiError::Timeout(self.timeout)
            } else {
                ApiError::Network(e.to_string())
            }
        })?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            let detail = Self::extract_detail(resp.text().await.ok(), "authentication required");
            warn!(detail = %detail, "request rejected as unauthenticated");
            return Err(ApiError::Auth(detail));
        }
        if !status.is_success() {
            let detail = Self::extract_detail(resp.text().await.ok(), fallback);
            debug!(status = status.as_u16(), detail = %detail, "server rejected request");
            return Err(ApiError::Server {
                status: status.as_u16(),
                detail,
            });
        }
        Ok(resp)
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        req: RequestBuilder,
        fallback: &str,
    ) -> Result<T, ApiError> {
        let resp = self.send_checked(req, fallback).await?;
        let status = resp.status().as_u16();
        resp.json::<T>().await.map_err(|e| ApiError::Server {
            status,
            detail: format!("unexpected response body: {}", e),
        })
    }

    async fn execute_unit(&self, req: RequestBuilder, fallback: &str) -> Result<(), ApiError> {
        self.send_checked(req, fallback).await.map(|_| ())
    }

    // ── Auth ──

    pub async fn register(&self, email: &str, password: &str) -> Result<User, ApiError> {
        let body = serde_json::json!({ "email": email, "password": password });
        let req = self.http.post(self.url("/auth/register")).json(&body);
        self.execute(req, "registration failed").await
    }

    /// Form-encoded credential exchange. On success the bearer token is
    /// stored in the session context as a side effect.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, ApiError> {
        let req = self
            .http
            .post(self.url("/auth/login"))
            .form(&[("username", email), ("password", password)]);
        let resp: LoginResponse = self.execute(req, "invalid credentials").await?;
        self.session.store_token(resp.access_token.clone());
        Ok(resp)
    }

    pub async fn current_user(&self) -> Result<User, ApiError> {
        let req = self.authorize(self.http.get(self.url("/auth/me")));
        self.execute(req, "not authenticated").await
    }

    /// Local-only: clears the stored token. No network call is made.
    pub fn logout(&self) {
        self.session.clear_token();
    }

    // ── Conversations ──

    pub async fn list_conversations(&self) -> Result<Vec<Conversation>, ApiError> {
        let req = self.authorize(self.http.get(self.url("/conversations")));
        self.execute(req, "failed to load conversations").await
    }

    pub async fn create_conversation(&self, title: &str) -> Result<Conversation, ApiError> {
        let body = serde_json::json!({ "title": title });
        let req = self.authorize(self.http.post(self.url("/conversations")).json(&body));
        self.execute(req, "failed to create conversation").await
    }

    pub async fn conversation(&self, id: i64) -> Result<ConversationDetail, ApiError> {
        let req = self.authorize(self.http.get(self.url(&format!("/conversations/{}", id))));
        self.execute(req, "conversation not found").await
    }

    pub async fn delete_conversation(&self, id: i64) -> Result<(), ApiError> {
        let req = self.authorize(
            self.http
                .delete(self.url(&format!("/conversations/{}", id))),
        );
        self.execute_unit(req, "failed to delete conversation").await
    }

    pub async fn add_message(
        &self,
        conversation_id: i64,
        role: Role,
        content: &str,
    ) -> Result<Message, ApiError> {
        let body = serde_json::json!({ "role": role.as_str(), "content": content });
        let req = self.authorize(
            self.http
                .post(self.url(&format!("/conversations/{}/messages", conversation_id)))
                .json(&body),
        );
        self.execute(req, "failed to persist message").await
    }

    // ── Search ──

    /// Idempotent on the server side: an already-indexed dataset is reused
    /// unless `force_reindex` is set.
    pub async fn index_dataset(
        &self,
        dataset_id: &str,
        force_reindex: bool,
    ) -> Result<DatasetIndexReport, ApiError> {
        let body = DatasetIndexRequest {
            dataset_id: dataset_id.to_string(),
            force_reindex,
        };
        let req = self.authorize(self.http.post(self.url("/search/dataset/index")).json(&body));
        self.execute(req, "dataset indexing failed").await
    }

    pub async fn search_dataset(
        &self,
        request: &DatasetSearchRequest,
    ) -> Result<SearchResponse, ApiError> {
        let req = self.authorize(self.http.post(self.url("/search/dataset")).json(request));
        self.execute(req, "dataset search failed").await
    }

    pub async fn search_file(
        &self,
        query: &str,
        filename: &str,
        content: Vec<u8>,
        mode: SearchMode,
        top_k: u32,
        candidate_k: u32,
    ) -> Result<SearchResponse, ApiError> {
        let form = multipart::Form::new()
            .text("query", query.to_string())
            .text("mode", mode.as_str().to_string())
            .text("top_k", top_k.to_string())
            .text("candidate_k", candidate_k.to_string())
            .part(
                "file",
                multipart::Part::bytes(content).file_name(filename.to_string()),
            );
        let req = self.authorize(self.http.post(self.url("/search/file")).multipart(form));
        self.execute(req, "file search failed").await
    }

    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, ApiError> {
        let req = self.authorize(self.http.post(self.url("/search")).json(request));
        self.execute(req, "search failed").await
    }

    // ── Datasets ──

    pub async fn list_datasets(&self) -> Result<Vec<DatasetSummary>, ApiError> {
        let req = self.authorize(self.http.get(self.url("/datasets")));
        self.execute(req, "failed to load datasets").await
    }

    pub async fn dataset(&self, dataset_id: &str) -> Result<DatasetDetail, ApiError> {
        let req = self.authorize(self.http.get(self.url(&format!("/datasets/{}", dataset_id))));
        self.execute(req, "dataset not found").await
    }

    // ── Benchmark labels ──

    pub async fn list_labels(&self) -> Result<BenchmarkLabelList, ApiError> {
        let req = self.authorize(self.http.get(self.url("/benchmarks/labels")));
        self.execute(req, "failed to load benchmark labels").await
    }

    pub async fn create_label(&self, label: &BenchmarkLabelIn) -> Result<BenchmarkLabel, ApiError> {
        let req = self.authorize(self.http.post(self.url("/benchmarks/labels")).json(label));
        self.execute(req, "failed to create benchmark label").await
    }

    pub async fn delete_label(&self, benchmark_id: &str) -> Result<(), ApiError> {
        let req = self.authorize(
            self.http
                .delete(self.url(&format!("/benchmarks/labels/{}", benchmark_id))),
        );
        self.execute_unit(req, "failed to delete benchmark label")
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_extracted_from_json_body() {
        let body = Some(r#"{"detail": "Dataset nao encontrado"}"#.to_string());
        assert_eq!(
            SearchClient::extract_detail(body, "fallback"),
            "Dataset nao encontrado"
        );
    }

    #[test]
    fn detail_falls_back_on_plain_text() {
        let body = Some("Internal Server Error".to_string());
        assert_eq!(SearchClient::extract_detail(body, "fallback"), "fallback");
    }

    #[test]
    fn detail_falls_back_on_missing_field() {
        let body = Some(r#"{"error": "boom"}"#.to_string());
        assert_eq!(SearchClient::extract_detail(body, "fallback"), "fallback");
    }

    #[test]
    fn detail_falls_back_on_empty_body() {
        assert_eq!(SearchClient::extract_detail(None, "fallback"), "fallback");
    }

    #[test]
    fn session_context_token_lifecycle() {
        let ctx = SessionContext::new();
        assert!(!ctx.is_authenticated());
        ctx.store_token("abc".into());
        assert_eq!(ctx.token().as_deref(), Some("abc"));
        ctx.clear_token();
        assert!(ctx.token().is_none());
    }
}
