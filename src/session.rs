//! The "send a query" state machine: conversation lifecycle, ordered network
//! calls, confirmed-before-append message handling, cache updates and error
//! narration. Failures are absorbed into a single assistant message; they
//! never leave the orchestrator in a stuck state.

use chrono::Utc;
use tracing::{debug, warn};

use crate::api::types::{
    Conversation, DatasetSearchRequest, Message, Role, SearchMode, SearchRequest, SearchResponse,
    SearchResponseLite,
};
use crate::api::{ApiError, SearchClient};
use crate::cache::ResponseCache;
use crate::compare::{self, SearchView};

const TITLE_MAX_CHARS: usize = 60;
pub const DEFAULT_TOP_K: u32 = 5;
pub const DEFAULT_CANDIDATE_K: u32 = 20;

/// What the query runs against.
#[derive(Debug, Clone)]
pub enum QueryTarget {
    /// A managed dataset; requires indexing before search. A `query_id`
    /// selects one of the dataset's benchmark queries.
    Dataset {
        dataset_id: String,
        query_id: Option<String>,
    },
    /// An uploaded file, sent multipart alongside the query.
    File { filename: String, content: Vec<u8> },
    /// An ad-hoc list of document texts.
    Documents(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct SendRequest {
    pub query: String,
    pub target: QueryTarget,
    pub mode: SearchMode,
    pub top_k: u32,
    pub candidate_k: u32,
}

impl SendRequest {
    pub fn dataset(query: impl Into<String>, dataset_id: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            target: QueryTarget::Dataset {
                dataset_id: dataset_id.into(),
                query_id: None,
            },
            mode: SearchMode::Compare,
            top_k: DEFAULT_TOP_K,
            candidate_k: DEFAULT_CANDIDATE_K,
        }
    }

    pub fn file(query: impl Into<String>, filename: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            query: query.into(),
            target: QueryTarget::File {
                filename: filename.into(),
                content,
            },
            mode: SearchMode::Classical,
            top_k: DEFAULT_TOP_K,
            candidate_k: DEFAULT_CANDIDATE_K,
        }
    }

    pub fn documents(query: impl Into<String>, documents: Vec<String>) -> Self {
        Self {
            query: query.into(),
            target: QueryTarget::Documents(documents),
            mode: SearchMode::Classical,
            top_k: DEFAULT_TOP_K,
            candidate_k: DEFAULT_CANDIDATE_K,
        }
    }

    pub fn with_mode(mut self, mode: SearchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_query_id(mut self, id: impl Into<String>) -> Self {
        if let QueryTarget::Dataset { query_id, .. } = &mut self.target {
            *query_id = Some(id.into());
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendState {
    Idle,
    Sending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Search completed; transcript, cache and view are updated.
    Completed,
    /// A step failed; the failure was narrated as an assistant message.
    Failed,
    /// Client-side validation failed; no network call was made.
    Invalid(String),
    /// A send is already in flight; this one was rejected, not queued.
    Busy,
}

pub struct SessionOrchestrator {
    client: SearchClient,
    cache: ResponseCache,
    conversations: Vec<Conversation>,
    active: Option<i64>,
    transcript: Vec<Message>,
    last_response: Option<SearchResponse>,
    state: SendState,
}

impl SessionOrchestrator {
    pub fn new(client: SearchClient, cache: ResponseCache) -> Self {
        Self {
            client,
            cache,
            conversations: Vec::new(),
            active: None,
            transcript: Vec::new(),
            last_response: None,
            state: SendState::Idle,
        }
    }

    pub fn client(&self) -> &SearchClient {
        &self.client
    }

    pub fn state(&self) -> SendState {
        self.state
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn active_conversation(&self) -> Option<i64> {
        self.active
    }

    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    pub fn last_response(&self) -> Option<&SearchResponse> {
        self.last_response.as_ref()
    }

    /// View-model for the last comparison shown, assembled on demand.
    pub fn last_view(&self) -> Option<SearchView> {
        self.last_response.as_ref().map(compare::assemble)
    }

    /// Drive one send end-to-end. Rejects re-entrant sends, validates before
    /// touching the network, and converts every downstream failure into a
    /// single assistant-role message.
    pub async fn send(&mut self, request: SendRequest) -> SendOutcome {
        if self.state == SendState::Sending {
            return SendOutcome::Busy;
        }
        if let Err(reason) = validate(&request) {
            return SendOutcome::Invalid(reason);
        }

        self.state = SendState::Sending;
        let outcome = match self.drive(request).await {
            Ok(()) => SendOutcome::Completed,
            Err(err) => {
                debug!(error = %err, "send failed; narrating to transcript");
                self.absorb_failure(&err).await;
                SendOutcome::Failed
            }
        };
        self.state = SendState::Idle;
        outcome
    }

    async fn drive(&mut self, request: SendRequest) -> Result<(), ApiError> {
        let conversation_id = self.ensure_conversation(&request).await?;

        // Appended only after the server confirms the write; an optimistic
        // append could show a message that silently failed to persist.
        let user_text = user_message_text(&request);
        let user_message = self
            .client
            .add_message(conversation_id, Role::User, &user_text)
            .await?;
        self.transcript.push(user_message);

        if let QueryTarget::Dataset { dataset_id, .. } = &request.target {
            self.client.index_dataset(dataset_id, false).await?;
        }

        let response = self.run_search(request).await?;

        if let Err(e) = self.cache.put(conversation_id, &response) {
            warn!(conversation_id, error = %e, "failed to cache search response");
        }

        let narrative = summarize(&response);
        self.last_response = Some(response);

        match self
            .client
            .add_message(conversation_id, Role::Assistant, &narrative)
            .await
        {
            Ok(message) => self.transcript.push(message),
            Err(e) => {
                // The search itself succeeded; keep the narrative visible
                // even when the persistence write is unreachable.
                warn!(conversation_id, error = %e, "assistant message not persisted");
                self.transcript.push(local_message(Role::Assistant, narrative));
            }
        }
        Ok(())
    }

    async fn ensure_conversation(&mut self, request: &SendRequest) -> Result<i64, ApiError> {
        if let Some(id) = self.active {
            return Ok(id);
        }
        let title = derive_title(&request.query, &request.target);
        let conversation = self.client.create_conversation(&title).await?;
        let id = conversation.id;
        self.conversations.insert(0, conversation);
        self.active = Some(id);
        Ok(id)
    }

    async fn run_search(&self, request: SendRequest) -> Result<SearchResponse, ApiError> {
        let SendRequest {
            query,
            target,
            mode,
            top_k,
            candidate_k,
        } = request;
        let query_text = query.trim().to_string();

        match target {
            QueryTarget::Dataset {
                dataset_id,
                query_id,
            } => {
                let request = DatasetSearchRequest {
                    dataset_id,
                    query: (!query_text.is_empty()).then(|| query_text.clone()),
                    query_id,
                    mode,
                    top_k,
                    candidate_k,
                };
                self.client.search_dataset(&request).await
            }
            QueryTarget::File { filename, content } => {
                self.client
                    .search_file(&query_text, &filename, content, mode, top_k, candidate_k)
                    .await
            }
            QueryTarget::Documents(documents) => {
                self.client
                    .search(&SearchRequest {
                        query: query_text,
                        documents,
                        mode,
                        top_k,
                        candidate_k,
                    })
                    .await
            }
        }
    }

    /// Exactly one assistant message per failed send: persisted when the
    /// server is reachable, display-only otherwise.
    async fn absorb_failure(&mut self, err: &ApiError) {
        let text = failure_message(err);
        let persisted = match self.active {
            Some(id) => self
                .client
                .add_message(id, Role::Assistant, &text)
                .await
                .ok(),
            None => None,
        };
        match persisted {
            Some(message) => self.transcript.push(message),
            None => self.transcript.push(local_message(Role::Assistant, text)),
        }
    }

    // ── Conversation bookkeeping ──

    pub async fn refresh_conversations(&mut self) -> Result<(), ApiError> {
        self.conversations = self.client.list_conversations().await?;
        Ok(())
    }

    /// Switch the active conversation: reload its history from the server and
    /// restore its own cached artifact (never the previous conversation's).
    pub async fn select_conversation(&mut self, id: i64) -> Result<(), ApiError> {
        let detail = self.client.conversation(id).await?;
        self.transcript = detail.messages;
        self.active = Some(id);
        self.last_response = self.cache.get(id);
        Ok(())
    }

    /// Reset to the empty/new-conversation state.
    pub fn new_conversation(&mut self) {
        self.active = None;
        self.transcript.clear();
        self.last_response = None;
    }

    /// Delete on the server, then drop the cache entry atomically with the
    /// local bookkeeping so no orphaned artifact survives.
    pub async fn delete_conversation(&mut self, id: i64) -> Result<(), ApiError> {
        self.client.delete_conversation(id).await?;
        if let Err(e) = self.cache.clear(id) {
            warn!(conversation_id = id, error = %e, "failed to clear cache entry");
        }
        self.conversations.retain(|c| c.id != id);
        if self.active == Some(id) {
            self.new_conversation();
        }
        Ok(())
    }
}

fn validate(request: &SendRequest) -> Result<(), String> {
    let has_query = !request.query.trim().is_empty();
    match &request.target {
        QueryTarget::Dataset {
            dataset_id,
            query_id,
        } => {
            if dataset_id.trim().is_empty() {
                return Err("pick a dataset first".to_string());
            }
            let has_query_id = query_id.as_deref().is_some_and(|q| !q.trim().is_empty());
            if has_query || has_query_id {
                Ok(())
            } else {
                Err("type a query or pick a dataset query".to_string())
            }
        }
        QueryTarget::File { content, .. } => {
            if content.is_empty() {
                Err("the selected file is empty".to_string())
            } else {
                Ok(())
            }
        }
        QueryTarget::Documents(documents) => {
            if !has_query {
                Err("type a query first".to_string())
            } else if documents.is_empty() {
                Err("provide at least one document".to_string())
            } else {
                Ok(())
            }
        }
    }
}

fn user_message_text(request: &SendRequest) -> String {
    let query = request.query.trim();
    if !query.is_empty() {
        return query.to_string();
    }
    match &request.target {
        QueryTarget::Dataset {
            query_id: Some(query_id),
            ..
        } => format!("Dataset query {}", query_id),
        QueryTarget::File { filename, .. } => format!("File search: {}", filename),
        _ => "Search".to_string(),
    }
}

fn derive_title(query: &str, target: &QueryTarget) -> String {
    let base = query.trim();
    let base = if base.is_empty() {
        match target {
            QueryTarget::File { filename, .. } => filename.as_str(),
            QueryTarget::Dataset { dataset_id, .. } => dataset_id.as_str(),
            QueryTarget::Documents(_) => "New query",
        }
    } else {
        base
    };
    truncate_chars(base, TITLE_MAX_CHARS)
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    text.chars().take(max_chars).collect()
}

/// Plain-text assistant narrative: per-pipeline counts, best scores and
/// latencies, plus ranking overlap for comparisons.
fn summarize(response: &SearchResponse) -> String {
    match &response.comparison {
        Some(comparison) => {
            let (derived_overlap, derived_jaccard) =
                compare::overlap_and_jaccard(&comparison.classical.results, &comparison.quantum.results);
            let comparative = response.comparison_metrics.as_ref();
            let overlap = comparative
                .and_then(|c| c.overlap_at_k)
                .unwrap_or(derived_overlap);
            let jaccard = comparative
                .and_then(|c| c.jaccard_at_k)
                .unwrap_or(derived_jaccard);
            let k = comparison
                .classical
                .metrics
                .as_ref()
                .map(|m| m.k)
                .unwrap_or(comparison.classical.results.len() as u32);
            format!(
                "{} {} Overlap@{}: {} shared documents (Jaccard {:.1}%).",
                pipeline_sentence("Classical", &comparison.classical),
                pipeline_sentence("Quantum-inspired", &comparison.quantum),
                k,
                overlap,
                jaccard * 100.0,
            )
        }
        None => {
            let label = match response.mode {
                SearchMode::Quantum => "Quantum-inspired",
                _ => "Classical",
            };
            let lite = SearchResponseLite {
                results: response.results.clone(),
                answer: response.answer.clone(),
                metrics: response.metrics.clone(),
                algorithm_details: None,
            };
            pipeline_sentence(label, &lite)
        }
    }
}

fn pipeline_sentence(label: &str, lite: &SearchResponseLite) -> String {
    let count = lite.results.len();
    let best = lite
        .results
        .iter()
        .map(|r| r.score)
        .fold(None::<f64>, |best, score| match best {
            Some(b) if b >= score => Some(b),
            _ => Some(score),
        });
    let best = match best {
        Some(score) => format!("{:.3}", score),
        None => "-".to_string(),
    };
    match &lite.metrics {
        Some(metrics) => format!(
            "{} retrieved {} documents (best score {}) in {:.1} ms.",
            label, count, best, metrics.latency_ms
        ),
        None => format!("{} retrieved {} documents (best score {}).", label, count, best),
    }
}

fn failure_message(err: &ApiError) -> String {
    match err {
        ApiError::Timeout(bound) => format!(
            "The search request timed out after {} seconds. The service may be busy; try again.",
            bound.as_secs()
        ),
        ApiError::Auth(detail) => {
            format!("Authentication failed: {}. Sign in again to continue.", detail)
        }
        ApiError::Network(detail) => {
            format!("Could not reach the search service: {}.", detail)
        }
        ApiError::Server { detail, .. } => {
            format!("The search service reported an error: {}.", detail)
        }
        ApiError::Validation(detail) => format!("Invalid request: {}.", detail),
    }
}

fn local_message(role: Role, content: String) -> Message {
    // Display-only fallback when persistence is unreachable; id 0 marks it as
    // never having been written server-side.
    Message {
        id: 0,
        role,
        content,
        created_at: Utc::now().to_rfc3339(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::{SearchComparison, SearchMetrics, SearchResult};

    fn request_with_query(query: &str) -> SendRequest {
        SendRequest::dataset(query, "beir/trec-covid")
    }

    #[test]
    fn empty_query_without_selection_is_invalid() {
        assert!(validate(&request_with_query("   ")).is_err());
        assert!(validate(&request_with_query("impact of X")).is_ok());
    }

    #[test]
    fn dataset_query_id_substitutes_for_query_text() {
        let request = request_with_query("").with_query_id("q42");
        assert!(validate(&request).is_ok());
        assert_eq!(user_message_text(&request), "Dataset query q42");
    }

    #[test]
    fn empty_file_is_invalid() {
        let request = SendRequest::file("summary", "doc.pdf", Vec::new());
        assert!(validate(&request).is_err());
        let request = SendRequest::file("", "doc.pdf", vec![1, 2, 3]);
        assert!(validate(&request).is_ok());
    }

    #[test]
    fn documents_target_needs_query_and_documents() {
        assert!(validate(&SendRequest::documents("", vec!["a doc".into()])).is_err());
        assert!(validate(&SendRequest::documents("q", Vec::new())).is_err());
        assert!(validate(&SendRequest::documents("q", vec!["a doc".into()])).is_ok());
    }

    #[test]
    fn title_truncated_on_char_boundary() {
        let long = "x".repeat(80);
        let title = derive_title(&long, &QueryTarget::Documents(Vec::new()));
        assert_eq!(title.chars().count(), TITLE_MAX_CHARS);

        let accented = "é".repeat(70);
        let title = derive_title(&accented, &QueryTarget::Documents(Vec::new()));
        assert_eq!(title.chars().count(), TITLE_MAX_CHARS);
    }

    #[test]
    fn title_falls_back_to_target_for_empty_query() {
        let target = QueryTarget::File {
            filename: "report.pdf".into(),
            content: vec![1],
        };
        assert_eq!(derive_title("", &target), "report.pdf");
    }

    fn lite(results: Vec<SearchResult>, latency_ms: f64) -> SearchResponseLite {
        SearchResponseLite {
            results,
            answer: None,
            metrics: Some(SearchMetrics {
                latency_ms,
                k: 5,
                candidate_k: 20,
                ..SearchMetrics::default()
            }),
            algorithm_details: None,
        }
    }

    fn results(scores: &[f64]) -> Vec<SearchResult> {
        scores
            .iter()
            .enumerate()
            .map(|(i, score)| SearchResult {
                doc_id: format!("d{}", i + 1),
                text: String::new(),
                score: *score,
            })
            .collect()
    }

    #[test]
    fn comparison_narrative_carries_both_latencies() {
        let response = SearchResponse {
            query: "impact of X".into(),
            mode: SearchMode::Compare,
            results: Vec::new(),
            answer: None,
            metrics: None,
            comparison: Some(SearchComparison {
                classical: lite(results(&[0.82, 0.7, 0.6, 0.5, 0.4]), 120.0),
                quantum: lite(results(&[0.79, 0.7, 0.6, 0.5, 0.4]), 340.0),
            }),
            comparison_metrics: None,
            algorithm_details: None,
        };
        let narrative = summarize(&response);
        assert!(narrative.contains("120.0 ms"));
        assert!(narrative.contains("340.0 ms"));
        assert!(narrative.contains("best score 0.820"));
        assert!(narrative.contains("best score 0.790"));
        assert!(narrative.contains("Overlap@5"));
    }

    #[test]
    fn single_pipeline_narrative() {
        let response = SearchResponse {
            query: "q".into(),
            mode: SearchMode::Quantum,
            results: results(&[0.4]),
            answer: None,
            metrics: None,
            comparison: None,
            comparison_metrics: None,
            algorithm_details: None,
        };
        let narrative = summarize(&response);
        assert!(narrative.starts_with("Quantum-inspired retrieved 1 documents"));
    }

    #[test]
    fn timeout_failure_message_names_the_bound() {
        let message = failure_message(&ApiError::Timeout(std::time::Duration::from_secs(60)));
        assert!(message.contains("timed out after 60 seconds"));
    }
}
