use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Conversation {
    pub id: i64,
    pub title: String,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ConversationDetail {
    pub id: i64,
    pub title: String,
    pub created_at: String,
    pub messages: Vec<Message>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Message {
    pub id: i64,
    pub role: Role,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Classical,
    Quantum,
    Compare,
}

impl SearchMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SearchMode::Classical => "classical",
            SearchMode::Quantum => "quantum",
            SearchMode::Compare => "compare",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SearchResult {
    pub doc_id: String,
    pub text: String,
    pub score: f64,
}

/// Per-pipeline search metrics. The ranking-quality fields are populated only
/// when the server had ground-truth relevance judgments for the query
/// (`has_labels`); `answer_similarity` additionally requires a stored ideal
/// answer (`has_ideal_answer`).
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct SearchMetrics {
    #[serde(default)]
    pub accuracy_at_k: Option<f64>,
    #[serde(default)]
    pub precision_at_k: Option<f64>,
    #[serde(default)]
    pub recall_at_k: Option<f64>,
    #[serde(default)]
    pub f1_at_k: Option<f64>,
    #[serde(default)]
    pub mrr: Option<f64>,
    #[serde(default)]
    pub ndcg_at_k: Option<f64>,
    #[serde(default)]
    pub spearman: Option<f64>,
    #[serde(default)]
    pub answer_similarity: Option<f64>,
    #[serde(default)]
    pub has_ideal_answer: bool,
    pub latency_ms: f64,
    pub k: u32,
    pub candidate_k: u32,
    #[serde(default)]
    pub has_labels: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AlgorithmDetails {
    pub algorithm: String,
    pub comparator: String,
    pub candidate_strategy: String,
    pub description: String,
    #[serde(default)]
    pub debug: Option<serde_json::Value>,
}

impl AlgorithmDetails {
    /// Ordered explanation steps from the debug payload, if the server sent any.
    pub fn steps(&self) -> Vec<String> {
        self.debug
            .as_ref()
            .and_then(|d| d.get("steps"))
            .and_then(|s| s.as_array())
            .map(|steps| {
                steps
                    .iter()
                    .filter_map(|x| x.as_str().map(str::to_owned))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// One pipeline's output inside a comparison.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SearchResponseLite {
    #[serde(default)]
    pub results: Vec<SearchResult>,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub metrics: Option<SearchMetrics>,
    #[serde(default)]
    pub algorithm_details: Option<AlgorithmDetails>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SearchComparison {
    pub classical: SearchResponseLite,
    pub quantum: SearchResponseLite,
}

/// Pipeline-independent comparatives. Every field is optional: historical
/// server versions emitted different subsets, and the client derives
/// overlap/Jaccard itself when they are missing.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ComparisonMetrics {
    #[serde(default)]
    pub overlap_at_k: Option<u64>,
    #[serde(default)]
    pub jaccard_at_k: Option<f64>,
    #[serde(default)]
    pub classical_mean_score: Option<f64>,
    #[serde(default)]
    pub quantum_mean_score: Option<f64>,
    #[serde(default)]
    pub common_doc_ids: Option<Vec<String>>,
}

/// Top-level artifact of a search call. `comparison` is present iff the
/// request mode was [`SearchMode::Compare`]; its absence means
/// single-pipeline output, never an error.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SearchResponse {
    pub query: String,
    pub mode: SearchMode,
    #[serde(default)]
    pub results: Vec<SearchResult>,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub metrics: Option<SearchMetrics>,
    #[serde(default)]
    pub comparison: Option<SearchComparison>,
    #[serde(default)]
    pub comparison_metrics: Option<ComparisonMetrics>,
    #[serde(default)]
    pub algorithm_details: Option<AlgorithmDetails>,
}

// ── Requests ──

#[derive(Debug, Serialize, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub documents: Vec<String>,
    pub mode: SearchMode,
    pub top_k: u32,
    pub candidate_k: u32,
}

#[derive(Debug, Serialize, Clone)]
pub struct DatasetSearchRequest {
    pub dataset_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_id: Option<String>,
    pub mode: SearchMode,
    pub top_k: u32,
    pub candidate_k: u32,
}

#[derive(Debug, Serialize, Clone)]
pub struct DatasetIndexRequest {
    pub dataset_id: String,
    pub force_reindex: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DatasetIndexReport {
    pub dataset_id: String,
    pub indexed_documents: u64,
    pub reused_existing: bool,
    pub embedder_provider: String,
    pub embedder_model: String,
}

// ── Datasets ──

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DatasetSummary {
    pub dataset_id: String,
    pub name: String,
    pub description: String,
    pub document_count: u64,
    pub query_count: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DatasetQuery {
    pub query_id: String,
    pub query: String,
    pub relevant_count: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DatasetDetail {
    pub dataset_id: String,
    pub name: String,
    pub description: String,
    pub queries: Vec<DatasetQuery>,
}

// ── Benchmark labels ──

#[derive(Debug, Serialize, Clone)]
pub struct BenchmarkLabelIn {
    pub dataset_id: String,
    pub query_text: String,
    pub ideal_answer: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BenchmarkLabel {
    pub benchmark_id: String,
    pub dataset_id: String,
    pub query_text: String,
    pub ideal_answer: String,
    #[serde(default)]
    pub relevant_doc_ids: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BenchmarkLabelList {
    pub items: Vec<BenchmarkLabel>,
}
