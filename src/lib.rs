//! Session orchestration core for a chat-style client of a document-search
//! comparison service. The service contrasts a classical retrieval pipeline
//! with a quantum-inspired one over a shared dataset, an uploaded file, or an
//! ad-hoc document list; this crate turns a user query into the correctly
//! ordered network calls, caches the last comparison per conversation, and
//! hands a typed view-model to the display layer.

pub mod api;
pub mod cache;
pub mod compare;
pub mod config;
pub mod session;

pub use api::{ApiError, SearchClient, SessionContext};
pub use cache::ResponseCache;
pub use compare::{assemble, Layout, SearchView};
pub use config::ClientConfig;
pub use session::{SendOutcome, SendRequest, SendState, SessionOrchestrator};
