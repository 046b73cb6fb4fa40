//! Concrete, IO-performing implementations of the `apiscout-core` traits:
//! a `reqwest`-backed `HttpFetcher`, an OpenAI-compatible `LlmBackend`, the
//! `Gateway` capability façade, `Www`/`Machine`, the concurrent `Indexer`,
//! `SearchEngine`, and the `Browser` composition.

pub mod browser;
pub mod fetcher;
pub mod gateway;
pub mod indexer;
pub mod llm_backend;
pub mod search;
pub mod www;

pub use browser::Browser;
pub use fetcher::ReqwestFetcher;
pub use gateway::{Gateway, Verdict};
pub use indexer::build_index;
pub use llm_backend::OpenAiCompatBackend;
pub use search::SearchEngine;
pub use www::{Machine, Www};
