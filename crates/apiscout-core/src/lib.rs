//! Backend-agnostic data model and capability traits for `apiscout`.
//!
//! This crate contains no IO. It defines the `Endpoint`/`WebPage`/`Document`/
//! `SearchResult` data model, the `HttpFetcher` and `LlmBackend` capability
//! traits that `apiscout-engine` implements, and the shared `Error`/`Result`
//! types every layer propagates.

mod error;
mod model;
mod traits;

pub use error::{Error, Result};
pub use model::{
    cosine, Address, Document, Endpoint, Protocol, SearchOptions, SearchResult, WebPage,
};
pub use traits::{HttpFetcher, LlmBackend};
