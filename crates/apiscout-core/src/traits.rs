use crate::model::{Endpoint, WebPage};
use crate::Result;
use tokio_util::sync::CancellationToken;

/// The raw HTTP transport a Machine uses to materialise an Endpoint's
/// OpenAPI document. One concrete implementation (`ReqwestFetcher`) lives in
/// `apiscout-engine`; tests may supply their own.
#[async_trait::async_trait]
pub trait HttpFetcher: Send + Sync {
    async fn fetch(&self, endpoint: &Endpoint, cancel: CancellationToken) -> Result<WebPage>;
}

/// The raw transport behind the LLM Gateway's three capabilities. Callers
/// should go through `Gateway`, not this trait directly, to get retry,
/// caching, and request coalescing.
#[async_trait::async_trait]
pub trait LlmBackend: Send + Sync {
    async fn generate(
        &self,
        instruction: &str,
        text: &str,
        cancel: CancellationToken,
    ) -> Result<String>;

    async fn embed(&self, text: &str, cancel: CancellationToken) -> Result<Vec<f32>>;
}
