use crate::search::SearchEngine;
use crate::www::Www;
use apiscout_core::{Address, Error, Result, SearchOptions, SearchResult};
use tokio_util::sync::CancellationToken;

/// Thin composition over `SearchEngine` and `Www`. `Execute` is reserved and
/// always returns `NotImplemented`.
pub struct Browser<'a> {
    search_engine: &'a SearchEngine,
    www: &'a Www,
}

impl<'a> Browser<'a> {
    pub fn new(search_engine: &'a SearchEngine, www: &'a Www) -> Self {
        Self { search_engine, www }
    }

    pub async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
        cancel: CancellationToken,
    ) -> Result<Vec<SearchResult>> {
        self.search_engine.search(query, options, cancel).await
    }

    /// Fetches the raw spec at `address` and serialises its `content` back
    /// to a JSON string.
    pub async fn navigate(&self, address: Address, cancel: CancellationToken) -> Result<String> {
        let machine = self.www.get(address)?;
        let web_page = machine.request(cancel).await?;
        serde_json::to_string(&web_page.content).map_err(|e| Error::Protocol(e.to_string()))
    }

    pub async fn execute(
        &self,
        _address: Address,
        _endpoint_path: &str,
        _body: serde_json::Value,
    ) -> Result<serde_json::Value> {
        Err(Error::NotImplemented("execute".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::ReqwestFetcher;
    use crate::gateway::Gateway;
    use apiscout_core::{Endpoint, LlmBackend, Protocol};
    use async_trait::async_trait;
    use axum::{routing::get, Json, Router};
    use serde_json::json;
    use std::sync::Arc;

    async fn spawn_server(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    struct UnusedLlm;
    #[async_trait]
    impl LlmBackend for UnusedLlm {
        async fn generate(&self, _i: &str, _t: &str, _c: CancellationToken) -> Result<String> {
            unreachable!("navigate never calls the LLM")
        }
        async fn embed(&self, _t: &str, _c: CancellationToken) -> Result<Vec<f32>> {
            unreachable!("navigate never calls the LLM")
        }
    }

    #[tokio::test]
    async fn navigate_returns_content_as_json_string() {
        let app = Router::new().route(
            "/spec",
            get(|| async { Json(json!({"info": {"title": "Flights"}, "paths": {"/x": {}}})) }),
        );
        let base = spawn_server(app).await;
        let url = url::Url::parse(&base).unwrap();
        let www = Www::with_endpoints(vec![Endpoint {
            protocol: Protocol::Http,
            ip_address: url.host_str().unwrap().to_string(),
            port: url.port().unwrap(),
            path: "/spec".to_string(),
        }])
        .unwrap()
        .with_fetcher(Arc::new(ReqwestFetcher::new().unwrap()));
        let gateway = Arc::new(Gateway::new(Arc::new(UnusedLlm)));
        let search_engine = SearchEngine::new(gateway);
        let browser = Browser::new(&search_engine, &www);

        let json_str = browser
            .navigate(Address(0), CancellationToken::new())
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json_str).unwrap();
        assert_eq!(value["info"]["title"], "Flights");
    }

    #[tokio::test]
    async fn navigate_unknown_address_is_not_found() {
        let www = Www::with_endpoints(vec![]).unwrap();
        let gateway = Arc::new(Gateway::new(Arc::new(UnusedLlm)));
        let search_engine = SearchEngine::new(gateway);
        let browser = Browser::new(&search_engine, &www);
        let err = browser
            .navigate(Address(0), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn execute_is_not_implemented() {
        let www = Www::with_endpoints(vec![]).unwrap();
        let gateway = Arc::new(Gateway::new(Arc::new(UnusedLlm)));
        let search_engine = SearchEngine::new(gateway);
        let browser = Browser::new(&search_engine, &www);
        let err = browser
            .execute(Address(0), "/x", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotImplemented(_)));
    }
}
