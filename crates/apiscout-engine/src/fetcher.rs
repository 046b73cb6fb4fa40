use apiscout_core::{Endpoint, Error, HttpFetcher, Result, WebPage};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// `reqwest`-backed `HttpFetcher`: issues `GET {protocol}://{ip}:{port}{path}`,
/// parses the body as JSON, and materialises a `WebPage`. Non-2xx is
/// `Transport`; malformed JSON is `Protocol`. A single retry is permitted on
/// connection-reset; timeouts are never retried.
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("apiscout/0.1")
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| Error::Transport(e.to_string()))?;
        Ok(Self { client })
    }

    /// Returns `Ok` or an error tagged with whether a retry is eligible
    /// (connection-reset/refused/dns only — never a timeout, never a
    /// non-2xx response).
    async fn request_once(&self, endpoint: &Endpoint) -> std::result::Result<WebPage, (Error, bool)> {
        let resp = self
            .client
            .get(endpoint.url())
            .send()
            .await
            .map_err(|e| {
                let retryable = is_retry_eligible(&e);
                (map_send_error(e), retryable)
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err((Error::Transport(format!("HTTP {status}")), false));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| (Error::Transport(e.to_string()), false))?;
        let content: serde_json::Value = serde_json::from_slice(&bytes)
            .map_err(|e| (Error::Protocol(e.to_string()), false))?;

        let title = content
            .get("info")
            .and_then(|i| i.get("title"))
            .and_then(|t| t.as_str())
            .unwrap_or("")
            .to_string();

        Ok(WebPage {
            title,
            endpoint: endpoint.clone(),
            content,
        })
    }
}

/// A connection reset/refused/dns error is retry-eligible; a timeout is not.
fn is_retry_eligible(e: &reqwest::Error) -> bool {
    !e.is_timeout() && (e.is_connect() || e.is_request())
}

fn map_send_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Transport(format!("timeout: {e}"))
    } else {
        Error::Transport(e.to_string())
    }
}

#[async_trait::async_trait]
impl HttpFetcher for ReqwestFetcher {
    async fn fetch(&self, endpoint: &Endpoint, cancel: CancellationToken) -> Result<WebPage> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            first = self.request_once(endpoint) => {
                match first {
                    Ok(wp) => Ok(wp),
                    Err((err, retryable)) => {
                        if !retryable {
                            return Err(err);
                        }
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => Err(Error::Cancelled),
                            retried = self.request_once(endpoint) => retried.map_err(|(e, _)| e),
                        }
                    }
                }
            }
        }
    }
}
