use apiscout_core::{Error, LlmBackend, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// An OpenAI-compatible `/v1/chat/completions` + `/v1/embeddings` backend.
/// Configured from `APISCOUT_LLM_BASE_URL` / `APISCOUT_LLM_API_KEY` /
/// `APISCOUT_LLM_MODEL` / `APISCOUT_LLM_EMBED_MODEL`.
#[derive(Debug, Clone)]
pub struct OpenAiCompatBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    chat_model: String,
    embed_model: String,
}

impl OpenAiCompatBackend {
    pub fn new(
        client: reqwest::Client,
        base_url: String,
        api_key: Option<String>,
        chat_model: String,
        embed_model: String,
    ) -> Result<Self> {
        if base_url.trim().is_empty() {
            return Err(Error::NotConfigured("missing llm base_url".to_string()));
        }
        Ok(Self {
            client,
            base_url,
            api_key,
            chat_model,
            embed_model,
        })
    }

    pub fn from_env(client: reqwest::Client) -> Result<Self> {
        let base_url = env("APISCOUT_LLM_BASE_URL")
            .ok_or_else(|| Error::NotConfigured("missing APISCOUT_LLM_BASE_URL".to_string()))?;
        let api_key = env("APISCOUT_LLM_API_KEY");
        let chat_model = env("APISCOUT_LLM_MODEL")
            .ok_or_else(|| Error::NotConfigured("missing APISCOUT_LLM_MODEL".to_string()))?;
        let embed_model = env("APISCOUT_LLM_EMBED_MODEL").unwrap_or_else(|| chat_model.clone());
        Self::new(client, base_url, api_key, chat_model, embed_model)
    }

    fn endpoint_chat(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn endpoint_embeddings(&self) -> String {
        format!("{}/v1/embeddings", self.base_url.trim_end_matches('/'))
    }

    fn authed(&self, rb: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(k) => rb.header(reqwest::header::AUTHORIZATION, format!("Bearer {k}")),
            None => rb,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Clone, Serialize)]
struct ChatCompletionsRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatCompletionsResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Clone, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct ChoiceMessage {
    content: String,
}

#[derive(Debug, Clone, Serialize)]
struct EmbeddingsRequest {
    model: String,
    input: String,
}

#[derive(Debug, Clone, Deserialize)]
struct EmbeddingsResponse {
    #[serde(default)]
    data: Vec<EmbeddingsDatum>,
}

#[derive(Debug, Clone, Deserialize)]
struct EmbeddingsDatum {
    #[serde(default)]
    embedding: Vec<f32>,
}

/// Maps a transport failure to the §4.1 failure taxonomy: 5xx/429/network is
/// `Transient` (retry-eligible), other non-2xx is `Permanent`.
fn classify_http_status(status: reqwest::StatusCode) -> Error {
    if status.is_server_error() || status.as_u16() == 429 {
        Error::Transient(format!("HTTP {status}"))
    } else {
        Error::Permanent(format!("HTTP {status}"))
    }
}

#[async_trait::async_trait]
impl LlmBackend for OpenAiCompatBackend {
    async fn generate(
        &self,
        instruction: &str,
        text: &str,
        cancel: CancellationToken,
    ) -> Result<String> {
        let req = ChatCompletionsRequest {
            model: self.chat_model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: instruction.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: text.to_string(),
                },
            ],
            stream: false,
        };

        let send = async {
            let rb = self
                .authed(self.client.post(self.endpoint_chat()))
                .timeout(Duration::from_secs(30))
                .json(&req);
            let resp = rb
                .send()
                .await
                .map_err(|e| Error::Transient(e.to_string()))?;
            let status = resp.status();
            if !status.is_success() {
                return Err(classify_http_status(status));
            }
            let parsed: ChatCompletionsResponse = resp
                .json()
                .await
                .map_err(|e| Error::Protocol(e.to_string()))?;
            parsed
                .choices
                .first()
                .map(|c| c.message.content.clone())
                .ok_or_else(|| Error::Protocol("missing choices[0].message.content".to_string()))
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            r = send => r,
        }
    }

    async fn embed(&self, text: &str, cancel: CancellationToken) -> Result<Vec<f32>> {
        let req = EmbeddingsRequest {
            model: self.embed_model.clone(),
            input: text.to_string(),
        };

        let send = async {
            let rb = self
                .authed(self.client.post(self.endpoint_embeddings()))
                .timeout(Duration::from_secs(30))
                .json(&req);
            let resp = rb
                .send()
                .await
                .map_err(|e| Error::Transient(e.to_string()))?;
            let status = resp.status();
            if !status.is_success() {
                return Err(classify_http_status(status));
            }
            let parsed: EmbeddingsResponse = resp
                .json()
                .await
                .map_err(|e| Error::Protocol(e.to_string()))?;
            parsed
                .data
                .into_iter()
                .next()
                .map(|d| d.embedding)
                .ok_or_else(|| Error::Protocol("missing data[0].embedding".to_string()))
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            r = send => r,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Json as JsonExtract, routing::post, Json, Router};
    use serde_json::{json, Value};

    async fn spawn(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn generate_returns_first_choice_content() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|JsonExtract(_body): JsonExtract<Value>| async {
                Json(json!({"choices": [{"message": {"content": "a short summary"}}]}))
            }),
        );
        let base = spawn(app).await;
        let backend = OpenAiCompatBackend::new(
            reqwest::Client::new(),
            base,
            None,
            "test-model".to_string(),
            "test-embed".to_string(),
        )
        .unwrap();
        let out = backend
            .generate("Summarize", "Title: X", CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out, "a short summary");
    }

    #[tokio::test]
    async fn embed_returns_vector() {
        let app = Router::new().route(
            "/v1/embeddings",
            post(|JsonExtract(_body): JsonExtract<Value>| async {
                Json(json!({"data": [{"embedding": [0.1, 0.2, 0.3]}]}))
            }),
        );
        let base = spawn(app).await;
        let backend = OpenAiCompatBackend::new(
            reqwest::Client::new(),
            base,
            None,
            "test-model".to_string(),
            "test-embed".to_string(),
        )
        .unwrap();
        let v = backend
            .embed("book a flight", CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(v, vec![0.1, 0.2, 0.3]);
    }

    #[tokio::test]
    async fn server_error_is_classified_transient() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async { axum::http::StatusCode::SERVICE_UNAVAILABLE }),
        );
        let base = spawn(app).await;
        let backend = OpenAiCompatBackend::new(
            reqwest::Client::new(),
            base,
            None,
            "m".to_string(),
            "m".to_string(),
        )
        .unwrap();
        let err = backend
            .generate("i", "t", CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transient(_)));
    }

    #[tokio::test]
    async fn not_found_is_classified_permanent() {
        let app = Router::new();
        let base = spawn(app).await;
        let backend = OpenAiCompatBackend::new(
            reqwest::Client::new(),
            base,
            None,
            "m".to_string(),
            "m".to_string(),
        )
        .unwrap();
        let err = backend
            .generate("i", "t", CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Permanent(_)));
    }
}
