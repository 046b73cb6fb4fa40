use apiscout_core::{Error, LlmBackend, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

const MAX_ATTEMPTS: u32 = 4;
const BASE_BACKOFF: Duration = Duration::from_millis(100);

/// A cached LLM result. Only `generate`/`embed` successes are cached;
/// failures never enter the map (§4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
enum CachedValue {
    Text { value: String },
    Embedding { value: Vec<f32> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotEntry {
    fingerprint: String,
    value: CachedValue,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    entries: Vec<SnapshotEntry>,
}

type Cell = Arc<OnceCell<CachedValue>>;

/// The LLM Gateway: three capabilities (generate/embed/verify) over a
/// `LlmBackend`, with bounded-retry, fingerprint caching, and at-most-one
/// in-flight call per fingerprint.
pub struct Gateway {
    backend: Arc<dyn LlmBackend>,
    cache: Mutex<HashMap<String, Cell>>,
    snapshot_path: Option<PathBuf>,
}

impl Gateway {
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self {
            backend,
            cache: Mutex::new(HashMap::new()),
            snapshot_path: None,
        }
    }

    /// Load a prior on-disk snapshot, if any. Corruption is non-fatal: log
    /// once and start with an empty cache.
    pub fn with_snapshot(mut self, path: PathBuf) -> Self {
        match load_snapshot(&path) {
            Ok(Some(snapshot)) => {
                let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
                for entry in snapshot.entries {
                    cache.insert(
                        entry.fingerprint,
                        Arc::new(OnceCell::new_with(Some(entry.value))),
                    );
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, path = %path.display(), "gateway snapshot unreadable; starting empty");
            }
        }
        self.snapshot_path = Some(path);
        self
    }

    /// Persist every cached (fingerprint, value) pair to the snapshot path,
    /// if one was configured.
    pub fn flush_to_disk(&self) -> Result<()> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        let mut entries = Vec::new();
        for (fingerprint, cell) in cache.iter() {
            if let Some(value) = cell.get() {
                entries.push(SnapshotEntry {
                    fingerprint: fingerprint.clone(),
                    value: value.clone(),
                });
            }
        }
        save_snapshot(path, &Snapshot { entries })
    }

    fn cell_for(&self, fingerprint: &str) -> Cell {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache
            .entry(fingerprint.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }

    pub async fn generate(
        &self,
        instruction: &str,
        text: &str,
        cancel: CancellationToken,
    ) -> Result<String> {
        let fingerprint = fingerprint_for("generate", &[instruction, text]);
        let cell = self.cell_for(&fingerprint);
        let backend = self.backend.clone();
        let instruction = instruction.to_string();
        let text = text.to_string();
        let cancel_for_retry = cancel.clone();

        let result = cell
            .get_or_try_init(|| {
                let backend = backend.clone();
                let instruction = instruction.clone();
                let text = text.clone();
                let cancel = cancel_for_retry.clone();
                async move {
                    let value = with_retry(
                        || backend.generate(&instruction, &text, cancel.clone()),
                        cancel,
                    )
                    .await?;
                    Ok::<CachedValue, Error>(CachedValue::Text { value })
                }
            })
            .await?;

        match result {
            CachedValue::Text { value } => Ok(value.clone()),
            CachedValue::Embedding { .. } => Err(Error::Protocol(
                "fingerprint collision: expected text, found embedding".to_string(),
            )),
        }
    }

    pub async fn embed(&self, text: &str, cancel: CancellationToken) -> Result<Vec<f32>> {
        let fingerprint = fingerprint_for("embed", &[text]);
        let cell = self.cell_for(&fingerprint);
        let backend = self.backend.clone();
        let text = text.to_string();
        let cancel_for_retry = cancel.clone();

        let result = cell
            .get_or_try_init(|| {
                let backend = backend.clone();
                let text = text.clone();
                let cancel = cancel_for_retry.clone();
                async move {
                    let value =
                        with_retry(|| backend.embed(&text, cancel.clone()), cancel).await?;
                    Ok::<CachedValue, Error>(CachedValue::Embedding { value })
                }
            })
            .await?;

        match result {
            CachedValue::Embedding { value } => Ok(value.clone()),
            CachedValue::Text { .. } => Err(Error::Protocol(
                "fingerprint collision: expected embedding, found text".to_string(),
            )),
        }
    }

    /// Verification is a specific `generate()` prompt (§4.1/§6.4): given a
    /// query and a candidate summary, answer relevant yes/no plus an
    /// optional adjusted score in [0,1].
    pub async fn verify(
        &self,
        query: &str,
        summary: &str,
        cancel: CancellationToken,
    ) -> Result<Verdict> {
        let instruction = "Given a search query and a candidate API summary, decide whether the \
                            candidate is relevant. Respond with a single JSON object of the \
                            exact shape {\"relevant\": true|false, \"score\": <number 0..1 or null>} \
                            and nothing else.";
        let text = format!("Query: {query}\nCandidate summary: {summary}\n");
        let raw = self.generate(instruction, &text, cancel).await?;
        parse_verdict(&raw)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verdict {
    pub relevant: bool,
    pub score: Option<f32>,
}

fn parse_verdict(raw: &str) -> Result<Verdict> {
    let start = raw.find('{');
    let end = raw.rfind('}');
    let (Some(start), Some(end)) = (start, end) else {
        return Err(Error::Protocol(format!(
            "verification response has no JSON object: {raw}"
        )));
    };
    let v: serde_json::Value = serde_json::from_str(&raw[start..=end])
        .map_err(|e| Error::Protocol(format!("verification response not JSON: {e}")))?;
    let relevant = v
        .get("relevant")
        .and_then(|b| b.as_bool())
        .ok_or_else(|| Error::Protocol("verification response missing `relevant`".to_string()))?;
    let score = v
        .get("score")
        .and_then(|s| s.as_f64())
        .map(|f| f.clamp(0.0, 1.0) as f32);
    Ok(Verdict { relevant, score })
}

fn fingerprint_for(capability: &str, inputs: &[&str]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(capability.as_bytes());
    for input in inputs {
        hasher.update(b"\x1f");
        hasher.update(input.trim().as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Retries `Transient` failures with exponential backoff up to
/// `MAX_ATTEMPTS`; `Protocol`/`Permanent`/`Cancelled` propagate immediately.
async fn with_retry<F, Fut, T>(mut f: F, cancel: CancellationToken) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match f().await {
            Ok(v) => return Ok(v),
            Err(Error::Transient(msg)) => {
                if attempt >= MAX_ATTEMPTS {
                    return Err(Error::Transient(msg));
                }
                let backoff = BASE_BACKOFF * 2u32.pow(attempt - 1);
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                    _ = tokio::time::sleep(backoff) => {}
                }
            }
            Err(e) => return Err(e),
        }
    }
}

fn load_snapshot(path: &Path) -> Result<Option<Snapshot>> {
    if !path.exists() {
        return Ok(None);
    }
    let bytes = std::fs::read(path).map_err(|e| Error::NotConfigured(e.to_string()))?;
    match serde_json::from_slice::<Snapshot>(&bytes) {
        Ok(s) => Ok(Some(s)),
        Err(e) => Err(Error::Protocol(e.to_string())),
    }
}

fn save_snapshot(path: &Path, snapshot: &Snapshot) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::NotConfigured(e.to_string()))?;
    }
    let tmp = path.with_extension("json.tmp");
    let bytes =
        serde_json::to_vec(snapshot).map_err(|e| Error::NotConfigured(e.to_string()))?;
    std::fs::write(&tmp, bytes).map_err(|e| Error::NotConfigured(e.to_string()))?;
    std::fs::rename(&tmp, path).map_err(|e| Error::NotConfigured(e.to_string()))?;
    Ok(())
}
