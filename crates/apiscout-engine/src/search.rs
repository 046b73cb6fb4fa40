use crate::gateway::Gateway;
use crate::indexer::build_index;
use crate::www::Www;
use apiscout_core::{cosine, Document, Error, Result, SearchOptions, SearchResult};
use std::sync::{Arc, RwLock};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Holds the in-memory Document index. Single-writer (`refresh_index`),
/// multi-reader (`search`): writers swap a whole new `Arc` in atomically so
/// a reader that already cloned the old `Arc` keeps scoring against a
/// consistent snapshot for the duration of its pass.
pub struct SearchEngine {
    index: RwLock<Arc<Vec<Document>>>,
    gateway: Arc<Gateway>,
}

impl SearchEngine {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self {
            index: RwLock::new(Arc::new(Vec::new())),
            gateway,
        }
    }

    pub fn with_documents(gateway: Arc<Gateway>, documents: Vec<Document>) -> Self {
        Self {
            index: RwLock::new(Arc::new(documents)),
            gateway,
        }
    }

    fn snapshot(&self) -> Arc<Vec<Document>> {
        self.index
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Delegates to the Indexer; on success replaces the in-memory index
    /// atomically. A cancelled refresh leaves the old index intact.
    pub async fn refresh_index(
        &self,
        www: &Www,
        addresses: &[apiscout_core::Address],
        max_concurrency: usize,
        cancel: CancellationToken,
    ) -> Result<()> {
        let documents =
            build_index(www, addresses, self.gateway.clone(), max_concurrency, cancel).await?;
        *self.index.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(documents);
        Ok(())
    }

    pub async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
        cancel: CancellationToken,
    ) -> Result<Vec<SearchResult>> {
        let snapshot = self.snapshot();
        if snapshot.is_empty() {
            return Err(Error::EmptyIndex);
        }

        let query_embedding = self.gateway.embed(query, cancel.clone()).await?;

        let mut scored: Vec<ScoredCandidate> = snapshot
            .iter()
            .map(|doc| {
                let score = cosine(&query_embedding, &doc.embedding);
                ScoredCandidate {
                    result: SearchResult {
                        web_page_title: doc.web_page.title.clone(),
                        web_page: doc.web_page.clone(),
                        address: doc.address,
                        score,
                    },
                    summary: doc.summary.clone(),
                }
            })
            .filter(|c| match options.min_score {
                Some(floor) => c.result.score >= floor,
                None => true,
            })
            .collect();

        scored.sort_by(|a, b| SearchResult::cmp_rank(&a.result, &b.result));
        scored.truncate(options.max_num_results);

        if options.use_verification {
            scored = self.verify_pass(query, scored, options, cancel).await?;
        }

        Ok(scored.into_iter().map(|c| c.result).collect())
    }

    /// §4.4.1: bounded-concurrency LLM re-rank/filter over the already
    /// cosine-trimmed shortlist. The verification prompt is built from each
    /// candidate's summary, not its title. A failed verification call is
    /// fail-open — the candidate is kept at its original score.
    async fn verify_pass(
        &self,
        query: &str,
        candidates: Vec<ScoredCandidate>,
        options: &SearchOptions,
        cancel: CancellationToken,
    ) -> Result<Vec<ScoredCandidate>> {
        let semaphore = Arc::new(Semaphore::new(options.max_concurrency.max(1)));
        let mut joinset: JoinSet<Option<ScoredCandidate>> = JoinSet::new();

        for candidate in candidates.into_iter() {
            let semaphore = semaphore.clone();
            let gateway = self.gateway.clone();
            let cancel = cancel.clone();
            let query = query.to_string();
            joinset.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok()?;
                match gateway.verify(&query, &candidate.summary, cancel).await {
                    Ok(verdict) => {
                        if !verdict.relevant {
                            return None;
                        }
                        let score = verdict.score.unwrap_or(candidate.result.score);
                        Some(ScoredCandidate {
                            result: SearchResult {
                                score,
                                ..candidate.result
                            },
                            summary: candidate.summary,
                        })
                    }
                    Err(Error::Cancelled) => None,
                    Err(_) => Some(candidate),
                }
            });
        }

        let mut kept = Vec::new();
        while let Some(joined) = joinset.join_next().await {
            if let Ok(Some(result)) = joined {
                kept.push(result);
            } else if let Err(_e) = joined {
                // task panicked; drop silently, same as any other lost candidate.
            }
        }

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        kept.sort_by(|a, b| SearchResult::cmp_rank(&a.result, &b.result));
        Ok(kept)
    }
}

/// A cosine-scored candidate carried through the verification pass; the
/// summary is needed for the verification prompt but dropped from the
/// public `SearchResult` once scoring is done.
struct ScoredCandidate {
    result: SearchResult,
    summary: String,
}
