use crate::gateway::Gateway;
use crate::www::{Machine, Www};
use apiscout_core::{Address, Document, Error, Result};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

const SUMMARIZE_INSTRUCTION: &str =
    "Summarize the following API specification, covering its purpose and key endpoints.";

/// Builds one `Document` per address, fanned out over a semaphore of width
/// `max_concurrency`. Per-address failures are logged and skipped; the call
/// only fails if cancelled or if every address failed.
pub async fn build_index(
    www: &Www,
    addresses: &[Address],
    gateway: Arc<Gateway>,
    max_concurrency: usize,
    cancel: CancellationToken,
) -> Result<Vec<Document>> {
    let semaphore = Arc::new(Semaphore::new(max_concurrency.max(1)));
    let mut joinset: JoinSet<Option<Document>> = JoinSet::new();

    for address in addresses.iter().copied() {
        let machine = match www.get(address) {
            Ok(machine) => machine,
            Err(e) => {
                tracing::warn!(%address, error = %e, "address not resolvable; skipping");
                continue;
            }
        };
        let semaphore = semaphore.clone();
        let gateway = gateway.clone();
        let cancel = cancel.clone();

        joinset.spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return None,
            };
            match index_one(address, machine, gateway.as_ref(), cancel).await {
                Ok(doc) => Some(doc),
                Err(e) => {
                    tracing::warn!(%address, error = %e, "indexing address failed");
                    None
                }
            }
        });
    }

    let mut documents = Vec::new();
    while let Some(joined) = joinset.join_next().await {
        if let Ok(Some(doc)) = joined {
            documents.push(doc);
        }
    }

    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    if documents.is_empty() {
        return Err(Error::EmptyIndex);
    }
    Ok(documents)
}

async fn index_one(
    address: Address,
    machine: Machine,
    gateway: &Gateway,
    cancel: CancellationToken,
) -> Result<Document> {
    let web_page = machine.request(cancel.clone()).await?;

    let title = web_page.info_title();
    let description = web_page.info_description();
    let sample_paths = web_page.path_keys(5).join(", ");
    let prompt_input =
        format!("Title: {title}\nDescription: {description}\nSample endpoints: {sample_paths}\n");

    let summary = gateway
        .generate(SUMMARIZE_INSTRUCTION, &prompt_input, cancel.clone())
        .await?;
    let embedding = gateway.embed(&summary, cancel).await?;

    Ok(Document {
        address,
        web_page,
        summary,
        embedding,
    })
}
