use std::path::PathBuf;
use std::sync::Arc;

use apiscout_core::{Address, Document, Error, SearchOptions};
use apiscout_engine::{build_index, Gateway, OpenAiCompatBackend, SearchEngine, Www};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "apiscout")]
#[command(about = "Semantic search and navigation over a corpus of OpenAPI specifications")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Embed a query, score it against the index, print ranked results.
    Search(SearchArgs),
    /// Fetch and print the raw spec served at one address.
    Navigate(NavigateArgs),
    /// Build an index over a corpus and write it as a §6.2 JSON snapshot.
    Index(IndexArgs),
}

#[derive(Args, Debug)]
struct SearchArgs {
    /// Path to a §6.1 endpoints JSON file.
    #[arg(long, env = "APISCOUT_CONTENT")]
    content: PathBuf,
    /// Natural-language query.
    #[arg(long, env = "APISCOUT_QUERY")]
    query: String,
    /// Path to a precomputed §6.2 index snapshot. If omitted, the index is
    /// rebuilt from `--content`.
    #[arg(long)]
    index: Option<PathBuf>,
    #[arg(long, default_value_t = 1, env = "APISCOUT_MAX_CONCURRENCY")]
    max_concurrency: usize,
    #[arg(long = "max-results", default_value_t = 10)]
    max_num_results: usize,
    /// Engage the LLM verification re-ranking pass.
    #[arg(long)]
    verify: bool,
    #[arg(long)]
    min_score: Option<f32>,
}

#[derive(Args, Debug)]
struct NavigateArgs {
    #[arg(long, env = "APISCOUT_CONTENT")]
    content: PathBuf,
    #[arg(long)]
    address: u64,
}

#[derive(Args, Debug)]
struct IndexArgs {
    #[arg(long, env = "APISCOUT_CONTENT")]
    content: PathBuf,
    #[arg(long)]
    out: PathBuf,
    #[arg(long, default_value_t = 1, env = "APISCOUT_MAX_CONCURRENCY")]
    max_concurrency: usize,
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_target(false).init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let exit_code = match run(cli.command, cancel).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            1
        }
    };
    std::process::exit(exit_code);
}

async fn run(command: Command, cancel: CancellationToken) -> anyhow::Result<i32> {
    match command {
        Command::Search(args) => run_search(args, cancel).await,
        Command::Navigate(args) => run_navigate(args, cancel).await,
        Command::Index(args) => run_index(args, cancel).await,
    }
}

fn gateway_from_env() -> anyhow::Result<Arc<Gateway>> {
    let backend = OpenAiCompatBackend::from_env(reqwest::Client::new())?;
    Ok(Arc::new(Gateway::new(Arc::new(backend))))
}

/// Loads a §6.2 index snapshot. Rejects a file whose `Document`s don't all
/// share one embedding length.
fn load_index(path: &PathBuf) -> anyhow::Result<Vec<Document>> {
    let bytes = std::fs::read(path)?;
    let documents: Vec<Document> = serde_json::from_slice(&bytes)?;
    let Some(expected) = documents.first().map(|d| d.embedding.len()) else {
        return Ok(documents);
    };
    for doc in &documents {
        if doc.embedding.len() != expected {
            return Err(Error::DimensionMismatch {
                expected,
                got: doc.embedding.len(),
            }
            .into());
        }
    }
    Ok(documents)
}

async fn run_search(args: SearchArgs, cancel: CancellationToken) -> anyhow::Result<i32> {
    let gateway = gateway_from_env()?;

    let engine = match &args.index {
        Some(path) => {
            let documents = load_index(path)?;
            SearchEngine::with_documents(gateway, documents)
        }
        None => {
            let www = Www::from_endpoints_file(&args.content)?;
            let engine = SearchEngine::new(gateway);
            engine
                .refresh_index(
                    &www,
                    &www.all_addresses(),
                    args.max_concurrency,
                    cancel.clone(),
                )
                .await?;
            engine
        }
    };

    let options = SearchOptions {
        max_num_results: args.max_num_results,
        max_concurrency: args.max_concurrency,
        use_verification: args.verify,
        min_score: args.min_score,
    };

    match engine.search(&args.query, &options, cancel).await {
        Ok(results) if results.is_empty() => {
            tracing::info!("search returned no results");
            Ok(1)
        }
        Ok(results) => {
            for result in &results {
                println!("{} — {:.4}", result.web_page_title, result.score);
            }
            Ok(0)
        }
        Err(Error::Cancelled) => {
            tracing::warn!("search cancelled");
            Ok(1)
        }
        Err(e) => {
            tracing::error!(error = %e, "search failed");
            Ok(1)
        }
    }
}

async fn run_navigate(args: NavigateArgs, cancel: CancellationToken) -> anyhow::Result<i32> {
    let www = Www::from_endpoints_file(&args.content)?;
    let machine = www.get(Address(args.address))?;
    match machine.request(cancel).await {
        Ok(web_page) => {
            println!("{}", serde_json::to_string_pretty(&web_page.content)?);
            Ok(0)
        }
        Err(Error::Cancelled) => {
            tracing::warn!("navigate cancelled");
            Ok(1)
        }
        Err(e) => {
            tracing::error!(error = %e, "navigate failed");
            Ok(1)
        }
    }
}

async fn run_index(args: IndexArgs, cancel: CancellationToken) -> anyhow::Result<i32> {
    let gateway = gateway_from_env()?;
    let www = Www::from_endpoints_file(&args.content)?;
    let addresses = www.all_addresses();

    match build_index(&www, &addresses, gateway, args.max_concurrency, cancel).await {
        Ok(documents) => {
            let bytes = serde_json::to_vec_pretty(&documents)?;
            std::fs::write(&args.out, bytes)?;
            tracing::info!(count = documents.len(), out = %args.out.display(), "index written");
            Ok(0)
        }
        Err(Error::Cancelled) => {
            tracing::warn!("index build cancelled");
            Ok(1)
        }
        Err(e) => {
            tracing::error!(error = %e, "index build failed");
            Ok(1)
        }
    }
}
