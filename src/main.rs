use anyhow::{Context, Result};
use clap::{Parser, Subcommand, error::ErrorKind};
use kbingest::{
    config::{self, Config},
    graph::{GraphClient, HttpGraphClient},
    logging,
    processing::{IngestMode, IngestionOrchestrator},
    query::{self, DEFAULT_RESULT_LIMIT, QueryRequest, SessionOptions},
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Exit status for configuration, usage, connection, and document errors.
const EXIT_FAILURE: i32 = 1;
/// Exit status for runs that finished with failed chunks or an unsaved cache.
const EXIT_PARTIAL_FAILURE: i32 = 2;

#[derive(Parser)]
#[command(
    name = "kbingest",
    version,
    about = "Feed text documents into a knowledge graph and query it"
)]
struct Cli {
    /// Directory holding per-document ingestion caches.
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Soft chunk size threshold in characters.
    #[arg(long, global = true, value_parser = clap::value_parser!(u64).range(1..))]
    chunk_size: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest every chunk of a document.
    Ingest {
        /// Text document to ingest.
        #[arg(long)]
        document: PathBuf,
        /// Delete all graph data before ingesting.
        #[arg(long, default_value_t = false)]
        clear_existing: bool,
    },
    /// Ingest only chunks that changed since the last run.
    Reingest {
        /// Text document to re-ingest.
        #[arg(long)]
        document: PathBuf,
    },
    /// Search the graph; starts an interactive session when no query is given.
    Query {
        /// Query text.
        text: Vec<String>,
        /// Maximum number of results; the session default when interactive.
        #[arg(long, default_value_t = DEFAULT_RESULT_LIMIT, value_parser = parse_positive)]
        limit: usize,
        /// Node UUID used to rerank results; applied to the first interactive query.
        #[arg(long)]
        center_node: Option<String>,
    },
}

fn parse_positive(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(limit) if limit > 0 => Ok(limit),
        _ => Err(format!("'{value}' is not a positive integer")),
    }
}

/// Exit status for an argument parsing outcome. Usage errors map to [`EXIT_FAILURE`].
fn usage_exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
        _ => EXIT_FAILURE,
    }
}

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            std::process::exit(usage_exit_code(err.kind()));
        }
    };
    logging::init_tracing();

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err:#}");
            std::process::exit(EXIT_FAILURE);
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    let chunk_size = cli
        .chunk_size
        .map(usize::try_from)
        .transpose()
        .context("chunk size does not fit this platform")?;
    let config = config::init_config(cli.cache_dir, chunk_size).context("invalid configuration")?;
    let client: Arc<dyn GraphClient> = Arc::new(
        HttpGraphClient::new(&config.graph).context("failed to configure graph client")?,
    );

    match cli.command {
        Command::Ingest {
            document,
            clear_existing,
        } => ingest(config, client, &document, IngestMode::Full { clear_existing }).await,
        Command::Reingest { document } => {
            ingest(config, client, &document, IngestMode::Incremental).await
        }
        Command::Query {
            text,
            limit,
            center_node,
        } => {
            let outcome = run_query(client.as_ref(), text, limit, center_node).await;
            if let Err(error) = client.close().await {
                tracing::warn!(%error, "Failed to close graph client");
            }
            outcome.map(|()| 0)
        }
    }
}

async fn ingest(
    config: &Config,
    client: Arc<dyn GraphClient>,
    document: &Path,
    mode: IngestMode,
) -> Result<i32> {
    let orchestrator = IngestionOrchestrator::new(client, &config.cache_dir, config.chunk_size);
    let report = orchestrator
        .run(document, mode)
        .await
        .with_context(|| format!("ingestion of {} failed", document.display()))?;

    println!("{report}");
    Ok(if report.is_success() {
        0
    } else {
        EXIT_PARTIAL_FAILURE
    })
}

async fn run_query(
    client: &dyn GraphClient,
    text: Vec<String>,
    limit: usize,
    center_node: Option<String>,
) -> Result<()> {
    if text.is_empty() {
        let mut input = BufReader::new(tokio::io::stdin()).lines();
        let mut output = tokio::io::stdout();
        let options = SessionOptions {
            default_limit: limit,
            center_node_uuid: center_node,
        };
        return query::interactive_session(client, options, &mut input, &mut output)
            .await
            .context("interactive session failed");
    }

    let request = QueryRequest {
        text: text.join(" "),
        limit,
        center_node_uuid: center_node,
    };
    let results = query::search_facts(client, request)
        .await
        .context("query failed")?;
    print!("{}", query::format_results(&results));
    Ok(())
}
