use chrono::Utc;
use clap::{Parser, Subcommand};
use datachat_core::backends::gemini::{
    DEFAULT_EMBEDDING_MODEL, DEFAULT_ENDPOINT, DEFAULT_GENERATION_MODEL,
};
use datachat_core::{
    load_dataset, AnalysisCoordinator, ChunkingConfig, EmbeddingBackend, EmbeddingIndex,
    GeminiEmbedder, GeminiGenerator, GenerationBackend, HashedNgramEmbedder, SessionState,
    SqlHttpStore, StorageBackend,
};
use std::io::{self, BufRead, Write};
use std::path::Path;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "datachat", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Gemini API base URL
    #[arg(long, default_value = DEFAULT_ENDPOINT)]
    gemini_url: String,

    /// Generation model name
    #[arg(long, default_value = DEFAULT_GENERATION_MODEL)]
    model: String,

    /// Embedding model name
    #[arg(long, default_value = DEFAULT_EMBEDDING_MODEL)]
    embedding_model: String,

    /// Gemini API key
    #[arg(long, env = "GEMINI_API_KEY")]
    api_key: Option<String>,

    /// Directory for persisted embedding collections
    #[arg(long, default_value = "/tmp/datachat_index")]
    index_root: String,

    /// Use the deterministic local embedder instead of the Gemini one.
    #[arg(long, default_value_t = false)]
    local_embeddings: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze a dataset file: summary narrative, insights, quality scores.
    Analyze {
        /// CSV, TXT, or MD file to analyze.
        #[arg(long)]
        file: String,
    },
    /// Ask one question about a dataset file.
    Ask {
        /// CSV, TXT, or MD file to question.
        #[arg(long)]
        file: String,
        /// The question to answer.
        #[arg(long)]
        query: String,
    },
    /// Interactive chat session over a dataset file.
    Chat {
        /// CSV, TXT, or MD file to chat about.
        #[arg(long)]
        file: String,
    },
    /// Run a SQL query against the storage gateway and print the relation.
    Fetch {
        /// SQL query text.
        #[arg(long)]
        sql: String,
        /// Storage gateway base URL.
        #[arg(long, default_value = "http://localhost:8080")]
        storage_url: String,
        /// Storage gateway username.
        #[arg(long, default_value = "datachat")]
        storage_user: String,
        /// Storage gateway password.
        #[arg(long, default_value = "password", env = "STORAGE_PASSWORD")]
        storage_password: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        "datachat boot"
    );

    match &cli.command {
        Command::Analyze { file } => {
            let coordinator = build_coordinator(&cli)?;
            let mut session = load_session(file)?;

            let report = coordinator
                .analyze(&mut session)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            println!("{}", report.response);
            if !report.key_insights.is_empty() {
                println!("\nkey insights:");
                for insight in &report.key_insights {
                    println!("  - {insight}");
                }
            }
            if let Some(score) = report.quality {
                println!(
                    "\nquality: completeness={:.3} unique_ratio={:.3}",
                    score.completeness, score.unique_ratio
                );
            }
            for recommendation in &report.recommendations {
                println!("recommendation: {recommendation}");
            }
        }
        Command::Ask { file, query } => {
            let coordinator = build_coordinator(&cli)?;
            let mut session = load_session(file)?;

            let response = coordinator
                .chat(&mut session, query)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            println!("{response}");
        }
        Command::Chat { file } => {
            let coordinator = build_coordinator(&cli)?;
            let mut session = load_session(file)?;
            println!("chatting about {file} (empty line or 'exit' to quit)");

            let stdin = io::stdin();
            loop {
                print!("you> ");
                io::stdout().flush()?;

                let mut line = String::new();
                if stdin.lock().read_line(&mut line)? == 0 {
                    break;
                }
                let query = line.trim();
                if query.is_empty() || query == "exit" || query == "quit" {
                    break;
                }

                match coordinator.chat(&mut session, query).await {
                    Ok(response) => println!("datachat> {response}"),
                    // The failure message replaces the response; the
                    // session and its history stay usable.
                    Err(error) => println!("datachat> request failed: {error}"),
                }
            }
        }
        Command::Fetch {
            sql,
            storage_url,
            storage_user,
            storage_password,
        } => {
            let store = SqlHttpStore::new(storage_url, storage_user, storage_password);
            let relation = store
                .fetch(sql)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            println!("{}", relation.to_markdown(usize::MAX));
            println!("\n{} rows", relation.row_count());
        }
    }

    Ok(())
}

fn load_session(file: &str) -> anyhow::Result<SessionState> {
    let dataset = load_dataset(Path::new(file))
        .map_err(|error| anyhow::anyhow!("could not load {file}: {error}"))?;
    Ok(SessionState::new(dataset))
}

fn build_coordinator(
    cli: &Cli,
) -> anyhow::Result<AnalysisCoordinator<Box<dyn GenerationBackend>, Box<dyn EmbeddingBackend>>> {
    let api_key = cli
        .api_key
        .clone()
        .ok_or_else(|| anyhow::anyhow!("GEMINI_API_KEY (or --api-key) is required"))?;

    let generation: Box<dyn GenerationBackend> = Box::new(GeminiGenerator::new(
        &cli.gemini_url,
        &cli.model,
        &api_key,
    ));

    let embeddings: Box<dyn EmbeddingBackend> = if cli.local_embeddings {
        Box::new(HashedNgramEmbedder::default())
    } else {
        Box::new(GeminiEmbedder::new(
            &cli.gemini_url,
            &cli.embedding_model,
            &api_key,
        ))
    };

    let index = EmbeddingIndex::new(&cli.index_root, ChunkingConfig::default());
    Ok(AnalysisCoordinator::new(generation, embeddings, index))
}
