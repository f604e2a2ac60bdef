use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use university_ai_assistant::api::{self, AppState};
use university_ai_assistant::config::{GenerationSettings, Settings};
use university_ai_assistant::database::qdrant_config::{dashboard_url, launch_qdrant_container};
use university_ai_assistant::database::{Database, QdrantStore, VectorStore};
use university_ai_assistant::llm::Assistant;
use university_ai_assistant::logging;
use university_ai_assistant::providers::{build_completion_provider, build_embedding_provider};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Read configuration from this file instead of ./.env
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API (default)
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Chunk documents and embed them into the vector database
    Ingest {
        /// A single document, relative to LOC_DOC; defaults to every allowed file there
        path: Option<String>,
        /// Clear stored chunks and recreate the collection first
        #[arg(long)]
        reset: bool,
    },
    /// Answer one question from the terminal
    Ask {
        question: String,
        #[arg(long, default_value = "cli")]
        user: String,
        #[arg(long, default_value_t = 3)]
        top_k: u64,
        #[arg(long, default_value_t = 0.7)]
        threshold: f32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    match &args.env_file {
        Some(path) => {
            dotenv::from_path(path)
                .with_context(|| format!("Failed to load {}", path.display()))?;
        }
        None => {
            dotenv::dotenv().ok();
        }
    }

    let mut settings = Settings::from_env()?;
    logging::init(&settings.log_dir)?;

    match args.command.unwrap_or(Command::Serve {
        host: None,
        port: None,
    }) {
        Command::Serve { host, port } => {
            if let Some(host) = host {
                settings.host = host;
            }
            if let Some(port) = port {
                settings.port = port;
            }
            run_api_server(settings).await
        }
        Command::Ingest { path, reset } => run_ingest(settings, path, reset).await,
        Command::Ask {
            question,
            user,
            top_k,
            threshold,
        } => run_ask(settings, &question, &user, top_k, threshold).await,
    }
}

async fn connect_vector_store(settings: &Settings) -> Result<QdrantStore> {
    match QdrantStore::new(&settings.qdrant_url).await {
        Ok(store) => Ok(store),
        Err(e) if settings.qdrant_autostart => {
            tracing::warn!("[STARTUP] Qdrant not reachable ({}), launching container", e);
            let client = launch_qdrant_container(&settings.qdrant_storage, &settings.qdrant_url).await?;
            Ok(QdrantStore::from_client(client))
        }
        Err(e) => Err(e).context("Qdrant is not reachable; start it or set QDRANT_AUTOSTART=true"),
    }
}

async fn build_assistant(settings: Settings) -> Result<Assistant> {
    let database = Database::open(&settings.sqlite_path).await?;
    tracing::info!("[STARTUP] Relational DB initialized.");

    let vectors: Arc<dyn VectorStore> = Arc::new(connect_vector_store(&settings).await?);
    tracing::info!(
        "[STARTUP] Vector DB initialized. Dashboard: {}",
        dashboard_url(&settings.qdrant_url)
    );

    let embedder = build_embedding_provider(&settings)?;
    tracing::info!("[STARTUP] Embedding model ready: {}", embedder.model_name());

    let generation = GenerationSettings::default();
    let provider = build_completion_provider(&settings, &generation)?;

    let assistant = Assistant::new(settings, database, vectors, embedder, provider, generation)?;
    assistant.ensure_collection().await?;
    tracing::info!("[STARTUP] Language model ready: {}", assistant.model_name().await);
    Ok(assistant)
}

async fn run_api_server(settings: Settings) -> Result<()> {
    tracing::info!(
        "[STARTUP] Starting {} v{}",
        settings.app_name,
        settings.app_version
    );
    let address = settings.bind_address();

    let assistant = build_assistant(settings).await?;
    let app = api::create_api(AppState { assistant });

    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind to {}", address))?;

    tracing::info!("[STARTUP] Server listening on http://{} (docs at /docs)", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("[SHUTDOWN] Server stopped.");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    tracing::info!("[SHUTDOWN] Shutting down application...");
}

fn spinner(message: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        bar.set_style(style);
    }
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

async fn run_ingest(settings: Settings, path: Option<String>, reset: bool) -> Result<()> {
    let assistant = build_assistant(settings).await?;

    let bar = spinner("Splitting documents into chunks...");
    let report = match assistant.ingest(path.as_deref(), reset).await {
        Ok(report) => report,
        Err(e) => {
            bar.finish_and_clear();
            return Err(e.into());
        }
    };
    bar.finish_with_message(format!("{} chunks stored", report.inserted_chunks));

    let bar = spinner("Embedding chunks...");
    let embedded = match assistant.embed_chunks().await {
        Ok(embedded) => embedded,
        Err(e) => {
            bar.finish_and_clear();
            return Err(e.into());
        }
    };
    bar.finish_with_message(format!("{} chunks embedded", embedded));

    println!(
        "{} {} chunks are searchable in '{}'.",
        "✓".green().bold(),
        embedded.to_string().bold(),
        assistant.settings().qdrant_collection
    );
    Ok(())
}

async fn run_ask(
    settings: Settings,
    question: &str,
    user: &str,
    top_k: u64,
    threshold: f32,
) -> Result<()> {
    let assistant = build_assistant(settings).await?;

    let bar = spinner("Thinking...");
    let result = assistant.answer(user, question, top_k, threshold).await;
    bar.finish_and_clear();

    match result {
        Ok(answer) => {
            let label = if answer.cached { "Assistant (cached)" } else { "Assistant" };
            println!("{}\n{}", label.cyan().bold(), answer.response);
            if !answer.retrieved_docs.is_empty() {
                println!("{}", "Sources:".dimmed());
                for passage in &answer.retrieved_docs {
                    println!(
                        "  {} {}",
                        format!("[{:.2}]", passage.score).dimmed(),
                        passage.source.as_deref().unwrap_or("unknown")
                    );
                }
            }
            Ok(())
        }
        Err(e) => {
            println!("{}", e.to_string().red());
            Err(e.into())
        }
    }
}
