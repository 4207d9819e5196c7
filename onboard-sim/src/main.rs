//! Onboarding simulator (onboard-sim) - Main entry point
//!
//! Serves the conversational training pipeline over HTTP: customer personas
//! played by a hosted language model, grounded in reference documents, with
//! an end-of-session competency evaluation.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use onboard_common::config::{load_toml_config, resolve_root_folder, RootFolderInitializer};
use onboard_sim::catalog::ContentCatalog;
use onboard_sim::config::{log_filter, resolve_llm_api_key, SimulatorConfig};
use onboard_sim::db::{init_database_pool, SqliteDocumentStore, SqliteSessionStore};
use onboard_sim::services::{
    Collaborators, HttpGenerationClient, HttpSpeechClient, SessionEngine, SpeechToText, TextToSpeech,
};
use onboard_sim::{build_router, AppState};

/// Command-line arguments for onboard-sim
#[derive(Parser, Debug)]
#[command(name = "onboard-sim")]
#[command(about = "Conversational onboarding simulator for bank employees")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "5780", env = "ONBOARD_SIM_PORT")]
    port: u16,

    /// Root folder holding the database
    #[arg(short, long, env = "ONBOARD_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Bootstrap TOML config (root folder, logging, content dir, API key)
    #[arg(short, long, env = "ONBOARD_CONFIG")]
    config: Option<PathBuf>,

    /// Simulator TOML config (timeouts, thresholds, models)
    #[arg(long, env = "ONBOARD_SIM_CONFIG")]
    sim_config: Option<PathBuf>,

    /// Directory with personas.toml, situations.toml and lexicon.toml
    #[arg(long, env = "ONBOARD_CONTENT_DIR")]
    content_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let toml_config = load_toml_config(args.config.as_deref()).context("Failed to load bootstrap configuration")?;

    // RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter(&toml_config).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting onboard-sim on port {}", args.port);

    let sim_config = SimulatorConfig::load(args.sim_config.as_deref()).context("Failed to load simulator configuration")?;

    // Root folder and database
    let root_folder = resolve_root_folder(args.root_folder.as_deref(), &toml_config);
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to create root folder")?;
    info!("Root folder: {}", initializer.root_folder().display());

    let pool = init_database_pool(&initializer.database_path())
        .await
        .context("Failed to initialize database")?;
    info!("Database ready: {}", initializer.database_path().display());

    // Read-only content
    let content_dir = args
        .content_dir
        .or_else(|| toml_config.content_dir.clone())
        .unwrap_or_else(|| PathBuf::from("content"));
    let catalog = Arc::new(ContentCatalog::load(&content_dir).context("Failed to load content catalog")?);

    // Hosted services
    let api_key = match resolve_llm_api_key(&toml_config) {
        Ok(key) => Some(key),
        Err(e) => {
            warn!("{}", e);
            warn!("Continuing without an API key; hosted calls will degrade to fallbacks");
            None
        }
    };

    let generator = Arc::new(
        HttpGenerationClient::new(sim_config.generation_config(api_key.clone()))
            .context("Failed to build generation client")?,
    );

    let (stt, tts) = if sim_config.speech.enabled {
        let speech = Arc::new(
            HttpSpeechClient::new(sim_config.speech_config(api_key))
                .context("Failed to build speech client")?,
        );
        (
            Some(speech.clone() as Arc<dyn SpeechToText>),
            Some(speech as Arc<dyn TextToSpeech>),
        )
    } else {
        info!("Speech disabled; voice turns will be rejected");
        (None, None)
    };

    let collaborators = Collaborators {
        search: Arc::new(SqliteDocumentStore::new(pool.clone())),
        generator,
        store: Arc::new(SqliteSessionStore::new(pool, sim_config.database.max_lock_wait_ms)),
        stt,
        tts,
    };

    let engine = Arc::new(
        SessionEngine::new(catalog, collaborators, sim_config.engine_settings(), CancellationToken::new()).await,
    );
    info!("Session engine initialized");

    let app = build_router(AppState::new(engine.clone()));

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    engine.shutdown().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
