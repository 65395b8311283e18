//! services/worker/src/bin/worker.rs
//!
//! Processes uploads. Upload ids are taken from the command line, or one per line
//! from stdin when none are given. `--force` regenerates uploads that are already
//! ready and takes over uploads held by another run. Each run's outcome is printed
//! as one JSON line.

use async_openai::{config::OpenAIConfig, Client};
use clap::Parser;
use doomlearn_core::embedding::embedder_for;
use doomlearn_core::ports::GenerationService;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;
use worker_lib::{
    adapters::{
        openai_generation::voice_from_name, DbAdapter, FsObjectStorage, MockGenerationAdapter,
        OpenAiGenerationAdapter, SourceTextExtractor,
    },
    config::{Config, GenerationMode},
    dispatch::Dispatcher,
    error::WorkerError,
    state::WorkerState,
};

#[derive(Parser)]
#[command(name = "worker", about = "Generates reels, quizzes and captions for uploads")]
#[command(version)]
struct Args {
    /// Regenerate uploads that are already ready, and take over uploads held by
    /// another run
    #[arg(long)]
    force: bool,

    /// Upload ids to process. Read one per line from stdin when omitted
    upload_ids: Vec<Uuid>,
}

#[tokio::main]
async fn main() -> Result<(), WorkerError> {
    let args = Args::parse();

    // --- 1. Load Configuration & Set Up Logging ---
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting worker...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize Service Adapters ---
    let embedder = embedder_for(&config.embeddings_mode, config.vector_dim)?;
    let storage = Arc::new(FsObjectStorage::new(
        config.storage_root.clone(),
        config.storage_public_base_url.clone(),
        config.storage_signing_secret.clone(),
    ));

    let generator: Arc<dyn GenerationService> = match config.generation_mode {
        GenerationMode::Mock => Arc::new(MockGenerationAdapter::new()),
        GenerationMode::OpenAi => {
            let openai_config = OpenAIConfig::new().with_api_key(
                config
                    .openai_api_key
                    .as_ref()
                    .ok_or_else(|| WorkerError::Internal("OPENAI_API_KEY is required".to_string()))?,
            );
            let voice = voice_from_name(&config.tts_voice).ok_or_else(|| {
                WorkerError::Internal(format!(
                    "Invalid TTS voice specified in config: '{}'",
                    config.tts_voice
                ))
            })?;
            Arc::new(OpenAiGenerationAdapter::new(
                Client::with_config(openai_config),
                config.concept_model.clone(),
                voice,
            ))
        }
    };
    info!("Generation backend: {:?}", config.generation_mode);

    // --- 4. Build the Shared WorkerState ---
    let state = Arc::new(WorkerState {
        db: db_adapter,
        storage,
        generator,
        extractor: Arc::new(SourceTextExtractor::new()),
        embedder,
        pipeline: config.pipeline.clone(),
        presign_ttl: config.presign_ttl,
    });

    // --- 5. Start the Dispatcher ---
    let dispatcher = Dispatcher::start(state, config.worker_concurrency);
    let cancel = dispatcher.cancellation_token();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received. Finishing runs in flight...");
                cancel.cancel();
            }
        }
    });

    // --- 6. Feed Jobs ---
    let force = args.force;
    if args.upload_ids.is_empty() {
        info!("Reading upload ids from stdin...");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = tokio::select! {
                _ = cancel.cancelled() => break,
                line = lines.next_line() => line?,
            };
            let Some(line) = line else {
                break;
            };
            submit(&dispatcher, line.trim(), force).await?;
        }
    } else {
        for upload_id in args.upload_ids {
            dispatcher.dispatch(upload_id, force).await?;
        }
    }

    // --- 7. Drain and Report ---
    let report = dispatcher.shutdown().await;
    for outcome in &report.outcomes {
        let line = serde_json::to_string(outcome)
            .map_err(|e| WorkerError::Internal(e.to_string()))?;
        println!("{}", line);
    }
    let failed = report.outcomes.iter().filter(|o| o.is_failed()).count();
    info!(
        runs = report.outcomes.len(),
        failed,
        dropped = report.dropped.len(),
        "Worker finished."
    );

    Ok(())
}

async fn submit(dispatcher: &Dispatcher, raw: &str, force: bool) -> Result<(), WorkerError> {
    if raw.is_empty() {
        return Ok(());
    }
    match Uuid::parse_str(raw) {
        Ok(upload_id) => dispatcher.dispatch(upload_id, force).await,
        Err(e) => {
            warn!("Ignoring '{}': not an upload id ({})", raw, e);
            Ok(())
        }
    }
}
