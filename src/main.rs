//! # Voice Enhance Backend - Main Application Entry Point
//!
//! HTTP service that removes background noise from uploaded voice
//! recordings. Uploads are queued, enhanced by a pool of workers and kept
//! available for download until the retention window expires.
//!
//! ## Application Architecture:
//! - **config**: Application configuration (config.toml + environment variables)
//! - **state**: Shared application state and request metrics
//! - **health**: Health and metrics endpoints
//! - **middleware**: Request metrics collection
//! - **handlers**: Upload, status, download, delete, queue and config endpoints
//! - **audio**: Decoding, resampling and writing audio files
//! - **enhance**: Chunked noise suppression pipeline
//! - **jobs**: Job records, worker queue and the tracker used by handlers
//! - **retention**: Time-based deletion of uploads and results
//! - **error**: Error types and HTTP error responses

mod audio;
mod config;
mod enhance;
mod error;
mod handlers;
mod health;
mod jobs;
mod middleware;
mod retention;
mod state;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use audio::{FfmpegConverter, FileAudioIo};
use config::AppConfig;
use enhance::{EnhancementSettings, Enhancer, RnnoiseLoader};
use jobs::{JobStore, JobTracker, LocalJobQueue, MemoryCache};
use retention::RetentionManager;
use state::AppState;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Set once SIGTERM or SIGINT has been received.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

/// ## Startup order:
/// 1. Load `.env`, set up tracing, load and validate configuration
/// 2. Create the upload and processed directories
/// 3. Start the job store, worker pool, tracker and retention sweeper
/// 4. Serve HTTP until a shutdown signal arrives
#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting voice-enhance-backend v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {}:{}", config.server.host, config.server.port);

    for dir in [&config.storage.upload_dir, &config.storage.processed_dir] {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;
    }

    let retention = Arc::new(RetentionManager::new(
        vec![config.storage.upload_dir.clone(), config.storage.processed_dir.clone()],
        config.storage.retention(),
    ));
    let store = Arc::new(JobStore::new(Arc::new(MemoryCache::new()), config.storage.retention()));

    let enhancement = config.enhancement.clone();
    let queue = LocalJobQueue::start(config.queue.workers, store.clone(), move |worker| {
        info!(worker, "Preparing enhancement worker");
        Enhancer::new(
            EnhancementSettings::from_config(&enhancement),
            Box::new(RnnoiseLoader::new(enhancement.target_sample_rate)),
            Arc::new(FileAudioIo::new(Box::new(FfmpegConverter))),
        )
    });
    info!("Started {} enhancement workers", queue.worker_count());

    let tracker = Arc::new(JobTracker::new(store.clone(), Arc::new(queue), retention.clone()));
    let sweeper = retention::spawn_sweeper(
        retention,
        store,
        Duration::from_secs(config.storage.cleanup_interval_secs),
    );

    let app_state = AppState::new(config.clone(), tracker);
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    setup_signal_handlers();

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = config
            .server
            .cors_origins
            .iter()
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
            .allow_any_method()
            .allow_any_header()
            .supports_credentials()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(cors)
            .wrap(tracing_actix_web::TracingLogger::default())
            .wrap(middleware::MetricsMiddleware)
            .service(
                web::scope("/api")
                    .route("/upload", web::post().to(handlers::upload_audio))
                    .route("/status/{task_id}", web::get().to(handlers::get_status))
                    .route("/download/{task_id}", web::get().to(handlers::download_file))
                    .route("/delete/{task_id}", web::delete().to(handlers::delete_task))
                    .route("/queue", web::get().to(handlers::get_queue_status))
                    .route("/health", web::get().to(health::health_check))
                    .route("/metrics", web::get().to(health::detailed_metrics))
                    .route("/config", web::get().to(handlers::get_config)),
            )
            .route("/health", web::get().to(health::health_check))
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(server_result) => {
                    if let Err(e) = server_result {
                        error!("Server error: {}", e);
                    }
                }
                Err(e) => {
                    error!("Server task error: {}", e);
                }
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    sweeper.abort();
    info!("Server stopped gracefully");
    Ok(())
}

/// `RUST_LOG` controls the filter; defaults to
/// `voice_enhance_backend=debug,actix_web=info`.
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voice_enhance_backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Set `SHUTDOWN_SIGNAL` on SIGTERM or SIGINT.
fn setup_signal_handlers() {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async {
        let (mut sigterm, mut sigint) = match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(term), Ok(int)) => (term, int),
            (Err(e), _) | (_, Err(e)) => {
                warn!("Failed to install signal handlers, falling back to Ctrl+C: {}", e);
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!("Failed to listen for Ctrl+C: {}", e);
                    return;
                }
                SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }

        SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
    });
}

async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}
