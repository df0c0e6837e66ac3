use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use dotenvy::dotenv;
use tokio::{net::TcpListener, signal};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use backend::config::load_config;
use backend::extractors;
use backend::pipeline::{IngestionPipeline, spawn_workers};
use backend::review::ReviewController;
use backend::routes::{self, AppState};
use backend::storage::{BlobStore, FsBlobStore, StorageManager, Tables};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!(error = %err, "backend crashed");
        eprintln!("backend crashed: {err:#}");
    }
}

async fn run() -> Result<()> {
    init_tracing();
    dotenv().ok();

    let config = load_config()
        .await
        .context("failed to load application configuration")?;
    let working_dir = config.working_dir();

    let tables = Arc::new(Tables::new(&working_dir.join("tables")));
    let mut storage_manager = StorageManager::new();
    tables.register(&mut storage_manager);
    storage_manager.initialize_all().await?;

    let blob: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(
        working_dir.join("blobs"),
        config.storage.bucket.clone(),
        config.storage.secret_key.clone(),
    ));

    let extractor = extractors::for_config(&config.llm)?;
    info!(provider = %config.llm.provider, "extractor configured");

    let pipeline = Arc::new(IngestionPipeline::new(
        tables.clone(),
        blob.clone(),
        extractor,
    ));
    let jobs = spawn_workers(pipeline, config.ingest.workers, config.ingest.max_retries);
    let review = Arc::new(ReviewController::new(tables.clone()));

    let addr_string = format!("{}:{}", config.server.host, config.server.port);
    let addr = addr_string
        .parse::<SocketAddr>()
        .with_context(|| format!("invalid server address: {addr_string}"))?;
    info!(host = %config.server.host, port = config.server.port, "loaded configuration");

    let state = Arc::new(AppState {
        config: Arc::new(config),
        tables,
        blob,
        jobs,
        review,
    });
    let app = routes::router(state);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind TCP listener on {addr}"))?;
    info!(%addr, "backend server listening");

    let server_result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    if let Err(err) = storage_manager.finalize_all().await {
        warn!(error = %err, "failed to finalize storage");
    }

    server_result.context("server encountered a fatal error")?;
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "failed to listen for Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                if stream.recv().await.is_some() {
                    info!("received SIGTERM");
                }
            }
            Err(err) => warn!(error = %err, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received termination signal (Ctrl+C)");
        }
        _ = terminate => {
            info!("received termination signal (SIGTERM)");
        }
    }
}
