use anyhow::{Context, Result};
use clap::Parser;
use pointgate::admin::{AdminConsole, AdminCredentials};
use pointgate::config::{AppConfig, StorageBackend};
use pointgate::facade::PointGate;
use pointgate::storage::{FileKvStore, KvStore, MemoryKvStore};
use pointgate::web::{AppState, build_router};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = AppConfig::parse();
    config.validate().context("invalid configuration")?;

    let store: Arc<dyn KvStore> = match config.storage {
        StorageBackend::Memory => {
            warn!("storage backend: memory (data is lost on exit)");
            Arc::new(MemoryKvStore::new())
        }
        StorageBackend::File => {
            info!(data_dir = %config.data_dir.display(), "storage backend: file");
            let store = FileKvStore::open(&config.data_dir, config.durability.into(), config.snapshot_every)
                .with_context(|| format!("failed to open data directory {}", config.data_dir.display()))?;
            Arc::new(store)
        }
    };

    let mut builder = PointGate::builder(store)
        .zone(config.accrual_zone()?)
        .bcrypt_cost(config.bcrypt_cost);
    if let Some(root) = &config.content_root {
        builder = builder.content_root(root);
    }
    let gate = Arc::new(builder.build());
    let admin = Arc::new(AdminConsole::new(
        gate.clone(),
        AdminCredentials::new(&config.admin_username, &config.admin_password),
    ));

    let app = build_router(AppState::new(gate, admin));

    let addr = config.address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    info!(address = %addr, "pointgate started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("pointgate=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "unable to install Ctrl+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "unable to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
