use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use reson8_core::presence::PresenceStore;
use reson8_core::rooms::RoomBroker;
use reson8_core::{AppConfig, AppState};
use reson8_sfu::memory::MemoryEngine;
use reson8_sfu::{SfuCoordinator, WorkerPool, WorkerSettings};

mod cli;
mod config;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("reson8=info")),
        )
        .init();

    let args = cli::Args::parse();
    let config = config::Config::load(&args.config)?;

    if let Some(parent) = database_parent_dir(&config.database.url) {
        std::fs::create_dir_all(parent)?;
    }

    let db = reson8_db::create_pool(&config.database.url, config.database.max_connections).await?;
    reson8_db::run_migrations(&db).await?;
    if config.server.seed_template {
        let server_id = reson8_db::seed::seed_template(
            &db,
            &config.server.name,
            &config.server.bind_address,
            config.server.max_clients,
        )
        .await?;
        tracing::info!(server_id, "template seed ensured");
    }

    // One worker per logical CPU unless pinned in config. A dead worker
    // takes the whole server down: media state is unrecoverable in-process.
    let worker_count = match config.sfu.workers {
        0 => std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1),
        pinned => pinned,
    };
    let engine = MemoryEngine::new();
    let pool = WorkerPool::spawn(
        &engine,
        worker_count,
        WorkerSettings {
            announced_ip: config.sfu.announced_ip.clone(),
            rtc_min_port: config.sfu.rtc_min_port,
            rtc_max_port: config.sfu.rtc_max_port,
        },
        Arc::new(|worker_id: &str| {
            tracing::error!(worker_id, "sfu worker died, shutting down");
            std::process::exit(1);
        }),
    )
    .await
    .map_err(|e| anyhow::anyhow!("sfu worker pool: {e}"))?;

    let presence = Arc::new(PresenceStore::new(Duration::from_secs(
        config.presence.ttl_seconds,
    )));
    let state = AppState {
        db: db.clone(),
        presence: Arc::clone(&presence),
        rooms: Arc::new(RoomBroker::new()),
        sfu: Arc::new(SfuCoordinator::new(pool)),
        config: AppConfig {
            turn: config.turn_credentials(),
            admin_instance_id: config.admin.instance_id.clone(),
        },
        started_at: Instant::now(),
    };

    let sweep_interval = Duration::from_secs(config.presence.sweep_interval_seconds.max(10));
    let sweeper = Arc::clone(&presence);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_interval);
        loop {
            interval.tick().await;
            sweeper.sweep();
        }
    });

    let app = reson8_gateway::gateway_router().with_state(state.clone());
    let listener = tokio::net::TcpListener::bind(&config.server.bind_address).await?;
    tracing::info!(
        address = %config.server.bind_address,
        workers = worker_count,
        "reson8 server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Shutdown order: media first, then the stores.
    tracing::info!(
        voice_channels = state.sfu.channel_count().await,
        "closing sfu coordinator"
    );
    db.close().await;
    tracing::info!("shutdown complete");
    Ok(())
}

/// For `sqlite://./data/reson8.db` style URLs, the directory must exist
/// before the pool connects.
fn database_parent_dir(url: &str) -> Option<std::path::PathBuf> {
    let path = url.strip_prefix("sqlite://")?;
    if path.starts_with(':') {
        return None;
    }
    let path = path.split('?').next().unwrap_or(path);
    std::path::Path::new(path)
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map(|parent| parent.to_path_buf())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::database_parent_dir;

    #[test]
    fn sqlite_urls_resolve_their_parent_dir() {
        assert_eq!(
            database_parent_dir("sqlite://./data/reson8.db?mode=rwc"),
            Some(std::path::PathBuf::from("./data"))
        );
        assert_eq!(database_parent_dir("sqlite://:memory:"), None);
        assert_eq!(database_parent_dir("postgres://localhost/reson8"), None);
    }
}
