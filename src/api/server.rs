use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Router, routing::get, routing::post};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::decompression::RequestDecompressionLayer;
use tracing::{error, info, warn};

use super::{services, state::AppState};
use crate::config::Config;
use crate::driver::{Driver, DriverBackend};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// All routes with their middleware
pub fn build_router(state: AppState) -> Router {
    let invoke_limit = state.config.server.max_concurrent_invocations;

    Router::new()
        .route(
            "/functions/process-queue",
            post(services::process_queue).layer(ConcurrencyLimitLayer::new(invoke_limit)),
        )
        .route(
            "/admin/queue",
            post(services::enqueue).get(services::list_items),
        )
        .route("/admin/queue/stats", get(services::queue_stats))
        .route("/admin/queue/reset-failed", post(services::reset_failed))
        .route("/admin/queue/{id}", get(services::get_item))
        .route("/admin/queue/{id}/reset", post(services::reset_item))
        .route("/admin/control", get(services::get_control))
        .route("/admin/control/start", post(services::start_run))
        .route("/admin/control/stop", post(services::stop_run))
        .route("/admin/control/batches", post(services::record_batch))
        .route("/admin/activity", get(services::recent_activity))
        .route(
            "/admin/records/{table}/{id}",
            get(services::get_record).put(services::put_record),
        )
        .route("/health", get(services::health))
        .with_state(state)
        // Automatically decompress gzip request bodies
        .layer(RequestDecompressionLayer::new())
}

/// Serve the API; with `drive`, also run the driver loop in-process
pub async fn run(config: Config, address: Option<SocketAddr>, drive: bool) -> Result<(), AnyError> {
    let address = address.unwrap_or(config.server.bind_addr);
    let ttl_days = config.retention.activity_ttl_days;

    info!(data_dir = %config.server.data_dir.display(), "Opening stores");
    let state = AppState::open(config)?;

    match state.ledger.prune_expired(ttl_days) {
        Ok(stats) => info!(pruned = stats.activity_pruned, "Activity retention applied"),
        Err(e) => warn!(error = %e, "Activity pruning failed"),
    }

    // Claims left behind by a previous process
    let recovered = state.queue.recover_stale(state.config.worker.stale_after())?;
    if !recovered.is_empty() {
        info!(count = recovered.len(), "Recovered stale claims at startup");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let driver_task = drive.then(|| {
        let backend: Arc<dyn DriverBackend> = Arc::new(state.local_backend());
        let driver = Driver::new(backend, state.config.driver.clone());
        let rx = shutdown_rx.clone();
        tokio::spawn(driver.run(wait_for_shutdown(rx)))
    });

    let app = build_router(state.clone());
    let listener = TcpListener::bind(address).await?;
    info!(%address, "docmirror API listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(wait_for_shutdown(shutdown_rx))
        .await?;

    if let Some(task) = driver_task {
        match task.await {
            Ok(Ok(report)) => info!(processed = report.processed, "Embedded driver finished"),
            Ok(Err(e)) => error!(error = %e, "Embedded driver failed"),
            Err(e) => error!(error = %e, "Embedded driver task panicked"),
        }
    }

    state.queue.flush()?;
    state.ledger.persist()?;
    state.records.persist()?;

    Ok(())
}

pub(crate) async fn wait_for_shutdown(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

/// Resolves on Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
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

    info!("Shutdown signal received");
}
