//! Server setup and lifecycle management

use crate::api::create_router;
use crate::api::rest::state::AppState;
use crate::config::{DaemonConfig, StorageConfig};
use crate::delivery::{DaemonGateway, EmailSender, HttpEmailRelay, LogEmailSender, RealtimeHub};
use crate::error::{DaemonError, DaemonResult};
use axum::Router;
use csr_checkpoints::{
    CheckpointService, DeliveryGateway, DeliveryMode, DeliveryWorker, Directory,
    NotificationDispatcher,
};
use csr_store::{InMemoryStorage, PostgresStorage, Storage};
use csr_types::NotificationId;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// CSR checkpoint daemon
pub struct Server {
    config: DaemonConfig,
    state: AppState,
    worker: Option<(Arc<DeliveryWorker>, mpsc::Receiver<NotificationId>)>,
}

impl Server {
    /// Create a new server with the given configuration
    pub async fn new(config: DaemonConfig) -> DaemonResult<Self> {
        let (storage, backend): (Arc<dyn Storage>, &'static str) = match &config.storage {
            StorageConfig::Memory => (Arc::new(InMemoryStorage::new()), "memory"),
            StorageConfig::Postgres {
                url,
                max_connections,
                connect_timeout_secs,
            } => {
                let storage =
                    PostgresStorage::new(url, *max_connections, *connect_timeout_secs).await?;
                (Arc::new(storage), "postgres")
            }
        };

        let hub = RealtimeHub::new(config.delivery.realtime_capacity);
        let email: Arc<dyn EmailSender> = match &config.delivery.email_relay_url {
            Some(url) => Arc::new(
                HttpEmailRelay::new(url.clone()).map_err(|e| DaemonError::Delivery(e.to_string()))?,
            ),
            None => Arc::new(LogEmailSender),
        };
        let gateway: Arc<dyn DeliveryGateway> = Arc::new(DaemonGateway::new(hub.clone(), email));

        let (dispatcher, worker) = match config.delivery.mode {
            DeliveryMode::Inline => (
                NotificationDispatcher::inline(storage.clone(), gateway.clone()),
                None,
            ),
            DeliveryMode::Outbox => {
                let (worker, nudge_rx) = DeliveryWorker::new(
                    storage.clone(),
                    gateway.clone(),
                    config.delivery.worker_config(),
                );
                let dispatcher =
                    NotificationDispatcher::outbox(storage.clone(), gateway.clone(), worker.sender());
                (dispatcher, Some((worker, nudge_rx)))
            }
        };

        let service = Arc::new(CheckpointService::new(storage.clone(), Arc::new(dispatcher)));
        let directory = Arc::new(Directory::new(storage));
        let state = AppState::new(service, directory, hub, backend);

        Ok(Self {
            config,
            state,
            worker,
        })
    }

    /// Router over this server's state
    pub fn router(&self) -> Router {
        create_router(self.state.clone(), self.config.server.enable_cors)
    }

    /// Run the server
    pub async fn run(self) -> DaemonResult<()> {
        let addr = self.config.server.listen_addr;
        let app = self.router();

        let listener = TcpListener::bind(addr).await?;

        tracing::info!(
            listen_addr = %addr,
            storage = self.state.storage_backend,
            delivery_mode = ?self.config.delivery.mode,
            "CSR daemon listening"
        );

        // Start the delivery worker in background
        let worker_task = self.worker.map(|(worker, nudge_rx)| {
            let handle = tokio::spawn(worker.clone().start(nudge_rx));
            (worker, handle)
        });

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| DaemonError::Server(e.to_string()))?;

        tracing::info!("CSR daemon shutting down");

        // Pending records stay in storage and are swept on the next start.
        if let Some((worker, handle)) = worker_task {
            worker.stop().await;
            handle.abort();
        }

        Ok(())
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
