//! # Node Runtime
//!
//! Startup order:
//!
//! 1. Connect pools and build components (`ServiceContainer`)
//! 2. Apply schema migrations
//! 3. Start the cron scheduler
//! 4. Bind and serve the reporting API
//! 5. Trigger `SYNC_RUN_ON_STARTUP` jobs in the background
//!
//! Shutdown runs in reverse: stop serving, stop cron triggers, close pools.

use std::net::SocketAddr;
use std::sync::Arc;

use mlm_network::{run_migrations, NetworkError};
use reporting_api::build_router;
use sync_scheduler::{JobKind, JobOutcome, SchedulerError, SyncScheduler};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::container::{ContainerError, NodeConfig, ServiceContainer};

#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error("schema migration failed: {0}")]
    Migration(#[source] NetworkError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("node already started")]
    AlreadyStarted,
}

/// The running service.
pub struct AffiliateNode {
    config: NodeConfig,
    container: ServiceContainer,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    server: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl AffiliateNode {
    pub async fn new(config: NodeConfig) -> Result<Self, NodeError> {
        let container = ServiceContainer::connect(&config).await?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            config,
            container,
            shutdown_tx,
            shutdown_rx,
            server: None,
            local_addr: None,
        })
    }

    pub fn container(&self) -> &ServiceContainer {
        &self.container
    }

    /// Address the API is listening on, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub async fn start(&mut self) -> Result<(), NodeError> {
        if self.server.is_some() {
            return Err(NodeError::AlreadyStarted);
        }

        run_migrations(&self.container.reporting_pool)
            .await
            .map_err(NodeError::Migration)?;
        info!("Schema migrations applied");

        self.container.scheduler.start().await?;

        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.api.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| NodeError::Bind { addr, source })?;
        self.local_addr = listener.local_addr().ok();

        let router = build_router(self.container.app_state(&self.config.api.service_name));
        let mut shutdown_rx = self.shutdown_rx.clone();
        self.server = Some(tokio::spawn(async move {
            let shutdown = async move {
                let _ = shutdown_rx.wait_for(|stopped| *stopped).await;
            };
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await
            {
                error!(error = %e, "Reporting API server failed");
            }
        }));
        info!(addr = %addr, service = %self.config.api.service_name, "Reporting API listening");

        if !self.config.api.startup_jobs.is_empty() {
            tokio::spawn(run_startup_jobs(
                Arc::clone(&self.container.scheduler),
                self.config.api.startup_jobs.clone(),
            ));
        }

        Ok(())
    }

    pub async fn shutdown(mut self) -> Result<(), NodeError> {
        info!("Shutting down affiliate node");
        let _ = self.shutdown_tx.send(true);

        if let Some(server) = self.server.take() {
            if let Err(e) = server.await {
                warn!(error = %e, "Reporting API task ended abnormally");
            }
        }

        self.container.scheduler.shutdown().await?;
        self.container.close().await;
        info!("Affiliate node stopped");
        Ok(())
    }
}

/// Trigger each job once, in order. A skipped or failed job does not stop
/// the rest.
async fn run_startup_jobs(scheduler: Arc<SyncScheduler>, jobs: Vec<JobKind>) {
    for job in jobs {
        info!(job = %job, "Running startup job");
        match scheduler.trigger(job).await {
            JobOutcome::Failed { error } => warn!(job = %job, error = %error, "Startup job failed"),
            JobOutcome::Skipped { running } => {
                warn!(job = %job, running = %running, "Startup job skipped")
            }
            JobOutcome::Completed { .. } => {}
        }
    }
}
