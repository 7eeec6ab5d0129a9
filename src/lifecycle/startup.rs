//! Startup orchestration.
//!
//! # Responsibilities
//! - Load and validate settings
//! - Initialize logging, metrics, store, seed data and the provider in order
//! - Start the refresh scheduler
//! - Bind the admin listener and serve until shutdown
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal, including the first build
//! - Subsystems initialize in order, not concurrently
//! - Listeners start last (traffic only when a snapshot exists)

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::admin::{admin_router, AdminState};
use crate::config::{load_settings, Settings, SettingsError};
use crate::lifecycle::signals::spawn_signal_handler;
use crate::lifecycle::Shutdown;
use crate::observability::{init_logging, init_metrics, LoggingError, MetricsError};
use crate::provider::ConfigProvider;
use crate::refresh::RefreshScheduler;
use crate::snapshot::{BuildError, SnapshotBuilder};
use crate::store::seed::seed_if_empty;
use crate::store::{SqlStore, StoreError};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Logging(#[from] LoggingError),

    #[error(transparent)]
    Metrics(#[from] MetricsError),

    #[error("entity store: {0}")]
    Store(#[from] StoreError),

    #[error("initial routing config build failed: {0}")]
    InitialBuild(#[from] BuildError),

    #[error("admin listener {address}: {source}")]
    Bind {
        address: String,
        source: std::io::Error,
    },

    #[error("admin server: {0}")]
    Serve(std::io::Error),
}

/// Everything that must exist before the control plane takes traffic.
pub struct ControlPlane {
    pub settings: Settings,
    pub store: SqlStore,
    pub provider: Arc<ConfigProvider>,
}

impl ControlPlane {
    /// Open the store, seed it if empty, and run the first build.
    pub async fn prepare(settings: Settings) -> Result<Self, StartupError> {
        let store = SqlStore::connect(&settings.database).await?;
        Self::prepare_with_store(settings, store).await
    }

    /// Same as [`ControlPlane::prepare`] over an already opened store.
    pub async fn prepare_with_store(settings: Settings, store: SqlStore) -> Result<Self, StartupError> {
        seed_if_empty(&store, &settings.seed).await?;

        let builder = SnapshotBuilder::new(
            Arc::new(store.clone()),
            Duration::from_secs(settings.database.query_timeout_secs),
        );
        let provider = Arc::new(ConfigProvider::initialize(builder).await?);

        Ok(Self {
            settings,
            store,
            provider,
        })
    }

    /// Start the scheduler, serve the admin API until `shutdown` fires, then
    /// wait for the scheduler to finish its current tick.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), StartupError> {
        let scheduler = RefreshScheduler::new(
            self.provider.clone(),
            Duration::from_secs(self.settings.refresh.interval_secs),
        )
        .spawn(shutdown.subscribe());

        let state = AdminState::new(
            self.store.clone(),
            self.provider.clone(),
            self.settings.admin.max_page_size,
            Duration::from_secs(self.settings.admin.refresh_timeout_secs),
        );
        let app = admin_router(
            state,
            Duration::from_secs(self.settings.admin.request_timeout_secs),
        );

        if let Ok(address) = listener.local_addr() {
            tracing::info!(address = %address, "Admin API listening");
        }

        let mut stop = shutdown.subscribe();
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = stop.recv().await;
            })
            .await;

        // The server can also stop on an I/O error; make sure the scheduler
        // follows it down.
        shutdown.trigger();
        if let Err(e) = scheduler.await {
            tracing::error!(error = %e, "Refresh scheduler task failed");
        }

        served.map_err(StartupError::Serve)?;
        tracing::info!("Admin API stopped");
        Ok(())
    }
}

/// Full process startup: settings → logging/metrics → store → seed →
/// provider → scheduler → admin API. Returns after a graceful shutdown.
pub async fn bootstrap(config_path: Option<&Path>) -> Result<(), StartupError> {
    let settings = load_settings(config_path)?;
    init_logging(&settings.observability)?;
    init_metrics(&settings.observability)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        database = %settings.database.url,
        refresh_interval_secs = settings.refresh.interval_secs,
        "route-control starting"
    );

    let plane = ControlPlane::prepare(settings).await?;

    let address = plane.settings.admin.bind_address.clone();
    let listener = TcpListener::bind(&address)
        .await
        .map_err(|source| StartupError::Bind { address, source })?;

    let shutdown = Shutdown::new();
    spawn_signal_handler(shutdown.clone());

    plane.run(listener, shutdown).await?;
    tracing::info!("Shutdown complete");
    Ok(())
}
