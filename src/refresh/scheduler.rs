//! Periodic routing config refresh.
//!
//! # Responsibilities
//! - Call `ConfigProvider::update` on a fixed interval
//! - Survive failed ticks
//! - Stop on shutdown without cutting a refresh short

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::provider::{ConfigProvider, RefreshTrigger};

pub struct RefreshScheduler {
    provider: Arc<ConfigProvider>,
    interval: Duration,
}

impl RefreshScheduler {
    pub fn new(provider: Arc<ConfigProvider>, interval: Duration) -> Self {
        Self { provider, interval }
    }

    /// Run on a dedicated task. Await the handle to wait for the loop to exit.
    pub fn spawn(self, shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// Tick until shutdown.
    ///
    /// The first tick comes one interval after start; the initial build has
    /// already happened by then. Shutdown is only observed between ticks, so
    /// an in-flight update always finishes.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(interval_secs = self.interval.as_secs_f64(), "Refresh scheduler starting");

        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    tracing::info!("Refresh scheduler received shutdown signal, exiting loop");
                    break;
                }
                _ = ticker.tick() => {
                    // Failures are logged by the provider; the next tick retries.
                    if let Err(e) = self.provider.update(RefreshTrigger::Scheduled).await {
                        tracing::debug!(error = %e, "Scheduled refresh failed");
                    }
                }
            }
        }
    }
}
