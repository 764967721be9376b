use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tradelens_cache::CacheStore;

use crate::config::LoaderConfig;
use crate::error::LoaderError;
use crate::pipeline::{Pipeline, RefreshReport, SourceJob};

/// Long-running refresher. Runs the configured jobs on an interval and
/// prunes expired cache rows, until cancelled.
pub struct Daemon {
    jobs: Vec<SourceJob>,
    refresh_interval: Duration,
    cleanup_interval: Duration,
    pipeline: Arc<Pipeline>,
    cache: Arc<CacheStore>,
    cancel: CancellationToken,
    latest: watch::Sender<Option<Arc<RefreshReport>>>,
}

impl Daemon {
    pub fn new(config: &LoaderConfig, pipeline: Arc<Pipeline>, cache: Arc<CacheStore>) -> Self {
        let (latest, _) = watch::channel(None);
        Self {
            jobs: config.jobs.clone(),
            refresh_interval: config.daemon.refresh_interval(),
            cleanup_interval: Duration::from_secs(config.cache.cleanup_interval_seconds),
            pipeline,
            cache,
            cancel: CancellationToken::new(),
            latest,
        }
    }

    /// Returns a CancellationToken that can be used to trigger shutdown.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Receives every completed refresh report. `None` until the first one lands.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<RefreshReport>>> {
        self.latest.subscribe()
    }

    /// Run the daemon until cancelled.
    pub async fn run(&self) -> Result<(), LoaderError> {
        if self.jobs.is_empty() {
            return Err(LoaderError::Config("no [[jobs]] configured".into()));
        }
        tracing::info!(
            jobs = self.jobs.len(),
            refresh_secs = self.refresh_interval.as_secs(),
            "TradeLens refresh daemon starting"
        );

        tokio::join!(self.refresh_loop(), self.cleanup_loop());

        tracing::info!("TradeLens refresh daemon stopped");
        Ok(())
    }

    async fn refresh_loop(&self) {
        // Run immediately on startup
        self.refresh_once().await;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("Refresh loop shutting down");
                    break;
                }
                _ = tokio::time::sleep(self.refresh_interval) => {
                    self.refresh_once().await;
                }
            }
        }
    }

    async fn refresh_once(&self) {
        let report = self.pipeline.refresh(&self.jobs, &self.cancel).await;
        for error in report.errors() {
            tracing::warn!(
                severity = ?error.severity(),
                message = %error.user_message(),
                "Refresh reported an error"
            );
        }
        self.latest.send_replace(Some(Arc::new(report)));
    }

    async fn cleanup_loop(&self) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("Cleanup loop shutting down");
                    break;
                }
                _ = tokio::time::sleep(self.cleanup_interval) => {
                    match self.cache.clear_expired().await {
                        Ok(0) => {}
                        Ok(deleted) => tracing::info!(deleted, "Cleaned up expired cache entries"),
                        Err(e) => tracing::warn!(error = %e, "Cache cleanup failed"),
                    }
                }
            }
        }
    }
}
