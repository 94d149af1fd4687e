//! Long-lived worker that keeps the routing configuration in sync with the
//! cluster catalog.
//!
//! After a client-credentials bootstrap (retried with exponential backoff),
//! the worker refreshes the catalog on a fixed interval and publishes a
//! complete `RoutingConfig` for every successful fetch. Failed fetches are
//! logged and skipped: the previously published configuration stays in
//! effect until a newer one lands.

use crate::cluster_api::{Cluster, ClusterApi};
use backoff::ExponentialBackoff;
use shared::routing::RoutingConfig;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

const DEFAULT_REFRESH_SECONDS: u64 = 60;

#[derive(Debug)]
pub enum Command {
    /// Sync ahead of schedule; the sender is acked when the attempt finishes.
    Refresh(oneshot::Sender<()>),
    /// Stop the worker cleanly.
    Shutdown,
}

pub struct CatalogProvider {
    api: ClusterApi,
    refresh: Duration,
    // First successfully seen cluster's api-url; kept across refreshes while
    // that cluster remains in the catalog.
    default_backend_url: String,
}

impl CatalogProvider {
    pub fn new(api: ClusterApi, refresh_seconds: u64) -> Self {
        let refresh_seconds = if refresh_seconds == 0 {
            DEFAULT_REFRESH_SECONDS
        } else {
            refresh_seconds
        };
        CatalogProvider {
            api,
            refresh: Duration::from_secs(refresh_seconds),
            default_backend_url: String::new(),
        }
    }

    pub async fn run(
        mut self,
        config_tx: mpsc::Sender<RoutingConfig>,
        mut commands: mpsc::Receiver<Command>,
    ) {
        let Some(token) = self.bootstrap_token().await else {
            return;
        };

        let mut ticker = tokio::time::interval(self.refresh);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.sync(&token, &config_tx).await.is_err() {
                        // Consumer is gone; nothing left to publish to.
                        return;
                    }
                }
                command = commands.recv() => match command {
                    Some(Command::Refresh(done)) => {
                        let result = self.sync(&token, &config_tx).await;
                        let _ = done.send(());
                        if result.is_err() {
                            return;
                        }
                    }
                    Some(Command::Shutdown) | None => {
                        tracing::info!("catalog provider stopping");
                        return;
                    }
                },
            }
        }
    }

    async fn bootstrap_token(&self) -> Option<String> {
        let operation = || async {
            self.api
                .fetch_token()
                .await
                .map_err(backoff::Error::transient)
        };
        let notify = |err, wait: Duration| {
            tracing::warn!(error = %err, retry_in = ?wait, "cluster token fetch failed");
        };
        match backoff::future::retry_notify(ExponentialBackoff::default(), operation, notify).await
        {
            Ok(token) => Some(token),
            Err(e) => {
                tracing::error!(error = %e, "giving up on cluster token");
                None
            }
        }
    }

    // Err means the config channel is closed.
    async fn sync(
        &mut self,
        token: &str,
        config_tx: &mpsc::Sender<RoutingConfig>,
    ) -> Result<(), ()> {
        match self.api.fetch_clusters(token).await {
            Ok(clusters) => {
                let config = self.build_config(&clusters);
                tracing::debug!(
                    frontends = config.frontends.len(),
                    "publishing routing configuration"
                );
                config_tx.send(config).await.map_err(|_| ())
            }
            Err(e) => {
                tracing::warn!(error = %e, "catalog fetch failed, keeping previous configuration");
                Ok(())
            }
        }
    }

    fn build_config(&mut self, clusters: &[Cluster]) -> RoutingConfig {
        let mut config = RoutingConfig::default();
        if clusters.is_empty() {
            return config;
        }

        let mut default_exists = false;
        for (ind, cluster) in clusters.iter().enumerate() {
            if !self.default_backend_url.is_empty()
                && self.default_backend_url == cluster.api_url
            {
                default_exists = true;
            }
            let i = ind + 1;
            if !cluster.api_url.is_empty() {
                config.add_target_route(&format!("api{i}"), &cluster.api_url, &cluster.api_url);
            }
            if !cluster.metrics_url.is_empty() {
                config.add_target_route(
                    &format!("metrics{i}"),
                    &cluster.metrics_url,
                    &cluster.metrics_url,
                );
            }
        }

        if !default_exists {
            self.default_backend_url = clusters[0].api_url.clone();
        }
        if !self.default_backend_url.is_empty() {
            config.add_target_route("default", "default", &self.default_backend_url);
        }

        config
    }
}
