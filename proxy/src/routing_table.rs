//! The live routing table, fed by the catalog provider.
//!
//! Each `RoutingConfig` message replaces the whole table in one write, so
//! readers never observe a partially applied catalog.

use parking_lot::RwLock;
use shared::routing::{RoutingConfig, TARGET_RULE_PREFIX};
use std::collections::HashMap;
use tokio::sync::mpsc;

#[derive(Default)]
pub struct RoutingTable {
    // Target header value -> backend server URL
    targets: RwLock<HashMap<String, String>>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swaps in the routes of a freshly published configuration.
    pub fn apply(&self, config: &RoutingConfig) {
        let mut targets = HashMap::new();
        for frontend in config.frontends.values() {
            let Some(url) = config.backend_url(&frontend.backend) else {
                tracing::warn!(backend = %frontend.backend, "frontend references unknown backend");
                continue;
            };
            for route in frontend.routes.values() {
                if let Some(match_value) = route.rule.strip_prefix(TARGET_RULE_PREFIX) {
                    targets.insert(match_value.to_string(), url.to_string());
                }
            }
        }
        tracing::info!(routes = targets.len(), "routing table updated");
        *self.targets.write() = targets;
    }

    pub fn backend_for(&self, target: &str) -> Option<String> {
        self.targets.read().get(target).cloned()
    }

    /// Applies configurations until the provider closes the channel.
    pub async fn run_updates(&self, mut config_rx: mpsc::Receiver<RoutingConfig>) {
        while let Some(config) = config_rx.recv().await {
            self.apply(&config);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn config(routes: &[(&str, &str, &str)]) -> RoutingConfig {
        let mut config = RoutingConfig::default();
        for (name, match_value, url) in routes {
            config.add_target_route(name, match_value, url);
        }
        config
    }

    #[test]
    fn test_apply_and_lookup() {
        let table = RoutingTable::new();
        table.apply(&config(&[
            ("api1", "http://api.cluster1.com", "http://api.cluster1.com"),
            ("default", "default", "http://api.cluster1.com"),
        ]));

        assert_eq!(
            table.backend_for("http://api.cluster1.com"),
            Some("http://api.cluster1.com".to_string())
        );
        assert_eq!(table.backend_for("default"), Some("http://api.cluster1.com".to_string()));
        assert_eq!(table.backend_for("http://api.cluster2.com"), None);
    }

    #[test]
    fn test_apply_replaces_previous_state() {
        let table = RoutingTable::new();
        table.apply(&config(&[(
            "api1",
            "http://api.cluster1.com",
            "http://api.cluster1.com",
        )]));
        table.apply(&config(&[(
            "api1",
            "http://api.cluster2.com",
            "http://api.cluster2.com",
        )]));

        assert_eq!(table.backend_for("http://api.cluster1.com"), None);
        assert_eq!(
            table.backend_for("http://api.cluster2.com"),
            Some("http://api.cluster2.com".to_string())
        );
    }

    #[tokio::test]
    async fn test_run_updates_drains_channel() {
        let table = Arc::new(RoutingTable::new());
        let (tx, rx) = mpsc::channel(4);

        let updater = {
            let table = table.clone();
            tokio::spawn(async move { table.run_updates(rx).await })
        };

        tx.send(config(&[(
            "api1",
            "http://api.cluster1.com",
            "http://api.cluster1.com",
        )]))
        .await
        .unwrap();
        drop(tx);
        updater.await.unwrap();

        assert_eq!(
            table.backend_for("http://api.cluster1.com"),
            Some("http://api.cluster1.com".to_string())
        );
    }
}
