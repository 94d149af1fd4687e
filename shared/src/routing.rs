//! Routing configuration messages published by the catalog provider and
//! consumed by the forwarding proxy.
//!
//! A configuration pairs named frontends (header-match rules) with named
//! backends (server URLs). Each message is a complete replacement for the
//! previous state; partial updates are never emitted.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Rule prefix for frontends that match on the `Target` request header.
pub const TARGET_RULE_PREFIX: &str = "Headers:Target,";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingConfig {
    pub frontends: HashMap<String, Frontend>,
    pub backends: HashMap<String, Backend>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frontend {
    pub backend: String,
    pub routes: HashMap<String, Route>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub rule: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Backend {
    pub servers: HashMap<String, Server>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Server {
    pub url: String,
}

impl RoutingConfig {
    /// Registers a frontend matching `Target: <match_value>` together with a
    /// backend of the same name pointing at `server_url`.
    pub fn add_target_route(&mut self, name: &str, match_value: &str, server_url: &str) {
        let rule = format!("{TARGET_RULE_PREFIX}{}", crate::normalize_url(match_value));
        let routes = HashMap::from([("route1".to_string(), Route { rule })]);
        self.frontends.insert(
            name.to_string(),
            Frontend {
                backend: name.to_string(),
                routes,
            },
        );
        let servers = HashMap::from([(
            "server1".to_string(),
            Server {
                url: crate::normalize_url(server_url).to_string(),
            },
        )]);
        self.backends.insert(name.to_string(), Backend { servers });
    }

    /// The server URL of the named backend, when it has one.
    pub fn backend_url(&self, name: &str) -> Option<&str> {
        self.backends
            .get(name)?
            .servers
            .values()
            .next()
            .map(|s| s.url.as_str())
    }
}
