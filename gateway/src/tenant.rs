//! Client for the tenant service, which maps an identity to its namespaces.

use crate::errors::GatewayError;
use serde::Deserialize;
use std::collections::HashMap;

/// One namespace of a tenant. Only `cluster-url` is guaranteed non-empty;
/// the per-kind URLs fall back to it when absent.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Namespace {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(rename = "cluster-url", default)]
    pub cluster_url: String,
    #[serde(rename = "cluster-metrics-url", default)]
    pub cluster_metrics_url: String,
    #[serde(rename = "cluster-console-url", default)]
    pub cluster_console_url: String,
    #[serde(rename = "cluster-logging-url", default)]
    pub cluster_logging_url: String,
}

#[derive(Deserialize)]
struct TenantResponse {
    data: TenantData,
}

#[derive(Deserialize)]
struct TenantData {
    attributes: TenantAttributes,
}

#[derive(Deserialize)]
struct TenantAttributes {
    #[serde(default)]
    namespaces: Vec<Namespace>,
}

pub struct TenantClient {
    client: reqwest::Client,
    base_url: String,
}

impl TenantClient {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        TenantClient {
            client,
            base_url: shared::normalize_url(base_url).to_string(),
        }
    }

    /// Namespaces of the tenant the token itself belongs to.
    pub async fn get_tenant(
        &self,
        token: &str,
        params: &HashMap<String, String>,
    ) -> Result<Namespace, GatewayError> {
        let url = format!("{}/tenant", self.base_url);
        self.fetch(&url, token, params).await
    }

    /// Namespaces of the tenant identified by `user_id`, looked up on behalf
    /// of a service account.
    pub async fn get_tenant_by_id(
        &self,
        token: &str,
        user_id: &str,
        params: &HashMap<String, String>,
    ) -> Result<Namespace, GatewayError> {
        let url = format!("{}/tenants/{}", self.base_url, user_id);
        self.fetch(&url, token, params).await
    }

    async fn fetch(
        &self,
        url: &str,
        token: &str,
        params: &HashMap<String, String>,
    ) -> Result<Namespace, GatewayError> {
        let response = self
            .client
            .get(url)
            .query(params)
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::TenantStatus(status));
        }

        let body: TenantResponse = response.json().await?;
        select_namespace(body.data.attributes.namespaces, params.get("type"))
    }
}

// The tenant owns one namespace per kind; `type` in the request params picks
// which one, otherwise the first entry wins.
fn select_namespace(
    namespaces: Vec<Namespace>,
    kind: Option<&String>,
) -> Result<Namespace, GatewayError> {
    match kind {
        Some(kind) => namespaces
            .into_iter()
            .find(|ns| ns.kind == *kind)
            .ok_or(GatewayError::NamespaceNotFound),
        None => namespaces
            .into_iter()
            .next()
            .ok_or(GatewayError::NamespaceNotFound),
    }
}
