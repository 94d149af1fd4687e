//! Client for the auth service's cluster catalog, authenticated with the
//! provider's own service account via the client credentials flow.

use crate::metrics_defs::{CATALOG_SYNC_CLUSTERS, CATALOG_SYNC_DURATION};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Instant;

#[derive(thiserror::Error, Debug)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("token endpoint returned status {0}")]
    TokenStatus(StatusCode),
    #[error("cluster api returned status {0}")]
    CatalogStatus(StatusCode),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Cluster {
    #[serde(rename = "api-url", default)]
    pub api_url: String,
    #[serde(rename = "metrics-url", default)]
    pub metrics_url: String,
    #[serde(rename = "console-url", default)]
    pub console_url: String,
    #[serde(rename = "app-dns", default)]
    pub app_dns: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Deserialize)]
struct ClusterResponse {
    data: Vec<Cluster>,
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    grant_type: &'static str,
    client_id: &'a str,
    client_secret: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    #[allow(dead_code)]
    token_type: String,
}

pub struct ClusterApi {
    client: reqwest::Client,
    token_url: String,
    clusters_url: String,
    service_account_id: String,
    service_account_secret: String,
}

impl ClusterApi {
    pub fn new(
        auth_url: &str,
        clusters_url: &str,
        service_account_id: &str,
        service_account_secret: &str,
    ) -> Self {
        ClusterApi {
            client: reqwest::Client::new(),
            token_url: format!("{}/token", shared::normalize_url(auth_url)),
            clusters_url: clusters_url.to_string(),
            service_account_id: service_account_id.to_string(),
            service_account_secret: service_account_secret.to_string(),
        }
    }

    pub async fn fetch_token(&self) -> Result<String, ProviderError> {
        let request = TokenRequest {
            grant_type: "client_credentials",
            client_id: &self.service_account_id,
            client_secret: &self.service_account_secret,
        };
        let response = self.client.post(&self.token_url).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::TokenStatus(status));
        }

        let body: TokenResponse = response.json().await?;
        Ok(body.access_token)
    }

    pub async fn fetch_clusters(&self, token: &str) -> Result<Vec<Cluster>, ProviderError> {
        let start = Instant::now();
        let result = self.fetch_clusters_inner(token).await;

        let status = if result.is_ok() { "success" } else { "failure" };
        metrics::histogram!(CATALOG_SYNC_DURATION.name, "status" => status)
            .record(start.elapsed().as_secs_f64());
        if let Ok(ref clusters) = result {
            metrics::histogram!(CATALOG_SYNC_CLUSTERS.name).record(clusters.len() as f64);
        }

        result
    }

    async fn fetch_clusters_inner(&self, token: &str) -> Result<Vec<Cluster>, ProviderError> {
        let response = self
            .client
            .get(&self.clusters_url)
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::CatalogStatus(status));
        }

        let body: ClusterResponse = response.json().await?;
        Ok(body.data)
    }
}
