//! Client for reading service-account bearer secrets out of a container
//! cluster. The decoded secret is what the proxy presents when it acts on a
//! tenant's behalf through a service account.

use crate::errors::GatewayError;
use base64::Engine;
use serde::Deserialize;

#[derive(Deserialize)]
struct ServiceAccountResponse {
    #[serde(default)]
    secrets: Vec<SecretRef>,
}

#[derive(Deserialize)]
struct SecretRef {
    name: String,
}

#[derive(Deserialize)]
struct SecretResponse {
    data: SecretData,
}

#[derive(Deserialize)]
struct SecretData {
    // base64 encoded
    #[serde(default)]
    token: String,
}

pub struct SecretClient {
    client: reqwest::Client,
}

impl SecretClient {
    pub fn new(client: reqwest::Client) -> Self {
        SecretClient { client }
    }

    /// Name of the token secret attached to the namespace's service account:
    /// the first entry named `{service_account}-token...`.
    pub async fn secret_name(
        &self,
        cluster_url: &str,
        cluster_token: &str,
        namespace: &str,
        service_account: &str,
    ) -> Result<String, GatewayError> {
        let url = format!(
            "{}/api/v1/namespaces/{}/serviceaccounts/{}",
            shared::normalize_url(cluster_url),
            namespace,
            service_account
        );
        let response = self
            .client
            .get(&url)
            .bearer_auth(cluster_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::ClusterStatus(status));
        }

        let body: ServiceAccountResponse = response.json().await?;
        let prefix = format!("{service_account}-token");
        body.secrets
            .into_iter()
            .map(|s| s.name)
            .find(|name| name.starts_with(&prefix))
            .ok_or(GatewayError::SecretNameNotFound)
    }

    /// The decoded bearer token stored in the named secret.
    pub async fn secret(
        &self,
        cluster_url: &str,
        cluster_token: &str,
        namespace: &str,
        secret_name: &str,
    ) -> Result<String, GatewayError> {
        let url = format!(
            "{}/api/v1/namespaces/{}/secrets/{}",
            shared::normalize_url(cluster_url),
            namespace,
            secret_name
        );
        let response = self
            .client
            .get(&url)
            .bearer_auth(cluster_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::ClusterStatus(status));
        }

        let body: SecretResponse = response.json().await?;
        if body.data.token.is_empty() {
            return Err(GatewayError::SecretNotFound);
        }

        let raw = base64::engine::general_purpose::STANDARD
            .decode(body.data.token.as_bytes())
            .map_err(|e| GatewayError::SecretEncoding(e.to_string()))?;
        String::from_utf8(raw).map_err(|e| GatewayError::SecretEncoding(e.to_string()))
    }
}
