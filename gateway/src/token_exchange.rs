//! Client for the auth service's token endpoints.
//!
//! Two disjoint exchange paths feed the middleware: a user token is traded
//! directly for a cluster token, while the service path first obtains the
//! proxy's own service-account token via client credentials and exchanges
//! that. The service-account token is fetched once and held for the
//! client's lifetime; credential rotation is handled by restarting.

use crate::errors::GatewayError;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

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

pub struct TokenExchanger {
    client: reqwest::Client,
    auth_url: String,
    service_account_id: String,
    service_account_secret: String,
    service_account_token: OnceCell<String>,
}

impl TokenExchanger {
    pub fn new(
        client: reqwest::Client,
        auth_url: &str,
        service_account_id: &str,
        service_account_secret: &str,
    ) -> Self {
        TokenExchanger {
            client,
            auth_url: shared::normalize_url(auth_url).to_string(),
            service_account_id: service_account_id.to_string(),
            service_account_secret: service_account_secret.to_string(),
            service_account_token: OnceCell::new(),
        }
    }

    /// Trades a user token for a token the tenant's cluster accepts.
    pub async fn exchange_user_token(
        &self,
        user_token: &str,
        cluster_url: &str,
    ) -> Result<String, GatewayError> {
        self.exchange(user_token, cluster_url).await
    }

    /// Same exchange, authenticated as the proxy's service account.
    pub async fn exchange_sa_token(
        &self,
        sa_token: &str,
        cluster_url: &str,
    ) -> Result<String, GatewayError> {
        self.exchange(sa_token, cluster_url).await
    }

    async fn exchange(&self, bearer: &str, cluster_url: &str) -> Result<String, GatewayError> {
        let url = format!("{}/token", self.auth_url);
        let response = self
            .client
            .get(&url)
            .query(&[("for", cluster_url)])
            .bearer_auth(bearer)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::AuthStatus(status));
        }

        let body: TokenResponse = response.json().await?;
        Ok(body.access_token)
    }

    /// The proxy's own service-account token, obtained via the client
    /// credentials flow on first use.
    pub async fn sa_token(&self) -> Result<String, GatewayError> {
        let token = self
            .service_account_token
            .get_or_try_init(|| self.fetch_sa_token())
            .await?;
        Ok(token.clone())
    }

    async fn fetch_sa_token(&self) -> Result<String, GatewayError> {
        let url = format!("{}/token", self.auth_url);
        let request = TokenRequest {
            grant_type: "client_credentials",
            client_id: &self.service_account_id,
            client_secret: &self.service_account_secret,
        };
        let response = self.client.post(&url).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::AuthStatus(status));
        }

        let body: TokenResponse = response.json().await?;
        Ok(body.access_token)
    }
}
