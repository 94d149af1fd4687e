//! Parses and classifies identity tokens.
//!
//! Tokens are signed JWTs. A token carrying a recognized
//! `service_accountname` claim is a service token and authorizes
//! impersonation; a token carrying a `sub` claim is an ordinary user token.
//! Signing keys come from the auth service's JWKS endpoint, fetched lazily on
//! the first classification and kept for the life of the process. A failed
//! fetch leaves the key set empty so the next classification retries.

use crate::errors::GatewayError;
use jsonwebtoken::jwk::{AlgorithmParameters, JwkSet};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use std::collections::HashMap;
use tokio::sync::OnceCell;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    User,
    /// Carries the service kind, e.g. `che` for the `rh-che` account. The
    /// kind doubles as the namespace type and service-account name on the
    /// tenant's cluster.
    Service(String),
}

pub struct TokenClassifier {
    client: reqwest::Client,
    keys_url: String,
    service_accounts: HashMap<String, String>,
    keys: OnceCell<HashMap<String, DecodingKey>>,
}

impl TokenClassifier {
    pub fn new(
        client: reqwest::Client,
        auth_url: &str,
        service_accounts: HashMap<String, String>,
    ) -> Self {
        TokenClassifier {
            client,
            keys_url: format!("{}/token/keys", shared::normalize_url(auth_url)),
            service_accounts,
            keys: OnceCell::new(),
        }
    }

    pub async fn classify(&self, token: &str) -> Result<TokenKind, GatewayError> {
        let header = jsonwebtoken::decode_header(token)
            .map_err(|e| GatewayError::InvalidToken(e.to_string()))?;
        let kid = header.kid.ok_or(GatewayError::MissingKeyId)?;

        let keys = self.keys.get_or_try_init(|| self.fetch_keys()).await?;
        let key = keys
            .get(&kid)
            .ok_or_else(|| GatewayError::UnknownKeyId(kid.clone()))?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let data = jsonwebtoken::decode::<serde_json::Value>(token, key, &validation)
            .map_err(|e| GatewayError::InvalidToken(e.to_string()))?;

        if let Some(account) = data.claims.get("service_accountname") {
            let name = account.as_str().ok_or_else(|| {
                GatewayError::InvalidToken("service_accountname is not a string".to_string())
            })?;
            let kind = self
                .service_accounts
                .get(name)
                .cloned()
                .ok_or_else(|| GatewayError::UnknownServiceAccount(name.to_string()))?;
            return Ok(TokenKind::Service(kind));
        }

        match data.claims.get("sub").and_then(|sub| sub.as_str()) {
            Some(_) => Ok(TokenKind::User),
            None => Err(GatewayError::InvalidToken("no subject claim".to_string())),
        }
    }

    async fn fetch_keys(&self) -> Result<HashMap<String, DecodingKey>, GatewayError> {
        tracing::debug!(url = %self.keys_url, "fetching signing keys");
        let response = self.client.get(&self.keys_url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::AuthStatus(status));
        }

        let set: JwkSet = response.json().await?;
        let mut keys = HashMap::new();
        for jwk in &set.keys {
            // Only RSA public keys are used for token signatures.
            if !matches!(jwk.algorithm, AlgorithmParameters::RSA(_)) {
                continue;
            }
            let Some(kid) = jwk.common.key_id.clone() else {
                continue;
            };
            let key = DecodingKey::from_jwk(jwk)
                .map_err(|e| GatewayError::InvalidKeySet(e.to_string()))?;
            keys.insert(kid, key);
        }
        tracing::info!(count = keys.len(), "loaded signing keys");
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{mount_jwks, service_account_table, sign_token, sign_token_with_kid};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn classifier(server: &MockServer) -> TokenClassifier {
        TokenClassifier::new(reqwest::Client::new(), &server.uri(), service_account_table())
    }

    #[tokio::test]
    async fn test_classify_user_token() {
        let server = MockServer::start().await;
        mount_jwks(&server).await;

        let kind = classifier(&server)
            .classify(&sign_token(json!({"sub": "1111"})))
            .await
            .unwrap();

        assert_eq!(kind, TokenKind::User);
    }

    #[tokio::test]
    async fn test_classify_service_token() {
        let server = MockServer::start().await;
        mount_jwks(&server).await;

        let kind = classifier(&server)
            .classify(&sign_token(json!({"service_accountname": "rh-che"})))
            .await
            .unwrap();

        assert_eq!(kind, TokenKind::Service("che".to_string()));
    }

    #[tokio::test]
    async fn test_unknown_service_account() {
        let server = MockServer::start().await;
        mount_jwks(&server).await;

        let err = classifier(&server)
            .classify(&sign_token(json!({"service_accountname": "intruder"})))
            .await
            .unwrap_err();

        assert_eq!(err, GatewayError::UnknownServiceAccount("intruder".to_string()));
    }

    #[tokio::test]
    async fn test_token_without_claims() {
        let server = MockServer::start().await;
        mount_jwks(&server).await;

        let err = classifier(&server)
            .classify(&sign_token(json!({"email": "who@example.com"})))
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::InvalidToken(_)));
    }

    #[tokio::test]
    async fn test_missing_kid() {
        let server = MockServer::start().await;
        mount_jwks(&server).await;

        let err = classifier(&server)
            .classify(&sign_token_with_kid(json!({"sub": "1111"}), None))
            .await
            .unwrap_err();

        assert_eq!(err, GatewayError::MissingKeyId);
    }

    #[tokio::test]
    async fn test_unknown_kid() {
        let server = MockServer::start().await;
        mount_jwks(&server).await;

        let err = classifier(&server)
            .classify(&sign_token_with_kid(json!({"sub": "1111"}), Some("other-key")))
            .await
            .unwrap_err();

        assert_eq!(err, GatewayError::UnknownKeyId("other-key".to_string()));
    }

    #[tokio::test]
    async fn test_garbage_token() {
        let server = MockServer::start().await;
        mount_jwks(&server).await;

        let err = classifier(&server).classify("not-a-jwt").await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidToken(_)));
    }

    #[tokio::test]
    async fn test_key_fetch_failure_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/token/keys"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let classifier = classifier(&server);
        let token = sign_token(json!({"sub": "1111"}));

        let err = classifier.classify(&token).await.unwrap_err();
        assert_eq!(err, GatewayError::AuthStatus(http::StatusCode::INTERNAL_SERVER_ERROR));

        // The key set stayed empty, so a later call fetches again.
        server.reset().await;
        mount_jwks(&server).await;
        assert_eq!(classifier.classify(&token).await.unwrap(), TokenKind::User);
    }

    #[tokio::test]
    async fn test_non_rsa_keys_are_skipped() {
        let server = MockServer::start().await;
        let mut jwks: serde_json::Value = crate::testutil::jwks_json();
        jwks["keys"]
            .as_array_mut()
            .unwrap()
            .push(json!({"kty": "oct", "kid": "sym-key", "k": "c2VjcmV0"}));
        Mock::given(method("GET"))
            .and(path("/token/keys"))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks))
            .mount(&server)
            .await;

        let classifier = classifier(&server);
        assert_eq!(
            classifier.classify(&sign_token(json!({"sub": "1111"}))).await.unwrap(),
            TokenKind::User
        );
        assert_eq!(
            classifier
                .classify(&sign_token_with_kid(json!({"sub": "1111"}), Some("sym-key")))
                .await
                .unwrap_err(),
            GatewayError::UnknownKeyId("sym-key".to_string())
        );
    }
}
