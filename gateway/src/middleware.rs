//! The authenticating middleware.
//!
//! Each request's identity token is classified and resolved to the tenant's
//! namespace plus a cluster access token, through the single-flight cache so
//! a storm of requests on one identity performs the upstream chain once.
//! The request is then rewritten for its backend: service prefix stripped,
//! parameterized segment substituted, `Target` and `Authorization` headers
//! set, or a redirect issued for console and log traffic.

use crate::access_token::ACCESS_TOKEN_PARAM;
use crate::classifier::{TokenClassifier, TokenKind};
use crate::cluster_secret::SecretClient;
use crate::errors::GatewayError;
use crate::metrics_defs::RESOLVE_DURATION;
use crate::request_path::{self, PARAM_PATH_SEGMENT, RequestKind};
use crate::single_flight::SingleFlightCache;
use crate::tenant::{Namespace, TenantClient};
use crate::token_exchange::TokenExchanger;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use http::header::AUTHORIZATION;
use http::{HeaderValue, Method, StatusCode};
use sha2::{Digest, Sha256};
use shared::TARGET_HEADER;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// The value cached per identity fingerprint: where the tenant lives and
/// what credential the cluster accepts.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTenant {
    pub namespace: Namespace,
    pub cluster_token: String,
}

pub struct AuthGateway {
    classifier: TokenClassifier,
    tenants: TenantClient,
    tokens: TokenExchanger,
    secrets: SecretClient,
    cache: SingleFlightCache<ResolvedTenant, GatewayError>,
}

impl AuthGateway {
    pub fn new(
        tenant_url: &str,
        auth_url: &str,
        service_account_id: &str,
        service_account_secret: &str,
        service_accounts: HashMap<String, String>,
    ) -> Self {
        let client = reqwest::Client::new();
        AuthGateway {
            classifier: TokenClassifier::new(client.clone(), auth_url, service_accounts),
            tenants: TenantClient::new(client.clone(), tenant_url),
            tokens: TokenExchanger::new(
                client.clone(),
                auth_url,
                service_account_id,
                service_account_secret,
            ),
            secrets: SecretClient::new(client),
            cache: SingleFlightCache::new(),
        }
    }

    async fn resolve_user(
        &self,
        token: &str,
        params: &HashMap<String, String>,
    ) -> Result<ResolvedTenant, GatewayError> {
        let key = fingerprint(token);
        self.cache
            .get(&key, || async {
                let namespace = self.tenants.get_tenant(token, params).await?;
                let cluster_token = self
                    .tokens
                    .exchange_user_token(token, &namespace.cluster_url)
                    .await?;
                Ok(ResolvedTenant {
                    namespace,
                    cluster_token,
                })
            })
            .await
    }

    // The service path impersonates: the tenant is looked up by the user id
    // the service supplied, and the credential handed downstream is the
    // tenant namespace's own service-account secret.
    async fn resolve_service(
        &self,
        token: &str,
        user_id: &str,
        params: &HashMap<String, String>,
    ) -> Result<ResolvedTenant, GatewayError> {
        let key = fingerprint(&format!("{token}_{user_id}"));
        self.cache
            .get(&key, || async {
                let sa_token = self.tokens.sa_token().await?;
                let namespace = self
                    .tenants
                    .get_tenant_by_id(&sa_token, user_id, params)
                    .await?;
                let cluster_token = self
                    .tokens
                    .exchange_sa_token(&sa_token, &namespace.cluster_url)
                    .await?;
                let secret_name = self
                    .secrets
                    .secret_name(
                        &namespace.cluster_url,
                        &cluster_token,
                        &namespace.name,
                        &namespace.kind,
                    )
                    .await?;
                let secret = self
                    .secrets
                    .secret(
                        &namespace.cluster_url,
                        &cluster_token,
                        &namespace.name,
                        &secret_name,
                    )
                    .await?;
                Ok(ResolvedTenant {
                    namespace,
                    cluster_token: secret,
                })
            })
            .await
    }
}

pub async fn authenticate(
    State(gateway): State<Arc<AuthGateway>>,
    mut req: Request,
    next: Next,
) -> Response {
    // CORS preflights carry no credentials; they go to the default backend
    // so they are never blocked by authentication.
    if req.method() == Method::OPTIONS {
        req.headers_mut()
            .insert(TARGET_HEADER, HeaderValue::from_static("default"));
        return next.run(req).await;
    }

    let Some(token) = bearer_token(&req) else {
        tracing::warn!("no authorization token on request");
        return StatusCode::UNAUTHORIZED.into_response();
    };

    let kind = match gateway.classifier.classify(&token).await {
        Ok(kind) => kind,
        Err(e) => {
            tracing::warn!(error = %e, "token classification failed");
            return StatusCode::UNAUTHORIZED.into_response();
        }
    };

    let mut params = request_path::path_segment_params(req.uri().path(), PARAM_PATH_SEGMENT);
    if let TokenKind::Service(service_kind) = &kind {
        // The service kind selects the namespace kind unless the request
        // pinned one explicitly.
        if !params.contains_key("type") {
            params.insert("type".to_string(), service_kind.clone());
        }
    }

    let started = Instant::now();
    let resolved = match &kind {
        TokenKind::User => gateway.resolve_user(&token, &params).await,
        TokenKind::Service(_) => {
            let Some(user_id) = request_path::user_id(req.headers(), req.uri()) else {
                tracing::warn!("user identity is missing on service-token request");
                return StatusCode::UNAUTHORIZED.into_response();
            };
            gateway.resolve_service(&token, &user_id, &params).await
        }
    };
    let outcome = if resolved.is_ok() { "success" } else { "failure" };
    metrics::histogram!(RESOLVE_DURATION.name, "outcome" => outcome)
        .record(started.elapsed().as_secs_f64());

    let resolved = match resolved {
        Ok(resolved) => resolved,
        Err(e) => {
            tracing::warn!(error = %e, "request resolution failed");
            return e.response_status().into_response();
        }
    };

    let kind_path = RequestKind::classify(req.uri().path());
    let stripped = kind_path.strip(req.uri().path());
    let new_path =
        request_path::replace_path_segment(&stripped, PARAM_PATH_SEGMENT, &resolved.namespace.name);
    let target = shared::normalize_url(kind_path.target_url(&resolved.namespace)).to_string();

    if kind_path.is_redirect() {
        let mut location = format!("{target}{new_path}");
        // Log redirects keep the query so viewer state survives; console
        // redirects drop it.
        if kind_path == RequestKind::Logs {
            if let Some(query) = req.uri().query() {
                if !query.is_empty() {
                    location = format!("{location}?{query}");
                }
            }
        }
        return Redirect::temporary(&location).into_response();
    }

    let query = req.uri().query().unwrap_or("").to_string();
    request_path::set_path_and_query(&mut req, &new_path, &query);

    let (Ok(target_value), Ok(auth_value)) = (
        HeaderValue::from_str(&target),
        HeaderValue::from_str(&format!("Bearer {}", resolved.cluster_token)),
    ) else {
        tracing::error!("resolved route is not header-safe");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };
    req.headers_mut().insert(TARGET_HEADER, target_value);
    req.headers_mut().insert(AUTHORIZATION, auth_value);

    if matches!(kind, TokenKind::Service(_)) {
        request_path::scrub_impersonation(&mut req);
    }

    next.run(req).await
}

// The token is preferred from the query (promoted upstream by the
// access-token middleware) and otherwise taken as the last whitespace
// separated component of the Authorization header, which accepts both
// "Bearer <token>" and a bare token.
fn bearer_token(req: &Request) -> Option<String> {
    let query = req.uri().query().unwrap_or("");
    if let Some(token) = request_path::query_param(query, ACCESS_TOKEN_PARAM) {
        if !token.is_empty() {
            return Some(token);
        }
    }

    let auth = req.headers().get(AUTHORIZATION)?.to_str().ok()?;
    let token = auth.split_whitespace().last()?;
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

fn fingerprint(plain: &str) -> String {
    hex::encode(Sha256::digest(plain.as_bytes()))
}
