use http::StatusCode;

/// Errors produced while resolving a request's identity to a tenant route.
///
/// The type is `Clone` so that every caller coalesced onto one in-flight
/// resolve can receive the same outcome; upstream failures are therefore
/// carried as status codes and rendered messages rather than source errors.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    #[error("missing authorization token")]
    MissingToken,
    #[error("invalid token: {0}")]
    InvalidToken(String),
    #[error("no 'kid' header in the token")]
    MissingKeyId,
    #[error("no public key with id '{0}'")]
    UnknownKeyId(String),
    #[error("invalid key set: {0}")]
    InvalidKeySet(String),
    #[error("service account '{0}' not supported")]
    UnknownServiceAccount(String),
    #[error("user identity is missing")]
    MissingUserId,
    #[error("unable to locate namespace")]
    NamespaceNotFound,
    #[error("unable to locate secret name")]
    SecretNameNotFound,
    #[error("unable to locate secret")]
    SecretNotFound,
    #[error("secret is not a valid token: {0}")]
    SecretEncoding(String),
    #[error("tenant service returned status {0}")]
    TenantStatus(StatusCode),
    #[error("auth service returned status {0}")]
    AuthStatus(StatusCode),
    #[error("cluster returned status {0}")]
    ClusterStatus(StatusCode),
    #[error("request failed: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        GatewayError::Transport(err.to_string())
    }
}

impl GatewayError {
    /// Status the middleware answers with when resolution fails.
    ///
    /// A tenant-service 403 or 404 is relayed verbatim so callers can tell a
    /// forbidden collaborator apart from a namespace that was never created.
    /// Everything else collapses to 401.
    pub fn response_status(&self) -> StatusCode {
        match self {
            GatewayError::TenantStatus(status)
                if *status == StatusCode::FORBIDDEN || *status == StatusCode::NOT_FOUND =>
            {
                *status
            }
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_status() {
        assert_eq!(
            GatewayError::TenantStatus(StatusCode::NOT_FOUND).response_status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            GatewayError::TenantStatus(StatusCode::FORBIDDEN).response_status(),
            StatusCode::FORBIDDEN
        );
        // 5xx from the tenant service is deliberately ambiguous to callers
        assert_eq!(
            GatewayError::TenantStatus(StatusCode::BAD_GATEWAY).response_status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            GatewayError::AuthStatus(StatusCode::NOT_FOUND).response_status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(GatewayError::MissingToken.response_status(), StatusCode::UNAUTHORIZED);
    }
}
