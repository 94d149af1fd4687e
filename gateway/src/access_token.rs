//! Promotes `access_token` query parameters into the `Authorization` header.
//!
//! Browser clients following OAuth redirects arrive with the token in the
//! URL. The token must not survive into access logs or upstream requests,
//! so the parameter is removed and the query re-encoded before anything
//! else sees the request.

use crate::request_path::{encode_query, query_param, set_path_and_query};
use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use http::header::AUTHORIZATION;
use http::{HeaderValue, Method};

pub const ACCESS_TOKEN_PARAM: &str = "access_token";

pub async fn promote_access_token(mut req: Request, next: Next) -> Response {
    if req.method() != Method::OPTIONS {
        promote(&mut req);
    }
    next.run(req).await
}

fn promote<B>(req: &mut http::Request<B>) {
    let query = req.uri().query().unwrap_or("").to_string();
    let Some(token) = query_param(&query, ACCESS_TOKEN_PARAM) else {
        return;
    };
    if token.is_empty() {
        return;
    }

    match HeaderValue::from_str(&format!("Bearer {token}")) {
        Ok(value) => {
            req.headers_mut().insert(AUTHORIZATION, value);
        }
        Err(_) => {
            tracing::warn!("auth query parameter is not a valid header value");
            return;
        }
    }

    let remaining: Vec<(String, String)> = url::form_urlencoded::parse(query.as_bytes())
        .filter(|(k, _)| k != ACCESS_TOKEN_PARAM)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    let path = req.uri().path().to_string();
    set_path_and_query(req, &path, &encode_query(&remaining));

    // Log the path only. The token value and the parameter name must never
    // reach the logs.
    tracing::debug!(path = %req.uri().path(), "promoted auth query parameter to header");
}
