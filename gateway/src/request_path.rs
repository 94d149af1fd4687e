//! Request path classification and rewriting.
//!
//! The first path segment selects which of the tenant's URLs a request is
//! destined for. Path segments may carry request-scoped parameters in matrix
//! form (`ns;type=stage;space=...`); the parameters feed the tenant lookup
//! and the segment is later replaced with the resolved namespace name.

use crate::tenant::Namespace;
use http::uri::{PathAndQuery, Uri};
use http::{HeaderMap, Request};
use std::collections::HashMap;

/// Sentinel name of the path segment that carries tenant-lookup parameters.
pub const PARAM_PATH_SEGMENT: &str = "ns";

pub const USER_ID_HEADER: &str = "impersonate-user";
pub const USER_GROUP_HEADER: &str = "impersonate-group";
pub const USER_ID_PARAM: &str = "identity_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Api,
    Metrics,
    Console,
    Logs,
    Undefined,
}

impl RequestKind {
    pub fn classify(path: &str) -> RequestKind {
        match first_segment(path) {
            "api" => RequestKind::Api,
            "metrics" => RequestKind::Metrics,
            "console" => RequestKind::Console,
            "logs" => RequestKind::Logs,
            _ => RequestKind::Undefined,
        }
    }

    /// Removes the service prefix from `path`.
    ///
    /// API paths only lose their leading `/api` when the remainder is itself
    /// an `api`/`oapi` cluster path; a bare `/api/...` already matches the
    /// cluster's own routes and passes through unchanged.
    pub fn strip(&self, path: &str) -> String {
        match self {
            RequestKind::Api => {
                if path.starts_with("/api/api") || path.starts_with("/api/oapi") {
                    strip_prefix(path, "/api")
                } else {
                    path.to_string()
                }
            }
            RequestKind::Metrics => strip_prefix(path, "/metrics"),
            RequestKind::Console => strip_prefix(path, "/console"),
            RequestKind::Logs => strip_prefix(path, "/logs"),
            RequestKind::Undefined => path.to_string(),
        }
    }

    /// The namespace URL this kind routes to; kinds without a dedicated URL
    /// fall back to the cluster API.
    pub fn target_url<'a>(&self, ns: &'a Namespace) -> &'a str {
        let url = match self {
            RequestKind::Api | RequestKind::Undefined => &ns.cluster_url,
            RequestKind::Metrics => &ns.cluster_metrics_url,
            RequestKind::Console => &ns.cluster_console_url,
            RequestKind::Logs => &ns.cluster_logging_url,
        };
        if url.is_empty() { &ns.cluster_url } else { url }
    }

    /// Console and log requests are answered with a redirect instead of
    /// being proxied.
    pub fn is_redirect(&self) -> bool {
        matches!(self, RequestKind::Console | RequestKind::Logs)
    }
}

fn first_segment(path: &str) -> &str {
    path.strip_prefix('/')
        .unwrap_or(path)
        .split('/')
        .next()
        .unwrap_or("")
}

fn strip_prefix(path: &str, prefix: &str) -> String {
    let rest = path.strip_prefix(prefix).unwrap_or(path);
    ensure_leading_slash(rest)
}

fn ensure_leading_slash(s: &str) -> String {
    format!("/{}", s.strip_prefix('/').unwrap_or(s))
}

/// Parameters of the first path segment named `segment_name`, e.g.
/// `/api/v1/namespaces/ns;type=stage;space=s1/pods` yields
/// `{type: stage, space: s1}` for segment name `ns`.
pub fn path_segment_params(path: &str, segment_name: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    for segment in path.split('/') {
        let mut parts = segment.split(';');
        if parts.next() != Some(segment_name) {
            continue;
        }
        for part in parts {
            let kv: Vec<&str> = part.split('=').collect();
            if kv.len() == 2 {
                params.insert(kv[0].to_string(), kv[1].to_string());
            }
        }
        if !params.is_empty() {
            return params;
        }
    }
    params
}

/// Replaces the parameterized segment named `segment_name` with
/// `new_segment`, or deletes it entirely when the replacement is empty.
pub fn replace_path_segment(path: &str, segment_name: &str, new_segment: &str) -> String {
    let mut segments: Vec<&str> = path.split('/').collect();
    let target = segments
        .iter()
        .position(|seg| seg.contains(';') && seg.split(';').next() == Some(segment_name));

    match target {
        None => path.to_string(),
        Some(i) => {
            if new_segment.is_empty() {
                segments.remove(i);
            } else {
                segments[i] = new_segment;
            }
            segments.join("/")
        }
    }
}

/// The impersonated user for a service-token request, from the
/// `Impersonate-User` header or the `identity_id` query parameter. Clients
/// that build URLs by concatenation can leave a path spilled into the
/// parameter value; everything after the first `/` is ignored here.
pub fn user_id(headers: &HeaderMap, uri: &Uri) -> Option<String> {
    if let Some(value) = headers.get(USER_ID_HEADER).and_then(|v| v.to_str().ok()) {
        if !value.is_empty() {
            return Some(value.to_string());
        }
    }

    let value = query_param(uri.query().unwrap_or(""), USER_ID_PARAM)?;
    if value.is_empty() {
        return None;
    }
    match value.find('/') {
        Some(i) => Some(value[..i].to_string()),
        None => Some(value),
    }
}

/// Strips impersonation artifacts before the request is forwarded: the
/// impersonation headers and the `identity_id` query parameter.
///
/// When the parameter value carries a spilled `/path?query` suffix, that
/// suffix is the request the client actually meant; it is re-installed as
/// the path and query.
pub fn scrub_impersonation<B>(req: &mut Request<B>) {
    req.headers_mut().remove(USER_ID_HEADER);
    req.headers_mut().remove(USER_GROUP_HEADER);

    let query = req.uri().query().unwrap_or("").to_string();
    let Some(value) = query_param(&query, USER_ID_PARAM) else {
        return;
    };
    if value.is_empty() {
        return;
    }

    if value.contains('/') {
        let remaining_query = if let Some(i) = query.rfind('?') {
            &query[i + 1..]
        } else if let Some(i) = query.find('&') {
            &query[i + 1..]
        } else {
            ""
        };
        let id = match value.find('?') {
            Some(i) => &value[..i],
            None => value.as_str(),
        };
        let Some(slash) = id.find('/') else {
            return;
        };
        let path = id[slash..].to_string();
        set_path_and_query(req, &path, remaining_query);
    } else {
        let remaining: Vec<(String, String)> = url::form_urlencoded::parse(query.as_bytes())
            .filter(|(k, _)| k != USER_ID_PARAM)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        let path = req.uri().path().to_string();
        set_path_and_query(req, &path, &encode_query(&remaining));
    }
}

/// Replaces the request URI's path and query, keeping scheme and authority.
pub fn set_path_and_query<B>(req: &mut Request<B>, path: &str, query: &str) {
    let pq = if query.is_empty() {
        path.to_string()
    } else {
        format!("{path}?{query}")
    };
    let mut parts = req.uri().clone().into_parts();
    match PathAndQuery::try_from(pq.as_str()) {
        Ok(path_and_query) => {
            parts.path_and_query = Some(path_and_query);
            match Uri::from_parts(parts) {
                Ok(uri) => *req.uri_mut() = uri,
                Err(e) => tracing::warn!(error = %e, "failed to rewrite request uri"),
            }
        }
        Err(e) => tracing::warn!(error = %e, "failed to rewrite request path"),
    }
}

pub(crate) fn query_param(query: &str, name: &str) -> Option<String> {
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

pub(crate) fn encode_query(pairs: &[(String, String)]) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (k, v) in pairs {
        serializer.append_pair(k, v);
    }
    serializer.finish()
}
