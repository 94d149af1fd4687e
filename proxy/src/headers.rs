//! Header hygiene for proxied traffic, applied in both directions: requests
//! from clients to upstreams and responses coming back.

use http::Version;
use http::header::{
    CONNECTION, HeaderMap, HeaderName, HeaderValue, PROXY_AUTHENTICATE, PROXY_AUTHORIZATION, TE,
    TRAILER, TRANSFER_ENCODING, UPGRADE, VIA,
};

static HOP_BY_HOP: &[HeaderName] = &[
    CONNECTION,
    TRANSFER_ENCODING,
    TE,
    TRAILER,
    UPGRADE,
    PROXY_AUTHORIZATION,
    PROXY_AUTHENTICATE,
];

fn is_http1(version: Version) -> bool {
    matches!(version, Version::HTTP_09 | Version::HTTP_10 | Version::HTTP_11)
}

// Removes hop-by-hop headers for HTTP/1.x: the standard set, anything listed
// in the Connection header value, and keep-alive for HTTP/0.9 and 1.0.
// HTTP/2 and HTTP/3 don't use hop-by-hop headers.
pub fn strip_hop_by_hop(headers: &mut HeaderMap, version: Version) {
    if !is_http1(version) {
        return;
    }

    let listed: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|token| HeaderName::from_bytes(token.trim().as_bytes()).ok())
        .collect();

    for name in HOP_BY_HOP {
        headers.remove(name);
    }
    for name in listed {
        headers.remove(&name);
    }
    if matches!(version, Version::HTTP_09 | Version::HTTP_10) {
        headers.remove(HeaderName::from_static("keep-alive"));
    }
}

/// Appends this proxy to the Via chain.
pub fn append_via(headers: &mut HeaderMap, version: Version) {
    let protocol = match version {
        Version::HTTP_09 => "0.9",
        Version::HTTP_10 => "1.0",
        Version::HTTP_11 => "1.1",
        Version::HTTP_2 => "2",
        Version::HTTP_3 => "3",
        _ => {
            tracing::warn!(?version, "unknown HTTP version, skipping Via header");
            return;
        }
    };

    let via = format!("{protocol} switchyard");
    let combined = match headers.get(VIA).and_then(|existing| existing.to_str().ok()) {
        Some(existing) => format!("{existing}, {via}"),
        None => via,
    };
    if let Ok(value) = HeaderValue::from_str(&combined) {
        headers.insert(VIA, value);
    }
}
