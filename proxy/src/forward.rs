//! Fallback handler that forwards requests to the backend named by the
//! `Target` header the auth middleware wrote.

use crate::headers::{append_via, strip_hop_by_hop};
use crate::metrics_defs::REQUEST_DURATION;
use crate::routing_table::RoutingTable;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::response::{IntoResponse, Response};
use http::{StatusCode, Uri, header};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use shared::TARGET_HEADER;
use std::sync::Arc;
use std::time::Instant;

pub struct Forwarder {
    client: Client<HttpConnector, Body>,
    table: Arc<RoutingTable>,
}

impl Forwarder {
    pub fn new(table: Arc<RoutingTable>) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Forwarder { client, table }
    }
}

pub async fn forward(State(forwarder): State<Arc<Forwarder>>, req: Request) -> Response {
    let start = Instant::now();
    let response = forward_inner(&forwarder, req).await;
    metrics::histogram!(REQUEST_DURATION.name, "status" => response.status().as_u16().to_string())
        .record(start.elapsed().as_secs_f64());
    response
}

async fn forward_inner(forwarder: &Forwarder, mut req: Request) -> Response {
    let Some(target) = req
        .headers()
        .get(TARGET_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
    else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let Some(backend) = forwarder.table.backend_for(&target) else {
        tracing::debug!(target = %target, "no backend for target");
        return StatusCode::NOT_FOUND.into_response();
    };

    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let uri: Uri = match format!("{backend}{path_and_query}").parse() {
        Ok(uri) => uri,
        Err(e) => {
            tracing::error!(error = %e, backend = %backend, "invalid upstream uri");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    *req.uri_mut() = uri;

    let version = req.version();
    // The client derives Host from the upstream authority.
    req.headers_mut().remove(header::HOST);
    strip_hop_by_hop(req.headers_mut(), version);
    append_via(req.headers_mut(), version);

    match forwarder.client.request(req).await {
        Ok(response) => {
            let version = response.version();
            let mut response = response.map(Body::new);
            strip_hop_by_hop(response.headers_mut(), version);
            append_via(response.headers_mut(), version);
            response
        }
        Err(e) => {
            tracing::warn!(error = %e, "upstream request failed");
            StatusCode::BAD_GATEWAY.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use http::Request as HttpRequest;
    use shared::routing::RoutingConfig;
    use tower::ServiceExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn upstream(body: &str) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/test"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;
        server
    }

    fn app(table: Arc<RoutingTable>) -> Router {
        Router::new()
            .fallback(forward)
            .with_state(Arc::new(Forwarder::new(table)))
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_forwards_to_matched_backend() {
        let server = upstream("served by cluster1").await;

        let table = Arc::new(RoutingTable::new());
        let mut config = RoutingConfig::default();
        config.add_target_route("api1", &server.uri(), &server.uri());
        table.apply(&config);

        let req = HttpRequest::builder()
            .uri("/test")
            .header(TARGET_HEADER, server.uri())
            .body(Body::empty())
            .unwrap();
        let response = app(table).oneshot(req).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "served by cluster1");
    }

    #[tokio::test]
    async fn test_default_target_uses_default_backend() {
        let server = upstream("default backend").await;

        let table = Arc::new(RoutingTable::new());
        let mut config = RoutingConfig::default();
        config.add_target_route("default", "default", &server.uri());
        table.apply(&config);

        let req = HttpRequest::builder()
            .uri("/test")
            .header(TARGET_HEADER, "default")
            .body(Body::empty())
            .unwrap();
        let response = app(table).oneshot(req).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "default backend");
    }

    #[tokio::test]
    async fn test_unknown_target_not_found() {
        let table = Arc::new(RoutingTable::new());
        let req = HttpRequest::builder()
            .uri("/test")
            .header(TARGET_HEADER, "http://api.cluster9.com")
            .body(Body::empty())
            .unwrap();
        let response = app(table).oneshot(req).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_missing_target_not_found() {
        let table = Arc::new(RoutingTable::new());
        let req = HttpRequest::builder().uri("/test").body(Body::empty()).unwrap();
        let response = app(table).oneshot(req).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unreachable_backend_bad_gateway() {
        let table = Arc::new(RoutingTable::new());
        let mut config = RoutingConfig::default();
        config.add_target_route("api1", "http://127.0.0.1:1", "http://127.0.0.1:1");
        table.apply(&config);

        let req = HttpRequest::builder()
            .uri("/test")
            .header(TARGET_HEADER, "http://127.0.0.1:1")
            .body(Body::empty())
            .unwrap();
        let response = app(table).oneshot(req).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
