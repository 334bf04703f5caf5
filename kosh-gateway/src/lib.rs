//! Edge router.
//!
//! Rewrites `/api/v1/<service>/<rest>` to `/api/v1/<rest>` and forwards the
//! request to the named component, propagating the bearer credential and
//! idempotency key and stamping forwarding headers. Pure plumbing; every
//! decision of consequence happens in the components.

use std::collections::HashMap;
use std::net::SocketAddr;

use axum::body::{to_bytes, Body};
use axum::extract::{ConnectInfo, Path, Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use uuid::Uuid;

use kosh_common::config::ServiceUrls;
use kosh_common::CoreError;

const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Headers copied from the inbound request to the forwarded one.
const PROPAGATED: &[&str] = &["authorization", "content-type", "x-idempotency-key"];

#[derive(Clone)]
pub struct GatewayState {
    client: reqwest::Client,
    targets: HashMap<&'static str, String>,
}

impl GatewayState {
    pub fn new(urls: &ServiceUrls) -> Self {
        // The event fan-out is not proxied: SSE streams are long-lived and
        // subscribers connect to it directly.
        let targets = HashMap::from([
            ("ledger", urls.ledger.clone()),
            ("wallet", urls.wallet.clone()),
            ("authority", urls.authority.clone()),
            ("identity", urls.identity.clone()),
            ("transaction", urls.orchestrator.clone()),
        ]);
        Self {
            client: reqwest::Client::new(),
            targets,
        }
    }
}

pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/api/v1/{service}/{*rest}", any(forward))
        .with_state(state)
}

async fn forward(
    State(state): State<GatewayState>,
    Path((service, rest)): Path<(String, String)>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
) -> Response {
    let Some(base) = state.targets.get(service.as_str()) else {
        return CoreError::not_found("service").into_response();
    };

    let query = request
        .uri()
        .query()
        .map(|q| format!("?{q}"))
        .unwrap_or_default();
    let url = format!("{base}/api/v1/{rest}{query}");
    let method = request.method().clone();
    let headers = request.headers().clone();
    let request_id = Uuid::new_v4().to_string();

    let body = match to_bytes(request.into_body(), MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(_) => return CoreError::Validation("request body too large".into()).into_response(),
    };

    let mut outbound = state
        .client
        .request(method, &url)
        .header("x-request-id", &request_id);
    for name in PROPAGATED {
        if let Some(value) = headers.get(*name) {
            outbound = outbound.header(*name, value);
        }
    }
    let ip = addr.ip().to_string();
    outbound = outbound
        .header("x-forwarded-for", &ip)
        .header("x-real-ip", &ip);
    if !body.is_empty() {
        outbound = outbound.body(body.to_vec());
    }

    match outbound.send().await {
        Ok(upstream) => {
            let status =
                StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
            let mut response_headers = HeaderMap::new();
            if let Some(ct) = upstream.headers().get("content-type") {
                if let Ok(value) = HeaderValue::from_bytes(ct.as_bytes()) {
                    response_headers.insert(HeaderName::from_static("content-type"), value);
                }
            }
            match upstream.bytes().await {
                Ok(bytes) => (status, response_headers, Body::from(bytes)).into_response(),
                Err(e) => {
                    tracing::error!(service, error = %e, "upstream body read failed");
                    CoreError::internal("upstream read failed").into_response()
                }
            }
        }
        Err(e) => {
            tracing::error!(service, url, error = %e, "forwarding failed");
            CoreError::internal("upstream unreachable").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls() -> ServiceUrls {
        ServiceUrls {
            ledger: "http://ledger:8081".into(),
            wallet: "http://wallet:8082".into(),
            authority: "http://authority:8083".into(),
            identity: "http://identity:8084".into(),
            orchestrator: "http://orchestrator:8085".into(),
            events: "http://events:8086".into(),
            risk: "http://risk:8090".into(),
        }
    }

    #[test]
    fn test_known_services_mapped() {
        let state = GatewayState::new(&urls());
        assert_eq!(state.targets["identity"], "http://identity:8084");
        assert_eq!(state.targets["transaction"], "http://orchestrator:8085");
        assert!(!state.targets.contains_key("risk"), "risk is not edge-routable");
        assert!(!state.targets.contains_key("events"), "streams bypass the proxy");
    }
}
