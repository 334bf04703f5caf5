//! HTTP surface of the core.
//!
//! One axum app hosts every component's routes; the edge router strips the
//! service segment before forwarding, so paths here are service-local.
//! Responses use the `{"success": ...}` envelope from `kosh_common::api`.

pub mod authority;
pub mod identity;
pub mod ledger;
pub mod transactions;
pub mod wallet;

use std::time::Duration;

use axum::http::HeaderMap;
use axum::routing::get;
use axum::{Extension, Router};
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;

use crate::bootstrap::AppContext;

/// Per-request deadline; an elapsed deadline cancels in-flight work and any
/// open transactional scope rolls back.
const REQUEST_DEADLINE: Duration = Duration::from_secs(30);

pub fn router(ctx: AppContext) -> Router {
    let events = kosh_events::api::router(ctx.events.clone());
    Router::new()
        .merge(identity::router())
        .merge(wallet::router())
        .merge(ledger::router())
        .merge(authority::router())
        .merge(transactions::router())
        .route("/healthz", get(|| async { "ok" }))
        .layer(TimeoutLayer::new(REQUEST_DEADLINE))
        .with_state(ctx.clone())
        .merge(events)
        .layer(Extension(ctx.identity.clone()))
        .layer(CorsLayer::permissive())
}

/// Caller-supplied idempotency key, from the `X-Idempotency-Key` header.
pub(crate) fn idem_key(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-idempotency-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

pub(crate) fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-real-ip")
        .or_else(|| headers.get("x-forwarded-for"))
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

pub(crate) fn user_agent(headers: &HeaderMap) -> String {
    headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}
