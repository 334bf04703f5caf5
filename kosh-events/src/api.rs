use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::sse::{Event, Sse};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use futures::stream::Stream;
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;

use kosh_common::{api, CoreError};

use crate::{EventHub, EventRecord, Topic};

/// Heartbeat cadence proving stream liveness.
const HEARTBEAT_SECS: u64 = 30;

#[derive(Deserialize)]
struct SubscribeParams {
    topics: Option<String>,
}

pub fn router(hub: EventHub) -> Router {
    Router::new()
        .route("/events", get(subscribe))
        .route("/events/broadcast", post(broadcast))
        .with_state(hub)
}

async fn subscribe(
    State(hub): State<EventHub>,
    Query(params): Query<SubscribeParams>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, CoreError> {
    let topics = parse_topics(params.topics.as_deref())?;
    let rx = hub.subscribe();
    let heartbeat = tokio::time::interval(Duration::from_secs(HEARTBEAT_SECS));

    let stream = futures::stream::unfold(
        (rx, heartbeat, topics),
        |(mut rx, mut heartbeat, topics)| async move {
            loop {
                tokio::select! {
                    _ = heartbeat.tick() => {
                        let event = Event::default()
                            .event("heartbeat")
                            .data(serde_json::json!({"timestamp": Utc::now()}).to_string());
                        return Some((Ok(event), (rx, heartbeat, topics)));
                    }
                    received = rx.recv() => match received {
                        Ok(record) if record.matches(&topics) => {
                            let event = Event::default()
                                .event(record.event_type.clone())
                                .data(serde_json::to_string(&record).unwrap_or_default());
                            return Some((Ok(event), (rx, heartbeat, topics)));
                        }
                        Ok(_) => continue,
                        // A lagging subscriber loses events, never the stream.
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "subscriber lagged, events dropped");
                            continue;
                        }
                        Err(RecvError::Closed) => return None,
                    }
                }
            }
        },
    );

    Ok(Sse::new(stream))
}

/// Internal publish endpoint.
async fn broadcast(
    State(hub): State<EventHub>,
    Json(record): Json<EventRecord>,
) -> Response {
    hub.publish(&record.event_type, record.topic, record.data);
    api::ok(serde_json::json!({ "published": true }))
}

fn parse_topics(raw: Option<&str>) -> Result<Vec<Topic>, CoreError> {
    let raw = raw.unwrap_or("all");
    let mut topics = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let topic = Topic::parse(part)
            .ok_or_else(|| CoreError::Validation(format!("unknown topic: {part}")))?;
        topics.push(topic);
    }
    if topics.is_empty() {
        topics.push(Topic::All);
    }
    Ok(topics)
}
