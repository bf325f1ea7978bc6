//! HTTP routes
//!
//! - `GET /` returns every component's stats line as JSON
//! - `GET /enqueue-inbound?count=N` queues N inbound calls
//! - `GET /enqueue-outbound?count=N&phone-number=..&vxml-url=..&cdr-url=..`
//!   queues N outbound calls
//!
//! Both enqueue routes answer with the number of calls queued.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use rvoip_traffic_core::{CallRequest, EngineStats, TrafficEngine, TrafficError};
use thiserror::Error;
use tracing::info;

const COUNT: &str = "count";

/// Largest `count` one request may enqueue
pub const MAX_COUNT: u64 = 100_000;

/// Errors returned to HTTP clients
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid count '{0}': expected a non-negative integer")]
    InvalidCount(String),

    #[error("Count {0} exceeds the limit of {} per request", MAX_COUNT)]
    CountTooLarge(u64),

    #[error("Missing required parameters: {}", .0.join(", "))]
    MissingParameters(Vec<&'static str>),

    #[error(transparent)]
    Engine(#[from] TrafficError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::InvalidCount(_)
            | ApiError::CountTooLarge(_)
            | ApiError::MissingParameters(_) => StatusCode::BAD_REQUEST,
            ApiError::Engine(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, self.to_string()).into_response()
    }
}

pub fn router(engine: Arc<TrafficEngine>) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/enqueue-inbound", get(enqueue_inbound))
        .route("/enqueue-outbound", get(enqueue_outbound))
        .with_state(engine)
}

async fn home(State(engine): State<Arc<TrafficEngine>>) -> Json<EngineStats> {
    Json(engine.stats())
}

async fn enqueue_inbound(
    State(engine): State<Arc<TrafficEngine>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<String, ApiError> {
    let count = parse_count(&params)?;

    timed("enqueued", count, "incoming message", || {
        (0..count).try_for_each(|_| engine.enqueue_inbound(CallRequest::new()))
    })?;

    Ok(count.to_string())
}

async fn enqueue_outbound(
    State(engine): State<Arc<TrafficEngine>>,
    Query(mut params): Query<HashMap<String, String>>,
) -> Result<String, ApiError> {
    let count = parse_count(&params)?;
    params.remove(COUNT);

    let request = CallRequest::from_params(params);
    let missing = request.missing_outbound_keys();
    if !missing.is_empty() {
        return Err(ApiError::MissingParameters(missing));
    }

    timed("enqueued", count, "outgoing message", || {
        (0..count).try_for_each(|_| engine.enqueue_outbound(request.clone()))
    })?;

    Ok(count.to_string())
}

fn parse_count(params: &HashMap<String, String>) -> Result<u64, ApiError> {
    let count = match params.get(COUNT) {
        None => 1,
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ApiError::InvalidCount(raw.clone()))?,
    };
    if count > MAX_COUNT {
        return Err(ApiError::CountTooLarge(count));
    }
    Ok(count)
}

/// Run `f` and log how long it took and how fast `count` objects went through
fn timed<T>(action: &str, count: u64, object: &str, f: impl FnOnce() -> T) -> T {
    let start = Instant::now();
    let result = f();
    let duration_ms = start.elapsed().as_millis() as u64;
    info!("{}", describe_timing(action, count, object, duration_ms));
    result
}

fn describe_timing(action: &str, count: u64, object: &str, duration_ms: u64) -> String {
    if count == 0 || object.is_empty() {
        return format!("{} in {}ms", action, duration_ms);
    }

    let objects = format!("{}s", object);
    let noun = if count == 1 { object } else { objects.as_str() };
    let speed = if duration_ms == 0 {
        format!("at a gazillion {}/sec", objects)
    } else {
        format!("at {} {}/sec", 1000 * count / duration_ms, noun)
    };
    format!("{} {} {} in {}ms {}", action, count, noun, duration_ms, speed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use rvoip_traffic_core::{OutcomeType, TrafficConfig};
    use std::time::Duration;
    use tower::ServiceExt;

    fn test_engine() -> Arc<TrafficEngine> {
        let mut config = TrafficConfig::default();
        config.incoming.workers = 2;
        config.outgoing.workers = 2;
        config.cdr.workers = 2;
        config.incoming.outcomes = vec![OutcomeType::new("success", 100, 1, 2)];
        config.outgoing.outcomes = vec![OutcomeType::new("success", 100, 1, 2)];
        Arc::new(TrafficEngine::start(config).unwrap())
    }

    async fn get_path(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    async fn wait_for_cdrs(engine: &TrafficEngine, expected: u64) {
        for _ in 0..500 {
            if engine.cdr_recorder().count() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {} cdrs, got {}", expected, engine.cdr_recorder().count());
    }

    #[test]
    fn test_describe_timing() {
        assert_eq!(describe_timing("enqueued", 0, "message", 4), "enqueued in 4ms");
        assert_eq!(
            describe_timing("enqueued", 1, "message", 2),
            "enqueued 1 message in 2ms at 500 message/sec"
        );
        assert_eq!(
            describe_timing("enqueued", 300, "incoming message", 3),
            "enqueued 300 incoming messages in 3ms at 100000 incoming messages/sec"
        );
        assert_eq!(
            describe_timing("enqueued", 5, "message", 0),
            "enqueued 5 messages in 0ms at a gazillion messages/sec"
        );
    }

    #[tokio::test]
    async fn test_enqueue_inbound_default_count() {
        let engine = test_engine();
        let (status, body) = get_path(router(engine.clone()), "/enqueue-inbound").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "1");

        wait_for_cdrs(&engine, 1).await;
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_enqueue_inbound_with_count() {
        let engine = test_engine();
        let (status, body) = get_path(router(engine.clone()), "/enqueue-inbound?count=25").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "25");

        wait_for_cdrs(&engine, 25).await;
        assert_eq!(engine.incoming_calls().total(), 25);
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_invalid_count_is_rejected() {
        let engine = test_engine();
        let (status, body) = get_path(router(engine.clone()), "/enqueue-inbound?count=lots").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("lots"));

        let (status, _) = get_path(router(engine.clone()), "/enqueue-inbound?count=-3").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(engine.incoming_queue().pending(), 0);
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_count_above_limit_is_rejected() {
        let engine = test_engine();
        let uri = format!("/enqueue-inbound?count={}", MAX_COUNT + 1);
        let (status, body) = get_path(router(engine.clone()), &uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("100001"));

        let (status, _) =
            get_path(router(engine.clone()), "/enqueue-outbound?count=18446744073709551615").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        assert_eq!(engine.incoming_queue().pending(), 0);
        assert_eq!(engine.outgoing_queue().pending(), 0);
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_enqueue_outbound_requires_call_parameters() {
        let engine = test_engine();
        let (status, body) =
            get_path(router(engine.clone()), "/enqueue-outbound?count=2&phone-number=5550100").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "Missing required parameters: vxml-url, cdr-url");
        assert_eq!(engine.outgoing_calls().total(), 0);
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_enqueue_outbound() {
        let engine = test_engine();
        let uri = "/enqueue-outbound?count=3&phone-number=5550100&vxml-url=http%3A%2F%2Fivr%2Fa.vxml&cdr-url=http%3A%2F%2Fivr%2Fcdr";
        let (status, body) = get_path(router(engine.clone()), uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "3");

        wait_for_cdrs(&engine, 3).await;
        assert_eq!(engine.outgoing_calls().total(), 3);
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_home_reports_stats() {
        let engine = test_engine();
        let (status, body) = get_path(router(engine.clone()), "/").await;
        assert_eq!(status, StatusCode::OK);

        let stats: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(stats["cdrs"], "cdr: 0");
        assert_eq!(stats["incoming calls"], "incoming-call: 0");
        assert_eq!(stats["outgoing queue"], "outgoing-queue: 0 pending, 0 processed");
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_enqueue_after_shutdown_is_unavailable() {
        let engine = test_engine();
        engine.shutdown().await;
        let (status, body) = get_path(router(engine.clone()), "/enqueue-inbound").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body.contains("closed"));
    }
}
