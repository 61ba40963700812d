//! HTTP request handlers
//!
//! Implementation of the webhook receiver endpoints.

use crate::{
    replay::{RecordOutcome, ReplayCheck, parse_timestamp},
    server::app::AppState,
    types::{ErrorResponse, HealthResponse, PingResponse, WebhookAck},
    utils::version,
};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Json,
};

pub const HEADER_NONCE: &str = "x-webhook-nonce";
pub const HEADER_TIMESTAMP: &str = "x-webhook-timestamp";
pub const HEADER_SIGNATURE: &str = "x-webhook-signature";

type HandlerError = (StatusCode, Json<ErrorResponse>);

fn reject(status: StatusCode, message: impl Into<String>) -> HandlerError {
    (status, Json(ErrorResponse::new(message)))
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Webhook delivery endpoint
///
/// POST /webhook
///
/// Requires a nonce and a timestamp header. Stale timestamps are rejected
/// before the nonce store is consulted; a nonce is stored only once the
/// request has passed every other check.
pub async fn receive_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<(StatusCode, Json<WebhookAck>), HandlerError> {
    let nonce = header_value(&headers, HEADER_NONCE)
        .ok_or_else(|| reject(StatusCode::BAD_REQUEST, format!("Missing {} header", HEADER_NONCE)))?;

    let timestamp = header_value(&headers, HEADER_TIMESTAMP)
        .ok_or_else(|| {
            reject(
                StatusCode::BAD_REQUEST,
                format!("Missing {} header", HEADER_TIMESTAMP),
            )
        })
        .and_then(|raw| {
            parse_timestamp(raw).ok_or_else(|| {
                reject(
                    StatusCode::BAD_REQUEST,
                    format!("Invalid {} header: {}", HEADER_TIMESTAMP, raw),
                )
            })
        })?;

    let payload: serde_json::Value = if body.trim().is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_str(&body)
            .map_err(|e| reject(StatusCode::BAD_REQUEST, format!("Invalid JSON body: {}", e)))?
    };

    let tolerance = state.settings.replay.timestamp_tolerance();
    match state
        .replay
        .check_nonce_with_timestamp(nonce, timestamp, tolerance)
    {
        ReplayCheck::Fresh => {}
        ReplayCheck::TimestampOutOfRange => {
            return Err(reject(
                StatusCode::UNAUTHORIZED,
                "Request timestamp outside allowed window",
            ));
        }
        ReplayCheck::Replay => {
            return Err(reject(StatusCode::CONFLICT, "Nonce already used"));
        }
    }

    let signature = header_value(&headers, HEADER_SIGNATURE);
    match state.replay.record_nonce(nonce, signature, None) {
        RecordOutcome::Recorded => {}
        RecordOutcome::AlreadyRecorded => {
            return Err(reject(StatusCode::CONFLICT, "Nonce already used"));
        }
        RecordOutcome::StoreFull => {
            return Err(reject(
                StatusCode::SERVICE_UNAVAILABLE,
                "Replay protection store is full",
            ));
        }
    }

    tracing::info!("Accepted webhook delivery {}", nonce);
    Ok((
        StatusCode::ACCEPTED,
        Json(WebhookAck {
            nonce: nonce.to_string(),
            payload,
        }),
    ))
}

/// Health check endpoint
///
/// GET /ping
pub async fn ping(State(state): State<AppState>) -> Json<PingResponse> {
    let uptime = state.start_time.elapsed().as_secs();
    Json(PingResponse::new(uptime, version::get_version()))
}

/// Pool health endpoint
///
/// GET /health
///
/// Answers 503 when the connection pool reports itself unhealthy.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let healthy = state.pool.is_healthy();
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(HealthResponse {
            healthy,
            pool: state.pool.get_stats(),
            stored_nonces: state.replay.len(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::server::app::create_app;
    use axum::body::Body;
    use axum::http::Request;
    use chrono::Utc;
    use tower::ServiceExt;

    fn webhook(nonce: &str, timestamp: i64, body: &str) -> Request<Body> {
        Request::post("/webhook")
            .header(HEADER_NONCE, nonce)
            .header(HEADER_TIMESTAMP, timestamp.to_string())
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_webhook_accepts_then_rejects_replay() {
        let state = AppState::new(Settings::default());
        let app = create_app(state.clone());
        let now = Utc::now().timestamp();

        let response = app
            .clone()
            .oneshot(webhook("n-1", now, r#"{"event":"order.created"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = json_body(response).await;
        assert_eq!(body["nonce"], "n-1");
        assert_eq!(body["payload"]["event"], "order.created");

        let replay = app
            .oneshot(webhook("n-1", now, r#"{"event":"order.created"}"#))
            .await
            .unwrap();
        assert_eq!(replay.status(), StatusCode::CONFLICT);
        assert_eq!(state.replay.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_duplicate_deliveries_accept_once() {
        let state = AppState::new(Settings::default());
        let app = create_app(state.clone());
        let now = Utc::now().timestamp();

        let deliveries: Vec<_> = (0..8)
            .map(|_| {
                let app = app.clone();
                tokio::spawn(async move {
                    app.oneshot(webhook("dup", now, "{}"))
                        .await
                        .unwrap()
                        .status()
                })
            })
            .collect();

        let mut statuses = Vec::new();
        for delivery in deliveries {
            statuses.push(delivery.await.unwrap());
        }
        assert_eq!(
            statuses.iter().filter(|s| **s == StatusCode::ACCEPTED).count(),
            1
        );
        assert!(
            statuses
                .iter()
                .all(|s| *s == StatusCode::ACCEPTED || *s == StatusCode::CONFLICT)
        );
    }

    #[tokio::test]
    async fn test_webhook_accepts_millisecond_timestamps() {
        let app = create_app(AppState::new(Settings::default()));
        let response = app
            .oneshot(webhook("n-ms", Utc::now().timestamp_millis(), "{}"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_webhook_rejects_stale_timestamp() {
        let state = AppState::new(Settings::default());
        let app = create_app(state.clone());
        let stale = Utc::now().timestamp() - 3600;

        let response = app.oneshot(webhook("n-2", stale, "{}")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(state.replay.is_empty());
    }

    #[tokio::test]
    async fn test_webhook_requires_headers() {
        let app = create_app(AppState::new(Settings::default()));

        let response = app
            .clone()
            .oneshot(Request::post("/webhook").body(Body::from("{}")).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(
            json_body(response).await["error"]
                .as_str()
                .unwrap()
                .contains(HEADER_NONCE)
        );

        let response = app
            .oneshot(
                Request::post("/webhook")
                    .header(HEADER_NONCE, "n-3")
                    .header(HEADER_TIMESTAMP, "soon")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_webhook_rejects_invalid_json_without_storing() {
        let state = AppState::new(Settings::default());
        let app = create_app(state.clone());
        let response = app
            .oneshot(webhook("n-4", Utc::now().timestamp(), "{not json"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(state.replay.is_empty());
    }

    #[tokio::test]
    async fn test_webhook_full_store_is_unavailable() {
        let mut settings = Settings::default();
        settings.replay.max_entries = 1;
        let app = create_app(AppState::new(settings));
        let now = Utc::now().timestamp();

        let first = app.clone().oneshot(webhook("a", now, "{}")).await.unwrap();
        assert_eq!(first.status(), StatusCode::ACCEPTED);

        let second = app.oneshot(webhook("b", now, "{}")).await.unwrap();
        assert_eq!(second.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_webhook_stores_signature() {
        let state = AppState::new(Settings::default());
        let app = create_app(state.clone());
        let request = Request::post("/webhook")
            .header(HEADER_NONCE, "n-5")
            .header(HEADER_TIMESTAMP, Utc::now().timestamp().to_string())
            .header(HEADER_SIGNATURE, "sha256=abc")
            .body(Body::from("{}"))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(
            state.replay.get("n-5").unwrap().signature.as_deref(),
            Some("sha256=abc")
        );
    }

    #[tokio::test]
    async fn test_ping_reports_version() {
        let app = create_app(AppState::new(Settings::default()));
        let response = app
            .oneshot(Request::get("/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_health_reports_pool_stats() {
        let app = create_app(AppState::new(Settings::default()));
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["healthy"], true);
        assert_eq!(body["pool"]["max_sockets"], 50);
        assert_eq!(body["stored_nonces"], 0);
    }
}
