use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use events_common::event::{BatchResult, RawEvent};
use tracing::debug;

use super::AppState;
use crate::api::ApiError;

/// `POST /events/batch`: validate, reconcile and store a batch of machine events.
pub async fn post_batch(
    State(state): State<AppState>,
    payload: Result<Json<Vec<RawEvent>>, JsonRejection>,
) -> Result<Json<BatchResult>, ApiError> {
    let Json(events) = payload?;
    debug!("received batch of {} events", events.len());

    let summary = state.processor.process(events).await?;

    Ok(Json(summary))
}

#[cfg(test)]
mod tests {
    use crate::handlers::app::tests::{app, body_json, post_json, test_store, NOW};
    use assert_json_diff::assert_json_eq;
    use axum::http::StatusCode;
    use serde_json::json;
    use tower::ServiceExt; // for `oneshot`

    fn event(
        event_id: &str,
        duration_ms: i64,
        defect_count: i32,
        event_time: &str,
    ) -> serde_json::Value {
        json!({
            "eventId": event_id,
            "machineId": "M1",
            "eventTime": event_time,
            "durationMs": duration_ms,
            "defectCount": defect_count,
        })
    }

    #[tokio::test]
    async fn accept_dedupe_update_reject() {
        let store = test_store();
        let app = app(store.clone());
        let event_time = "2026-01-01T11:50:00.123Z";

        let response = app
            .clone()
            .oneshot(post_json(json!([event("TEST-001", 5000, 2, event_time)])))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_json_eq!(
            body_json(response).await,
            json!({"accepted": 1, "deduped": 0, "updated": 0, "rejected": 0, "rejections": []})
        );

        let response = app
            .clone()
            .oneshot(post_json(json!([event("TEST-001", 5000, 2, event_time)])))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["deduped"], 1);

        let response = app
            .clone()
            .oneshot(post_json(json!([event("TEST-001", 6000, 5, event_time)])))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["updated"], 1);
        assert_eq!(store.get("TEST-001").unwrap().duration_ms, 6000);

        let response = app
            .clone()
            .oneshot(post_json(json!([
                event("ERR-1", 30_000_000, 0, event_time),
                event("ERR-2", 1000, 0, "2026-01-01T12:20:00Z"),
            ])))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_json_eq!(
            body_json(response).await,
            json!({
                "accepted": 0,
                "deduped": 0,
                "updated": 0,
                "rejected": 2,
                "rejections": [
                    {"eventId": "ERR-1", "reason": "INVALID_DURATION"},
                    {"eventId": "ERR-2", "reason": "FUTURE_EVENT_TIME"},
                ]
            })
        );
    }

    #[tokio::test]
    async fn server_side_fields_are_ignored() {
        let store = test_store();
        let app = app(store.clone());

        let mut payload = event("E-1", 100, 0, "2026-01-01T11:00:00Z");
        payload["factoryId"] = json!("F99");
        payload["lineId"] = json!("LINE-99");
        payload["receivedTime"] = json!("1999-01-01T00:00:00Z");

        let response = app.oneshot(post_json(json!([payload]))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let stored = store.get("E-1").unwrap();
        assert_eq!(stored.factory_id, "F01");
        assert_eq!(stored.line_id, "LINE-02");
        assert_eq!(
            stored.received_time,
            NOW.parse::<chrono::DateTime<chrono::Utc>>().unwrap()
        );
    }

    #[tokio::test]
    async fn malformed_body_is_bad_request() {
        let store = test_store();
        let app = app(store.clone());

        for body in [
            json!("not a batch"),
            json!([{"eventId": "E-1"}]),
            json!([{"eventId": "E-1", "machineId": "M1", "eventTime": "yesterday", "durationMs": 1, "defectCount": 0}]),
        ] {
            let response = app.clone().oneshot(post_json(body)).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            assert!(body_json(response).await["error"].is_string());
        }
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn empty_batch_is_ok() {
        let response = app(test_store()).oneshot(post_json(json!([]))).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["accepted"], 0);
    }

    #[tokio::test]
    async fn store_outage_is_service_unavailable() {
        let store = test_store();
        store.set_unavailable(true);

        let response = app(store.clone())
            .oneshot(post_json(json!([event("E-1", 100, 0, "2026-01-01T11:00:00Z")])))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        store.set_unavailable(false);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn body_too_large() {
        let events: Vec<_> = (0..20_000)
            .map(|i| event(&format!("E-{}", i), 100, 0, "2026-01-01T11:00:00Z"))
            .collect();

        let response = app(test_store())
            .oneshot(post_json(json!(events)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
