use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use events_common::aggregation::DEFAULT_TOP_LINES_LIMIT;
use events_common::event::{MachineStats, TopDefectLine};
use serde_derive::Deserialize;

use super::AppState;
use crate::api::ApiError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineStatsQuery {
    pub machine_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopDefectLinesQuery {
    pub factory_id: String,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    DEFAULT_TOP_LINES_LIMIT
}

/// `GET /events/stats?machineId=..&start=..&end=..`
pub async fn get_machine_stats(
    State(state): State<AppState>,
    query: Result<Query<MachineStatsQuery>, QueryRejection>,
) -> Result<Json<MachineStats>, ApiError> {
    let Query(query) = query?;

    let stats = state
        .stats
        .machine_stats(&query.machine_id, query.start, query.end)
        .await?;

    Ok(Json(stats))
}

/// `GET /events/stats/top-defect-lines?factoryId=..&from=..&to=..[&limit=..]`
pub async fn get_top_defect_lines(
    State(state): State<AppState>,
    query: Result<Query<TopDefectLinesQuery>, QueryRejection>,
) -> Result<Json<Vec<TopDefectLine>>, ApiError> {
    let Query(query) = query?;

    let lines = state
        .stats
        .top_defect_lines(&query.factory_id, query.from, query.to, query.limit)
        .await?;

    Ok(Json(lines))
}

#[cfg(test)]
mod tests {
    use crate::handlers::app::tests::{app, body_json, get, post_json, test_store};
    use assert_json_diff::assert_json_eq;
    use axum::http::StatusCode;
    use axum::Router;
    use serde_json::json;
    use tower::ServiceExt; // for `oneshot`

    fn event(
        event_id: &str,
        machine_id: &str,
        event_time: &str,
        defects: i32,
    ) -> serde_json::Value {
        json!({
            "eventId": event_id,
            "machineId": machine_id,
            "eventTime": event_time,
            "durationMs": 1000,
            "defectCount": defects,
        })
    }

    async fn seed(app: &Router, events: Vec<serde_json::Value>) {
        let response = app
            .clone()
            .oneshot(post_json(json!(events)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn machine_stats_window() {
        let app = app(test_store());
        seed(
            &app,
            vec![
                event("E-1", "M-001", "2026-01-01T06:00:00Z", 4),
                event("E-2", "M-001", "2026-01-01T07:30:00Z", -1),
                event("E-3", "M-001", "2026-01-01T09:59:59.999Z", 2),
                // end is exclusive
                event("E-4", "M-001", "2026-01-01T10:00:00Z", 50),
                event("E-5", "M-002", "2026-01-01T07:00:00Z", 50),
            ],
        )
        .await;

        let response = app
            .oneshot(get(
                "/events/stats?machineId=M-001&start=2026-01-01T06:00:00Z&end=2026-01-01T10:00:00Z",
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_json_eq!(
            body_json(response).await,
            json!({
                "machineId": "M-001",
                "start": "2026-01-01T06:00:00Z",
                "end": "2026-01-01T10:00:00Z",
                "eventsCount": 3,
                "defectsCount": 6,
                "avgDefectRate": 1.5,
                "status": "Healthy",
            })
        );
    }

    #[tokio::test]
    async fn machine_stats_warning() {
        let app = app(test_store());
        seed(&app, vec![event("E-1", "M-001", "2026-01-01T10:30:00Z", 2)]).await;

        let response = app
            .oneshot(get(
                "/events/stats?machineId=M-001&start=2026-01-01T10:00:00Z&end=2026-01-01T11:00:00Z",
            ))
            .await
            .unwrap();

        let body = body_json(response).await;
        assert_eq!(body["avgDefectRate"], 2.0);
        assert_eq!(body["status"], "Warning");
    }

    #[tokio::test]
    async fn machine_stats_missing_parameter() {
        let response = app(test_store())
            .oneshot(get("/events/stats?machineId=M-001&start=2026-01-01T10:00:00Z"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn top_defect_lines() {
        let app = app(test_store());
        seed(
            &app,
            vec![
                event("E-1", "M-001", "2026-01-01T09:00:00Z", 3),
                event("E-2", "M-005", "2026-01-01T09:10:00Z", 0),
                event("E-3", "M-007", "2026-01-01T09:20:00Z", -1),
                event("E-4", "M-020", "2026-01-01T09:30:00Z", 5),
                event("E-5", "M-021", "2026-01-01T09:40:00Z", 5),
            ],
        )
        .await;

        let response = app
            .clone()
            .oneshot(get(
                "/events/stats/top-defect-lines?factoryId=F01&from=2026-01-01T00:00:00Z&to=2026-01-02T00:00:00Z",
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_json_eq!(
            body_json(response).await,
            json!([
                {"lineId": "LINE-02", "totalDefects": 10, "eventCount": 2, "defectsPercent": 500.0},
                {"lineId": "LINE-01", "totalDefects": 3, "eventCount": 3, "defectsPercent": 100.0},
            ])
        );

        let response = app
            .clone()
            .oneshot(get(
                "/events/stats/top-defect-lines?factoryId=F01&from=2026-01-01T00:00:00Z&to=2026-01-02T00:00:00Z&limit=1",
            ))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["lineId"], "LINE-02");

        let response = app
            .oneshot(get(
                "/events/stats/top-defect-lines?factoryId=F02&from=2026-01-01T00:00:00Z&to=2026-01-02T00:00:00Z",
            ))
            .await
            .unwrap();
        assert_json_eq!(body_json(response).await, json!([]));
    }

    #[tokio::test]
    async fn top_defect_lines_bad_timestamp() {
        let response = app(test_store())
            .oneshot(get(
                "/events/stats/top-defect-lines?factoryId=F01&from=yesterday&to=2026-01-02T00:00:00Z",
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
