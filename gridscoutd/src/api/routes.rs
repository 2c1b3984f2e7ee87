use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use shared::types::{LocalReport, PilotSighting, ScoutStatus};
use crate::grid::{IngestOutcome, LocalSubmitOutcome};
use crate::grid_manager::GridHandle;
use crate::notify::{NotifierHandle, NotifyEvent};
use crate::parser::{self, RawReport, RejectReason};
use crate::standing::{resolve_standing_hint, Standing};

pub const TENANT_HEADER: &str = "x-tenant-id";
/// Identity the fronting proxy already authenticated
pub const REPORTER_HEADER: &str = "x-reporter-id";
pub const SCOUT_NAME_HEADER: &str = "x-scout-name";

const DEFAULT_SIGHTINGS_LIMIT: usize = 50;

#[derive(Clone)]
pub struct AppState {
    pub grid: GridHandle,
    pub notifier: NotifierHandle,
}

#[derive(Deserialize)]
pub struct SightingsQuery {
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct StandingQuery {
    #[serde(default)]
    pub hint: String,
}

#[derive(Deserialize)]
pub struct DeleteQuery {
    pub key: String,
}

/// A pilot the authorization side flagged as a possible spy
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpyReport {
    pub identity: String,
    #[serde(default)]
    pub tenant_ids: Vec<String>,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub reason: String,
}

pub fn router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/v1/report", post(post_report))
        .route("/v1/tenants/:tenant/sightings", get(get_sightings).delete(delete_sighting))
        .route("/v1/tenants/:tenant/sightings/hash", get(get_sightings_hash))
        .route("/v1/tenants/:tenant/scouts", get(get_scouts))
        .route("/v1/tenants/:tenant/locals", get(get_locals).post(post_locals))
        .route("/v1/tenants/:tenant/standing-icons", get(get_standing_icons))
        .route("/v1/standing", get(get_standing))
        .route("/v1/notify/spy", post(post_spy))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}

async fn post_report(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<IngestOutcome>, (StatusCode, String)> {
    let scout_name = header_value(&headers, SCOUT_NAME_HEADER);
    let raw = RawReport {
        tenant_id: header_value(&headers, TENANT_HEADER),
        reporter_identity: header_value(&headers, REPORTER_HEADER),
        reporter_name: Some(scout_name).filter(|name| !name.trim().is_empty()),
        body: body.to_vec(),
    };

    let report = parser::parse(raw).map_err(|reason| {
        tracing::warn!("Rejected report: {}", reason);
        (reject_status(&reason), reason.to_string())
    })?;

    let outcome = state.grid.ingest(report.clone()).await.map_err(|e| {
        tracing::error!("Failed to ingest report from {}: {:#}", report.reporter_identity, e);
        (StatusCode::INTERNAL_SERVER_ERROR, "failed to store report".to_string())
    })?;

    state.notifier.report_ingested(report, outcome.clone());
    Ok(Json(outcome))
}

async fn get_sightings(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    Query(params): Query<SightingsQuery>,
) -> Result<Json<Vec<PilotSighting>>, StatusCode> {
    let limit = params.limit.unwrap_or(DEFAULT_SIGHTINGS_LIMIT);
    state
        .grid
        .list_sightings(tenant, limit)
        .await
        .map(Json)
        .map_err(internal_error)
}

async fn get_sightings_hash(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
) -> Result<String, StatusCode> {
    state.grid.sightings_hash(tenant).await.map_err(internal_error)
}

async fn delete_sighting(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    Query(params): Query<DeleteQuery>,
) -> StatusCode {
    match state.grid.delete_sighting(tenant, params.key).await {
        Ok(true) => StatusCode::NO_CONTENT,
        Ok(false) => StatusCode::NOT_FOUND,
        Err(e) => internal_error(e),
    }
}

async fn get_scouts(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
) -> Result<Json<Vec<ScoutStatus>>, StatusCode> {
    state
        .grid
        .list_live_scouts(tenant)
        .await
        .map(Json)
        .map_err(internal_error)
}

async fn get_locals(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
) -> Result<Json<Vec<LocalReport>>, StatusCode> {
    state
        .grid
        .local_reports(tenant)
        .await
        .map(Json)
        .map_err(internal_error)
}

async fn post_locals(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    headers: HeaderMap,
    Json(report): Json<LocalReport>,
) -> Result<Json<LocalSubmitOutcome>, StatusCode> {
    let outcome = state
        .grid
        .submit_local_report(tenant.clone(), report)
        .await
        .map_err(internal_error)?;
    let submitted = &outcome.report;

    if !outcome.hostile_on_grid.is_empty() {
        state.notifier.emit(NotifyEvent::OnGridThreat {
            tenant_id: tenant.clone(),
            system: submitted.system.clone(),
            scout_name: submitted.scout_name.clone(),
            status: submitted.status.clone(),
            on_grid: outcome.hostile_on_grid.clone(),
        });
    }

    let scout_identity = header_value(&headers, REPORTER_HEADER);
    let undocked = submitted.status.to_lowercase().contains("undocked");
    if undocked && outcome.new_non_friendly_locals > 0 && !scout_identity.is_empty() {
        state.notifier.emit(NotifyEvent::UndockedLocal {
            tenant_id: tenant,
            scout_identity,
            scout_name: submitted.scout_name.clone(),
            system: submitted.system.clone(),
            new_pilot_count: outcome.new_non_friendly_locals,
        });
    }

    Ok(Json(outcome))
}

async fn get_standing_icons(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
) -> Result<Json<Vec<i64>>, StatusCode> {
    state
        .grid
        .standing_icon_ids(tenant)
        .await
        .map(Json)
        .map_err(internal_error)
}

async fn get_standing(Query(params): Query<StandingQuery>) -> Json<Standing> {
    Json(resolve_standing_hint(&params.hint))
}

async fn post_spy(State(state): State<AppState>, Json(spy): Json<SpyReport>) -> StatusCode {
    if spy.identity.trim().is_empty() || spy.tenant_ids.is_empty() {
        return StatusCode::BAD_REQUEST;
    }

    state.notifier.emit(NotifyEvent::SuspectedSpy {
        tenant_ids: spy.tenant_ids,
        identity: spy.identity.trim().to_string(),
        source: spy.source,
        reason: spy.reason,
    });
    StatusCode::ACCEPTED
}

/// All values of a header joined with commas, so a repeated tenant header
/// reads as ambiguous
fn header_value(headers: &HeaderMap, name: &str) -> String {
    headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::trim)
        .collect::<Vec<_>>()
        .join(",")
}

fn reject_status(reason: &RejectReason) -> StatusCode {
    match reason {
        RejectReason::MissingReporter | RejectReason::InvalidReporter(_) => StatusCode::FORBIDDEN,
        _ => StatusCode::BAD_REQUEST,
    }
}

fn internal_error(e: anyhow::Error) -> StatusCode {
    tracing::error!("Grid request failed: {:#}", e);
    StatusCode::INTERNAL_SERVER_ERROR
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tokio::sync::mpsc;
    use tower::ServiceExt;
    use crate::config::StoreConfig;
    use crate::grid::Grid;
    use crate::store::MemoryBlobStore;

    const SCOUT_ID: &str = "123456789012345678";

    fn app(max_body_bytes: usize) -> (Router, mpsc::Receiver<NotifyEvent>) {
        let grid = GridHandle::spawn(Grid::new(MemoryBlobStore::new(), &StoreConfig::default()));
        let (notifier, rx) = NotifierHandle::channel(16);
        (router(AppState { grid, notifier }, max_body_bytes), rx)
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    fn report_request(tenant: &str, reporter: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/v1/report")
            .header(TENANT_HEADER, tenant)
            .header(REPORTER_HEADER, reporter)
            .header(SCOUT_NAME_HEADER, "Scoutie")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_report_is_ingested_and_queued() {
        let (app, mut rx) = app(64 * 1024);

        let (status, body) = send(
            &app,
            report_request("guild-1", SCOUT_ID, "Wormhole C5\nGila [TEST] [NULL] Jane Doe"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let outcome: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(outcome["newSightings"], 1);
        assert_eq!(outcome["onlineScouts"], 1);

        match rx.try_recv() {
            Ok(NotifyEvent::Report { report, outcome }) => {
                assert_eq!(report.tenant_id, "guild-1");
                assert_eq!(outcome.new_sightings, 1);
            }
            other => panic!("expected a report event, got {:?}", other),
        }

        let (status, body) = send(&app, get("/v1/tenants/guild-1/sightings")).await;
        assert_eq!(status, StatusCode::OK);
        let sightings: Vec<PilotSighting> = serde_json::from_slice(&body).unwrap();
        assert_eq!(sightings.len(), 1);
        assert_eq!(sightings[0].key, "Jane Doe/Gila");
        assert_eq!(sightings[0].wormhole_label, "C5");

        let (_, body) = send(&app, get("/v1/tenants/guild-1/scouts")).await;
        let scouts: Vec<ScoutStatus> = serde_json::from_slice(&body).unwrap();
        assert_eq!(scouts[0].name, "Scoutie");
    }

    #[tokio::test]
    async fn test_rejected_reports() {
        let (app, mut rx) = app(64 * 1024);

        let (status, _) = send(&app, report_request("guild-1", "not-an-id", "Nothing Found")).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(&app, report_request("", SCOUT_ID, "Nothing Found")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(&app, report_request("guild-1", SCOUT_ID, "  ")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(String::from_utf8(body).unwrap(), "report body is empty");

        let repeated = Request::builder()
            .method("POST")
            .uri("/v1/report")
            .header(TENANT_HEADER, "guild-1")
            .header(TENANT_HEADER, "guild-2")
            .header(REPORTER_HEADER, SCOUT_ID)
            .body(Body::from("Nothing Found"))
            .unwrap();
        let (status, body) = send(&app, repeated).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(String::from_utf8(body).unwrap(), "report names more than one tenant");

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_oversized_report_is_refused() {
        let (app, _rx) = app(16);
        let (status, _) = send(&app, report_request("guild-1", SCOUT_ID, &"x".repeat(1024))).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_delete_sighting_and_hash() {
        let (app, _rx) = app(64 * 1024);
        send(&app, report_request("guild-1", SCOUT_ID, "Gila [TEST] [NULL] Jane Doe")).await;

        let (_, before) = send(&app, get("/v1/tenants/guild-1/sightings/hash")).await;
        assert_eq!(before.len(), 64);

        let delete = |key: &str| {
            Request::builder()
                .method("DELETE")
                .uri(format!("/v1/tenants/guild-1/sightings?key={}", key))
                .body(Body::empty())
                .unwrap()
        };
        let (status, _) = send(&app, delete("Jane%20Doe%2FGila")).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, delete("Jane%20Doe%2FGila")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, after) = send(&app, get("/v1/tenants/guild-1/sightings/hash")).await;
        assert_ne!(before, after);
    }

    #[tokio::test]
    async fn test_local_report_raises_warnings() {
        let (app, mut rx) = app(64 * 1024);
        let local = serde_json::json!({
            "System": "J123456",
            "ScoutName": "Scoutie",
            "Status": "Undocked",
            "Locals": [
                { "Name": "Jane Doe", "StandingHint": "Pilot has bad standing." },
                { "Name": "Buddy", "StandingHint": "Pilot is in your corporation.", "StandingIconId": 7 }
            ],
            "OnGrid": [
                { "PilotName": "Jane Doe", "ShipType": "Gila", "StandingHint": "Pilot has bad standing." }
            ]
        });
        let request = Request::builder()
            .method("POST")
            .uri("/v1/tenants/guild-1/locals")
            .header("content-type", "application/json")
            .header(REPORTER_HEADER, SCOUT_ID)
            .body(Body::from(local.to_string()))
            .unwrap();

        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        let outcome: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(outcome["newNonFriendlyLocals"], 1);

        assert!(matches!(
            rx.try_recv(),
            Ok(NotifyEvent::OnGridThreat { ref on_grid, .. }) if on_grid.len() == 1
        ));
        assert!(matches!(
            rx.try_recv(),
            Ok(NotifyEvent::UndockedLocal { new_pilot_count: 1, ref scout_identity, .. }) if scout_identity == SCOUT_ID
        ));

        let (_, body) = send(&app, get("/v1/tenants/guild-1/locals")).await;
        let stored: Vec<LocalReport> = serde_json::from_slice(&body).unwrap();
        assert_eq!(stored.len(), 1);

        let (_, body) = send(&app, get("/v1/tenants/guild-1/standing-icons")).await;
        let icons: Vec<i64> = serde_json::from_slice(&body).unwrap();
        assert_eq!(icons, vec![7]);
    }

    #[tokio::test]
    async fn test_standing_lookup() {
        let (app, _rx) = app(64 * 1024);
        let (status, body) = send(&app, get("/v1/standing?hint=Pilot%20has%20Bad%20Standing")).await;
        assert_eq!(status, StatusCode::OK);

        let standing: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(standing["normalizedHint"], "pilot has bad standing");
        assert_eq!(standing["precedence"], 2);
        assert_eq!(standing["color"], "#C14503");
        assert_eq!(standing["isFriendly"], false);
    }

    #[tokio::test]
    async fn test_spy_report_is_queued() {
        let (app, mut rx) = app(64 * 1024);
        let spy = |body: serde_json::Value| {
            Request::builder()
                .method("POST")
                .uri("/v1/notify/spy")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap()
        };

        let (status, _) = send(
            &app,
            spy(serde_json::json!({
                "identity": SCOUT_ID,
                "tenantIds": ["1", "2"],
                "source": "oauth",
                "reason": "Member of a rival guild."
            })),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert!(matches!(rx.try_recv(), Ok(NotifyEvent::SuspectedSpy { ref tenant_ids, .. }) if tenant_ids.len() == 2));

        let (status, _) = send(&app, spy(serde_json::json!({ "identity": " ", "tenantIds": ["1"] }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
