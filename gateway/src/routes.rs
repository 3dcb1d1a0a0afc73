//! Mount API Routes
//!
//! REST commands and status under `/api/v1`, plus the WebSocket stream.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use celestial_mechanics::{Body, CelestialPosition};
use chrono::{DateTime, Utc};
use mount_control::events::{BroadcastSink, MemorySink};
use mount_control::{
    AxisKind, Command, CommandOutcome, LogEvent, MountError, MountHandle, PointingContext, Target,
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;

use crate::stream;

const DEFAULT_EVENT_LIMIT: usize = 100;

#[derive(Clone)]
pub struct AppState {
    pub mount: MountHandle,
    pub recent: Arc<MemorySink>,
    pub live: Arc<BroadcastSink>,
}

// ============================================================================
// Errors
// ============================================================================

/// `MountError` rendered as status + `{ "error": reason }`
pub struct ApiError(MountError);

impl From<MountError> for ApiError {
    fn from(e: MountError) -> Self {
        ApiError(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            MountError::InvalidAngle(_)
            | MountError::InvalidLocation { .. }
            | MountError::InvalidCommand(_)
            | MountError::Config(_) => StatusCode::BAD_REQUEST,
            MountError::SafetyInterlock | MountError::Faulted => StatusCode::CONFLICT,
            MountError::ActuatorFault { .. } | MountError::CalculationDomain(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            MountError::RuntimeClosed | MountError::Busy => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{}", self.0);
        }
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ============================================================================
// Request Types
// ============================================================================

#[derive(Deserialize)]
pub struct AngleRequest {
    pub angle: f64,
}

#[derive(Deserialize)]
pub struct SpeedRequest {
    pub speed: f64,
}

#[derive(Deserialize)]
pub struct SafetyRequest {
    pub confirmed: bool,
}

#[derive(Deserialize)]
pub struct ObserverRequest {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Deserialize)]
pub struct CelestialQuery {
    /// RFC 3339 instant; defaults to now
    pub at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
pub struct EventsQuery {
    pub limit: Option<usize>,
}

// ============================================================================
// Route Handlers
// ============================================================================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "mount-gateway",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// GET /status - Pointing snapshot
async fn status(State(state): State<AppState>) -> Json<PointingContext> {
    Json(state.mount.snapshot())
}

async fn run(state: &AppState, command: Command) -> ApiResult<CommandOutcome> {
    Ok(Json(state.mount.execute(command).await?))
}

/// POST /axes/:axis/target - Manual angle for one axis
async fn set_axis_target(
    State(state): State<AppState>,
    Path(axis): Path<String>,
    Json(req): Json<AngleRequest>,
) -> ApiResult<CommandOutcome> {
    let axis = axis.parse::<AxisKind>()?;
    run(&state, Command::SetTarget { axis, angle: req.angle }).await
}

/// POST /axes/:axis/speed - Degrees per axis tick, clamped to limits
async fn set_axis_speed(
    State(state): State<AppState>,
    Path(axis): Path<String>,
    Json(req): Json<SpeedRequest>,
) -> ApiResult<CommandOutcome> {
    let axis = axis.parse::<AxisKind>()?;
    run(&state, Command::SetSpeed { axis, speed: req.speed }).await
}

/// POST /slew - One-shot slew to sun, moon or a manual alt/az
async fn slew(State(state): State<AppState>, Json(target): Json<Target>) -> ApiResult<CommandOutcome> {
    run(&state, Command::SlewTo { target }).await
}

/// POST /tracking/start - Continuous tracking of the Sun or Moon
async fn start_tracking(
    State(state): State<AppState>,
    Json(target): Json<Target>,
) -> ApiResult<CommandOutcome> {
    run(&state, Command::StartTracking { target }).await
}

async fn stop_tracking(State(state): State<AppState>) -> ApiResult<CommandOutcome> {
    run(&state, Command::StopTracking).await
}

/// POST /safety - Confirm or revoke the solar filter
async fn confirm_safety(
    State(state): State<AppState>,
    Json(req): Json<SafetyRequest>,
) -> ApiResult<CommandOutcome> {
    run(&state, Command::ConfirmSafety { confirmed: req.confirmed }).await
}

/// POST /emergency-stop - Bypasses the command queue
async fn emergency_stop(State(state): State<AppState>) -> Json<CommandOutcome> {
    Json(CommandOutcome::Mode {
        mode: state.mount.emergency_stop(),
    })
}

async fn reset(State(state): State<AppState>) -> ApiResult<CommandOutcome> {
    run(&state, Command::Reset).await
}

/// PUT /observer - New observer location for subsequent calculations
async fn set_observer(
    State(state): State<AppState>,
    Json(req): Json<ObserverRequest>,
) -> ApiResult<CommandOutcome> {
    run(
        &state,
        Command::SetObserver {
            latitude: req.latitude,
            longitude: req.longitude,
        },
    )
    .await
}

/// GET /celestial/:body - Position for the current observer
async fn celestial(
    State(state): State<AppState>,
    Path(body): Path<String>,
    Query(query): Query<CelestialQuery>,
) -> ApiResult<CelestialPosition> {
    let body = body.parse::<Body>().map_err(MountError::from)?;
    let at = query.at.unwrap_or_else(Utc::now);
    let calculator = state.mount.coordinator().calculator();
    let position = calculator.position(body, at).map_err(MountError::from)?;
    Ok(Json(position))
}

/// GET /events - Most recent LogEvents, oldest first
async fn events(State(state): State<AppState>, Query(query): Query<EventsQuery>) -> Json<Vec<LogEvent>> {
    let limit = query.limit.unwrap_or(DEFAULT_EVENT_LIMIT);
    Json(state.recent.recent(limit))
}

// ============================================================================
// Router
// ============================================================================

pub fn mount_routes(state: AppState) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/axes/:axis/target", post(set_axis_target))
        .route("/axes/:axis/speed", post(set_axis_speed))
        .route("/slew", post(slew))
        .route("/tracking/start", post(start_tracking))
        .route("/tracking/stop", post(stop_tracking))
        .route("/safety", post(confirm_safety))
        .route("/emergency-stop", post(emergency_stop))
        .route("/reset", post(reset))
        .route("/observer", put(set_observer))
        .route("/celestial/:body", get(celestial))
        .route("/events", get(events))
        .route("/stream", get(stream::stream))
        .with_state(state)
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", mount_routes(state))
        .layer(CorsLayer::permissive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body as HttpBody};
    use axum::http::{Method, Request};
    use mount_control::events::FanoutSink;
    use mount_control::{Mount, MountConfig};
    use serde_json::Value;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        let config = MountConfig::default();
        let recent = Arc::new(MemorySink::new(config.events.recent_capacity));
        let live = Arc::new(BroadcastSink::new(config.events.channel_capacity));
        let sink = FanoutSink::new().with(recent.clone()).with(live.clone());
        let mount = Mount::simulated(config, Arc::new(sink)).unwrap().spawn();
        AppState { mount, recent, live }
    }

    async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => request
                .header("content-type", "application/json")
                .body(HttpBody::from(json.to_string()))
                .unwrap(),
            None => request.body(HttpBody::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let app = app(test_state());
        let (status, body) = call(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["service"], "mount-gateway");
    }

    #[tokio::test]
    async fn test_status_starts_idle() {
        let app = app(test_state());
        let (status, body) = call(&app, Method::GET, "/api/v1/status", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["mode"], "idle");
        assert_eq!(body["safety_confirmed"], false);
    }

    #[tokio::test]
    async fn test_sun_tracking_requires_safety() {
        let state = test_state();
        let app = app(state.clone());

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/v1/tracking/start",
            Some(serde_json::json!({ "kind": "sun" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("Safety interlock"));

        let (status, _) = call(
            &app,
            Method::POST,
            "/api/v1/safety",
            Some(serde_json::json!({ "confirmed": true })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, events) = call(&app, Method::GET, "/api/v1/events?limit=10", None).await;
        let kinds: Vec<_> = events
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["kind"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(kinds, vec!["command_rejected", "safety_confirmed"]);

        state.mount.shutdown().await;
    }

    #[tokio::test]
    async fn test_bad_requests() {
        let app = app(test_state());

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/v1/axes/roll/target",
            Some(serde_json::json!({ "angle": 10.0 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("roll"));

        let (status, _) = call(
            &app,
            Method::PUT,
            "/api/v1/observer",
            Some(serde_json::json!({ "latitude": 95.0, "longitude": 0.0 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(&app, Method::GET, "/api/v1/celestial/mars", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_axis_target_and_observer() {
        let app = app(test_state());

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/v1/axes/az/target",
            Some(serde_json::json!({ "angle": 370.0 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"], "angle");
        assert_eq!(body["axis"], "azimuth");
        assert!((body["value"].as_f64().unwrap() - 10.0).abs() < 1e-9);

        let (status, body) = call(
            &app,
            Method::PUT,
            "/api/v1/observer",
            Some(serde_json::json!({ "latitude": 51.4779, "longitude": 0.0 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["observer"]["latitude"], 51.4779);
    }

    #[tokio::test]
    async fn test_celestial_moon_phase() {
        let app = app(test_state());
        let (status, body) = call(
            &app,
            Method::GET,
            "/api/v1/celestial/moon?at=2024-04-23T23:49:00Z",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["body"], "moon");
        assert_eq!(body["moon"]["phase"], "full_moon");
    }

    #[tokio::test]
    async fn test_emergency_stop_from_idle() {
        let app = app(test_state());
        let (status, body) = call(&app, Method::POST, "/api/v1/emergency-stop", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["mode"], "stopped");
    }
}
