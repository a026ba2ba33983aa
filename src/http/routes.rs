//! HTTP route definitions

use axum::{
    extract::{Path, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::app::AppState;
use crate::game::snapshot::RoomSnapshot;
use crate::lobby::registry::ParticipantStats;
use crate::lobby::{JoinError, JoinRequest, RoomInfo};
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let cors = match &state.config.client_origin {
        // Support multiple origins (comma-separated in CLIENT_ORIGIN)
        Some(origins) => {
            let allowed_origins: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|s| s.trim().parse::<HeaderValue>().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(allowed_origins)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE])
                .allow_credentials(true)
        }
        None => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE]),
    };

    Router::new()
        .route("/health", get(health_handler))
        .route("/register", post(register_handler))
        .route("/leave", post(leave_handler))
        .route("/rooms", get(rooms_handler))
        .route("/rooms/:room_id", get(room_handler))
        .route("/rooms/:room_id/snapshot", get(snapshot_handler))
        .route("/rooms/:room_id/speed", post(speed_handler))
        .route("/participants/:participant_id/stats", get(stats_handler))
        .route("/ws", get(ws_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    configured_rooms: usize,
    active_rooms: usize,
    active_participants: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        configured_rooms: state.registry.all_rooms().len(),
        active_rooms: state.registry.active_rooms(),
        active_participants: state.registry.total_participants(),
    })
}

// ============================================================================
// Registration endpoints
// ============================================================================

#[derive(Serialize)]
struct RegisterResponse {
    success: bool,
    message: String,
    /// Zero signals failure
    combatant_id: u32,
    /// Machine-readable failure reason
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    room: Option<RoomInfo>,
}

async fn register_handler(
    State(state): State<AppState>,
    Json(req): Json<JoinRequest>,
) -> Result<Json<RegisterResponse>, JoinError> {
    let participant_id = req.participant_id.clone();
    let room_id = req.room_id.clone();

    let accepted = state.registry.join(req).map_err(|e| {
        warn!(participant_id = %participant_id, room_id = %room_id, error = %e, "Registration rejected");
        e
    })?;

    Ok(Json(RegisterResponse {
        success: true,
        message: format!("Joined room '{}'", accepted.room.room_id),
        combatant_id: accepted.combatant_id,
        code: None,
        room: Some(accepted.room),
    }))
}

#[derive(Deserialize)]
struct LeaveRequest {
    participant_id: String,
}

#[derive(Serialize)]
struct LeaveResponse {
    left: bool,
}

async fn leave_handler(State(state): State<AppState>, Json(req): Json<LeaveRequest>) -> Json<LeaveResponse> {
    Json(LeaveResponse {
        left: state.registry.leave(&req.participant_id),
    })
}

// ============================================================================
// Room endpoints
// ============================================================================

async fn rooms_handler(State(state): State<AppState>) -> Json<Vec<RoomInfo>> {
    Json(state.registry.all_rooms())
}

async fn room_handler(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<RoomInfo>, AppError> {
    state
        .registry
        .room_info(&room_id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Room '{}' not found", room_id)))
}

async fn snapshot_handler(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<RoomSnapshot>, AppError> {
    state
        .registry
        .snapshot(&room_id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Room '{}' is not running", room_id)))
}

#[derive(Deserialize)]
struct SpeedRequest {
    multiplier: f32,
}

#[derive(Serialize)]
struct SpeedResponse {
    room_id: String,
    speed_multiplier: f32,
}

async fn speed_handler(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Json(req): Json<SpeedRequest>,
) -> Result<Json<SpeedResponse>, AppError> {
    if !req.multiplier.is_finite() || req.multiplier <= 0.0 {
        return Err(AppError::BadRequest("multiplier must be a positive number".to_string()));
    }

    let applied = state
        .registry
        .set_speed(&room_id, req.multiplier)
        .ok_or_else(|| AppError::NotFound(format!("Room '{}' is not running", room_id)))?;

    Ok(Json(SpeedResponse {
        room_id,
        speed_multiplier: applied,
    }))
}

// ============================================================================
// Participant endpoints
// ============================================================================

async fn stats_handler(
    State(state): State<AppState>,
    Path(participant_id): Path<String>,
) -> Result<Json<ParticipantStats>, AppError> {
    state
        .registry
        .participant_stats(&participant_id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Participant '{}' is not registered", participant_id)))
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}

impl IntoResponse for JoinError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            JoinError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            JoinError::DuplicateParticipant { .. } => StatusCode::CONFLICT,
            JoinError::RoomNotFound { .. } => StatusCode::NOT_FOUND,
            JoinError::BadPassword { .. } => StatusCode::FORBIDDEN,
            JoinError::RoomFull { .. } => StatusCode::CONFLICT,
        };

        if status == StatusCode::BAD_REQUEST {
            info!(error = %self, "Malformed registration");
        }

        let body = RegisterResponse {
            success: false,
            message: self.to_string(),
            combatant_id: 0,
            code: Some(self.code()),
            room: None,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::config::rooms::RoomsConfig;
    use crate::config::Config;

    const ROOMS: &str = r#"{
        "arena1": {"password": "secret", "max_participants": 2},
        "open": {"password": "", "max_participants": 8}
    }"#;

    fn app() -> (Router, AppState) {
        let config = Config {
            server_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "debug".to_string(),
            rooms_config_path: "rooms.json".to_string(),
            client_origin: None,
        };
        let state = AppState::new(config, RoomsConfig::from_json(ROOMS).unwrap());
        (build_router(state.clone()), state)
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
            .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    fn register_body(participant_id: &str, room_id: &str, password: &str) -> Value {
        json!({
            "participant_id": participant_id,
            "display_name": "Bot",
            "room_id": room_id,
            "room_password": password,
        })
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = app();
        let (status, body) = send(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["configured_rooms"], 2);
    }

    #[tokio::test]
    async fn test_register_status_codes() {
        let (app, state) = app();

        let (status, body) = send(&app, Method::POST, "/register", Some(register_body("p1", "arena1", "secret"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_ne!(body["combatant_id"], 0);
        assert_eq!(body["room"]["participants"], 1);

        let (status, body) = send(&app, Method::POST, "/register", Some(register_body("p2", "arena1", "wrong"))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["success"], false);
        assert_eq!(body["combatant_id"], 0);
        assert_eq!(body["code"], "bad_password");

        let (status, body) = send(&app, Method::POST, "/register", Some(register_body("p3", "nope", "x"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["message"].as_str().unwrap().contains("not found"));
        assert_eq!(body["code"], "room_not_found");

        let (status, body) = send(&app, Method::POST, "/register", Some(register_body("p1", "open", ""))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "duplicate_participant");

        let (status, _) = send(&app, Method::POST, "/register", Some(register_body("", "open", ""))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        state.registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_leave_endpoint() {
        let (app, state) = app();
        send(&app, Method::POST, "/register", Some(register_body("p1", "open", ""))).await;

        let (_, body) = send(&app, Method::POST, "/leave", Some(json!({"participant_id": "p1"}))).await;
        assert_eq!(body["left"], true);
        let (_, body) = send(&app, Method::POST, "/leave", Some(json!({"participant_id": "p1"}))).await;
        assert_eq!(body["left"], false);

        state.registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_room_listing_and_snapshot() {
        let (app, state) = app();

        let (status, body) = send(&app, Method::GET, "/rooms", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 2);

        let (status, _) = send(&app, Method::GET, "/rooms/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, Method::GET, "/rooms/open/snapshot", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        send(&app, Method::POST, "/register", Some(register_body("p1", "open", ""))).await;
        let (status, body) = send(&app, Method::GET, "/rooms/open/snapshot", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["combatants"].as_array().unwrap().len(), 1);

        let (status, body) = send(&app, Method::GET, "/rooms/open", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["materialized"], true);

        state.registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_speed_and_stats() {
        let (app, state) = app();
        send(&app, Method::POST, "/register", Some(register_body("p1", "open", ""))).await;

        let (status, body) = send(&app, Method::POST, "/rooms/open/speed", Some(json!({"multiplier": 2.0}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["speed_multiplier"], 2.0);

        let (status, _) = send(&app, Method::POST, "/rooms/open/speed", Some(json!({"multiplier": -1.0}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, Method::POST, "/rooms/arena1/speed", Some(json!({"multiplier": 2.0}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(&app, Method::GET, "/participants/p1/stats", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["kills"], 0);
        assert_eq!(body["room_id"], "open");

        let (status, _) = send(&app, Method::GET, "/participants/ghost/stats", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        state.registry.shutdown().await;
    }
}
