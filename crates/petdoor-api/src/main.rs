//! Pet Door Assistant - service invocation API server

use axum::{
    extract::{Path, State, WebSocketUpgrade},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use petdoor_core::{register_services, DoorHub};
use petdoor_services::{ServiceCall, ServiceError, ServiceHost, ServiceRegistry, ValidationError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod websocket;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<DoorHub>,
    pub host: Arc<ServiceHost>,
}

/// API response wrapper using serde_json::Value for flexibility
#[derive(Serialize)]
struct ApiResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ApiResponse {
    fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: Some(serde_json::to_value(data).unwrap_or(serde_json::Value::Null)),
            error: None,
        }
    }

    fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

/// System info response
#[derive(Serialize)]
struct SystemInfo {
    name: String,
    version: String,
    domain: String,
    door_count: usize,
}

/// Get system info
async fn system_info(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(SystemInfo {
        name: "Pet Door Assistant".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        domain: petdoor_services::DOMAIN.to_string(),
        door_count: state.hub.len(),
    }))
}

/// The service registry document
async fn list_services(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(state.host.registry()))
}

/// Invoke a service; the body is the field map
async fn invoke_service(
    State(state): State<AppState>,
    Path(service): Path<String>,
    Json(data): Json<serde_json::Map<String, serde_json::Value>>,
) -> impl IntoResponse {
    let call = ServiceCall::new(service.clone(), data);
    match state.host.call(call).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({
                "service": service,
                "status": "invoked"
            }))),
        ),
        Err(e) => (error_status(&e), Json(ApiResponse::error(e.to_string()))),
    }
}

/// Map dispatch failures onto HTTP statuses
fn error_status(error: &ServiceError) -> StatusCode {
    match error {
        ServiceError::Validation(ValidationError::UnknownService(_)) => StatusCode::NOT_FOUND,
        ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
        // The door is the upstream here
        ServiceError::Handler(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// List all doors
async fn list_doors(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(state.hub.snapshots().await))
}

/// Get a specific door
async fn get_door(
    State(state): State<AppState>,
    Path(entity_id): Path<String>,
) -> impl IntoResponse {
    match state.hub.get(&entity_id) {
        Some(door) => (
            StatusCode::OK,
            Json(ApiResponse::success(door.snapshot().await)),
        ),
        None => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error("Door not found")),
        ),
    }
}

/// Open request body
#[derive(Deserialize, Default)]
struct OpenRequest {
    /// Hold the door open; defaults to the door's configured hold flag
    #[serde(default)]
    hold: Option<bool>,
}

/// Open a door
async fn open_door(
    State(state): State<AppState>,
    Path(entity_id): Path<String>,
    body: Option<Json<OpenRequest>>,
) -> impl IntoResponse {
    let hold = body.map(|Json(b)| b.hold).unwrap_or_default();
    let door = match state.hub.get(&entity_id) {
        Some(door) => door,
        None => {
            return (
                StatusCode::NOT_FOUND,
                Json(ApiResponse::error("Door not found")),
            )
        }
    };

    match door.open(hold).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({
                "action": "open",
                "entity_id": entity_id
            }))),
        ),
        Err(e) => (
            StatusCode::BAD_GATEWAY,
            Json(ApiResponse::error(e.to_string())),
        ),
    }
}

/// Close a door
async fn close_door(
    State(state): State<AppState>,
    Path(entity_id): Path<String>,
) -> impl IntoResponse {
    let door = match state.hub.get(&entity_id) {
        Some(door) => door,
        None => {
            return (
                StatusCode::NOT_FOUND,
                Json(ApiResponse::error("Door not found")),
            )
        }
    };

    match door.close().await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({
                "action": "close",
                "entity_id": entity_id
            }))),
        ),
        Err(e) => (
            StatusCode::BAD_GATEWAY,
            Json(ApiResponse::error(e.to_string())),
        ),
    }
}

/// WebSocket upgrade handler
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| websocket::handle_socket(socket, state))
}

/// Health check
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "petdoor_api=debug,petdoor_protocol=debug,info".into()),
        )
        .init();

    tracing::info!("Starting Pet Door Assistant API server");

    // Load door configs
    let config_path =
        std::env::var("PETDOOR_CONFIG").unwrap_or_else(|_| "./doors.json".to_string());
    let doors = petdoor_core::config::load_doors(std::path::Path::new(&config_path)).await;
    if doors.is_empty() {
        tracing::warn!("No doors configured in {}; starting with an empty hub", config_path);
    }

    let hub = Arc::new(DoorHub::new());
    for config in doors {
        hub.add_door(config);
    }

    // Host side: registry plus the integration's handlers
    let host = Arc::new(ServiceHost::new(ServiceRegistry::canonical()));
    register_services(&host, hub.clone())?;

    let state = AppState { hub, host };

    // Build the router
    let app = Router::new()
        // API routes
        .route("/health", get(health))
        .route("/api/v1/system/info", get(system_info))
        .route("/api/v1/services", get(list_services))
        .route("/api/v1/services/:service", post(invoke_service))
        .route("/api/v1/doors", get(list_doors))
        .route("/api/v1/doors/:entity_id", get(get_door))
        .route("/api/v1/doors/:entity_id/open", post(open_door))
        .route("/api/v1/doors/:entity_id/close", post(close_door))
        // WebSocket
        .route("/ws", get(ws_handler))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    // Start server
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], 8080));
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
