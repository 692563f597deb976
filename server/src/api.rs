use axum::extract::{State, WebSocketUpgrade};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use common::{Color, Pixel};
use serde::Deserialize;
use tokio::sync::broadcast;

use crate::error::PlaceError;
use crate::journal::Journal;
use crate::map_cache::MapView;
use crate::painter::Painter;
use crate::ws;

#[derive(Clone)]
pub struct AppState {
    pub painter: Painter,
    pub journal: Journal,
    pub broadcast_tx: broadcast::Sender<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/map", get(get_map))
        .route("/api/map/meta", get(get_map_meta))
        .route("/api/pixel", post(place_pixel))
        .route("/api/stroke", post(place_stroke))
        .route("/api/rebuild", post(rebuild))
        .route("/api/health", get(health))
        .route("/ws", get(ws_upgrade))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct PixelRequest {
    x: i32,
    y: i32,
    color: String,
}

impl PixelRequest {
    fn pixel(&self) -> Result<Pixel, ApiError> {
        let color = Color::parse(&self.color).map_err(|e| ApiError::BadRequest(e.to_string()))?;
        Ok(Pixel::new(self.x, self.y, color))
    }
}

#[derive(Debug, Deserialize)]
struct StrokeRequest {
    from: PixelRequest,
    to: PixelRequest,
}

enum ApiError {
    BadRequest(String),
    Place(PlaceError),
}

impl From<PlaceError> for ApiError {
    fn from(e: PlaceError) -> Self {
        Self::Place(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let retryable = matches!(&self, Self::Place(e) if e.is_retryable());
        let (status, code, message) = match self {
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, "bad-request", message),
            Self::Place(PlaceError::Rejected(reason)) => {
                (StatusCode::UNPROCESSABLE_ENTITY, reason.code(), reason.to_string())
            }
            Self::Place(e @ (PlaceError::Store(_) | PlaceError::PainterClosed)) => {
                (StatusCode::SERVICE_UNAVAILABLE, "unavailable", e.to_string())
            }
            Self::Place(e @ PlaceError::Cache(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "cache-failure", e.to_string())
            }
        };
        let body = serde_json::json!({ "error": code, "message": message, "retryable": retryable });
        (status, Json(body)).into_response()
    }
}

fn meta_json(view: &MapView) -> serde_json::Value {
    serde_json::json!({
        "version": view.version,
        "last_update": view.last_update.to_rfc3339(),
        "width": view.torus.width,
        "height": view.torus.height,
        "scale": view.scale,
    })
}

async fn get_map(State(state): State<AppState>) -> impl IntoResponse {
    let view = state.painter.current();
    (
        [
            (header::CONTENT_TYPE, "image/png".to_string()),
            (
                header::HeaderName::from_static("x-map-version"),
                view.version.to_string(),
            ),
            (
                header::HeaderName::from_static("x-last-updated"),
                view.last_update.to_rfc3339(),
            ),
            (
                header::CACHE_CONTROL,
                "no-cache, must-revalidate".to_string(),
            ),
        ],
        view.png.as_ref().clone(),
    )
}

async fn get_map_meta(State(state): State<AppState>) -> impl IntoResponse {
    Json(meta_json(&state.painter.current()))
}

async fn place_pixel(
    State(state): State<AppState>,
    Json(request): Json<PixelRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let view = state.painter.place(request.pixel()?).await?;
    Ok(Json(serde_json::json!({
        "version": view.version,
        "last_update": view.last_update.to_rfc3339(),
        "image": STANDARD.encode(view.png.as_slice()),
    })))
}

async fn place_stroke(
    State(state): State<AppState>,
    Json(request): Json<StrokeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let steps = state
        .painter
        .stroke(request.from.pixel()?, request.to.pixel()?)
        .await?;
    Ok(Json(serde_json::json!({
        "version": state.painter.current().version,
        "steps": steps,
    })))
}

async fn rebuild(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let view = state.painter.rebuild().await?;
    Ok(Json(meta_json(&view)))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": state.painter.current().version,
        "journal_length": state.journal.len().await,
    }))
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws::handle_socket(socket, state))
}
