//! HTTP surface for the camera and the servo
//!
//! - `POST /upload` multipart `photo` field, answers `{message}` or `{error}`
//! - `POST /open-servo`, `POST /close-servo` answer `{status}` or `{error}`
//! - `GET /health`

use axum::body::Bytes;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

use crate::actuator::{ActuatorClient, ActuatorCommand};
use crate::error::Error;
use crate::pipeline::Pipeline;
use crate::telegram::TelegramClient;

/// Multipart field carrying the photo
pub const PHOTO_FIELD: &str = "photo";
pub const PHOTO_CAPTION: &str = "📷 Gambar diterima dari ESP32-CAM";

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Pipeline,
    pub actuator: Arc<ActuatorClient>,
    /// Upload notifications go here; `None` disables them
    pub notifier: Option<Arc<TelegramClient>>,
    pub pipeline_timeout: Duration,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub module: String,
    pub version: String,
}

/// Error answered as `{"error": message}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let status = match error {
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, error.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let max_upload_bytes = state.max_upload_bytes;

    Router::new()
        .route("/upload", post(upload))
        .route("/open-servo", post(open_servo))
        .route("/close-servo", post(close_servo))
        .route("/health", get(health_check))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// POST /upload
pub async fn upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let mut multipart =
        multipart.map_err(|rejection| ApiError::new(rejection.status(), rejection.body_text()))?;
    let photo = read_photo(&mut multipart).await?;
    tracing::info!(bytes = photo.len(), "Photo received");

    let report = tokio::time::timeout(state.pipeline_timeout, state.pipeline.process(photo.clone()))
        .await
        .map_err(|_| Error::PipelineTimeout(state.pipeline_timeout))?
        .map_err(|e| {
            tracing::error!("Pipeline failed: {}", e);
            e
        })?;

    tracing::info!(
        identifiers = report.identifiers().len(),
        degraded = report.is_degraded(),
        "Photo processed"
    );

    if let Some(notifier) = state.notifier.clone() {
        let summary = report.summary().to_string();
        tokio::spawn(notify_upload(notifier, photo, summary));
    }

    Ok(Json(MessageResponse {
        message: report.summary().to_string(),
    }))
}

async fn read_photo(multipart: &mut Multipart) -> Result<Bytes, ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() == Some(PHOTO_FIELD) {
            return field.bytes().await.map_err(multipart_error);
        }
    }
    Err(Error::BadRequest(format!("missing multipart field '{}'", PHOTO_FIELD)).into())
}

fn multipart_error(error: MultipartError) -> ApiError {
    let status = match error.status() {
        StatusCode::PAYLOAD_TOO_LARGE => StatusCode::PAYLOAD_TOO_LARGE,
        _ => StatusCode::BAD_REQUEST,
    };
    ApiError::new(status, error.body_text())
}

/// Forward the photo and summary to the chat; failures are only logged
async fn notify_upload(notifier: Arc<TelegramClient>, photo: Bytes, summary: String) {
    let chat_id = notifier.chat_id().to_string();

    if let Err(e) = notifier.send_photo(&chat_id, photo.to_vec(), PHOTO_CAPTION).await {
        tracing::warn!("Failed to forward photo: {}", e);
    }
    match notifier.send_message(&chat_id, &summary).await {
        Ok(_) => tracing::debug!("Summary sent to Telegram"),
        Err(e) => tracing::warn!("Failed to send summary: {}", e),
    }
}

/// POST /open-servo
pub async fn open_servo(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    actuate(&state, ActuatorCommand::Open).await
}

/// POST /close-servo
pub async fn close_servo(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    actuate(&state, ActuatorCommand::Close).await
}

async fn actuate(state: &AppState, command: ActuatorCommand) -> Result<Json<StatusResponse>, ApiError> {
    match state.actuator.send(command).await {
        Ok(status) => Ok(Json(StatusResponse { status })),
        Err(e) => {
            tracing::warn!("Actuator {} failed: {}", command, e);
            Err(e.into())
        }
    }
}

/// GET /health
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        module: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
