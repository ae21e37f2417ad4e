//! HTTP request handlers

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::errors::StagerError;
use crate::filesys::file::File;
use crate::server::state::ServerState;
use crate::staging::async_response::AsyncResponse;
use crate::utils::{ensure_path_safe, version_info};

/// Error body returned by every failing handler
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Handler error
#[derive(Debug)]
pub enum ApiError {
    Stager(StagerError),
    Unauthorized,
}

impl From<StagerError> for ApiError {
    fn from(err: StagerError) -> Self {
        ApiError::Stager(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = match self {
            ApiError::Unauthorized => {
                return (
                    StatusCode::UNAUTHORIZED,
                    [(header::WWW_AUTHENTICATE, "Basic realm=\"staging\"")],
                    Json(ErrorResponse {
                        error: "unauthorized".to_string(),
                    }),
                )
                    .into_response();
            }
            ApiError::Stager(err) => err,
        };

        let status = match &err {
            StagerError::NotFound(_) => StatusCode::NOT_FOUND,
            StagerError::ValidationError(_) => StatusCode::BAD_REQUEST,
            StagerError::StagingError(_) | StagerError::AsyncError(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!("Request failed: {}", err);
        }

        (
            status,
            Json(ErrorResponse {
                error: err.to_string(),
            }),
        )
            .into_response()
    }
}

fn authorize(state: &ServerState, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(ref credentials) = state.staging_credentials else {
        return Ok(());
    };
    let accepted = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| credentials.accepts(value));
    if accepted {
        Ok(())
    } else {
        Err(ApiError::Unauthorized)
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "app-stager".to_string(),
        version: version.version,
    })
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    Json(version_info())
}

/// Result of a synchronous staging
#[derive(Debug, Serialize)]
pub struct StageResponse {
    pub guid: String,
    pub droplet_hash: Option<String>,
}

/// Stage an app and wait for its droplet
pub async fn stage_handler(
    State(state): State<Arc<ServerState>>,
    Path(guid): Path<String>,
) -> Result<Json<StageResponse>, ApiError> {
    let mut app = state.stager.find_app(&guid).await?;
    state.stager.stage(&mut app).await?;

    Ok(Json(StageResponse {
        guid: app.guid,
        droplet_hash: app.droplet_hash,
    }))
}

/// Start a background staging
pub async fn stage_async_handler(
    State(state): State<Arc<ServerState>>,
    Path(guid): Path<String>,
) -> Result<(StatusCode, Json<AsyncResponse>), ApiError> {
    let app = state.stager.find_app(&guid).await?;
    let response = state.stager.stage_async(&app).await?;
    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// Delete an app's droplet
pub async fn delete_droplet_handler(
    State(state): State<Arc<ServerState>>,
    Path(guid): Path<String>,
) -> Result<StatusCode, ApiError> {
    let app = state.stager.find_app(&guid).await?;
    if state.stager.delete_droplet(&app).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(StagerError::NotFound(format!("droplet of app {}", guid)).into())
    }
}

fn octet_stream(contents: Vec<u8>) -> Response {
    (
        [(header::CONTENT_TYPE, "application/octet-stream")],
        contents,
    )
        .into_response()
}

/// App bits download used by staging workers
pub async fn download_bits_handler(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Path(guid): Path<String>,
) -> Result<Response, ApiError> {
    authorize(&state, &headers)?;
    ensure_path_safe(&guid)?;

    let path = state
        .stager
        .artifacts()
        .app_bits_path(&guid)
        .await?
        .ok_or_else(|| StagerError::NotFound(format!("bits of app {}", guid)))?;
    debug!("Serving app bits for {}", guid);

    Ok(octet_stream(File::new(path).read_bytes().await?))
}

/// Droplet upload from a staging worker.
///
/// Only accepted while a staging attempt holds the app's upload handle.
pub async fn upload_droplet_handler(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Path(guid): Path<String>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    authorize(&state, &headers)?;
    ensure_path_safe(&guid)?;

    let path = state
        .stager
        .artifacts()
        .pending_upload_path(&guid)
        .ok_or_else(|| StagerError::NotFound(format!("no staging in progress for app {}", guid)))?;

    File::new(path).write_atomic(&body).await?;
    info!("Received droplet upload for {} ({} bytes)", guid, body.len());

    Ok(StatusCode::CREATED)
}

/// Stored droplet download
pub async fn download_droplet_handler(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Path(guid): Path<String>,
) -> Result<Response, ApiError> {
    authorize(&state, &headers)?;

    let path = state
        .stager
        .artifacts()
        .droplet_path(&guid)
        .await?
        .ok_or_else(|| StagerError::NotFound(format!("droplet of app {}", guid)))?;

    Ok(octet_stream(File::new(path).read_bytes().await?))
}
