use std::net::SocketAddr;

use anyhow::Context;
use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Query},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use log::{info, warn};
use serde::Deserialize;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};

use crate::error::IngestError;
use crate::models::ScoredRecord;
use crate::risk::Pipeline;

/// Multipart form field carrying the uploaded table.
const UPLOAD_FIELD: &str = "file";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Default, Deserialize)]
pub struct UploadParams {
    #[serde(default)]
    pub pipeline: Pipeline,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error("invalid multipart body: {0}")]
    Multipart(#[from] MultipartError),

    #[error("multipart body has no `file` field")]
    MissingFile,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Multipart(err) => err.status(),
            ApiError::Ingest(_) | ApiError::MissingFile => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        warn!("rejected upload: {self}");
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (self.status(), body).into_response()
    }
}

pub fn router(max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/upload", post(upload))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(cors)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn upload(
    Query(params): Query<UploadParams>,
    mut multipart: Multipart,
) -> Result<Json<Vec<ScoredRecord>>, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or("upload").to_string();
        let bytes = field.bytes().await?;
        info!(
            "received {} ({} bytes) for the {} policy",
            file_name,
            bytes.len(),
            params.pipeline.as_str()
        );
        let records = params.pipeline.score_upload(&bytes)?;
        return Ok(Json(records));
    }

    Err(ApiError::MissingFile)
}

pub async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    info!("listening on {}", config.bind);

    axum::serve(listener, router(config.max_upload_bytes))
        .await
        .context("server terminated")?;
    Ok(())
}
