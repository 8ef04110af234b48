use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::db::CalibrationStore;
use crate::error::SubmissionError;
use crate::models::summary::DisplayPayload;
use crate::processor::upload_processor::{self, ComparisonOutcome, ComparisonRequest};
use crate::session::SessionRegistry;
use crate::track::GpxSummarizer;

#[derive(Clone)]
pub struct AppState {
    pub registry: SessionRegistry,
    pub store: CalibrationStore,
    pub provider: GpxSummarizer,
}

pub fn router(state: AppState, config: &AppConfig) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/uploads", post(upload))
        .route("/uploads/{id}/comparison", post(comparison))
        .route("/uploads/{id}/export", get(export))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Serialize)]
struct UploadResponse {
    submission_id: Uuid,
    summary: DisplayPayload,
}

async fn upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, SubmissionError> {
    let mut file: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| SubmissionError::BadRequest(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| SubmissionError::BadRequest("file field has no filename".to_string()))?;
        let bytes = field
            .bytes()
            .await
            .map_err(|e| SubmissionError::BadRequest(e.to_string()))?;
        file = Some((filename, bytes.to_vec()));
    }

    let (filename, bytes) =
        file.ok_or_else(|| SubmissionError::BadRequest("missing file field".to_string()))?;

    let (submission_id, summary) =
        upload_processor::handle_upload(&state.registry, &state.provider, &bytes, &filename)
            .await?;

    Ok(Json(UploadResponse {
        submission_id,
        summary,
    }))
}

async fn comparison(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<ComparisonRequest>,
) -> Result<Json<ComparisonOutcome>, SubmissionError> {
    let outcome =
        upload_processor::compare_and_record(&state.registry, &state.store, id, &request).await?;
    Ok(Json(outcome))
}

async fn export(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, SubmissionError> {
    let (filename, bytes) =
        upload_processor::export_csv(&state.registry, &state.provider, id).await?;

    let headers = [
        (header::CONTENT_TYPE, "text/csv".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename),
        ),
    ];
    Ok((headers, bytes))
}
