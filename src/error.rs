use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum SubmissionError {
    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),
    #[error("failed to decompress upload: {0}")]
    Decompression(#[source] std::io::Error),
    #[error("upload is not valid UTF-8: {0}")]
    Encoding(#[source] std::str::Utf8Error),
    #[error("failed to parse track: {0}")]
    Parse(String),
    #[error("calibration storage failure: {0}")]
    Persistence(#[from] sqlx::Error),
    #[error("unknown submission: {0}")]
    UnknownSubmission(Uuid),
    #[error("invalid upload request: {0}")]
    BadRequest(String),
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for SubmissionError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            SubmissionError::UnsupportedFormat(name) => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                format!("unsupported file format: {}", name),
            ),
            SubmissionError::Decompression(_) | SubmissionError::Encoding(_) => {
                warn!(error = %self, "rejected unreadable upload");
                (StatusCode::BAD_REQUEST, "could not read file".to_string())
            }
            // The underlying parser error is logged, never echoed to the client.
            SubmissionError::Parse(_) => {
                warn!(error = %self, "track provider rejected upload");
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "could not process file".to_string(),
                )
            }
            SubmissionError::Persistence(_) => {
                error!(error = %self, "calibration store failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "storage failure".to_string(),
                )
            }
            SubmissionError::UnknownSubmission(id) => (
                StatusCode::NOT_FOUND,
                format!("unknown submission: {}", id),
            ),
            SubmissionError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            SubmissionError::Internal(_) => {
                error!(error = %self, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                )
            }
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}
