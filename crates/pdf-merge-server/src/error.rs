use axum::{
    Json,
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use pdf_merge_jobs::JobError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// JSON body of every error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Stable machine-readable error name
    pub kind: String,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Job(#[from] JobError),

    /// A path segment that cannot name any job
    #[error("Job not found: {0}")]
    UnknownJob(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Invalid upload: {0}")]
    Multipart(#[from] MultipartError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Job(e) => match e {
                JobError::NotFound(_) => StatusCode::NOT_FOUND,
                JobError::NotReady { .. } | JobError::InvalidState { .. } => StatusCode::CONFLICT,
                JobError::InvalidOrdering(_) | JobError::NoValidDocuments => {
                    StatusCode::BAD_REQUEST
                }
                JobError::UploadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                JobError::Storage(_) | JobError::Config(_) | JobError::TaskJoin(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            ApiError::UnknownJob(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Multipart(e) => e.status(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Job(e) => e.kind(),
            ApiError::UnknownJob(_) => "not_found",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Multipart(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                "upload_too_large"
            }
            ApiError::Multipart(_) => "bad_request",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("Request failed: {}", self);
        } else {
            log::debug!("Request rejected ({}): {}", status, self);
        }

        let body = ErrorResponse {
            error: self.to_string(),
            kind: self.kind().to_string(),
        };
        (status, Json(body)).into_response()
    }
}
