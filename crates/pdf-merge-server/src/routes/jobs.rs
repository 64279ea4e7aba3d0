//! Job endpoints
//!
//! - POST   /jobs                       upload files into a new job
//! - POST   /jobs/{id}/files            upload more files
//! - DELETE /jobs/{id}/files/{position} drop one file
//! - POST   /jobs/{id}/reorder          reorder files
//! - POST   /jobs/{id}/merge            start merging
//! - GET    /jobs/{id}/status           poll merge progress
//! - GET    /jobs/{id}/download         fetch the merged PDF
//! - DELETE /jobs/{id}                  discard the job

use crate::error::ApiError;
use crate::state::AppState;
use crate::types::*;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Multipart, Path, State},
    http::header,
    response::IntoResponse,
    routing::{delete, get, post},
};
use pdf_merge_jobs::{JobId, Reordering, UploadedFile};
use std::sync::Arc;

/// Multipart field names that carry files
const FILE_FIELDS: [&str; 3] = ["files", "files[]", "file"];

fn parse_job_id(raw: &str) -> Result<JobId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::UnknownJob(raw.to_string()))
}

/// Keep only the final path component of a client-supplied file name
fn display_name(raw: &str) -> &str {
    raw.rsplit(['/', '\\']).next().unwrap_or(raw).trim()
}

async fn read_files(mut multipart: Multipart) -> Result<Vec<UploadedFile>, ApiError> {
    let mut files = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        if !FILE_FIELDS.contains(&field.name().unwrap_or_default()) {
            continue;
        }
        // Browsers send an empty part when no file was picked
        let filename = match field.file_name().map(display_name) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => continue,
        };
        let bytes = field.bytes().await?;
        files.push(UploadedFile::new(filename, bytes));
    }

    if files.is_empty() {
        return Err(ApiError::BadRequest("No files were uploaded".to_string()));
    }
    Ok(files)
}

/// POST /api/jobs
async fn create_job(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let files = read_files(multipart).await?;
    let summary = state.store.upload(files).await?;
    log::info!(
        "Job {} created with {}/{} valid file(s)",
        summary.job_id,
        summary.valid_count(),
        summary.total_count()
    );
    Ok(Json(UploadResponse::new(
        summary.job_id,
        &summary.entries,
        state.poll_interval().as_millis() as u64,
    )))
}

/// POST /api/jobs/{id}/files
async fn append_files(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let id = parse_job_id(&id)?;
    let files = read_files(multipart).await?;
    let entries = state.store.append_documents(id, files).await?;
    Ok(Json(UploadResponse::new(
        id,
        &entries,
        state.poll_interval().as_millis() as u64,
    )))
}

/// DELETE /api/jobs/{id}/files/{position}
async fn remove_file(
    State(state): State<Arc<AppState>>,
    Path((id, position)): Path<(String, usize)>,
) -> Result<Json<FilesResponse>, ApiError> {
    let id = parse_job_id(&id)?;
    let entries = state.store.remove_document(id, position).await?;
    Ok(Json(FilesResponse {
        success: true,
        files: file_infos(&entries),
    }))
}

/// POST /api/jobs/{id}/reorder
async fn reorder(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<ReorderRequest>,
) -> Result<Json<FilesResponse>, ApiError> {
    let id = parse_job_id(&id)?;
    let reordering = Reordering::try_from(request)?;
    let entries = state.store.reorder(id, &reordering)?;
    Ok(Json(FilesResponse {
        success: true,
        files: file_infos(&entries),
    }))
}

/// POST /api/jobs/{id}/merge
///
/// The body is optional; without one the output is named `merged.pdf`.
async fn start_merge(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<MergeResponse>, ApiError> {
    let id = parse_job_id(&id)?;
    let request: MergeRequest = if body.is_empty() {
        MergeRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("Invalid merge request: {}", e)))?
    };

    let output_name = state
        .store
        .start_merge(id, request.output_name.as_deref().unwrap_or_default())?;
    Ok(Json(MergeResponse {
        accepted: true,
        output_name,
    }))
}

/// GET /api/jobs/{id}/status
async fn status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let id = parse_job_id(&id)?;
    let snapshot = state.store.snapshot(id)?;
    Ok(Json(StatusResponse::from(&snapshot)))
}

/// GET /api/jobs/{id}/download
async fn download(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_job_id(&id)?;
    let output = state.store.get_output(id).await?;
    log::info!("Job {}: serving {} ({} bytes)", id, output.name, output.bytes.len());

    let disposition = format!("attachment; filename=\"{}\"", output.name);
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        output.bytes,
    ))
}

/// DELETE /api/jobs/{id}
async fn delete_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Json<SuccessResponse> {
    // Ids that cannot name a job are already "deleted"
    if let Ok(id) = id.parse::<JobId>() {
        state.store.delete_job(id).await;
    }
    Json(SuccessResponse { success: true })
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/jobs", post(create_job))
        .route("/jobs/{id}", delete(delete_job))
        .route("/jobs/{id}/files", post(append_files))
        .route("/jobs/{id}/files/{position}", delete(remove_file))
        .route("/jobs/{id}/reorder", post(reorder))
        .route("/jobs/{id}/merge", post(start_merge))
        .route("/jobs/{id}/status", get(status))
        .route("/jobs/{id}/download", get(download))
}
