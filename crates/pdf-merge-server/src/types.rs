//! Request and response bodies of the JSON API

use pdf_merge_jobs::{DocumentEntry, JobId, JobSnapshot, JobStatus, Reordering};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// One uploaded file as shown to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub filename: String,
    pub position: usize,
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_count: Option<usize>,
    pub byte_size: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
}

impl From<&DocumentEntry> for FileInfo {
    fn from(entry: &DocumentEntry) -> Self {
        Self {
            filename: entry.filename.clone(),
            position: entry.position,
            valid: entry.is_valid(),
            page_count: entry.page_count(),
            byte_size: entry.byte_size,
            title: entry.title.clone(),
            author: entry.author.clone(),
            error: entry.invalid_reason().map(str::to_string),
            error_kind: entry.invalid_kind().map(|kind| kind.as_str().to_string()),
        }
    }
}

pub fn file_infos(entries: &[DocumentEntry]) -> Vec<FileInfo> {
    entries.iter().map(FileInfo::from).collect()
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub job_id: JobId,
    pub files: Vec<FileInfo>,
    pub valid_count: usize,
    pub total_count: usize,
    pub poll_interval_ms: u64,
}

impl UploadResponse {
    pub fn new(job_id: JobId, entries: &[DocumentEntry], poll_interval_ms: u64) -> Self {
        Self {
            job_id,
            files: file_infos(entries),
            valid_count: entries.iter().filter(|e| e.is_valid()).count(),
            total_count: entries.len(),
            poll_interval_ms,
        }
    }
}

/// Either `{"order": [..]}` or `{"move": {"from": .., "to": ..}}`
#[derive(Debug, Default, Deserialize)]
pub struct ReorderRequest {
    #[serde(default)]
    pub order: Option<Vec<usize>>,
    #[serde(default, rename = "move")]
    pub move_entry: Option<MoveRequest>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct MoveRequest {
    pub from: usize,
    pub to: usize,
}

impl TryFrom<ReorderRequest> for Reordering {
    type Error = ApiError;

    fn try_from(request: ReorderRequest) -> Result<Self, Self::Error> {
        match (request.order, request.move_entry) {
            (Some(order), None) => Ok(Reordering::Indices(order)),
            (None, Some(MoveRequest { from, to })) => Ok(Reordering::Move { from, to }),
            _ => Err(ApiError::BadRequest(
                "Expected exactly one of \"order\" or \"move\"".to_string(),
            )),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FilesResponse {
    pub success: bool,
    pub files: Vec<FileInfo>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeRequest {
    #[serde(default)]
    pub output_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeResponse {
    pub accepted: bool,
    pub output_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub state: String,
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// RFC 3339 creation time
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_name: Option<String>,
    /// Files that will be (or were) merged
    pub file_count: usize,
}

impl From<&JobSnapshot> for StatusResponse {
    fn from(snapshot: &JobSnapshot) -> Self {
        let status: &JobStatus = &snapshot.status;
        Self {
            state: status.name().to_string(),
            progress: status.progress(),
            error: status.error().map(str::to_string),
            created_at: snapshot.created_at.to_rfc3339(),
            output_name: snapshot.output_name.clone(),
            file_count: snapshot.valid_count(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub uptime_secs: u64,
    pub jobs: usize,
}
