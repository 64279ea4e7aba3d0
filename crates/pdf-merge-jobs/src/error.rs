use crate::job::JobId;
use crate::storage::StorageError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Job not found: {0}")]
    NotFound(JobId),
    #[error("Operation not allowed while the job is {state}")]
    InvalidState { state: &'static str },
    #[error("Invalid ordering: {0}")]
    InvalidOrdering(String),
    #[error("Job has no valid documents to merge")]
    NoValidDocuments,
    #[error("Output not ready: the job is {state}")]
    NotReady { state: &'static str },
    #[error("Upload exceeds the per-job limit of {limit} bytes")]
    UploadTooLarge { limit: u64 },
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl JobError {
    /// Stable machine-readable name for the error
    pub fn kind(&self) -> &'static str {
        match self {
            JobError::NotFound(_) => "not_found",
            JobError::InvalidState { .. } => "invalid_state",
            JobError::InvalidOrdering(_) => "invalid_ordering",
            JobError::NoValidDocuments => "no_valid_documents",
            JobError::NotReady { .. } => "not_ready",
            JobError::UploadTooLarge { .. } => "upload_too_large",
            JobError::Storage(_) => "storage",
            JobError::Config(_) => "config",
            JobError::TaskJoin(_) => "internal",
        }
    }
}

pub type Result<T> = std::result::Result<T, JobError>;
