//! Job lifecycle for multi-document merge sessions.
//!
//! A [`JobStore`] owns every upload session: it validates and stores uploaded
//! files, applies client reorderings, drives one background merge per job, and
//! reclaims storage when jobs are deleted or expire.

mod config;
mod error;
mod job;
mod reorder;
mod storage;
mod store;
mod sweeper;
mod worker;

pub use config::StoreConfig;
pub use error::{JobError, Result};
pub use job::{
    DocumentEntry, JobId, JobSnapshot, JobStatus, Output, ProgressEvent, UploadSummary,
    UploadedFile,
};
pub use reorder::Reordering;
pub use storage::{BlobHandle, BlobKey, BlobRole, BlobStore, DiskStore, MemoryStore, StorageError};
pub use store::JobStore;
pub use sweeper::spawn_sweeper;

pub use pdf_merge::{InvalidKind, Validity};
