use crate::config::StoreConfig;
use crate::storage::BlobHandle;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use pdf_merge::{DocumentReport, InvalidKind, Validity};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Identifier of one upload session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// A file as received from a client
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub bytes: Bytes,
}

impl UploadedFile {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }
}

/// One uploaded file within a job, valid or not
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentEntry {
    pub filename: String,
    pub validity: Validity,
    pub byte_size: usize,
    /// Index in the job's displayed list
    pub position: usize,
    pub title: Option<String>,
    pub author: Option<String>,
    pub(crate) blob: Option<BlobHandle>,
}

impl DocumentEntry {
    pub(crate) fn from_report(report: DocumentReport, position: usize, blob: Option<BlobHandle>) -> Self {
        Self {
            filename: report.filename,
            validity: report.validity,
            byte_size: report.byte_size,
            position,
            title: report.title,
            author: report.author,
            blob,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self.validity, Validity::Valid { .. })
    }

    pub fn page_count(&self) -> Option<usize> {
        match self.validity {
            Validity::Valid { page_count } => Some(page_count),
            Validity::Invalid { .. } => None,
        }
    }

    pub fn invalid_kind(&self) -> Option<InvalidKind> {
        match self.validity {
            Validity::Valid { .. } => None,
            Validity::Invalid { kind, .. } => Some(kind),
        }
    }

    pub fn invalid_reason(&self) -> Option<&str> {
        match &self.validity {
            Validity::Valid { .. } => None,
            Validity::Invalid { reason, .. } => Some(reason),
        }
    }
}

/// Client-visible lifecycle state of a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Created,
    Merging { progress: u8 },
    Completed,
    Failed { error: String },
}

impl JobStatus {
    pub fn name(&self) -> &'static str {
        match self {
            JobStatus::Created => "created",
            JobStatus::Merging { .. } => "merging",
            JobStatus::Completed => "completed",
            JobStatus::Failed { .. } => "failed",
        }
    }

    /// Percentage complete; 0 before a merge starts and 100 once it has succeeded
    pub fn progress(&self) -> u8 {
        match self {
            JobStatus::Created => 0,
            JobStatus::Merging { progress } => *progress,
            JobStatus::Completed => 100,
            JobStatus::Failed { .. } => 0,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            JobStatus::Failed { error } => Some(error),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed { .. })
    }
}

/// Published on every committed status change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub job_id: JobId,
    pub status: JobStatus,
}

/// Read-only copy of a job
#[derive(Debug, Clone)]
pub struct JobSnapshot {
    pub id: JobId,
    pub status: JobStatus,
    pub entries: Vec<DocumentEntry>,
    pub output_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl JobSnapshot {
    pub fn valid_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_valid()).count()
    }

    pub fn total_count(&self) -> usize {
        self.entries.len()
    }

    pub fn total_pages(&self) -> usize {
        self.entries.iter().filter_map(DocumentEntry::page_count).sum()
    }
}

/// Result of creating a job from an initial upload
#[derive(Debug, Clone)]
pub struct UploadSummary {
    pub job_id: JobId,
    pub entries: Vec<DocumentEntry>,
}

impl UploadSummary {
    pub fn valid_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_valid()).count()
    }

    pub fn total_count(&self) -> usize {
        self.entries.len()
    }
}

/// A finished merge ready for download
#[derive(Debug, Clone)]
pub struct Output {
    pub name: String,
    pub bytes: Bytes,
}

/// Internal lifecycle; only `Completed` owns an output handle
#[derive(Debug)]
pub(crate) enum Phase {
    Created,
    Merging {
        progress: u8,
        output_name: String,
    },
    Completed {
        output: BlobHandle,
        output_name: String,
        downloaded_at: Option<Instant>,
    },
    Failed {
        error: String,
        output_name: String,
    },
}

/// One valid entry as handed to the merge worker
#[derive(Debug, Clone)]
pub(crate) struct MergeItem {
    pub filename: String,
    pub blob: BlobHandle,
    pub page_count: usize,
}

pub(crate) struct Job {
    pub id: JobId,
    pub entries: Vec<DocumentEntry>,
    pub phase: Phase,
    pub created_at: DateTime<Utc>,
    pub last_touched: Instant,
    /// Sequence number for the next upload blob key
    pub next_upload: u64,
    /// Bytes received so far, counted against the per-job upload limit
    pub uploaded_bytes: u64,
    pub cancel: CancellationToken,
    /// Set once deletion has returned this job's blobs to storage
    pub released: bool,
}

impl Job {
    pub fn new(id: JobId) -> Self {
        Self {
            id,
            entries: Vec::new(),
            phase: Phase::Created,
            created_at: Utc::now(),
            last_touched: Instant::now(),
            next_upload: 0,
            uploaded_bytes: 0,
            cancel: CancellationToken::new(),
            released: false,
        }
    }

    pub fn status(&self) -> JobStatus {
        match &self.phase {
            Phase::Created => JobStatus::Created,
            Phase::Merging { progress, .. } => JobStatus::Merging {
                progress: *progress,
            },
            Phase::Completed { .. } => JobStatus::Completed,
            Phase::Failed { error, .. } => JobStatus::Failed {
                error: error.clone(),
            },
        }
    }

    pub fn output_name(&self) -> Option<&str> {
        match &self.phase {
            Phase::Created => None,
            Phase::Merging { output_name, .. }
            | Phase::Completed { output_name, .. }
            | Phase::Failed { output_name, .. } => Some(output_name),
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self.phase, Phase::Created)
    }

    pub fn touch(&mut self) {
        self.last_touched = Instant::now();
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            id: self.id,
            status: self.status(),
            entries: self.entries.clone(),
            output_name: self.output_name().map(str::to_string),
            created_at: self.created_at,
        }
    }

    /// Valid entries in display order
    pub fn merge_plan(&self) -> Vec<MergeItem> {
        self.entries
            .iter()
            .filter_map(|entry| {
                Some(MergeItem {
                    filename: entry.filename.clone(),
                    blob: entry.blob.clone()?,
                    page_count: entry.page_count()?,
                })
            })
            .collect()
    }

    /// Hand out every blob this job owns, leaving none behind
    pub fn take_blobs(&mut self) -> Vec<BlobHandle> {
        let mut blobs: Vec<BlobHandle> = self
            .entries
            .iter_mut()
            .filter_map(|entry| entry.blob.take())
            .collect();
        if let Phase::Completed { output, .. } = &self.phase {
            blobs.push(output.clone());
        }
        blobs
    }

    /// Whether the sweeper may reclaim this job at `now`
    pub fn is_expired(&self, now: Instant, config: &StoreConfig) -> bool {
        match &self.phase {
            // A running worker still owns storage
            Phase::Merging { .. } => false,
            Phase::Completed {
                downloaded_at: Some(downloaded),
                ..
            } if now.saturating_duration_since(*downloaded) > config.download_grace => true,
            _ => now.saturating_duration_since(self.last_touched) > config.retention,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_job_id_parse_round_trip() {
        let id = JobId::new();
        let parsed: JobId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-job".parse::<JobId>().is_err());
    }

    #[test]
    fn test_status_progress_and_names() {
        assert_eq!(JobStatus::Created.progress(), 0);
        assert_eq!(JobStatus::Merging { progress: 42 }.progress(), 42);
        assert_eq!(JobStatus::Completed.progress(), 100);
        let failed = JobStatus::Failed {
            error: "boom".to_string(),
        };
        assert_eq!(failed.name(), "failed");
        assert_eq!(failed.error(), Some("boom"));
        assert!(failed.is_terminal());
        assert!(!JobStatus::Merging { progress: 0 }.is_terminal());
    }

    #[tokio::test(start_paused = true)]
    async fn test_merging_job_never_expires() {
        let config = StoreConfig {
            retention: Duration::from_secs(10),
            ..Default::default()
        };
        let mut job = Job::new(JobId::new());
        job.phase = Phase::Merging {
            progress: 0,
            output_name: "out.pdf".to_string(),
        };

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(!job.is_expired(Instant::now(), &config));

        job.phase = Phase::Failed {
            error: "x".to_string(),
            output_name: "out.pdf".to_string(),
        };
        assert!(job.is_expired(Instant::now(), &config));
    }
}
