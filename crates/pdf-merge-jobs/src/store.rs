use crate::config::StoreConfig;
use crate::error::{JobError, Result};
use crate::job::{
    DocumentEntry, Job, JobId, JobSnapshot, JobStatus, Output, Phase, ProgressEvent,
    UploadSummary, UploadedFile,
};
use crate::reorder::{self, Reordering};
use crate::storage::{BlobHandle, BlobKey, BlobStore, MemoryStore, StorageError};
use crate::worker;
use pdf_merge::{CombineBackend, DocumentReport, LopdfBackend, sanitize_output_name, validate_document};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tokio::sync::{Semaphore, broadcast};
use tokio::time::Instant;

const EVENT_CAPACITY: usize = 256;

type JobMap = HashMap<JobId, Arc<Mutex<Job>>>;

/// Registry of every live job.
///
/// Share it as an `Arc<JobStore>`. Locks are only ever taken map first, then job, and
/// none is held across an `.await`. Blob storage is only touched on the blocking pool.
pub struct JobStore {
    jobs: RwLock<JobMap>,
    pub(crate) storage: Arc<dyn BlobStore>,
    pub(crate) backend: Arc<dyn CombineBackend>,
    config: StoreConfig,
    pub(crate) merge_slots: Option<Arc<Semaphore>>,
    events: broadcast::Sender<ProgressEvent>,
}

impl JobStore {
    /// In-memory storage and the lopdf combiner
    pub fn new(config: StoreConfig) -> Arc<Self> {
        Self::with_parts(config, Arc::new(MemoryStore::new()), Arc::new(LopdfBackend))
    }

    pub fn with_parts(
        config: StoreConfig,
        storage: Arc<dyn BlobStore>,
        backend: Arc<dyn CombineBackend>,
    ) -> Arc<Self> {
        let merge_slots = config
            .max_concurrent_merges
            .map(|limit| Arc::new(Semaphore::new(limit)));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Arc::new(Self {
            jobs: RwLock::new(HashMap::new()),
            storage,
            backend,
            config,
            merge_slots,
            events,
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn storage(&self) -> &Arc<dyn BlobStore> {
        &self.storage
    }

    pub fn job_count(&self) -> usize {
        self.read_jobs().len()
    }

    pub fn contains(&self, id: JobId) -> bool {
        self.read_jobs().contains_key(&id)
    }

    /// Receive every status change committed from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.events.subscribe()
    }

    pub fn create_job(&self) -> JobId {
        let mut jobs = self.write_jobs();
        let mut id = JobId::new();
        while jobs.contains_key(&id) {
            id = JobId::new();
        }
        jobs.insert(id, Arc::new(Mutex::new(Job::new(id))));
        log::debug!("Created job {}", id);
        id
    }

    /// Create a job holding `files`. The job is discarded again if the upload is rejected.
    pub async fn upload(&self, files: Vec<UploadedFile>) -> Result<UploadSummary> {
        let job_id = self.create_job();
        match self.append_documents(job_id, files).await {
            Ok(entries) => Ok(UploadSummary { job_id, entries }),
            Err(e) => {
                self.delete_job(job_id).await;
                Err(e)
            }
        }
    }

    /// Validate `files` and append them to the job's list, returning the new entries.
    ///
    /// Invalid files are kept for display but store no bytes. Either every file is
    /// appended or none is.
    pub async fn append_documents(
        &self,
        id: JobId,
        files: Vec<UploadedFile>,
    ) -> Result<Vec<DocumentEntry>> {
        let job = self.job(id)?;
        let incoming: u64 = files.iter().map(|f| f.bytes.len() as u64).sum();
        // Blob keys are claimed up front so concurrent appends never share one
        let first_upload = {
            let mut job = self.lock_live(&job)?;
            self.check_appendable(&job, incoming)?;
            let first = job.next_upload;
            job.next_upload += files.len() as u64;
            first
        };

        let storage = Arc::clone(&self.storage);
        let stored = tokio::task::spawn_blocking(move || {
            store_valid(&*storage, id, first_upload, files)
        })
        .await??;

        let committed = {
            let mut job = lock(&job);
            // The job may have moved on while the files were stored
            self.check_appendable(&job, incoming).map(|()| {
                let first_position = job.entries.len();
                let entries: Vec<DocumentEntry> = stored
                    .iter()
                    .enumerate()
                    .map(|(offset, (report, blob))| {
                        DocumentEntry::from_report(report.clone(), first_position + offset, blob.clone())
                    })
                    .collect();
                job.uploaded_bytes += incoming;
                job.entries.extend(entries.iter().cloned());
                job.touch();
                entries
            })
        };

        match committed {
            Ok(entries) => {
                log::info!(
                    "Job {}: appended {} file(s), {} valid",
                    id,
                    entries.len(),
                    entries.iter().filter(|e| e.is_valid()).count()
                );
                Ok(entries)
            }
            Err(e) => {
                self.discard(stored.into_iter().filter_map(|(_, blob)| blob).collect())
                    .await;
                Err(e)
            }
        }
    }

    fn check_appendable(&self, job: &Job, incoming: u64) -> Result<()> {
        self.check_live(job)?;
        if !job.is_created() {
            return Err(JobError::NotFound(job.id));
        }
        let limit = self.config.max_upload_bytes;
        if job.uploaded_bytes.saturating_add(incoming) > limit {
            return Err(JobError::UploadTooLarge { limit });
        }
        Ok(())
    }

    /// Reorder the job's documents, returning the resulting list
    pub fn reorder(&self, id: JobId, reordering: &Reordering) -> Result<Vec<DocumentEntry>> {
        let job = self.job(id)?;
        let mut job = self.lock_live(&job)?;
        ensure_created(&job)?;

        let changed = reorder::apply(&mut job.entries, reordering)?;
        job.touch();
        log::debug!("Job {}: reorder moved {} entries", id, changed);
        Ok(job.entries.clone())
    }

    /// Drop the entry displayed at `position`, returning the resulting list
    pub async fn remove_document(&self, id: JobId, position: usize) -> Result<Vec<DocumentEntry>> {
        let job = self.job(id)?;
        let (entries, blob) = {
            let mut job = self.lock_live(&job)?;
            ensure_created(&job)?;

            if position >= job.entries.len() {
                return Err(JobError::InvalidOrdering(format!(
                    "No document at position {} (job has {})",
                    position,
                    job.entries.len()
                )));
            }
            let mut removed = job.entries.remove(position);
            reorder::renumber(&mut job.entries, position..usize::MAX);
            job.uploaded_bytes = job.uploaded_bytes.saturating_sub(removed.byte_size as u64);
            job.touch();
            log::debug!("Job {}: removed {}", id, removed.filename);
            (job.entries.clone(), removed.blob.take())
        };

        self.discard(blob.into_iter().collect()).await;
        Ok(entries)
    }

    /// Start merging the job's valid documents in their current order.
    ///
    /// Returns the output name the download will carry.
    pub fn start_merge(self: &Arc<Self>, id: JobId, output_name: &str) -> Result<String> {
        let job = self.job(id)?;
        let (plan, cancel, output_name) = {
            let mut guard = self.lock_live(&job)?;
            ensure_created(&guard)?;

            let plan = guard.merge_plan();
            if plan.is_empty() {
                return Err(JobError::NoValidDocuments);
            }

            let output_name = sanitize_output_name(output_name);
            guard.phase = Phase::Merging {
                progress: 0,
                output_name: output_name.clone(),
            };
            guard.touch();
            self.publish(id, guard.status());
            (plan, guard.cancel.clone(), output_name)
        };

        log::info!(
            "Job {}: merging {} document(s) into {}",
            id,
            plan.len(),
            output_name
        );
        tokio::spawn(worker::run(Arc::clone(self), job, id, plan, cancel));
        Ok(output_name)
    }

    pub fn get_state(&self, id: JobId) -> Result<JobStatus> {
        let job = self.job(id)?;
        let mut job = self.lock_live(&job)?;
        job.touch();
        Ok(job.status())
    }

    pub fn snapshot(&self, id: JobId) -> Result<JobSnapshot> {
        let job = self.job(id)?;
        let mut job = self.lock_live(&job)?;
        job.touch();
        Ok(job.snapshot())
    }

    /// Fetch the merged document. The first download starts the post-download grace period.
    pub async fn get_output(&self, id: JobId) -> Result<Output> {
        let job = self.job(id)?;
        let (handle, name) = {
            let mut job = self.lock_live(&job)?;
            job.touch();
            let status = job.status();
            match &mut job.phase {
                Phase::Completed {
                    output,
                    output_name,
                    downloaded_at,
                } => {
                    downloaded_at.get_or_insert_with(Instant::now);
                    (output.clone(), output_name.clone())
                }
                _ => {
                    return Err(JobError::NotReady {
                        state: status.name(),
                    });
                }
            }
        };

        let storage = Arc::clone(&self.storage);
        match tokio::task::spawn_blocking(move || storage.get(&handle)).await? {
            Ok(bytes) => Ok(Output { name, bytes }),
            // Deleted between the state check and the read
            Err(StorageError::Missing(_)) => Err(JobError::NotFound(id)),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove a job and free its storage. Unknown ids are ignored.
    pub async fn delete_job(&self, id: JobId) {
        let removed = self.write_jobs().remove(&id);
        let Some(job) = removed else {
            return;
        };
        let blobs = release(&mut lock(&job));
        log::info!("Deleted job {}", id);
        self.discard(blobs).await;
    }

    /// Delete every job past its retention window, returning how many were removed
    pub async fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let candidates: Vec<JobId> = self
            .read_jobs()
            .iter()
            .filter(|(_, job)| lock(job).is_expired(now, &self.config))
            .map(|(id, _)| *id)
            .collect();

        let mut evicted = 0;
        let mut blobs = Vec::new();
        for id in candidates {
            if let Some(released) = self.evict_if_expired(id, now) {
                evicted += 1;
                blobs.extend(released);
            }
        }
        self.discard(blobs).await;
        evicted
    }

    /// Remove the job if it is still expired at `now`, returning the blobs it held
    fn evict_if_expired(&self, id: JobId, now: Instant) -> Option<Vec<BlobHandle>> {
        let mut jobs = self.write_jobs();
        let job = jobs.get(&id).cloned()?;
        let mut job = lock(&job);
        // Re-check: the job may have been touched since the scan
        if !job.is_expired(now, &self.config) {
            return None;
        }
        jobs.remove(&id);
        drop(jobs);

        log::info!("Job {} expired", id);
        Some(release(&mut job))
    }

    /// Give `blobs` back to storage on the blocking pool
    pub(crate) async fn discard(&self, blobs: Vec<BlobHandle>) {
        if blobs.is_empty() {
            return;
        }
        let storage = Arc::clone(&self.storage);
        let released = tokio::task::spawn_blocking(move || {
            for blob in &blobs {
                storage.release(blob);
            }
        });
        if let Err(e) = released.await {
            log::warn!("Failed to release storage: {}", e);
        }
    }

    /// Publish a status change. Callers hold the job's lock so events stay in commit order.
    pub(crate) fn publish(&self, job_id: JobId, status: JobStatus) {
        // No receivers is fine
        let _ = self.events.send(ProgressEvent { job_id, status });
    }

    fn job(&self, id: JobId) -> Result<Arc<Mutex<Job>>> {
        self.read_jobs()
            .get(&id)
            .cloned()
            .ok_or(JobError::NotFound(id))
    }

    /// Lock a job that is neither deleted nor expired.
    ///
    /// An expired job is evicted on the spot rather than refreshed.
    fn lock_live<'a>(&self, job: &'a Mutex<Job>) -> Result<MutexGuard<'a, Job>> {
        let guard = lock(job);
        match self.check_live(&guard) {
            Ok(()) => Ok(guard),
            Err(e) => {
                let id = guard.id;
                drop(guard);
                self.expire(id);
                Err(e)
            }
        }
    }

    fn check_live(&self, job: &Job) -> Result<()> {
        if job.released || job.is_expired(Instant::now(), &self.config) {
            return Err(JobError::NotFound(job.id));
        }
        Ok(())
    }

    /// Evict an expired job without waiting for its storage to be released
    fn expire(&self, id: JobId) {
        if let Some(blobs) = self.evict_if_expired(id, Instant::now()) {
            let storage = Arc::clone(&self.storage);
            tokio::task::spawn_blocking(move || {
                for blob in &blobs {
                    storage.release(blob);
                }
            });
        }
    }

    fn read_jobs(&self) -> std::sync::RwLockReadGuard<'_, JobMap> {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_jobs(&self) -> std::sync::RwLockWriteGuard<'_, JobMap> {
        self.jobs.write().unwrap_or_else(PoisonError::into_inner)
    }
}

pub(crate) fn lock(job: &Mutex<Job>) -> MutexGuard<'_, Job> {
    job.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cancel the job's worker and hand out its blobs. Later calls return nothing.
fn release(job: &mut Job) -> Vec<BlobHandle> {
    job.cancel.cancel();
    if job.released {
        return Vec::new();
    }
    job.released = true;
    job.take_blobs()
}

/// Validate each file and store the valid ones, keyed from `first_upload` on.
///
/// Runs on the blocking pool. A storage failure releases what this call already stored.
fn store_valid(
    storage: &dyn BlobStore,
    id: JobId,
    first_upload: u64,
    files: Vec<UploadedFile>,
) -> std::result::Result<Vec<(DocumentReport, Option<BlobHandle>)>, StorageError> {
    let mut stored: Vec<(DocumentReport, Option<BlobHandle>)> = Vec::with_capacity(files.len());
    for (sequence, file) in (first_upload..).zip(files) {
        let report = validate_document(file.filename.as_str(), &file.bytes);
        if !report.is_valid() {
            log::debug!(
                "Job {}: rejected {} ({})",
                id,
                report.filename,
                report.invalid_reason().unwrap_or_default()
            );
            stored.push((report, None));
            continue;
        }
        match storage.put(BlobKey::upload(id, sequence), file.bytes) {
            Ok(handle) => stored.push((report, Some(handle))),
            Err(e) => {
                for handle in stored.iter().filter_map(|(_, blob)| blob.as_ref()) {
                    storage.release(handle);
                }
                log::warn!("Failed to store upload for job {}: {}", id, e);
                return Err(e);
            }
        }
    }
    Ok(stored)
}

fn ensure_created(job: &Job) -> Result<()> {
    if job.is_created() {
        Ok(())
    } else {
        Err(JobError::InvalidState {
            state: job.status().name(),
        })
    }
}
