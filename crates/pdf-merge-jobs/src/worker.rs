//! Background merge task, one per job

use crate::job::{Job, JobId, JobStatus, MergeItem, Phase};
use crate::storage::{BlobHandle, BlobKey};
use crate::store::{JobStore, lock};
use bytes::Bytes;
use pdf_merge::Combiner;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

enum Interrupt {
    Cancelled,
    Failed(String),
}

pub(crate) async fn run(
    store: Arc<JobStore>,
    job: Arc<Mutex<Job>>,
    id: JobId,
    plan: Vec<MergeItem>,
    cancel: CancellationToken,
) {
    // Queued merges stay at 0% until a slot frees up
    let _permit = match &store.merge_slots {
        Some(slots) => {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    log::debug!("Job {} cancelled while queued", id);
                    return;
                }
                permit = Arc::clone(slots).acquire_owned() => match permit {
                    Ok(permit) => Some(permit),
                    Err(e) => {
                        fail(&store, &job, id, format!("Merge queue closed: {}", e));
                        return;
                    }
                },
            }
        }
        None => None,
    };

    match merge(&store, &job, id, plan, &cancel).await {
        Ok(output) => {
            if let Some(orphan) = complete(&store, &job, id, output) {
                store.discard(vec![orphan]).await;
            }
        }
        Err(Interrupt::Cancelled) => log::debug!("Job {}: merge cancelled", id),
        Err(Interrupt::Failed(error)) => fail(&store, &job, id, error),
    }
}

async fn merge(
    store: &JobStore,
    job: &Mutex<Job>,
    id: JobId,
    plan: Vec<MergeItem>,
    cancel: &CancellationToken,
) -> Result<BlobHandle, Interrupt> {
    let total_pages = plan.iter().map(|item| item.page_count).sum::<usize>().max(1);
    let mut pages_done = 0;
    let mut reported = 0u8;
    let mut combiner: Box<dyn Combiner> = store.backend.start();

    for item in plan {
        if cancel.is_cancelled() {
            return Err(Interrupt::Cancelled);
        }

        let storage = Arc::clone(&store.storage);
        let (returned, appended) = tokio::task::spawn_blocking(move || {
            let appended = match storage.get(&item.blob) {
                Ok(bytes) => combiner
                    .append(&bytes)
                    .map_err(|e| format!("Failed to merge {}: {}", item.filename, e)),
                Err(e) => Err(format!("Failed to read {}: {}", item.filename, e)),
            };
            (combiner, appended.map(|pages| (pages, item.page_count)))
        })
        .await
        .map_err(|e| Interrupt::Failed(format!("Merge task failed: {}", e)))?;
        combiner = returned;

        let (appended, weight) = appended.map_err(Interrupt::Failed)?;
        log::debug!("Job {}: appended {} page(s)", id, appended);

        pages_done += weight;
        let progress = (100 * pages_done / total_pages).min(99) as u8;
        if progress > reported {
            if !set_progress(store, job, id, progress) {
                return Err(Interrupt::Cancelled);
            }
            reported = progress;
        }
    }

    if cancel.is_cancelled() {
        return Err(Interrupt::Cancelled);
    }

    let storage = Arc::clone(&store.storage);
    tokio::task::spawn_blocking(move || {
        let bytes = combiner
            .finish()
            .map_err(|e| format!("Failed to write merged document: {}", e))?;
        storage
            .put(BlobKey::output(id), Bytes::from(bytes))
            .map_err(|e| format!("Failed to store merged document: {}", e))
    })
    .await
    .map_err(|e| Interrupt::Failed(format!("Merge task failed: {}", e)))?
    .map_err(Interrupt::Failed)
}

/// Publish progress, returning false once the job has been deleted
fn set_progress(store: &JobStore, job: &Mutex<Job>, id: JobId, value: u8) -> bool {
    let mut job = lock(job);
    if job.released {
        return false;
    }
    if let Phase::Merging { progress, .. } = &mut job.phase {
        *progress = value;
        store.publish(id, JobStatus::Merging { progress: value });
    }
    true
}

/// Commit the output, handing it back if the job no longer wants it
fn complete(store: &JobStore, job: &Mutex<Job>, id: JobId, output: BlobHandle) -> Option<BlobHandle> {
    let mut job = lock(job);
    // Deleted while the output was being written
    if job.released || job.cancel.is_cancelled() {
        return Some(output);
    }
    let Phase::Merging { output_name, .. } = &mut job.phase else {
        return Some(output);
    };
    let output_name = std::mem::take(output_name);

    log::info!("Job {}: merge completed ({})", id, output_name);
    job.phase = Phase::Completed {
        output,
        output_name,
        downloaded_at: None,
    };
    job.touch();
    store.publish(id, JobStatus::Completed);
    None
}

fn fail(store: &JobStore, job: &Mutex<Job>, id: JobId, error: String) {
    let mut job = lock(job);
    if job.released {
        return;
    }
    let Phase::Merging { output_name, .. } = &mut job.phase else {
        return;
    };
    let output_name = std::mem::take(output_name);

    log::warn!("Job {}: merge failed: {}", id, error);
    job.phase = Phase::Failed {
        error: error.clone(),
        output_name,
    };
    job.touch();
    store.publish(id, JobStatus::Failed { error });
}
