mod common;

use common::*;
use pdf_merge_jobs::*;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_scenario_merge_two_documents() {
    let store = JobStore::new(StoreConfig::default());
    let summary = store
        .upload(vec![pdf_file("three.pdf", 3, 100), pdf_file("five.pdf", 5, 200)])
        .await
        .unwrap();

    assert_eq!(summary.valid_count(), 2);
    assert_eq!(summary.total_count(), 2);
    assert_eq!(summary.entries[0].page_count(), Some(3));
    assert_eq!(summary.entries[1].position, 1);

    let statuses = merge_and_wait(&store, summary.job_id, "combined").await;
    assert_eq!(statuses.last(), Some(&JobStatus::Completed));
    assert_eq!(store.get_state(summary.job_id).unwrap(), JobStatus::Completed);

    let output = store.get_output(summary.job_id).await.unwrap();
    assert_eq!(output.name, "combined.pdf");
    assert_eq!(
        page_widths(&output.bytes),
        vec![100, 100, 100, 200, 200, 200, 200, 200]
    );
}

#[tokio::test]
async fn test_scenario_invalid_file_is_kept_but_skipped() {
    let store = JobStore::new(StoreConfig::default());
    let summary = store
        .upload(vec![pdf_file("good.pdf", 2, 300), corrupt_file("bad.pdf")])
        .await
        .unwrap();

    assert_eq!(summary.valid_count(), 1);
    assert_eq!(summary.total_count(), 2);
    let bad = &summary.entries[1];
    assert!(!bad.is_valid());
    assert!(!bad.invalid_reason().unwrap().is_empty());
    // Only the valid upload holds bytes
    assert_eq!(store.storage().len(), 1);

    let statuses = merge_and_wait(&store, summary.job_id, "").await;
    assert_eq!(statuses.last(), Some(&JobStatus::Completed));

    let output = store.get_output(summary.job_id).await.unwrap();
    assert_eq!(output.name, "merged.pdf");
    assert_eq!(page_widths(&output.bytes), vec![300, 300]);

    let snapshot = store.snapshot(summary.job_id).unwrap();
    assert_eq!(snapshot.total_count(), 2);
    assert_eq!(snapshot.output_name.as_deref(), Some("merged.pdf"));
}

#[tokio::test(start_paused = true)]
async fn test_scenario_idle_job_is_reclaimed() {
    let config = StoreConfig {
        retention: Duration::from_secs(60),
        sweep_interval: Duration::from_secs(10),
        ..Default::default()
    };
    let store = JobStore::new(config);
    let sweeper = spawn_sweeper(&store);

    let id = store.create_job();
    tokio::time::sleep(Duration::from_secs(75)).await;

    assert!(matches!(store.get_state(id), Err(JobError::NotFound(_))));
    assert_eq!(store.job_count(), 0);
    sweeper.abort();
}

#[tokio::test(start_paused = true)]
async fn test_expired_job_is_gone_before_the_next_sweep() {
    let config = StoreConfig {
        retention: Duration::from_secs(60),
        sweep_interval: Duration::from_secs(300),
        ..Default::default()
    };
    let store = JobStore::new(config);
    let sweeper = spawn_sweeper(&store);

    let idle = store.create_job();
    let polled = store.upload(vec![pdf_file("a.pdf", 1, 100)]).await.unwrap().job_id;

    tokio::time::sleep(Duration::from_secs(40)).await;
    store.get_state(polled).unwrap();
    tokio::time::sleep(Duration::from_secs(80)).await;

    // No sweep has run yet, and reading an expired job must not revive it
    assert!(matches!(store.get_state(idle), Err(JobError::NotFound(_))));
    assert!(matches!(store.snapshot(polled), Err(JobError::NotFound(_))));
    assert!(matches!(store.get_state(polled), Err(JobError::NotFound(_))));
    assert!(matches!(
        store.reorder(polled, &Reordering::Indices(vec![0])),
        Err(JobError::NotFound(_))
    ));
    assert!(matches!(
        store.append_documents(polled, vec![pdf_file("b.pdf", 1, 100)]).await,
        Err(JobError::NotFound(_))
    ));
    assert_eq!(store.job_count(), 0);
    sweeper.abort();
}

#[tokio::test]
async fn test_scenario_bad_ordering_leaves_job_unchanged() {
    let store = JobStore::new(StoreConfig::default());
    let summary = store
        .upload(vec![
            pdf_file("a.pdf", 1, 100),
            pdf_file("b.pdf", 1, 200),
            pdf_file("c.pdf", 1, 300),
        ])
        .await
        .unwrap();
    let before = store.snapshot(summary.job_id).unwrap();

    let result = store.reorder(summary.job_id, &Reordering::Indices(vec![0, 2]));
    assert!(matches!(result, Err(JobError::InvalidOrdering(_))));

    let after = store.snapshot(summary.job_id).unwrap();
    assert_eq!(after.entries, before.entries);
}

#[tokio::test]
async fn test_reorder_changes_merge_order() {
    let store = JobStore::new(StoreConfig::default());
    let summary = store
        .upload(vec![
            pdf_file("a.pdf", 1, 100),
            corrupt_file("x.pdf"),
            pdf_file("b.pdf", 2, 200),
        ])
        .await
        .unwrap();

    let entries = store
        .reorder(summary.job_id, &Reordering::Indices(vec![1, 0]))
        .unwrap();
    let names: Vec<_> = entries.iter().map(|e| e.filename.as_str()).collect();
    assert_eq!(names, vec!["b.pdf", "x.pdf", "a.pdf"]);

    merge_and_wait(&store, summary.job_id, "out.pdf").await;
    let output = store.get_output(summary.job_id).await.unwrap();
    assert_eq!(page_widths(&output.bytes), vec![200, 200, 100]);
}

#[tokio::test]
async fn test_state_reads_are_repeatable() {
    let store = JobStore::new(StoreConfig::default());
    let summary = store
        .upload(vec![pdf_file("a.pdf", 2, 100), corrupt_file("b.pdf")])
        .await
        .unwrap();

    let first = store.snapshot(summary.job_id).unwrap();
    let second = store.snapshot(summary.job_id).unwrap();
    assert_eq!(first.entries, second.entries);
    assert_eq!(first.status, second.status);
    assert_eq!(first.total_pages(), 2);
    assert_eq!(
        store.get_state(summary.job_id).unwrap(),
        store.get_state(summary.job_id).unwrap()
    );
}

#[tokio::test]
async fn test_append_to_existing_job() {
    let store = JobStore::new(StoreConfig::default());
    let id = store.create_job();

    let first = store
        .append_documents(id, vec![pdf_file("a.pdf", 1, 100)])
        .await
        .unwrap();
    let second = store
        .append_documents(id, vec![pdf_file("b.pdf", 1, 200)])
        .await
        .unwrap();
    assert_eq!(first[0].position, 0);
    assert_eq!(second[0].position, 1);

    merge_and_wait(&store, id, "out").await;

    // Appending is only possible before the merge starts
    let result = store.append_documents(id, vec![pdf_file("c.pdf", 1, 300)]).await;
    assert!(matches!(result, Err(JobError::NotFound(_))));
}

#[tokio::test]
async fn test_start_merge_twice_is_rejected() {
    let store = JobStore::new(StoreConfig::default());
    let summary = store.upload(vec![pdf_file("a.pdf", 4, 100)]).await.unwrap();
    let id = summary.job_id;

    let mut events = store.subscribe();
    store.start_merge(id, "one").unwrap();
    match store.start_merge(id, "two") {
        Err(JobError::InvalidState { state }) => assert_eq!(state, "merging"),
        other => panic!("Expected InvalidState, got {other:?}"),
    }
    assert!(matches!(
        store.reorder(id, &Reordering::Indices(vec![0])),
        Err(JobError::InvalidState { .. })
    ));

    loop {
        let event = events.recv().await.unwrap();
        if event.status.is_terminal() {
            assert_eq!(event.status, JobStatus::Completed);
            break;
        }
    }

    match store.start_merge(id, "three") {
        Err(JobError::InvalidState { state }) => assert_eq!(state, "completed"),
        other => panic!("Expected InvalidState, got {other:?}"),
    }
    assert_eq!(store.get_output(id).await.unwrap().name, "one.pdf");
}

#[tokio::test]
async fn test_delete_is_idempotent_and_frees_storage() {
    let store = JobStore::new(StoreConfig::default());
    let summary = store
        .upload(vec![pdf_file("a.pdf", 1, 100), pdf_file("b.pdf", 1, 100)])
        .await
        .unwrap();
    merge_and_wait(&store, summary.job_id, "out").await;
    // Two uploads plus the output
    assert_eq!(store.storage().len(), 3);

    store.delete_job(summary.job_id).await;
    store.delete_job(summary.job_id).await;
    store.delete_job(JobId::new()).await;

    assert!(store.storage().is_empty());
    assert!(matches!(
        store.get_state(summary.job_id),
        Err(JobError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_disk_storage_is_released_on_delete() {
    let dir = tempfile::tempdir().unwrap();
    let disk = std::sync::Arc::new(DiskStore::open(dir.path()).unwrap());
    let store = JobStore::with_parts(
        StoreConfig::default(),
        disk.clone(),
        std::sync::Arc::new(pdf_merge::LopdfBackend),
    );

    let summary = store.upload(vec![pdf_file("a.pdf", 2, 100)]).await.unwrap();
    merge_and_wait(&store, summary.job_id, "out").await;
    assert_eq!(page_widths(&store.get_output(summary.job_id).await.unwrap().bytes).len(), 2);
    assert_eq!(disk.len(), 2);

    store.delete_job(summary.job_id).await;
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_touching_a_job_extends_retention() {
    let config = StoreConfig {
        retention: Duration::from_secs(60),
        ..Default::default()
    };
    let store = JobStore::new(config);
    let id = store.create_job();

    tokio::time::advance(Duration::from_secs(40)).await;
    store.get_state(id).unwrap();
    tokio::time::advance(Duration::from_secs(40)).await;
    assert_eq!(store.sweep_expired().await, 0);

    tokio::time::advance(Duration::from_secs(30)).await;
    assert_eq!(store.sweep_expired().await, 1);
    assert!(!store.contains(id));
}

#[tokio::test(start_paused = true)]
async fn test_downloaded_output_expires_after_grace_period() {
    let config = StoreConfig {
        retention: Duration::from_secs(3600),
        download_grace: Duration::from_secs(300),
        ..Default::default()
    };
    let store = JobStore::new(config);
    let summary = store.upload(vec![pdf_file("a.pdf", 1, 100)]).await.unwrap();
    merge_and_wait(&store, summary.job_id, "out").await;

    // Not downloaded yet, so only the retention window applies
    tokio::time::advance(Duration::from_secs(400)).await;
    assert_eq!(store.sweep_expired().await, 0);

    store.get_output(summary.job_id).await.unwrap();
    tokio::time::advance(Duration::from_secs(200)).await;
    assert_eq!(store.sweep_expired().await, 0);

    tokio::time::advance(Duration::from_secs(101)).await;
    assert_eq!(store.sweep_expired().await, 1);
    assert!(store.storage().is_empty());
}

#[tokio::test]
async fn test_store_config_file_drives_limits() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{"max_upload_bytes": 10}"#).unwrap();

    let config = StoreConfig::load(&path).await.unwrap();
    let store = JobStore::new(config);
    let result = store.upload(vec![pdf_file("a.pdf", 1, 100)]).await;
    assert!(matches!(result, Err(JobError::UploadTooLarge { limit: 10 })));
    assert_eq!(store.job_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_edits_on_one_job_stay_consistent() {
    let store = JobStore::new(StoreConfig::default());
    let id = store.create_job();

    let mut tasks = tokio::task::JoinSet::new();
    for i in 0..16 {
        let appender = Arc::clone(&store);
        tasks.spawn(async move {
            let file = if i % 4 == 3 {
                corrupt_file(&format!("bad{i}.pdf"))
            } else {
                pdf_file(&format!("doc{i}.pdf"), 1, 100 + i)
            };
            appender.append_documents(id, vec![file]).await.unwrap();
            0usize
        });

        let editor = Arc::clone(&store);
        tasks.spawn(async move {
            let valid = editor.snapshot(id).unwrap().valid_count();
            // Stale orderings are rejected, never half-applied
            match editor.reorder(id, &Reordering::Indices((0..valid).rev().collect())) {
                Ok(_) | Err(JobError::InvalidOrdering(_)) => {}
                Err(e) => panic!("Unexpected reorder error: {e}"),
            }
            if i % 5 == 0 {
                match editor.remove_document(id, 0).await {
                    Ok(_) => return 1,
                    Err(JobError::InvalidOrdering(_)) => {}
                    Err(e) => panic!("Unexpected remove error: {e}"),
                }
            }
            0
        });
    }

    let mut removed: usize = 0;
    while let Some(result) = tasks.join_next().await {
        removed += result.unwrap();
    }

    let snapshot = store.snapshot(id).unwrap();
    assert_eq!(snapshot.total_count(), 16 - removed);
    for (index, entry) in snapshot.entries.iter().enumerate() {
        assert_eq!(entry.position, index);
    }
    assert_eq!(store.storage().len(), snapshot.valid_count());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_delete_racing_appends_leaks_no_storage() {
    let store = JobStore::new(StoreConfig::default());
    let id = store.create_job();

    let mut tasks = tokio::task::JoinSet::new();
    for i in 0..8 {
        let appender = Arc::clone(&store);
        tasks.spawn(async move {
            let file = pdf_file(&format!("doc{i}.pdf"), 2, 100);
            match appender.append_documents(id, vec![file]).await {
                Ok(_) | Err(JobError::NotFound(_)) => {}
                Err(e) => panic!("Unexpected append error: {e}"),
            }
        });
    }
    let deleter = Arc::clone(&store);
    tasks.spawn(async move { deleter.delete_job(id).await });

    while let Some(result) = tasks.join_next().await {
        result.unwrap();
    }

    assert!(!store.contains(id));
    assert!(store.storage().is_empty());
}

/// Counts blob calls made on the thread driving the runtime
struct ThreadCheckingStore {
    inner: MemoryStore,
    runtime_thread: std::thread::ThreadId,
    calls: std::sync::atomic::AtomicUsize,
    on_runtime: std::sync::atomic::AtomicUsize,
}

impl ThreadCheckingStore {
    fn record(&self) {
        use std::sync::atomic::Ordering;
        self.calls.fetch_add(1, Ordering::SeqCst);
        if std::thread::current().id() == self.runtime_thread {
            self.on_runtime.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl BlobStore for ThreadCheckingStore {
    fn put(&self, key: BlobKey, bytes: bytes::Bytes) -> std::result::Result<BlobHandle, StorageError> {
        self.record();
        self.inner.put(key, bytes)
    }

    fn get(&self, handle: &BlobHandle) -> std::result::Result<bytes::Bytes, StorageError> {
        self.record();
        self.inner.get(handle)
    }

    fn release(&self, handle: &BlobHandle) {
        self.record();
        self.inner.release(handle)
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}

#[tokio::test]
async fn test_blob_storage_stays_off_the_runtime_thread() {
    use std::sync::atomic::Ordering;

    let blobs = Arc::new(ThreadCheckingStore {
        inner: MemoryStore::new(),
        runtime_thread: std::thread::current().id(),
        calls: Default::default(),
        on_runtime: Default::default(),
    });
    let store = JobStore::with_parts(
        StoreConfig::default(),
        blobs.clone(),
        Arc::new(pdf_merge::LopdfBackend),
    );

    let summary = store
        .upload(vec![
            pdf_file("a.pdf", 1, 100),
            pdf_file("b.pdf", 2, 200),
            pdf_file("c.pdf", 1, 300),
        ])
        .await
        .unwrap();
    store.remove_document(summary.job_id, 2).await.unwrap();
    merge_and_wait(&store, summary.job_id, "out").await;
    store.get_output(summary.job_id).await.unwrap();
    store.delete_job(summary.job_id).await;

    assert!(blobs.is_empty());
    assert!(blobs.calls.load(Ordering::SeqCst) >= 8);
    assert_eq!(blobs.on_runtime.load(Ordering::SeqCst), 0);
}
