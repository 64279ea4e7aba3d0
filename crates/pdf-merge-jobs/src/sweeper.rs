use crate::store::JobStore;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Periodically delete expired jobs from `store`.
///
/// The task only holds a weak reference and stops once the store is dropped.
pub fn spawn_sweeper(store: &Arc<JobStore>) -> JoinHandle<()> {
    let period = store.config().sweep_interval;
    let store = Arc::downgrade(store);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let Some(store) = store.upgrade() else {
                log::debug!("Job store dropped, stopping sweeper");
                break;
            };
            let evicted = store.sweep_expired().await;
            if evicted > 0 {
                log::info!(
                    "Retention sweep removed {} job(s), {} remaining",
                    evicted,
                    store.job_count()
                );
            }
        }
    })
}
