/// Observer for reporting replicate completion while a batch runs.
///
/// Callbacks arrive from worker threads in completion order, not index order.
/// Observers see progress only; they cannot influence any outcome.
pub trait BatchProgressObserver: Sync {
    fn on_batch_start(&self, total_replicates: usize) {
        let _ = total_replicates;
    }
    fn on_replicate_finish(&self, index: usize, succeeded: bool) {
        let _ = (index, succeeded);
    }
    fn on_batch_finish(&self, failures: usize) {
        let _ = failures;
    }
}

#[derive(Default)]
pub struct NoopBatchProgress;

impl BatchProgressObserver for NoopBatchProgress {}
