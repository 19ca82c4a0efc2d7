use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::engine::{SfuEngine, SfuError, SfuWorker, WorkerSettings};

/// Fixed pool of SFU workers, one per logical CPU at startup. Routers are
/// assigned to workers round-robin. Worker death is the one fatal failure
/// mode of the server; the `on_died` hook is expected to take the process
/// down.
pub struct WorkerPool {
    workers: Vec<Arc<dyn SfuWorker>>,
    next: AtomicUsize,
}

impl WorkerPool {
    pub async fn spawn(
        engine: &dyn SfuEngine,
        size: usize,
        settings: WorkerSettings,
        on_died: Arc<dyn Fn(&str) + Send + Sync>,
    ) -> Result<Self, SfuError> {
        let size = size.max(1);
        let mut workers = Vec::with_capacity(size);
        for _ in 0..size {
            let worker = engine.spawn_worker(settings.clone()).await?;
            let hook = Arc::clone(&on_died);
            worker.on_died(Box::new(move |worker_id| hook(worker_id)));
            tracing::debug!(worker_id = %worker.id(), "sfu worker spawned");
            workers.push(worker);
        }
        tracing::info!(workers = workers.len(), "sfu worker pool ready");
        Ok(Self {
            workers,
            next: AtomicUsize::new(0),
        })
    }

    pub fn next_worker(&self) -> Arc<dyn SfuWorker> {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.workers.len();
        Arc::clone(&self.workers[index])
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}
