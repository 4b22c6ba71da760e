//! Worker pool and coordination. A shared queue fans subsystem identifiers
//! out to `thread_count` workers; there are no inter-subsystem dependencies,
//! so workers only share the storage backend and the result map.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use models::{Subsystem, SubsystemId};
use storage::Storage;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::processor::Processor;

type Results = Arc<Mutex<BTreeMap<String, Subsystem>>>;
type Queue = Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<SubsystemId>>>;

pub struct Coordinator {
    storage: Arc<dyn Storage>,
    processor: Arc<Processor>,
    thread_count: usize,
}

impl Coordinator {
    pub fn new(storage: Arc<dyn Storage>, processor: Processor, thread_count: usize) -> Self {
        Self {
            storage,
            processor: Arc::new(processor),
            thread_count: thread_count.max(1),
        }
    }

    /// Process every subsystem and return the collected results keyed by
    /// subsystem path. An interrupt aborts the run: documents stored so far
    /// are durable and the next run will reuse them, but no snapshot is
    /// written.
    pub async fn run(
        &self,
        subsystems: Vec<SubsystemId>,
    ) -> anyhow::Result<BTreeMap<String, Subsystem>> {
        let results: Results = Arc::new(Mutex::new(BTreeMap::new()));
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let queue: Queue = Arc::new(tokio::sync::Mutex::new(queue_rx));

        // Workers start first and tolerate an empty queue.
        let mut workers = JoinSet::new();
        for _ in 0..self.thread_count {
            let worker = Worker {
                storage: self.storage.clone(),
                processor: self.processor.clone(),
                results: results.clone(),
                queue: queue.clone(),
            };
            workers.spawn(worker.run());
        }

        for subsystem in subsystems {
            // Send can only fail when every worker is gone, and workers only
            // exit once the queue closes.
            let _ = queue_tx.send(subsystem);
        }
        // Closing the queue is the shutdown signal.
        drop(queue_tx);

        let drained = async {
            while let Some(joined) = workers.join_next().await {
                joined?;
            }
            Ok::<(), tokio::task::JoinError>(())
        };
        tokio::select! {
            joined = drained => joined?,
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("interrupt received, abandoning this catalogue version");
                anyhow::bail!("interrupted");
            }
        }

        let results = std::mem::take(
            &mut *results.lock().expect("no worker holds the result lock anymore"),
        );
        Ok(results)
    }
}

struct Worker {
    storage: Arc<dyn Storage>,
    processor: Arc<Processor>,
    results: Results,
    queue: Queue,
}

impl Worker {
    async fn run(self) {
        loop {
            let subsystem = self.queue.lock().await.recv().await;
            let Some(subsystem) = subsystem else {
                // Queue closed and drained.
                return;
            };
            let path = subsystem.path();

            // Empty the work queue without processing when the storage
            // backend has failed; the run is already lost.
            if !self.storage.active() {
                tracing::info!(subsystem = %path, "skipping because of storage failure");
                continue;
            }

            tracing::info!(subsystem = %path, "start processing");
            match self.processor.process(&subsystem).await {
                Ok(record) => {
                    self.results
                        .lock()
                        .expect("result lock is never poisoned")
                        .insert(path, record);
                }
                // Catch everything so that a single subsystem cannot take
                // the worker down; the snapshot stays complete.
                Err(err) => {
                    tracing::warn!(subsystem = %path, error = %err, "unexpected failure, recording subsystem as failed");
                    self.results
                        .lock()
                        .expect("result lock is never poisoned")
                        .insert(path, Subsystem::failed(&subsystem));
                }
            }
        }
    }
}
