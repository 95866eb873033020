//! # Job Queue
//!
//! Hands enhancement tasks to a pool of workers.
//!
//! ## Local Worker Pool:
//! - Tasks go onto an unbounded tokio channel
//! - `workers` async tasks share the receiving end; each owns its own
//!   `Enhancer` (and therefore its own model instance)
//! - `process_file` is CPU-bound and synchronous, so it runs on tokio's
//!   blocking pool while the worker awaits it
//! - Each worker writes `processing`, then `completed` or `failed`, to the job store
//!
//! ## Counters:
//! `reserved` counts tasks submitted but not yet picked up; `active` counts
//! tasks currently being processed. Their sum is a new job's queue position.

use crate::enhance::Enhancer;
use crate::jobs::store::JobStore;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// One unit of work for a worker.
#[derive(Debug, Clone, PartialEq)]
pub struct EnhancementTask {
    pub task_id: String,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub attenuation_limit_db: Option<f32>,
    pub output_gain_db: Option<f32>,
}

/// Snapshot of the queue's load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub active: usize,
    pub reserved: usize,
}

impl QueueStats {
    pub fn total(&self) -> usize {
        self.active + self.reserved
    }
}

/// Where submitted jobs go.
pub trait JobQueue: Send + Sync {
    fn submit(&self, task: EnhancementTask) -> anyhow::Result<()>;

    fn inspect(&self) -> QueueStats;
}

#[derive(Debug, Default)]
struct QueueCounters {
    active: AtomicUsize,
    reserved: AtomicUsize,
}

type SharedReceiver = Arc<Mutex<mpsc::UnboundedReceiver<EnhancementTask>>>;

/// In-process worker pool.
pub struct LocalJobQueue {
    sender: mpsc::UnboundedSender<EnhancementTask>,
    counters: Arc<QueueCounters>,
    workers: Vec<JoinHandle<()>>,
}

impl LocalJobQueue {
    /// Spawn `workers` workers. `factory` builds the `Enhancer` for worker `i`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<F>(workers: usize, store: Arc<JobStore>, factory: F) -> Self
    where
        F: Fn(usize) -> Enhancer,
    {
        let (sender, receiver) = mpsc::unbounded_channel();
        let receiver: SharedReceiver = Arc::new(Mutex::new(receiver));
        let counters = Arc::new(QueueCounters::default());

        let handles = (0..workers.max(1))
            .map(|id| {
                let enhancer = Arc::new(factory(id));
                tokio::spawn(run_worker(
                    id,
                    enhancer,
                    receiver.clone(),
                    store.clone(),
                    counters.clone(),
                ))
            })
            .collect::<Vec<_>>();

        Self {
            sender,
            counters,
            workers: handles,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

impl JobQueue for LocalJobQueue {
    fn submit(&self, task: EnhancementTask) -> anyhow::Result<()> {
        self.counters.reserved.fetch_add(1, Ordering::SeqCst);
        if let Err(e) = self.sender.send(task) {
            self.counters.reserved.fetch_sub(1, Ordering::SeqCst);
            return Err(anyhow::anyhow!("Job queue is closed; task {} was not queued", e.0.task_id));
        }
        Ok(())
    }

    fn inspect(&self) -> QueueStats {
        QueueStats {
            active: self.counters.active.load(Ordering::SeqCst),
            reserved: self.counters.reserved.load(Ordering::SeqCst),
        }
    }
}

impl Drop for LocalJobQueue {
    fn drop(&mut self) {
        for worker in &self.workers {
            worker.abort();
        }
    }
}

async fn run_worker(
    id: usize,
    enhancer: Arc<Enhancer>,
    receiver: SharedReceiver,
    store: Arc<JobStore>,
    counters: Arc<QueueCounters>,
) {
    loop {
        // Only hold the receiver lock while waiting for the next task
        let task = {
            let mut receiver = receiver.lock().await;
            receiver.recv().await
        };

        let Some(task) = task else {
            info!(worker = id, "Job queue closed, worker exiting");
            break;
        };

        counters.reserved.fetch_sub(1, Ordering::SeqCst);
        counters.active.fetch_add(1, Ordering::SeqCst);

        process_task(id, &enhancer, &store, task).await;

        counters.active.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn process_task(worker: usize, enhancer: &Arc<Enhancer>, store: &JobStore, task: EnhancementTask) {
    let task_id = task.task_id.clone();
    info!(worker, task_id = %task_id, "Processing task");
    if !enhancer.is_ready() {
        info!(worker, "Enhancement model not loaded yet; first task will load it");
    }

    if let Err(e) = store.transition(&task_id, |record| record.begin_processing()) {
        warn!(task_id = %task_id, "Failed to mark task as processing: {}", e);
    }

    let runner = enhancer.clone();
    let result = tokio::task::spawn_blocking(move || {
        runner.process_file(
            &task.input_path,
            &task.output_path,
            task.attenuation_limit_db,
            task.output_gain_db,
        )
    })
    .await;

    let persisted = match result {
        Ok(Ok(outcome)) => {
            info!(
                task_id = %task_id,
                output = %outcome.output_path.display(),
                "Task completed"
            );
            store.transition(&task_id, |record| record.complete(&outcome))
        }
        Ok(Err(e)) => {
            error!(task_id = %task_id, "Task failed: {}", e);
            store.transition(&task_id, |record| record.fail(e.to_string()))
        }
        Err(e) => {
            error!(task_id = %task_id, "Worker crashed while processing task: {}", e);
            store.transition(&task_id, |record| record.fail(format!("Processing crashed: {}", e)))
        }
    };

    if let Err(e) = persisted {
        warn!(task_id = %task_id, "Failed to record task result: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioBuffer;
    use crate::config::AppConfig;
    use crate::enhance::testing::{MemoryIo, ScriptedLoader, Step};
    use crate::enhance::EnhancementSettings;
    use crate::jobs::record::{JobRecord, JobStatus};
    use crate::jobs::store::MemoryCache;
    use std::time::Duration;

    fn settings() -> EnhancementSettings {
        let mut config = AppConfig::default().enhancement;
        config.init_backoff_ms = 0;
        EnhancementSettings::from_config(&config)
    }

    fn queue_with(steps: fn() -> Vec<Step>) -> (LocalJobQueue, Arc<JobStore>) {
        let store = Arc::new(JobStore::new(Arc::new(MemoryCache::new()), Duration::from_secs(60)));
        let queue = LocalJobQueue::start(2, store.clone(), move |_| {
            let io = Arc::new(MemoryIo::new(AudioBuffer::new(vec![0.2; 4800], 48000), false));
            let (loader, _) = ScriptedLoader::new(steps());
            Enhancer::new(settings(), Box::new(loader), io)
        });
        (queue, store)
    }

    async fn wait_for_terminal(store: &JobStore, task_id: &str) -> JobRecord {
        for _ in 0..200 {
            if let Some(record) = store.get(task_id).unwrap() {
                if matches!(record.status, JobStatus::Completed | JobStatus::Failed) {
                    return record;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("task {} never finished", task_id);
    }

    fn submit(queue: &LocalJobQueue, store: &JobStore, dir: &tempfile::TempDir, task_id: &str) {
        let input = dir.path().join(format!("{}.wav", task_id));
        std::fs::write(&input, b"fake").unwrap();
        let output = dir.path().join(format!("enhanced_{}.wav", task_id));

        store
            .put(&JobRecord::queued(task_id, "memo.wav", input.clone(), output.clone(), 0))
            .unwrap();
        queue
            .submit(EnhancementTask {
                task_id: task_id.to_string(),
                input_path: input,
                output_path: output,
                attenuation_limit_db: None,
                output_gain_db: None,
            })
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_tasks_complete() {
        let dir = tempfile::tempdir().unwrap();
        let (queue, store) = queue_with(Vec::new);
        assert_eq!(queue.worker_count(), 2);

        submit(&queue, &store, &dir, "one");
        submit(&queue, &store, &dir, "two");

        for task_id in ["one", "two"] {
            let record = wait_for_terminal(&store, task_id).await;
            assert_eq!(record.status, JobStatus::Completed);
            assert_eq!(record.progress, 100);
            assert_eq!(record.duration_seconds, Some(0.1));
            assert!(record.output_path.unwrap().exists());
        }

        // Counters settle just after the final transition is written
        for _ in 0..100 {
            if queue.inspect().total() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(queue.inspect(), QueueStats { active: 0, reserved: 0 });
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_failed_task_records_error() {
        let dir = tempfile::tempdir().unwrap();
        let (queue, store) = queue_with(|| vec![Step::SucceedFailing]);

        submit(&queue, &store, &dir, "bad");

        let record = wait_for_terminal(&store, "bad").await;
        assert_eq!(record.status, JobStatus::Failed);
        assert!(record.error.unwrap().contains("CUDA out of memory"));
        assert!(record.output_path.is_none());
    }

    #[test]
    fn test_queue_stats_total() {
        let stats = QueueStats { active: 2, reserved: 3 };
        assert_eq!(stats.total(), 5);
    }
}
