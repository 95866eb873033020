//! # Job Tracker
//!
//! The caller-facing side of the job lifecycle: submit a file, poll its
//! status, delete its files. Handlers talk to this instead of the store and
//! queue directly.

use crate::jobs::queue::{EnhancementTask, JobQueue, QueueStats};
use crate::jobs::record::{JobRecord, JobStatus};
use crate::jobs::store::JobStore;
use crate::retention::{DeleteOutcome, RetentionManager};
use anyhow::Result;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Everything needed to queue one upload.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub task_id: String,
    pub filename: String,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub attenuation_limit_db: Option<f32>,
    pub output_gain_db: Option<f32>,
}

/// What a polling client sees.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSnapshot {
    pub task_id: String,
    pub status: JobStatus,
    pub progress: u8,
    pub queue_position: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_ready: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_size_mb: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_until_deletion_seconds: Option<u64>,
}

impl JobSnapshot {
    /// Unknown ids are reported as queued: the job may simply not have been
    /// recorded yet.
    fn unknown(task_id: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            status: JobStatus::Queued,
            progress: 0,
            queue_position: 0,
            error: None,
            download_ready: None,
            duration_seconds: None,
            output_size_bytes: None,
            output_size_mb: None,
            time_until_deletion_seconds: None,
        }
    }
}

/// Files removed by a manual delete.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeletionReport {
    pub task_id: String,
    pub deleted_files: Vec<String>,
}

pub struct JobTracker {
    store: Arc<JobStore>,
    queue: Arc<dyn JobQueue>,
    retention: Arc<RetentionManager>,
}

impl JobTracker {
    pub fn new(store: Arc<JobStore>, queue: Arc<dyn JobQueue>, retention: Arc<RetentionManager>) -> Self {
        Self { store, queue, retention }
    }

    /// Record a queued job and hand it to the queue.
    ///
    /// The queue position is the number of active plus reserved jobs at this
    /// moment. If the queue refuses the task, the record is removed again.
    pub fn submit(&self, request: SubmitRequest) -> Result<JobRecord> {
        let queue_position = self.queue.inspect().total();

        let record = JobRecord::queued(
            request.task_id.clone(),
            request.filename,
            request.input_path.clone(),
            request.output_path.clone(),
            queue_position,
        );
        self.store.put(&record)?;

        let task = EnhancementTask {
            task_id: request.task_id,
            input_path: request.input_path,
            output_path: request.output_path,
            attenuation_limit_db: request.attenuation_limit_db,
            output_gain_db: request.output_gain_db,
        };

        if let Err(e) = self.queue.submit(task) {
            if let Err(cleanup) = self.store.remove(&record.task_id) {
                warn!(task_id = %record.task_id, "Failed to remove orphaned job record: {}", cleanup);
            }
            return Err(e);
        }

        info!(task_id = %record.task_id, queue_position, "Processing task submitted");
        Ok(record)
    }

    pub fn record(&self, task_id: &str) -> Result<Option<JobRecord>> {
        self.store.get(task_id)
    }

    /// Current status of a job.
    pub fn status(&self, task_id: &str) -> Result<JobSnapshot> {
        let Some(record) = self.store.get(task_id)? else {
            return Ok(JobSnapshot::unknown(task_id));
        };

        let mut snapshot = JobSnapshot {
            task_id: record.task_id.clone(),
            status: record.status,
            progress: record.progress,
            queue_position: record.queue_position,
            error: None,
            download_ready: None,
            duration_seconds: None,
            output_size_bytes: None,
            output_size_mb: None,
            time_until_deletion_seconds: None,
        };

        match record.status {
            JobStatus::Completed => {
                if let Some(output) = record.output_path.as_deref().filter(|p| p.exists()) {
                    snapshot.download_ready = Some(true);
                    snapshot.duration_seconds = record.duration_seconds;
                    snapshot.output_size_bytes = record.output_size_bytes;
                    snapshot.output_size_mb = record.output_size_mb();
                    snapshot.time_until_deletion_seconds = Some(self.retention.time_until_deletion(output));
                }
            }
            JobStatus::Failed => {
                snapshot.error = Some(record.error.clone().unwrap_or_else(|| "Unknown error".to_string()));
            }
            JobStatus::Queued | JobStatus::Processing => {}
        }

        Ok(snapshot)
    }

    /// Delete every file belonging to a job and forget the job.
    ///
    /// Idempotent: unknown ids and already-deleted files simply produce an
    /// empty report.
    pub fn delete(&self, task_id: &str) -> Result<DeletionReport> {
        let mut deleted_files = Vec::new();

        if let Some(record) = self.store.get(task_id)? {
            let mut candidates = vec![record.input_path.clone(), record.requested_output_path.clone()];
            if let Some(output) = record.output_path.clone() {
                if !candidates.contains(&output) {
                    candidates.push(output);
                }
            }

            for path in candidates {
                if self.retention.delete(&path) == DeleteOutcome::Deleted {
                    let name = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| path.display().to_string());
                    deleted_files.push(name);
                }
            }

            self.store.remove(task_id)?;
        }

        Ok(DeletionReport {
            task_id: task_id.to_string(),
            deleted_files,
        })
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.queue.inspect()
    }

    #[cfg(test)]
    pub(crate) fn store(&self) -> &JobStore {
        &self.store
    }
}
