//! # Job Record
//!
//! The state machine for one submitted file.
//!
//! ## State Transitions:
//! ```text
//! queued ──► processing ──► completed
//!                 │
//!                 └───────► failed
//! ```
//! `completed` and `failed` are terminal. Transitions never mutate a record in
//! place: each returns a new record that replaces the stored one, so readers
//! always see a complete snapshot.

use crate::enhance::EnhancementOutcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Progress percentage reported for this status.
    pub fn progress(&self) -> u8 {
        match self {
            JobStatus::Queued => 0,
            JobStatus::Processing => 50,
            JobStatus::Completed => 100,
            JobStatus::Failed => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An illegal status change was requested.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("task {task_id} cannot move from {from} to {to}")]
pub struct TransitionError {
    pub task_id: String,
    pub from: JobStatus,
    pub to: JobStatus,
}

/// Everything known about one job.
///
/// ## Field Availability:
/// - `error`: only when `failed`
/// - `output_path`, `duration_seconds`, `output_size_bytes`, `sample_rate`: only when `completed`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub task_id: String,
    /// Original upload file name
    pub filename: String,
    pub status: JobStatus,
    pub progress: u8,
    /// Jobs ahead of this one at submission time
    pub queue_position: usize,
    pub input_path: PathBuf,
    /// Path handed to the enhancer; the written file may differ
    pub requested_output_path: PathBuf,
    pub output_path: Option<PathBuf>,
    pub error: Option<String>,
    pub duration_seconds: Option<f64>,
    pub output_size_bytes: Option<u64>,
    pub sample_rate: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    /// A freshly submitted job.
    pub fn queued(
        task_id: impl Into<String>,
        filename: impl Into<String>,
        input_path: PathBuf,
        requested_output_path: PathBuf,
        queue_position: usize,
    ) -> Self {
        let now = Utc::now();
        Self {
            task_id: task_id.into(),
            filename: filename.into(),
            status: JobStatus::Queued,
            progress: JobStatus::Queued.progress(),
            queue_position,
            input_path,
            requested_output_path,
            output_path: None,
            error: None,
            duration_seconds: None,
            output_size_bytes: None,
            sample_rate: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn check(&self, allowed_from: JobStatus, to: JobStatus) -> Result<(), TransitionError> {
        if self.status == allowed_from {
            Ok(())
        } else {
            Err(TransitionError {
                task_id: self.task_id.clone(),
                from: self.status,
                to,
            })
        }
    }

    fn with_status(&self, status: JobStatus) -> Self {
        Self {
            status,
            progress: status.progress(),
            queue_position: 0,
            updated_at: Utc::now(),
            ..self.clone()
        }
    }

    /// `queued → processing`
    pub fn begin_processing(&self) -> Result<Self, TransitionError> {
        self.check(JobStatus::Queued, JobStatus::Processing)?;
        Ok(self.with_status(JobStatus::Processing))
    }

    /// `processing → completed`, attaching the enhancement outcome.
    pub fn complete(&self, outcome: &EnhancementOutcome) -> Result<Self, TransitionError> {
        self.check(JobStatus::Processing, JobStatus::Completed)?;
        Ok(Self {
            output_path: Some(outcome.output_path.clone()),
            duration_seconds: Some(outcome.duration_seconds),
            output_size_bytes: Some(outcome.output_size_bytes),
            sample_rate: Some(outcome.sample_rate),
            ..self.with_status(JobStatus::Completed)
        })
    }

    /// `processing → failed`, keeping the error message verbatim.
    pub fn fail(&self, error: impl Into<String>) -> Result<Self, TransitionError> {
        self.check(JobStatus::Processing, JobStatus::Failed)?;
        Ok(Self {
            error: Some(error.into()),
            ..self.with_status(JobStatus::Failed)
        })
    }

    /// Output size in megabytes, rounded to two decimals.
    pub fn output_size_mb(&self) -> Option<f64> {
        self.output_size_bytes
            .map(|bytes| (bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0)
    }
}
