//! # Job Lifecycle
//!
//! Asynchronous processing of uploaded files.
//!
//! ## Key Components:
//! - **Record**: Per-job state machine (`queued → processing → completed | failed`)
//! - **Store**: Job records in an expiring metadata cache
//! - **Queue**: Worker pool that runs the enhancement pipeline
//! - **Tracker**: Submit, poll and delete, as used by the HTTP handlers

pub mod queue;    // Worker pool
pub mod record;   // Job state machine
pub mod store;    // Metadata persistence
pub mod tracker;  // Caller-facing operations

pub use queue::{LocalJobQueue, QueueStats};
pub use record::JobStatus;
pub use store::{JobStore, MemoryCache};
pub use tracker::{JobTracker, SubmitRequest};
