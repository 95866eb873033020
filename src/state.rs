//! # Application State Management
//!
//! Shared state handed to every HTTP handler through `web::Data<AppState>`.
//!
//! ## Contents:
//! - **config**: Immutable application configuration
//! - **metrics**: Request counters, updated by `MetricsMiddleware` on every request
//! - **tracker**: Job submission, polling and deletion
//! - **start_time**: For uptime reporting
//!
//! ## Arc<RwLock<T>> Pattern
//! Metrics are written by every request and read by the health and metrics
//! endpoints, so they sit behind a reader-writer lock. Everything else is
//! either immutable or synchronizes internally, so a plain `Arc` is enough.

use crate::config::AppConfig;
use crate::jobs::JobTracker;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};
use std::time::Instant;

/// The main application state shared across all HTTP request handlers.
///
/// Cloning is cheap: every field is reference counted or `Copy`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,

    /// Performance metrics (constantly being updated by requests)
    pub metrics: Arc<RwLock<AppMetrics>>,

    pub tracker: Arc<JobTracker>,

    /// When the server started
    pub start_time: Instant,
}

/// Metrics collected across all HTTP requests.
///
/// ## Why these metrics matter:
/// - **request_count** / **error_count**: load and reliability
/// - **uploads_accepted** / **upload_bytes**: how much audio the service is taking in
/// - **endpoint_metrics**: per-route latency and error rates
#[derive(Debug, Default, Clone)]
pub struct AppMetrics {
    pub request_count: u64,
    pub error_count: u64,
    pub uploads_accepted: u64,
    pub upload_bytes: u64,

    /// Key: route pattern (e.g., "GET /api/status/{task_id}")
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Performance metrics for one route.
///
/// ## Performance calculations:
/// - **Average response time**: total_duration_ms / request_count
/// - **Error rate**: error_count / request_count
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

impl AppState {
    pub fn new(config: AppConfig, tracker: Arc<JobTracker>) -> Self {
        Self {
            config: Arc::new(config),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            tracker,
            start_time: Instant::now(),
        }
    }

    pub fn get_config(&self) -> &AppConfig {
        &self.config
    }

    fn metrics_mut(&self) -> RwLockWriteGuard<'_, AppMetrics> {
        self.metrics.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Called by middleware for every request.
    pub fn increment_request_count(&self) {
        self.metrics_mut().request_count += 1;
    }

    /// Called for every 4xx/5xx response.
    pub fn increment_error_count(&self) {
        self.metrics_mut().error_count += 1;
    }

    /// Called by the upload handler once a file has been queued.
    pub fn record_upload(&self, bytes: u64) {
        let mut metrics = self.metrics_mut();
        metrics.uploads_accepted += 1;
        metrics.upload_bytes += bytes;
    }

    /// Record timing and outcome for a specific route.
    ///
    /// ## Parameters:
    /// - **endpoint**: Method plus route pattern (e.g., "GET /api/download/{task_id}")
    /// - **duration_ms**: How long the request took to process
    /// - **is_error**: Whether this request resulted in an error
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics_mut();
        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();

        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;

        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// Consistent copy of the current metrics, taken without holding the
    /// lock while a response is serialized.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        self.metrics.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl AppMetrics {
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

impl EndpointMetric {
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0  // No requests yet, so no average to calculate
        }
    }

    /// Error rate from 0.0 (no errors) to 1.0 (every request failed).
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}
