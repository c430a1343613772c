//! Application state management
//!
//! Author: hephaex@gmail.com

use qgate_core::config::AppConfig;
use qgate_core::{build_evaluator, AuditSink, Decision, Evaluator, KeySetError, TracingAuditSink};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Application state shared across handlers
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Authorization evaluator
    pub evaluator: Evaluator,
    /// HTTP client for the upstream vector database
    pub upstream: reqwest::Client,
    /// Server start time
    pub start_time: Instant,
    /// Request counter
    pub request_count: AtomicU64,
    /// Requests forwarded upstream
    pub allowed_count: AtomicU64,
    /// Requests rejected by the evaluator
    pub denied_count: AtomicU64,
}

impl AppState {
    /// Create application state with audit records going to `tracing`
    pub fn new(config: AppConfig) -> qgate_core::Result<Self> {
        Self::with_audit_sink(config, Arc::new(TracingAuditSink))
    }

    pub fn with_audit_sink(config: AppConfig, sink: Arc<dyn AuditSink>) -> qgate_core::Result<Self> {
        let evaluator = build_evaluator(&config.auth, sink)?;
        let upstream = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.server.request_timeout_secs))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build upstream client: {e}"))?;

        Ok(Self {
            config,
            evaluator,
            upstream,
            start_time: Instant::now(),
            request_count: AtomicU64::new(0),
            allowed_count: AtomicU64::new(0),
            denied_count: AtomicU64::new(0),
        })
    }

    /// Increment request counter
    pub fn increment_requests(&self) -> u64 {
        self.request_count.fetch_add(1, Ordering::Relaxed)
    }

    /// Count an evaluator decision
    pub fn record_decision(&self, decision: Decision) {
        if decision.is_allowed() {
            self.allowed_count.fetch_add(1, Ordering::Relaxed);
        } else {
            self.denied_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Get total request count
    pub fn get_request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    pub fn get_allowed_count(&self) -> u64 {
        self.allowed_count.load(Ordering::Relaxed)
    }

    pub fn get_denied_count(&self) -> u64 {
        self.denied_count.load(Ordering::Relaxed)
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Ready once a non-empty key set is published
    pub fn is_ready(&self) -> bool {
        !self.evaluator.keys().is_empty()
    }

    /// Number of keys in the published set
    pub fn key_count(&self) -> usize {
        self.evaluator.keys().len()
    }

    /// Re-read configuration and publish the new key set.
    ///
    /// Only the key set is swapped; server and upstream settings need a
    /// restart.
    pub fn reload_keys(&self, config: &AppConfig) -> Result<usize, KeySetError> {
        self.evaluator.keys().reload_from(&config.auth.keys)
    }
}
