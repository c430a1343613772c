//! Authorization audit trail
//!
//! Every evaluation produces one `AuditRecord`. Records identify keys by
//! fingerprint only; the raw key never leaves the evaluator.
//!
//! The default sink logs through `tracing` with the "audit" target, so
//! audit events can be filtered and routed separately from application
//! logs. Allowed requests are logged at INFO, denials at WARN.
//!
//! # Example
//!
//! ```ignore
//! use qgate_core::audit::{AuditSink, TracingAuditSink};
//!
//! let sink = TracingAuditSink;
//! sink.record(&record);
//! ```
//!
//! Author: hephaex@gmail.com

use crate::key::Operation;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::{info, warn};

/// One authorization decision, ready for an audit pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    /// Fingerprint of the presented key (absent when no key was sent)
    pub key_id: Option<String>,
    /// Label of the matched key, if any
    pub key_name: Option<String>,
    pub operation: Option<Operation>,
    pub collection: Option<String>,
    /// "allow" or "deny"
    pub decision: String,
    /// Reason code, "allowed" for granted requests
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl AuditRecord {
    pub fn is_allowed(&self) -> bool {
        self.decision == "allow"
    }
}

/// Destination for audit records
pub trait AuditSink: Send + Sync {
    fn record(&self, record: &AuditRecord);
}

/// Logs audit records via `tracing` with the "audit" target
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: &AuditRecord) {
        let event_json = serde_json::to_string(record)
            .unwrap_or_else(|e| format!("{{\"error\":\"Failed to serialize audit record: {e}\"}}"));

        if record.is_allowed() {
            info!(
                target: "audit",
                timestamp = %record.timestamp,
                event = %event_json,
                key_id = ?record.key_id,
                key_name = ?record.key_name,
                operation = ?record.operation,
                collection = ?record.collection,
                "Access allowed"
            );
        } else {
            warn!(
                target: "audit",
                timestamp = %record.timestamp,
                event = %event_json,
                key_id = ?record.key_id,
                operation = ?record.operation,
                collection = ?record.collection,
                reason = %record.reason,
                ip_address = ?record.ip_address,
                "Access denied"
            );
        }
    }
}

/// Keeps audit records in memory
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, record: &AuditRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(decision: &str, reason: &str) -> AuditRecord {
        AuditRecord {
            timestamp: Utc::now(),
            key_id: Some("ba7816bf8f01cfea".to_string()),
            key_name: None,
            operation: Some(Operation::Write),
            collection: Some("products".to_string()),
            decision: decision.to_string(),
            reason: reason.to_string(),
            ip_address: Some("192.168.1.1".to_string()),
            user_agent: None,
        }
    }

    #[test]
    fn test_audit_record_serialization() {
        let json = serde_json::to_string(&sample("deny", "write_not_permitted")).unwrap();

        assert!(json.contains("\"decision\":\"deny\""));
        assert!(json.contains("\"reason\":\"write_not_permitted\""));
        assert!(json.contains("\"operation\":\"write\""));
        assert!(!json.contains("user_agent"));
    }

    #[test]
    fn test_tracing_sink_does_not_panic() {
        TracingAuditSink.record(&sample("allow", "allowed"));
        TracingAuditSink.record(&sample("deny", "unknown_key"));
    }

    #[test]
    fn test_memory_sink_collects() {
        let sink = MemoryAuditSink::new();
        assert!(sink.is_empty());

        sink.record(&sample("allow", "allowed"));
        sink.record(&sample("deny", "collection_not_permitted"));

        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert!(records[0].is_allowed());
        assert!(!records[1].is_allowed());
    }
}
