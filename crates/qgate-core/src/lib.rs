//! qgate Core - API keys, key registry and the authorization evaluator
//!
//! This crate defines everything the gateway needs to decide whether a
//! request may reach the vector database:
//! - Typed key model (permissions, collection scope, redacted secrets)
//! - Immutable key sets published through an atomic registry
//! - The authorization evaluator and its deny reasons
//! - Audit records and sinks
//! - Configuration management

pub mod audit;
pub mod config;
pub mod evaluator;
pub mod key;
pub mod keyset;

pub use audit::{AuditRecord, AuditSink, MemoryAuditSink, TracingAuditSink};
pub use config::{AppConfig, AuthConfig, ConfigError, KeyConfig, UpstreamConfig};
pub use evaluator::{
    AccessRequest, Decision, DenyKind, DenyReason, Evaluator, InstanceScopePolicy, KeyIdentity,
    RequestOrigin, Verdict,
};
pub use key::{ApiKey, ApiKeyRecord, CollectionScope, KeyPolicy, Operation, Permissions};
pub use keyset::{KeyRegistry, KeySet, KeySetError};

use std::sync::Arc;
use thiserror::Error;

/// Core error types for qgate operations
#[derive(Error, Debug)]
pub enum GateError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Key set error: {0}")]
    KeySet(#[from] KeySetError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, GateError>;

/// Build an evaluator from configuration
///
/// The key set is loaded once here; later reloads go through
/// [`KeyRegistry::reload_from`] on `evaluator.keys()`.
pub fn build_evaluator(config: &AuthConfig, sink: Arc<dyn AuditSink>) -> Result<Evaluator> {
    let keys = KeySet::from_config(&config.keys)?;
    let registry = Arc::new(KeyRegistry::new(keys));

    Ok(Evaluator::new(registry, sink).with_policy(config.instance_scope))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_evaluator_from_config() {
        let mut auth = AuthConfig::default();
        auth.keys.insert(
            "admin".to_string(),
            KeyConfig::new("admin-key", Permissions::ADMIN),
        );
        auth.instance_scope = InstanceScopePolicy::Allow;

        let sink = Arc::new(MemoryAuditSink::new());
        let evaluator = build_evaluator(&auth, sink.clone()).unwrap();

        assert_eq!(evaluator.policy(), InstanceScopePolicy::Allow);
        assert_eq!(evaluator.keys().len(), 1);
        assert!(evaluator
            .evaluate(&AccessRequest::new("admin-key", Operation::Write).on_collection("orders"))
            .is_allowed());
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_build_evaluator_rejects_duplicates() {
        let mut auth = AuthConfig::default();
        auth.keys
            .insert("a".to_string(), KeyConfig::new("same", Permissions::ADMIN));
        auth.keys
            .insert("b".to_string(), KeyConfig::new("same", Permissions::READ_ONLY));

        let err = build_evaluator(&auth, Arc::new(TracingAuditSink)).unwrap_err();
        assert!(matches!(err, GateError::KeySet(KeySetError::DuplicateKey { .. })));
    }
}
