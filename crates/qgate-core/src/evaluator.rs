//! Authorization evaluator
//!
//! Decides ALLOW or DENY for a presented key, an operation kind and an
//! optional target collection. Checks run in a fixed order:
//!
//! 1. missing key or operation -> `malformed_request`
//! 2. key not configured -> `unknown_key`
//! 3. write without write flag -> `write_not_permitted`
//! 4. read without read flag -> `read_not_permitted`
//! 5. collection outside the key's scope -> `collection_not_permitted`
//! 6. instance-level request with a scoped key -> `collection_scope_required`
//!    (unless [`InstanceScopePolicy::Allow`] is configured)
//!
//! Evaluation reads one snapshot of the key registry, performs no I/O and
//! hands exactly one [`AuditRecord`] to the configured sink.
//!
//! Author: hephaex@gmail.com

use crate::audit::{AuditRecord, AuditSink};
use crate::key::{fingerprint, ApiKeyRecord, Operation, Permissions};
use crate::keyset::{KeyRegistry, KeySet};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Client metadata carried for the audit trail only
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOrigin {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// A request to be authorized
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessRequest {
    /// Presented key, if any
    pub key: Option<String>,
    pub operation: Option<Operation>,
    /// Target collection; `None` for instance-level operations
    pub collection: Option<String>,
    pub origin: RequestOrigin,
}

impl AccessRequest {
    pub fn new(key: impl Into<String>, operation: Operation) -> Self {
        Self {
            key: Some(key.into()),
            operation: Some(operation),
            collection: None,
            origin: RequestOrigin::default(),
        }
    }

    pub fn on_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    pub fn with_origin(mut self, origin: RequestOrigin) -> Self {
        self.origin = origin;
        self
    }

    fn presented_key(&self) -> Option<&str> {
        self.key.as_deref().filter(|k| !k.is_empty())
    }

    fn target_collection(&self) -> Option<&str> {
        self.collection.as_deref().filter(|c| !c.is_empty())
    }
}

/// Whether a denial means "who are you?" or "not allowed"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyKind {
    /// Caller could not be identified (401)
    Unauthenticated,
    /// Caller is known but lacks permission (403)
    Forbidden,
}

/// Reason code attached to every denial
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    UnknownKey,
    ReadNotPermitted,
    WriteNotPermitted,
    CollectionNotPermitted,
    CollectionScopeRequired,
    MalformedRequest,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::UnknownKey => "unknown_key",
            DenyReason::ReadNotPermitted => "read_not_permitted",
            DenyReason::WriteNotPermitted => "write_not_permitted",
            DenyReason::CollectionNotPermitted => "collection_not_permitted",
            DenyReason::CollectionScopeRequired => "collection_scope_required",
            DenyReason::MalformedRequest => "malformed_request",
        }
    }

    pub fn kind(&self) -> DenyKind {
        match self {
            DenyReason::UnknownKey | DenyReason::MalformedRequest => DenyKind::Unauthenticated,
            _ => DenyKind::Forbidden,
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of an evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    pub fn deny_reason(&self) -> Option<DenyReason> {
        match self {
            Decision::Allow => None,
            Decision::Deny(reason) => Some(*reason),
        }
    }

    /// "allowed" or the deny reason code
    pub fn reason_code(&self) -> &'static str {
        match self {
            Decision::Allow => "allowed",
            Decision::Deny(reason) => reason.as_str(),
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Allow => f.write_str("allow"),
            Decision::Deny(reason) => write!(f, "deny ({reason})"),
        }
    }
}

/// How instance-level operations are treated for collection-scoped keys
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceScopePolicy {
    /// Scoped keys may only perform collection-level operations
    #[default]
    Deny,
    /// Scoped keys may also perform instance-level operations
    Allow,
}

impl std::str::FromStr for InstanceScopePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "deny" => Ok(Self::Deny),
            "allow" => Ok(Self::Allow),
            other => Err(other.to_string()),
        }
    }
}

/// Identity of the key that was matched, safe to log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyIdentity {
    pub key_id: String,
    pub name: Option<String>,
    pub permissions: Permissions,
}

impl KeyIdentity {
    fn from_record(record: &ApiKeyRecord) -> Self {
        Self {
            key_id: record.key.fingerprint(),
            name: record.policy.name.clone(),
            permissions: record.policy.permissions,
        }
    }
}

/// Decision plus the matched key, if any
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub decision: Decision,
    pub key: Option<KeyIdentity>,
}

/// Authorization evaluator over the published key set
pub struct Evaluator {
    keys: Arc<KeyRegistry>,
    policy: InstanceScopePolicy,
    sink: Arc<dyn AuditSink>,
}

impl Evaluator {
    pub fn new(keys: Arc<KeyRegistry>, sink: Arc<dyn AuditSink>) -> Self {
        Self {
            keys,
            policy: InstanceScopePolicy::default(),
            sink,
        }
    }

    pub fn with_policy(mut self, policy: InstanceScopePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> InstanceScopePolicy {
        self.policy
    }

    pub fn keys(&self) -> &Arc<KeyRegistry> {
        &self.keys
    }

    /// Evaluate `request` and emit an audit record
    pub fn evaluate(&self, request: &AccessRequest) -> Decision {
        self.authorize(request).decision
    }

    /// Like [`Evaluator::evaluate`], also returning the matched key
    pub fn authorize(&self, request: &AccessRequest) -> Verdict {
        let keys = self.keys.snapshot();
        let (decision, record) = decide(&keys, self.policy, request);

        self.sink.record(&audit_record(request, decision, record));

        Verdict {
            decision,
            key: record.map(KeyIdentity::from_record),
        }
    }
}

impl fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Evaluator")
            .field("keys", &self.keys.len())
            .field("policy", &self.policy)
            .finish()
    }
}

/// Pure decision function over a key set
pub fn decide<'a>(
    keys: &'a KeySet,
    policy: InstanceScopePolicy,
    request: &AccessRequest,
) -> (Decision, Option<&'a ApiKeyRecord>) {
    let (Some(key), Some(operation)) = (request.presented_key(), request.operation) else {
        return (Decision::Deny(DenyReason::MalformedRequest), None);
    };

    let Some(record) = keys.get(key) else {
        return (Decision::Deny(DenyReason::UnknownKey), None);
    };

    let permissions = record.policy.permissions;
    let scope = &record.policy.scope;

    let decision = if operation == Operation::Write && !permissions.write {
        Decision::Deny(DenyReason::WriteNotPermitted)
    } else if operation == Operation::Read && !permissions.read {
        Decision::Deny(DenyReason::ReadNotPermitted)
    } else {
        match request.target_collection() {
            Some(collection) if !scope.permits(collection) => {
                Decision::Deny(DenyReason::CollectionNotPermitted)
            }
            None if scope.is_restricted() && policy == InstanceScopePolicy::Deny => {
                Decision::Deny(DenyReason::CollectionScopeRequired)
            }
            _ => Decision::Allow,
        }
    };

    (decision, Some(record))
}

fn audit_record(
    request: &AccessRequest,
    decision: Decision,
    record: Option<&ApiKeyRecord>,
) -> AuditRecord {
    AuditRecord {
        timestamp: Utc::now(),
        key_id: request.presented_key().map(fingerprint),
        key_name: record.and_then(|r| r.policy.name.clone()),
        operation: request.operation,
        collection: request.target_collection().map(str::to_string),
        decision: if decision.is_allowed() { "allow" } else { "deny" }.to_string(),
        reason: decision.reason_code().to_string(),
        ip_address: request.origin.ip_address.clone(),
        user_agent: request.origin.user_agent.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::key::{CollectionScope, KeyPolicy};
    use proptest::prelude::*;

    fn scenario_keys() -> KeySet {
        KeySet::from_records(vec![
            ApiKeyRecord::new("admin-key", KeyPolicy::admin().with_name("admin")),
            ApiKeyRecord::new("ro-key", KeyPolicy::read_only().with_name("read-only")),
            ApiKeyRecord::new(
                "products-key",
                KeyPolicy::new(
                    Permissions::ADMIN,
                    CollectionScope::from_list(Some(vec!["products"])),
                ),
            ),
            ApiKeyRecord::new(
                "locked-key",
                KeyPolicy::new(Permissions::NONE, CollectionScope::All),
            ),
        ])
        .unwrap()
    }

    fn evaluator() -> (Evaluator, Arc<MemoryAuditSink>) {
        let sink = Arc::new(MemoryAuditSink::new());
        let registry = Arc::new(KeyRegistry::new(scenario_keys()));
        (Evaluator::new(registry, sink.clone()), sink)
    }

    #[test]
    fn test_scenario() {
        let (eval, _) = evaluator();

        let cases = [
            ("admin-key", Operation::Write, "orders", Decision::Allow),
            (
                "ro-key",
                Operation::Write,
                "products",
                Decision::Deny(DenyReason::WriteNotPermitted),
            ),
            ("products-key", Operation::Write, "products", Decision::Allow),
            (
                "products-key",
                Operation::Read,
                "orders",
                Decision::Deny(DenyReason::CollectionNotPermitted),
            ),
            (
                "missing-key",
                Operation::Read,
                "products",
                Decision::Deny(DenyReason::UnknownKey),
            ),
        ];

        for (key, op, collection, expected) in cases {
            let request = AccessRequest::new(key, op).on_collection(collection);
            assert_eq!(eval.evaluate(&request), expected, "{key} {op} {collection}");
        }
    }

    #[test]
    fn test_no_flags_denies_everything() {
        let (eval, _) = evaluator();

        assert_eq!(
            eval.evaluate(&AccessRequest::new("locked-key", Operation::Read)),
            Decision::Deny(DenyReason::ReadNotPermitted)
        );
        assert_eq!(
            eval.evaluate(&AccessRequest::new("locked-key", Operation::Write).on_collection("x")),
            Decision::Deny(DenyReason::WriteNotPermitted)
        );
    }

    #[test]
    fn test_malformed_requests() {
        let (eval, _) = evaluator();

        let no_operation = AccessRequest {
            key: Some("admin-key".to_string()),
            ..Default::default()
        };
        let no_key = AccessRequest {
            operation: Some(Operation::Read),
            ..Default::default()
        };
        let empty_key = AccessRequest::new("", Operation::Read);

        for request in [no_operation, no_key, empty_key, AccessRequest::default()] {
            assert_eq!(
                eval.evaluate(&request),
                Decision::Deny(DenyReason::MalformedRequest)
            );
        }
    }

    #[test]
    fn test_instance_scope_default_deny() {
        let (eval, _) = evaluator();

        assert_eq!(
            eval.evaluate(&AccessRequest::new("products-key", Operation::Read)),
            Decision::Deny(DenyReason::CollectionScopeRequired)
        );
        // Unscoped keys are unaffected
        assert_eq!(
            eval.evaluate(&AccessRequest::new("ro-key", Operation::Read)),
            Decision::Allow
        );
    }

    #[test]
    fn test_instance_scope_allow_policy() {
        let (eval, _) = evaluator();
        let eval = eval.with_policy(InstanceScopePolicy::Allow);

        assert_eq!(
            eval.evaluate(&AccessRequest::new("products-key", Operation::Read)),
            Decision::Allow
        );
        // Collection checks still apply
        assert_eq!(
            eval.evaluate(&AccessRequest::new("products-key", Operation::Read).on_collection("orders")),
            Decision::Deny(DenyReason::CollectionNotPermitted)
        );
    }

    #[test]
    fn test_empty_collection_is_instance_level() {
        let (eval, sink) = evaluator();

        assert_eq!(
            eval.evaluate(&AccessRequest::new("products-key", Operation::Read).on_collection("")),
            Decision::Deny(DenyReason::CollectionScopeRequired)
        );

        // The audit trail reports the same target the decision used
        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].collection, None);
        assert!(!serde_json::to_string(&records[0]).unwrap().contains("\"collection\":\"\""));
    }

    #[test]
    fn test_permission_checked_before_scope() {
        let (eval, _) = evaluator();

        // ro-key has no scope restriction, but the write flag fails first
        assert_eq!(
            eval.evaluate(&AccessRequest::new("ro-key", Operation::Write)),
            Decision::Deny(DenyReason::WriteNotPermitted)
        );
    }

    #[test]
    fn test_deny_kinds() {
        assert_eq!(DenyReason::UnknownKey.kind(), DenyKind::Unauthenticated);
        assert_eq!(DenyReason::MalformedRequest.kind(), DenyKind::Unauthenticated);
        assert_eq!(DenyReason::WriteNotPermitted.kind(), DenyKind::Forbidden);
        assert_eq!(DenyReason::ReadNotPermitted.kind(), DenyKind::Forbidden);
        assert_eq!(DenyReason::CollectionNotPermitted.kind(), DenyKind::Forbidden);
        assert_eq!(DenyReason::CollectionScopeRequired.kind(), DenyKind::Forbidden);
    }

    #[test]
    fn test_audit_record_per_evaluation() {
        let (eval, sink) = evaluator();

        eval.evaluate(&AccessRequest::new("admin-key", Operation::Read).on_collection("products"));
        eval.evaluate(
            &AccessRequest::new("missing-key", Operation::Write).with_origin(RequestOrigin {
                ip_address: Some("203.0.113.1".to_string()),
                user_agent: None,
            }),
        );

        let records = sink.records();
        assert_eq!(records.len(), 2);

        assert_eq!(records[0].decision, "allow");
        assert_eq!(records[0].reason, "allowed");
        assert_eq!(records[0].key_name.as_deref(), Some("admin"));
        assert_eq!(records[0].collection.as_deref(), Some("products"));

        assert_eq!(records[1].decision, "deny");
        assert_eq!(records[1].reason, "unknown_key");
        assert_eq!(records[1].key_id, Some(fingerprint("missing-key")));
        assert_eq!(records[1].ip_address.as_deref(), Some("203.0.113.1"));

        for record in &records {
            let json = serde_json::to_string(record).unwrap();
            assert!(!json.contains("admin-key"));
            assert!(!json.contains("missing-key"));
        }
    }

    #[test]
    fn test_authorize_returns_identity() {
        let (eval, _) = evaluator();

        let verdict = eval.authorize(&AccessRequest::new("ro-key", Operation::Read));
        let key = verdict.key.unwrap();
        assert_eq!(key.name.as_deref(), Some("read-only"));
        assert_eq!(key.key_id, fingerprint("ro-key"));
        assert_eq!(key.permissions, Permissions::READ_ONLY);

        let verdict = eval.authorize(&AccessRequest::new("nope", Operation::Read));
        assert!(verdict.key.is_none());
    }

    #[test]
    fn test_reload_visible_to_next_evaluation() {
        let (eval, _) = evaluator();
        let request = AccessRequest::new("fresh-key", Operation::Read);

        assert_eq!(eval.evaluate(&request), Decision::Deny(DenyReason::UnknownKey));

        eval.keys().replace(
            KeySet::from_records(vec![ApiKeyRecord::new("fresh-key", KeyPolicy::read_only())])
                .unwrap(),
        );

        assert_eq!(eval.evaluate(&request), Decision::Allow);
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!("deny".parse::<InstanceScopePolicy>(), Ok(InstanceScopePolicy::Deny));
        assert_eq!("ALLOW".parse::<InstanceScopePolicy>(), Ok(InstanceScopePolicy::Allow));
        assert!("maybe".parse::<InstanceScopePolicy>().is_err());
    }

    fn arb_operation() -> impl Strategy<Value = Operation> {
        prop_oneof![Just(Operation::Read), Just(Operation::Write)]
    }

    fn arb_collection() -> impl Strategy<Value = Option<String>> {
        proptest::option::of("[a-z]{1,8}")
    }

    fn single_key(policy: KeyPolicy) -> KeySet {
        KeySet::from_records(vec![ApiKeyRecord::new("k", policy)]).unwrap()
    }

    fn request(op: Operation, collection: Option<String>) -> AccessRequest {
        AccessRequest {
            collection,
            ..AccessRequest::new("k", op)
        }
    }

    proptest! {
        #[test]
        fn prop_write_flag_off_denies_writes(
            read in any::<bool>(),
            collection in arb_collection(),
            scoped in any::<bool>(),
        ) {
            let scope = if scoped {
                CollectionScope::from_list(Some(vec!["products"]))
            } else {
                CollectionScope::All
            };
            let keys = single_key(KeyPolicy::new(Permissions::new(read, false), scope));

            let (decision, _) = decide(&keys, InstanceScopePolicy::Allow, &request(Operation::Write, collection));
            prop_assert_eq!(decision, Decision::Deny(DenyReason::WriteNotPermitted));
        }

        #[test]
        fn prop_admin_allows_everything(op in arb_operation(), collection in arb_collection()) {
            let keys = single_key(KeyPolicy::admin());
            let (decision, _) = decide(&keys, InstanceScopePolicy::Deny, &request(op, collection));
            prop_assert_eq!(decision, Decision::Allow);
        }

        #[test]
        fn prop_read_only_reads_any_collection(collection in arb_collection()) {
            let keys = single_key(KeyPolicy::read_only());

            let (read, _) = decide(&keys, InstanceScopePolicy::Deny, &request(Operation::Read, collection.clone()));
            let (write, _) = decide(&keys, InstanceScopePolicy::Deny, &request(Operation::Write, collection));

            prop_assert_eq!(read, Decision::Allow);
            prop_assert_eq!(write, Decision::Deny(DenyReason::WriteNotPermitted));
        }

        #[test]
        fn prop_scoped_key_confined(op in arb_operation(), collection in "[a-z]{1,8}") {
            let keys = single_key(KeyPolicy::new(
                Permissions::ADMIN,
                CollectionScope::from_list(Some(vec!["products"])),
            ));

            let (decision, _) = decide(&keys, InstanceScopePolicy::Deny, &request(op, Some(collection.clone())));
            if collection == "products" {
                prop_assert_eq!(decision, Decision::Allow);
            } else {
                prop_assert_eq!(decision, Decision::Deny(DenyReason::CollectionNotPermitted));
            }
        }

        #[test]
        fn prop_unknown_key_reason(
            key in "[a-z0-9-]{1,24}",
            op in arb_operation(),
            collection in arb_collection(),
        ) {
            prop_assume!(key != "k");
            let keys = single_key(KeyPolicy::new(Permissions::NONE, CollectionScope::All));
            let request = AccessRequest { key: Some(key), operation: Some(op), collection, ..Default::default() };

            let (decision, record) = decide(&keys, InstanceScopePolicy::Deny, &request);
            prop_assert_eq!(decision, Decision::Deny(DenyReason::UnknownKey));
            prop_assert!(record.is_none());
        }

        #[test]
        fn prop_evaluation_is_idempotent(
            key in prop_oneof![Just("admin-key"), Just("ro-key"), Just("products-key"), Just("locked-key"), Just("other")],
            op in arb_operation(),
            collection in arb_collection(),
        ) {
            let (eval, sink) = evaluator();
            let request = AccessRequest { collection, ..AccessRequest::new(key, op) };

            let first = eval.evaluate(&request);
            let second = eval.evaluate(&request);

            prop_assert_eq!(first, second);
            prop_assert_eq!(sink.len(), 2);
        }
    }
}
