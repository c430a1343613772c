//! Request classification
//!
//! Maps an HTTP method and path of the Qdrant REST API to the operation
//! kind and target collection the evaluator needs.
//!
//! Author: hephaex@gmail.com

use axum::http::Method;
use qgate_core::Operation;

/// Operation and collection derived from a request line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// `None` when the method has no sensible mapping
    pub operation: Option<Operation>,
    /// `None` for instance-level operations
    pub collection: Option<String>,
}

impl Classification {
    fn instance(operation: Option<Operation>) -> Self {
        Self {
            operation,
            collection: None,
        }
    }
}

/// POST endpoints under a collection that only read data
const READ_VERBS: &[&str] = &[
    "search",
    "recommend",
    "discover",
    "query",
    "scroll",
    "count",
    "facet",
];

/// Classify a request by method and path
pub fn classify(method: &Method, path: &str) -> Classification {
    let Some(base) = base_operation(method) else {
        return Classification::instance(None);
    };

    // The upstream URL parser would resolve these, so the forwarded request
    // could target a different collection or endpoint than the one checked.
    if is_ambiguous_path(path) {
        return Classification::instance(None);
    }

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    match segments.as_slice() {
        ["collections"] => Classification::instance(Some(base)),
        // Alias changes can touch any number of collections
        ["collections", "aliases", ..] => Classification::instance(Some(base)),
        ["collections", name, rest @ ..] => Classification {
            operation: Some(collection_operation(method, base, rest)),
            collection: Some(decode_name(name)),
        },
        _ => Classification::instance(Some(base)),
    }
}

/// Whether the path has a segment that URL normalization rewrites:
/// `.` or `..` (also percent-encoded) or a backslash separator.
pub fn is_ambiguous_path(path: &str) -> bool {
    path.split('/').any(|raw| {
        let segment = decode_name(raw);
        segment == "." || segment == ".." || segment.contains('\\')
    })
}

/// Default mapping by method alone
fn base_operation(method: &Method) -> Option<Operation> {
    match method.as_str() {
        "GET" | "HEAD" | "OPTIONS" => Some(Operation::Read),
        "POST" | "PUT" | "PATCH" | "DELETE" => Some(Operation::Write),
        _ => None,
    }
}

/// Refine the method mapping for collection-level paths.
///
/// Qdrant uses POST for several read-only endpoints (search, scroll,
/// point retrieval, ...).
fn collection_operation(method: &Method, base: Operation, rest: &[&str]) -> Operation {
    if *method != Method::POST {
        return base;
    }

    match rest {
        // Retrieve points by id
        ["points"] => Operation::Read,
        ["points", verb, ..] if READ_VERBS.contains(verb) => Operation::Read,
        [verb, ..] if READ_VERBS.contains(verb) => Operation::Read,
        _ => Operation::Write,
    }
}

fn decode_name(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|name| name.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}
