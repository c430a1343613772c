//! API key model
//!
//! Defines the typed capability set behind each configured key:
//! - `Operation`: what a request wants to do (read or write)
//! - `Permissions`: which operations a key may perform
//! - `CollectionScope`: which collections a key may touch
//! - `ApiKey`: the secret itself, redacted in every formatted output
//!
//! Author: hephaex@gmail.com

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;

/// Kind of access a request needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Read,
    Write,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Read => "read",
            Operation::Write => "write",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when an operation name cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown operation: {0}")]
pub struct ParseOperationError(pub String);

impl std::str::FromStr for Operation {
    type Err = ParseOperationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "read" => Ok(Operation::Read),
            "write" => Ok(Operation::Write),
            _ => Err(ParseOperationError(s.to_string())),
        }
    }
}

/// Operations a key is allowed to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    pub read: bool,
    pub write: bool,
}

impl Permissions {
    pub const ADMIN: Self = Self {
        read: true,
        write: true,
    };
    pub const READ_ONLY: Self = Self {
        read: true,
        write: false,
    };
    pub const NONE: Self = Self {
        read: false,
        write: false,
    };

    pub fn new(read: bool, write: bool) -> Self {
        Self { read, write }
    }

    /// Whether the flag for `op` is set
    pub fn allows(&self, op: Operation) -> bool {
        match op {
            Operation::Read => self.read,
            Operation::Write => self.write,
        }
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.read, self.write) {
            (true, true) => f.write_str("read,write"),
            (true, false) => f.write_str("read"),
            (false, true) => f.write_str("write"),
            (false, false) => f.write_str("none"),
        }
    }
}

/// Collections a key may touch
///
/// `Only` always holds at least one name; an empty allow-list collapses
/// to `All` when built through [`CollectionScope::from_list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionScope {
    All,
    Only(BTreeSet<String>),
}

impl CollectionScope {
    /// Build a scope from an optional allow-list. Absent or empty means all.
    pub fn from_list<I, S>(collections: Option<I>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: BTreeSet<String> = collections
            .into_iter()
            .flatten()
            .map(Into::into)
            .filter(|name: &String| !name.trim().is_empty())
            .collect();

        if names.is_empty() {
            CollectionScope::All
        } else {
            CollectionScope::Only(names)
        }
    }

    pub fn is_restricted(&self) -> bool {
        matches!(self, CollectionScope::Only(_))
    }

    /// Whether `collection` falls inside this scope
    pub fn permits(&self, collection: &str) -> bool {
        match self {
            CollectionScope::All => true,
            CollectionScope::Only(names) => names.contains(collection),
        }
    }

    /// Allowed collection names, or `None` for all collections
    pub fn names(&self) -> Option<&BTreeSet<String>> {
        match self {
            CollectionScope::All => None,
            CollectionScope::Only(names) => Some(names),
        }
    }
}

impl fmt::Display for CollectionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectionScope::All => f.write_str("*"),
            CollectionScope::Only(names) => {
                let joined: Vec<&str> = names.iter().map(String::as_str).collect();
                f.write_str(&joined.join(","))
            }
        }
    }
}

/// Everything a key is allowed to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPolicy {
    /// Human-readable label, used in logs instead of the key
    pub name: Option<String>,
    pub permissions: Permissions,
    pub scope: CollectionScope,
}

impl KeyPolicy {
    pub fn new(permissions: Permissions, scope: CollectionScope) -> Self {
        Self {
            name: None,
            permissions,
            scope,
        }
    }

    /// Full access to every collection
    pub fn admin() -> Self {
        Self::new(Permissions::ADMIN, CollectionScope::All)
    }

    /// Read access to every collection
    pub fn read_only() -> Self {
        Self::new(Permissions::READ_ONLY, CollectionScope::All)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Secret API key string
///
/// Formatting never reveals the key; use [`ApiKey::fingerprint`] to
/// identify it in logs.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn fingerprint(&self) -> String {
        fingerprint(&self.0)
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiKey({})", self.fingerprint())
    }
}

impl fmt::Display for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fingerprint())
    }
}

/// Short SHA-256 identifier of a raw key (first 16 hex chars)
pub fn fingerprint(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}

/// A configured key together with its policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiKeyRecord {
    pub key: ApiKey,
    pub policy: KeyPolicy,
}

impl ApiKeyRecord {
    pub fn new(key: impl Into<String>, policy: KeyPolicy) -> Self {
        Self {
            key: ApiKey::new(key),
            policy,
        }
    }

    /// Label if configured, otherwise the fingerprint
    pub fn display_name(&self) -> String {
        self.policy
            .name
            .clone()
            .unwrap_or_else(|| self.key.fingerprint())
    }
}
