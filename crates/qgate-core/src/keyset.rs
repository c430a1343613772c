//! Key set and registry
//!
//! A `KeySet` is built once from configuration and never mutated.
//! The `KeyRegistry` publishes the current set behind an atomic pointer:
//! readers take a lock-free snapshot, reloads build a complete new set
//! and swap it in as a whole.
//!
//! Author: hephaex@gmail.com

use crate::config::KeyConfig;
use crate::key::{fingerprint, ApiKeyRecord};
use arc_swap::ArcSwap;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Errors raised while building a key set
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeySetError {
    #[error("API key '{name}' is empty")]
    EmptyKey { name: String },

    #[error("API key {fingerprint} is configured twice ('{first}' and '{second}')")]
    DuplicateKey {
        fingerprint: String,
        first: String,
        second: String,
    },
}

/// Immutable mapping from key string to its record
#[derive(Debug, Default)]
pub struct KeySet {
    records: HashMap<String, ApiKeyRecord>,
}

impl KeySet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a set from records, rejecting empty and duplicate keys
    pub fn from_records<I>(records: I) -> Result<Self, KeySetError>
    where
        I: IntoIterator<Item = ApiKeyRecord>,
    {
        let mut map: HashMap<String, ApiKeyRecord> = HashMap::new();

        for record in records {
            let raw = record.key.expose();
            if raw.trim().is_empty() {
                return Err(KeySetError::EmptyKey {
                    name: record.display_name(),
                });
            }
            if let Some(existing) = map.get(raw) {
                return Err(KeySetError::DuplicateKey {
                    fingerprint: fingerprint(raw),
                    first: existing.display_name(),
                    second: record.display_name(),
                });
            }
            map.insert(raw.to_string(), record);
        }

        Ok(Self { records: map })
    }

    /// Build a set from the `[auth.keys]` tables of the configuration
    pub fn from_config(keys: &BTreeMap<String, KeyConfig>) -> Result<Self, KeySetError> {
        Self::from_records(keys.iter().map(|(name, cfg)| cfg.to_record(name)))
    }

    pub fn get(&self, key: &str) -> Option<&ApiKeyRecord> {
        self.records.get(key)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records ordered by display name
    pub fn records(&self) -> Vec<&ApiKeyRecord> {
        let mut records: Vec<&ApiKeyRecord> = self.records.values().collect();
        records.sort_by_key(|r| r.display_name());
        records
    }
}

/// Atomically swappable holder of the current key set
#[derive(Debug)]
pub struct KeyRegistry {
    current: ArcSwap<KeySet>,
}

impl KeyRegistry {
    pub fn new(keys: KeySet) -> Self {
        Self {
            current: ArcSwap::from_pointee(keys),
        }
    }

    /// The currently published set
    pub fn snapshot(&self) -> Arc<KeySet> {
        self.current.load_full()
    }

    /// Publish `keys` and return the previously published set
    pub fn replace(&self, keys: KeySet) -> Arc<KeySet> {
        self.current.swap(Arc::new(keys))
    }

    /// Build a new set from configuration and publish it.
    ///
    /// On error the current set stays in place.
    pub fn reload_from(&self, keys: &BTreeMap<String, KeyConfig>) -> Result<usize, KeySetError> {
        let next = KeySet::from_config(keys)?;
        let count = next.len();
        let previous = self.replace(next);

        info!(
            previous = previous.len(),
            current = count,
            "API key set reloaded"
        );

        Ok(count)
    }

    pub fn len(&self) -> usize {
        self.current.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.load().is_empty()
    }
}

impl Default for KeyRegistry {
    fn default() -> Self {
        Self::new(KeySet::empty())
    }
}
