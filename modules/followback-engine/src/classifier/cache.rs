//! In-memory classification memo for a process lifetime.
//!
//! Keyed by account id plus the first [`BIO_PREFIX_CHARS`] characters of the
//! bio, so an edited bio past that prefix still hits the old entry.

use std::collections::HashMap;
use std::sync::RwLock;

use followback_common::{AccountId, ClassificationResult, Profile};

pub const BIO_PREFIX_CHARS: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    pub id: AccountId,
    pub bio_prefix: String,
}

impl CacheKey {
    pub fn for_profile(profile: &Profile) -> Self {
        Self {
            id: profile.id.clone(),
            bio_prefix: profile.bio.chars().take(BIO_PREFIX_CHARS).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub size: usize,
    /// Sorted for stable output.
    pub keys: Vec<CacheKey>,
}

pub struct ClassificationCache {
    entries: RwLock<HashMap<CacheKey, ClassificationResult>>,
}

impl ClassificationCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<ClassificationResult> {
        let entries = self.entries.read().unwrap_or_else(|p| p.into_inner());
        entries.get(key).cloned()
    }

    pub fn insert(&self, key: CacheKey, result: ClassificationResult) {
        self.entries
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(key, result);
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .clear();
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.read().unwrap_or_else(|p| p.into_inner());
        let mut keys: Vec<CacheKey> = entries.keys().cloned().collect();
        keys.sort();
        CacheStats {
            size: keys.len(),
            keys,
        }
    }
}

impl Default for ClassificationCache {
    fn default() -> Self {
        Self::new()
    }
}
