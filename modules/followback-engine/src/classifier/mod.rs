//! Classification cache and fallback gate.
//!
//! The gate is the only caller of a [`ClassifierBackend`]. It memoizes
//! results, skips the backend for bios too short to say anything, and turns
//! backend failures into fixed results:
//!
//! - malformed reply: `OTHER`, not immune, 0.5 (cached)
//! - backend unreachable: `UNKNOWN`, immune, 0.3 (not cached)
//!
//! An unreachable oracle must never cause an action; a confused one may.

pub mod cache;
pub mod keywords;
pub mod openrouter;
pub mod prompt;

use std::sync::Arc;

use tracing::{debug, warn};

use followback_common::{clamp_confidence, Category, ClassificationResult, Profile};

use crate::traits::{BackendError, ClassifierBackend};

pub use cache::{CacheKey, CacheStats, ClassificationCache, BIO_PREFIX_CHARS};
pub use keywords::{classify_by_keyword, KeywordBackend, TECH_KEYWORDS};
pub use openrouter::{ImmunityVerdict, OpenRouterBackend};

/// Trimmed bios shorter than this skip the backend.
pub const MIN_BIO_CHARS: usize = 10;

/// Where a classification came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Cache,
    ShortBio,
    Backend,
    Malformed,
    Unreachable,
}

impl Origin {
    /// True when the backend was consulted for this result.
    pub fn consulted_backend(&self) -> bool {
        matches!(self, Origin::Backend | Origin::Malformed | Origin::Unreachable)
    }
}

pub struct ClassificationGate {
    backend: Arc<dyn ClassifierBackend>,
    cache: ClassificationCache,
}

impl ClassificationGate {
    pub fn new(backend: Arc<dyn ClassifierBackend>) -> Self {
        Self {
            backend,
            cache: ClassificationCache::new(),
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub async fn classify(&self, profile: &Profile) -> ClassificationResult {
        self.classify_traced(profile).await.0
    }

    /// Classify and report which path produced the result.
    pub async fn classify_traced(&self, profile: &Profile) -> (ClassificationResult, Origin) {
        let key = CacheKey::for_profile(profile);
        if let Some(hit) = self.cache.get(&key) {
            debug!(id = %profile.id, "Classification cache hit");
            return (hit, Origin::Cache);
        }

        if profile.bio.trim().chars().count() < MIN_BIO_CHARS {
            let result = ClassificationResult::new(
                Category::Other,
                false,
                0.9,
                "bio too short to classify",
            );
            self.cache.insert(key, result.clone());
            return (result, Origin::ShortBio);
        }

        let (result, origin) = match self.backend.classify(profile).await {
            Ok(mut result) => {
                result.confidence = clamp_confidence(result.confidence);
                (result, Origin::Backend)
            }
            Err(BackendError::Malformed(detail)) => {
                warn!(id = %profile.id, backend = self.backend.name(), %detail, "Malformed classifier reply");
                (
                    ClassificationResult::new(
                        Category::Other,
                        false,
                        0.5,
                        format!("parse failure: {detail}"),
                    ),
                    Origin::Malformed,
                )
            }
            Err(BackendError::Transport(detail)) => {
                warn!(id = %profile.id, backend = self.backend.name(), %detail, "Classifier unreachable, keeping account");
                let fallback = ClassificationResult::new(Category::Unknown, true, 0.3, detail);
                return (fallback, Origin::Unreachable);
            }
        };

        self.cache.insert(key, result.clone());
        (result, origin)
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockClassifier;

    fn profile(id: &str, bio: &str) -> Profile {
        Profile {
            bio: bio.to_string(),
            ..Profile::empty(id.into())
        }
    }

    const LONG_BIO: &str = "Building distributed databases in Rust";

    #[tokio::test]
    async fn identical_keys_call_backend_once() {
        let backend = Arc::new(MockClassifier::new().on_id(
            "1",
            ClassificationResult::new(Category::Engineer, true, 0.95, "databases"),
        ));
        let gate = ClassificationGate::new(backend.clone());

        let first = gate.classify(&profile("1", LONG_BIO)).await;
        let (second, origin) = gate.classify_traced(&profile("1", LONG_BIO)).await;

        assert_eq!(first, second);
        assert_eq!(origin, Origin::Cache);
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn short_bio_skips_backend_and_is_cached() {
        let backend = Arc::new(MockClassifier::new());
        let gate = ClassificationGate::new(backend.clone());

        let (r, origin) = gate.classify_traced(&profile("1", "  hi there ")).await;
        assert_eq!(origin, Origin::ShortBio);
        assert_eq!(r.category, Category::Other);
        assert!(!r.immune);
        assert_eq!(r.confidence, 0.9);
        assert_eq!(r.reasoning, "bio too short to classify");

        let (_, origin) = gate.classify_traced(&profile("1", "  hi there ")).await;
        assert_eq!(origin, Origin::Cache);
        assert_eq!(backend.calls(), 0);
        assert_eq!(gate.cache_stats().size, 1);
    }

    #[tokio::test]
    async fn transport_error_is_immune_and_not_cached() {
        let backend = Arc::new(
            MockClassifier::new().fail_id("1", BackendError::Transport("timeout".into())),
        );
        let gate = ClassificationGate::new(backend.clone());

        let (r, origin) = gate.classify_traced(&profile("1", LONG_BIO)).await;
        assert_eq!(origin, Origin::Unreachable);
        assert_eq!(r.category, Category::Unknown);
        assert!(r.immune);
        assert_eq!(r.confidence, 0.3);
        assert_eq!(r.reasoning, "timeout");

        gate.classify(&profile("1", LONG_BIO)).await;
        assert_eq!(backend.calls(), 2);
        assert_eq!(gate.cache_stats().size, 0);
    }

    #[tokio::test]
    async fn malformed_reply_is_not_immune_and_cached() {
        let backend = Arc::new(
            MockClassifier::new().fail_id("1", BackendError::Malformed("missing field `immune`".into())),
        );
        let gate = ClassificationGate::new(backend.clone());

        let (r, origin) = gate.classify_traced(&profile("1", LONG_BIO)).await;
        assert_eq!(origin, Origin::Malformed);
        assert_eq!(r.category, Category::Other);
        assert!(!r.immune);
        assert_eq!(r.confidence, 0.5);
        assert!(r.reasoning.starts_with("parse failure"));

        gate.classify(&profile("1", LONG_BIO)).await;
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn clear_forces_reclassification() {
        let backend = Arc::new(MockClassifier::new());
        let gate = ClassificationGate::new(backend.clone());
        gate.classify(&profile("1", LONG_BIO)).await;
        gate.clear_cache();
        gate.classify(&profile("1", LONG_BIO)).await;
        assert_eq!(backend.calls(), 2);
    }

    #[test]
    fn origin_reports_backend_use() {
        assert!(Origin::Backend.consulted_backend());
        assert!(Origin::Unreachable.consulted_backend());
        assert!(!Origin::Cache.consulted_backend());
        assert!(!Origin::ShortBio.consulted_backend());
    }
}
