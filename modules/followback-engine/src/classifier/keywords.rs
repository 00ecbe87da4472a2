//! Keyword matcher used when no language-model key is configured.

use async_trait::async_trait;

use followback_common::{Category, ClassificationResult, Profile};

use crate::traits::{BackendError, ClassifierBackend};

/// Technology and academia vocabulary. Matched as case-insensitive substrings.
pub const TECH_KEYWORDS: &[&str] = &[
    // roles
    "developer", "engineer", "programmer", "coding", "software", "frontend", "backend",
    "fullstack", "devops", "sre",
    // stacks
    "python", "javascript", "java", "react", "node", "aws", "kubernetes", "docker",
    "tensorflow", "pytorch",
    // leadership
    "cto", "vp engineering", "tech lead", "senior engineer", "staff engineer",
    "principal engineer",
    // ml / ai
    "machine learning", "artificial intelligence", "data scientist", "ml engineer",
    "ai researcher", "deep learning",
    // academia
    "phd", "professor", "researcher", "university", "stanford", "mit", "berkeley",
    "carnegie mellon",
    // employers
    "google", "microsoft", "apple", "meta", "amazon", "netflix", "uber", "airbnb",
    "stripe", "openai", "anthropic",
];

/// True if any vocabulary term occurs in `text`, ignoring case.
pub fn classify_by_keyword(text: &str) -> bool {
    first_match(text).is_some()
}

/// First vocabulary term found in `text`, ignoring case.
fn first_match(text: &str) -> Option<&'static str> {
    let lowered = text.to_lowercase();
    TECH_KEYWORDS.iter().copied().find(|kw| lowered.contains(kw))
}

pub struct KeywordBackend;

#[async_trait]
impl ClassifierBackend for KeywordBackend {
    async fn classify(&self, profile: &Profile) -> Result<ClassificationResult, BackendError> {
        let text = format!("{} {}", profile.display_name, profile.bio);
        Ok(match first_match(&text) {
            Some(kw) => ClassificationResult::new(
                Category::TechWorker,
                true,
                0.7,
                format!("keyword match: {kw}"),
            ),
            None => ClassificationResult::new(Category::Other, false, 0.6, "no technology keywords"),
        })
    }

    fn name(&self) -> &str {
        "keyword"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_are_case_insensitive() {
        assert!(classify_by_keyword("Senior ENGINEER at a startup"));
        assert!(classify_by_keyword("PhD student"));
        assert!(!classify_by_keyword("dog lover and baker"));
        assert!(!classify_by_keyword(""));
    }

    #[tokio::test]
    async fn match_is_immune_tech_worker() {
        let profile = Profile {
            bio: "Kubernetes whisperer".into(),
            ..Profile::empty("1".into())
        };
        let r = KeywordBackend.classify(&profile).await.unwrap();
        assert_eq!(r.category, Category::TechWorker);
        assert!(r.immune);
        assert_eq!(r.confidence, 0.7);
        assert!(r.reasoning.contains("kubernetes"));
    }

    #[tokio::test]
    async fn no_match_is_not_immune() {
        let profile = Profile {
            bio: "Sourdough and long walks".into(),
            ..Profile::empty("2".into())
        };
        let r = KeywordBackend.classify(&profile).await.unwrap();
        assert_eq!(r.category, Category::Other);
        assert!(!r.immune);
        assert_eq!(r.confidence, 0.6);
    }

    #[tokio::test]
    async fn backend_agrees_with_keyword_check() {
        for bio in ["Works at Stripe", "MIT alum", "Sourdough and long walks", "cto"] {
            let profile = Profile {
                bio: bio.into(),
                ..Profile::empty("3".into())
            };
            let r = KeywordBackend.classify(&profile).await.unwrap();
            assert_eq!(r.immune, classify_by_keyword(bio), "{bio}");
        }
    }
}
