use std::time::Duration;

use ai_client::{AiError, OpenRouter};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::debug;

use followback_common::{Category, ClassificationResult, Profile};

use super::prompt::{user_prompt, SYSTEM_PROMPT};
use crate::traits::{BackendError, ClassifierBackend};

/// Reply shape requested from the model.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ImmunityVerdict {
    /// One of ENGINEER, RESEARCHER, ACADEMIC, TECH_LEADER, TECH_WORKER, OTHER.
    pub category: String,
    /// True if the account should be kept.
    pub immune: bool,
    /// Certainty between 0.0 and 1.0.
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: String,
}

impl ImmunityVerdict {
    pub fn into_result(self) -> Result<ClassificationResult, BackendError> {
        if self.category.trim().is_empty() {
            return Err(BackendError::Malformed("empty category".into()));
        }
        Ok(ClassificationResult::new(
            Category::from_label(&self.category),
            self.immune,
            self.confidence,
            self.reasoning,
        ))
    }
}

impl From<AiError> for BackendError {
    fn from(e: AiError) -> Self {
        if e.is_transport() {
            BackendError::Transport(e.to_string())
        } else {
            BackendError::Malformed(e.to_string())
        }
    }
}

/// Hosted language model behind OpenRouter.
pub struct OpenRouterBackend {
    ai: OpenRouter,
}

impl OpenRouterBackend {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            ai: OpenRouter::new(api_key, model)
                .with_app_name("followback")
                .with_timeout(Duration::from_secs(30))
                .with_max_tokens(200),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.ai = self.ai.with_base_url(url);
        self
    }
}

#[async_trait]
impl ClassifierBackend for OpenRouterBackend {
    async fn classify(&self, profile: &Profile) -> Result<ClassificationResult, BackendError> {
        debug!(id = %profile.id, model = self.ai.model(), "Classifying profile");
        let verdict: ImmunityVerdict = self.ai.extract(SYSTEM_PROMPT, user_prompt(profile)).await?;
        verdict.into_result()
    }

    fn name(&self) -> &str {
        self.ai.model()
    }
}
