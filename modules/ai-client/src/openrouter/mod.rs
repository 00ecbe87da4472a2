mod client;
pub(crate) mod types;

use std::time::Duration;

use crate::error::{AiError, Result};
use crate::schema::StructuredOutput;
use crate::util::{extract_json_object, strip_code_blocks};

use client::OpenRouterClient;
use types::{ChatRequest, WireMessage};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Sampling temperature for every request.
const TEMPERATURE: f32 = 0.1;

// =============================================================================
// OpenRouter Agent
// =============================================================================

#[derive(Clone)]
pub struct OpenRouter {
    api_key: String,
    model: String,
    app_name: Option<String>,
    base_url: Option<String>,
    timeout: Duration,
    max_tokens: u32,
}

impl OpenRouter {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            app_name: None,
            base_url: None,
            timeout: DEFAULT_TIMEOUT,
            max_tokens: 300,
        }
    }

    pub fn with_app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = Some(name.into());
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn client(&self) -> Result<OpenRouterClient> {
        let mut client = OpenRouterClient::new(&self.api_key, self.timeout)?;
        if let Some(ref url) = self.base_url {
            client = client.with_base_url(url);
        }
        if let Some(ref name) = self.app_name {
            client = client.with_app_name(name);
        }
        Ok(client)
    }

    /// Request strict JSON-schema output and deserialize it into `T`.
    ///
    /// A reply that does not deserialize (missing field, wrong type, prose
    /// instead of JSON) is an `AiError::Parse`; a failed round trip is
    /// `Network`/`Api`.
    pub async fn extract<T: StructuredOutput>(
        &self,
        system_prompt: impl Into<String>,
        user_prompt: impl Into<String>,
    ) -> Result<T> {
        let request = ChatRequest::new(&self.model)
            .message(WireMessage::system(system_prompt))
            .message(WireMessage::user(user_prompt))
            .max_tokens(self.max_tokens)
            .temperature(TEMPERATURE)
            .json_schema(&T::type_name(), T::strict_schema());

        let content = self.client()?.complete(&request).await?;
        parse_structured(&content)
    }
}

/// Deserialize a model reply, tolerating code fences and surrounding prose.
pub fn parse_structured<T: StructuredOutput>(content: &str) -> Result<T> {
    match serde_json::from_str(strip_code_blocks(content)) {
        Ok(value) => Ok(value),
        Err(first) => match extract_json_object(content) {
            Some(inner) => serde_json::from_str(inner).map_err(AiError::from),
            None => Err(AiError::Parse(first.to_string())),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemars::JsonSchema;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, JsonSchema)]
    struct Verdict {
        immune: bool,
        confidence: f64,
    }

    #[test]
    fn test_openrouter_new() {
        let ai = OpenRouter::new("sk-or-test", "anthropic/claude-3.5-sonnet");
        assert_eq!(ai.model(), "anthropic/claude-3.5-sonnet");
        assert_eq!(ai.api_key, "sk-or-test");
        assert_eq!(ai.timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_openrouter_builders() {
        let ai = OpenRouter::new("k", "m")
            .with_app_name("followback")
            .with_base_url("http://localhost:9999")
            .with_timeout(Duration::from_secs(5));
        assert_eq!(ai.app_name.as_deref(), Some("followback"));
        assert_eq!(ai.base_url.as_deref(), Some("http://localhost:9999"));
        assert_eq!(ai.timeout, Duration::from_secs(5));
    }

    #[test]
    fn parse_structured_accepts_fenced_json() {
        let v: Verdict = parse_structured("```json\n{\"immune\":true,\"confidence\":0.9}\n```").unwrap();
        assert!(v.immune);
    }

    #[test]
    fn parse_structured_accepts_json_inside_prose() {
        let v: Verdict =
            parse_structured("Analysis: {\"immune\":false,\"confidence\":0.4} done").unwrap();
        assert!(!v.immune);
        assert!((v.confidence - 0.4).abs() < f64::EPSILON);
    }

    #[test]
    fn parse_structured_missing_field_is_parse_error() {
        let err = parse_structured::<Verdict>("{\"confidence\":0.4}").unwrap_err();
        assert!(matches!(err, AiError::Parse(_)));
        assert!(!err.is_transport());
    }

    #[tokio::test]
    async fn unreachable_provider_is_transport_error() {
        let ai = OpenRouter::new("k", "m")
            .with_base_url("http://127.0.0.1:9")
            .with_timeout(Duration::from_secs(2));
        let err = ai.extract::<Verdict>("sys", "user").await.unwrap_err();
        assert!(err.is_transport(), "got {err:?}");
    }
}
