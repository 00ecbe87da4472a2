use thiserror::Error;

pub type Result<T> = std::result::Result<T, AiError>;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Empty response from {0}")]
    EmptyResponse(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl AiError {
    /// True when the provider could not be consulted at all.
    ///
    /// `Parse` and `EmptyResponse` mean a reply arrived but was unusable;
    /// callers treat those differently from an unreachable provider.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            AiError::Config(_) | AiError::Network(_) | AiError::Api { .. }
        )
    }
}

impl From<reqwest::Error> for AiError {
    fn from(e: reqwest::Error) -> Self {
        AiError::Network(e.to_string())
    }
}

impl From<serde_json::Error> for AiError {
    fn from(e: serde_json::Error) -> Self {
        AiError::Parse(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_are_distinguished_from_parse_errors() {
        assert!(AiError::Network("timeout".into()).is_transport());
        assert!(AiError::Api {
            status: 429,
            message: "quota".into()
        }
        .is_transport());
        assert!(!AiError::Parse("missing field `immune`".into()).is_transport());
        assert!(!AiError::EmptyResponse("OpenRouter".into()).is_transport());
    }

    #[test]
    fn serde_errors_map_to_parse() {
        let err: AiError = serde_json::from_str::<serde_json::Value>("{not json")
            .unwrap_err()
            .into();
        assert!(matches!(err, AiError::Parse(_)));
    }
}
