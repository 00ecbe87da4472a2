use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::info;

use crate::error::FollowbackError;

/// Which Action Executor / Membership Source implementation to wire up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// X API v2 over HTTPS.
    XApi,
    /// Read membership from the X API but only log the unfollows.
    DryRun,
}

impl FromStr for TransportKind {
    type Err = FollowbackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "x-api" | "x" | "api" => Ok(TransportKind::XApi),
            "dry-run" | "dryrun" => Ok(TransportKind::DryRun),
            other => Err(FollowbackError::Config(format!(
                "TRANSPORT must be x-api or dry-run, got {other}"
            ))),
        }
    }
}

/// Admission preset used when re-deriving an action set from a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    Normal,
    Aggressive,
}

impl FromStr for FilterMode {
    type Err = FollowbackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" => Ok(FilterMode::Normal),
            "aggressive" => Ok(FilterMode::Aggressive),
            other => Err(FollowbackError::Config(format!(
                "FILTER_MODE must be normal or aggressive, got {other}"
            ))),
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Classifier
    pub openrouter_api_key: Option<String>,
    pub classifier_model: String,

    // X API
    pub x_bearer_token: Option<String>,
    pub x_user_id: Option<String>,
    pub transport: TransportKind,

    // Storage
    pub data_dir: PathBuf,

    // Pacing
    pub batch_size: usize,
    pub action_delay: Duration,
    pub classify_delay: Duration,
    pub cycle_interval: Duration,

    pub filter_mode: FilterMode,
}

impl Config {
    pub fn from_env() -> Result<Self, FollowbackError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, FollowbackError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let transport = match get("TRANSPORT") {
            Some(v) => v.parse()?,
            None => TransportKind::XApi,
        };
        let filter_mode = match get("FILTER_MODE") {
            Some(v) => v.parse()?,
            None => FilterMode::Normal,
        };

        let config = Self {
            openrouter_api_key: get("OPENROUTER_API_KEY"),
            classifier_model: get("CLASSIFIER_MODEL")
                .unwrap_or_else(|| "anthropic/claude-3.5-sonnet".to_string()),
            x_bearer_token: get("X_BEARER_TOKEN"),
            x_user_id: get("X_USER_ID"),
            transport,
            data_dir: PathBuf::from(get("DATA_DIR").unwrap_or_else(|| "data".to_string())),
            batch_size: parse_or("BATCH_SIZE", get("BATCH_SIZE"), 20)?,
            action_delay: Duration::from_secs(parse_or::<u64>(
                "ACTION_DELAY_SECS",
                get("ACTION_DELAY_SECS"),
                3,
            )?),
            classify_delay: Duration::from_millis(parse_or::<u64>(
                "CLASSIFY_DELAY_MS",
                get("CLASSIFY_DELAY_MS"),
                500,
            )?),
            cycle_interval: Duration::from_secs(
                parse_or::<u64>("CYCLE_INTERVAL_MINS", get("CYCLE_INTERVAL_MINS"), 20)?
                    .checked_mul(60)
                    .ok_or_else(|| FollowbackError::Config("CYCLE_INTERVAL_MINS is out of range".into()))?,
            ),
            filter_mode,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), FollowbackError> {
        if self.batch_size == 0 {
            return Err(FollowbackError::Config("BATCH_SIZE must be at least 1".into()));
        }
        Ok(())
    }

    /// `(bearer_token, user_id)` for the X API transports.
    pub fn x_credentials(&self) -> Result<(&str, &str), FollowbackError> {
        let token = self.x_bearer_token.as_deref().ok_or_else(|| {
            FollowbackError::Config("X_BEARER_TOKEN environment variable is required".into())
        })?;
        let user_id = self.x_user_id.as_deref().ok_or_else(|| {
            FollowbackError::Config("X_USER_ID environment variable is required".into())
        })?;
        Ok((token, user_id))
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.data_dir.join("checkpoint.json")
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.data_dir.join("reports")
    }

    pub fn action_log_path(&self) -> PathBuf {
        self.data_dir.join("actions.jsonl")
    }

    /// Log the effective configuration with secrets reduced to presence flags.
    pub fn log_redacted(&self) {
        info!(
            classifier = if self.openrouter_api_key.is_some() { "openrouter" } else { "keyword" },
            model = %self.classifier_model,
            transport = ?self.transport,
            x_token_set = self.x_bearer_token.is_some(),
            x_user_id = self.x_user_id.as_deref().unwrap_or(""),
            data_dir = %self.data_dir.display(),
            batch_size = self.batch_size,
            action_delay_secs = self.action_delay.as_secs(),
            classify_delay_ms = self.classify_delay.as_millis() as u64,
            cycle_interval_mins = self.cycle_interval.as_secs() / 60,
            filter_mode = ?self.filter_mode,
            "Configuration loaded"
        );
    }
}

fn parse_or<T: FromStr>(key: &str, value: Option<String>, default: T) -> Result<T, FollowbackError> {
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| FollowbackError::Config(format!("{key} must be a number, got {raw}"))),
        None => Ok(default),
    }
}
