use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use followback_common::{Config, TransportKind};
use followback_engine::classifier::{KeywordBackend, OpenRouterBackend};
use followback_engine::{ActionExecutor, ClassifierBackend, DryRunExecutor, Transports, XTransport};

pub fn classifier(config: &Config) -> Arc<dyn ClassifierBackend> {
    match config.openrouter_api_key.as_deref() {
        Some(key) => Arc::new(OpenRouterBackend::new(key, config.classifier_model.as_str())),
        None => {
            warn!("OPENROUTER_API_KEY not set, falling back to keyword classifier");
            Arc::new(KeywordBackend)
        }
    }
}

pub fn transports(config: &Config) -> Result<Transports> {
    let (token, user_id) = config.x_credentials()?;
    let x = Arc::new(XTransport::from_credentials(token, user_id)?);

    let executor: Arc<dyn ActionExecutor> = match config.transport {
        TransportKind::XApi => x.clone(),
        TransportKind::DryRun => {
            info!("Dry run: unfollows will be logged, not performed");
            Arc::new(DryRunExecutor::new())
        }
    };

    Ok(Transports {
        membership: x.clone(),
        profiles: x,
        classifier: classifier(config),
        executor,
    })
}
