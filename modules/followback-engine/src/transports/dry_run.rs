use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use followback_common::AccountId;

use crate::traits::ActionExecutor;

/// Logs each action instead of performing it. Always succeeds, so cursors
/// advance exactly as they would against the live API.
#[derive(Default)]
pub struct DryRunExecutor {
    count: AtomicUsize,
}

impl DryRunExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Actions "performed" so far.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ActionExecutor for DryRunExecutor {
    async fn perform_action(&self, id: &AccountId) -> Result<()> {
        let n = self.count.fetch_add(1, Ordering::Relaxed) + 1;
        info!(id = %id, n, "Dry run: would unfollow");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn counts_without_failing() {
        let dry = DryRunExecutor::new();
        dry.perform_action(&"1".into()).await.unwrap();
        dry.perform_action(&"2".into()).await.unwrap();
        assert_eq!(dry.count(), 2);
    }
}
