//! Rate-limited batch executor.
//!
//! Consumes up to `batch_size` ids from the checkpoint cursor, one at a
//! time, with a fixed pause between consecutive actions. Failures consume
//! their slot; nothing is retried within a pass.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use followback_common::{AccountId, Category};

use crate::checkpoint::Checkpoint;
use crate::traits::ActionExecutor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchState {
    Idle,
    Running,
    BatchComplete,
    Exhausted,
    Interrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionOutcome {
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDetail {
    pub id: AccountId,
    pub outcome: ActionOutcome,
    pub category: Option<Category>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub state: BatchState,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub details: Vec<ActionDetail>,
}

impl BatchResult {
    fn new(state: BatchState) -> Self {
        Self {
            state,
            attempted: 0,
            succeeded: 0,
            failed: 0,
            details: Vec::new(),
        }
    }
}

pub struct BatchExecutor {
    executor: Arc<dyn ActionExecutor>,
    delay: Duration,
    cancelled: Arc<AtomicBool>,
    state: Mutex<BatchState>,
}

impl BatchExecutor {
    pub fn new(executor: Arc<dyn ActionExecutor>, delay: Duration, cancelled: Arc<AtomicBool>) -> Self {
        Self {
            executor,
            delay,
            cancelled,
            state: Mutex::new(BatchState::Idle),
        }
    }

    /// State after the most recent `run_batch` (or `Idle` before the first).
    pub fn state(&self) -> BatchState {
        *self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn set_state(&self, state: BatchState) {
        *self.state.lock().unwrap_or_else(|p| p.into_inner()) = state;
    }

    /// Run one batch starting at the checkpoint cursor.
    ///
    /// The returned checkpoint has its cursor advanced by the number of ids
    /// attempted and `last_run` set, whatever the terminal state.
    pub async fn run_batch(&self, mut checkpoint: Checkpoint, batch_size: usize) -> (Checkpoint, BatchResult) {
        self.set_state(BatchState::Running);

        if checkpoint.is_exhausted() {
            checkpoint.last_run = Some(Utc::now());
            self.set_state(BatchState::Exhausted);
            info!(total = checkpoint.total, "Action set exhausted");
            return (checkpoint, BatchResult::new(BatchState::Exhausted));
        }

        let slice: Vec<AccountId> = checkpoint
            .remaining()
            .iter()
            .take(batch_size)
            .cloned()
            .collect();

        info!(
            cursor = checkpoint.cursor,
            total = checkpoint.total,
            batch = slice.len(),
            "Starting batch"
        );

        let mut result = BatchResult::new(BatchState::BatchComplete);
        for (i, id) in slice.iter().enumerate() {
            if i > 0 && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            // After the delay: a signal raised while sleeping stops the next action.
            if self.cancelled.load(Ordering::Relaxed) {
                info!(attempted = result.attempted, "Batch interrupted");
                result.state = BatchState::Interrupted;
                break;
            }

            let category = checkpoint.category_of(id);
            let detail = match self.executor.perform_action(id).await {
                Ok(()) => {
                    result.succeeded += 1;
                    info!(id = %id, "Action succeeded");
                    ActionDetail {
                        id: id.clone(),
                        outcome: ActionOutcome::Success,
                        category,
                        error: None,
                    }
                }
                Err(e) => {
                    result.failed += 1;
                    warn!(id = %id, error = %e, "Action failed");
                    ActionDetail {
                        id: id.clone(),
                        outcome: ActionOutcome::Failed,
                        category,
                        error: Some(format!("{e:#}")),
                    }
                }
            };
            result.attempted += 1;
            result.details.push(detail);
        }

        checkpoint.cursor += result.attempted;
        checkpoint.last_run = Some(Utc::now());
        self.set_state(result.state);

        info!(
            state = ?result.state,
            attempted = result.attempted,
            succeeded = result.succeeded,
            failed = result.failed,
            cursor = checkpoint.cursor,
            total = checkpoint.total,
            "Batch finished"
        );
        (checkpoint, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockExecutor;
    use std::collections::BTreeMap;

    fn checkpoint(raw: &[&str]) -> Checkpoint {
        let ids = raw.iter().map(|s| AccountId::from(*s)).collect();
        Checkpoint::new(ids, BTreeMap::new(), None)
    }

    fn executor(mock: Arc<MockExecutor>) -> BatchExecutor {
        BatchExecutor::new(mock, Duration::ZERO, Arc::new(AtomicBool::new(false)))
    }

    #[tokio::test]
    async fn exhausted_checkpoint_performs_nothing() {
        let mock = Arc::new(MockExecutor::new());
        let exec = executor(mock.clone());
        let mut cp = checkpoint(&["a"]);
        cp.cursor = 1;

        let (cp, result) = exec.run_batch(cp, 5).await;
        assert_eq!(result.state, BatchState::Exhausted);
        assert_eq!(result.attempted, 0);
        assert!(mock.performed().is_empty());
        assert!(cp.last_run.is_some());
        assert_eq!(exec.state(), BatchState::Exhausted);
    }

    #[tokio::test]
    async fn partial_final_batch_stops_at_total() {
        let mock = Arc::new(MockExecutor::new());
        let exec = executor(mock.clone());

        let (cp, result) = exec.run_batch(checkpoint(&["a", "b", "c"]), 2).await;
        assert_eq!(result.state, BatchState::BatchComplete);
        assert_eq!(cp.cursor, 2);

        let (cp, result) = exec.run_batch(cp, 2).await;
        assert_eq!(result.attempted, 1);
        assert_eq!(cp.cursor, 3);
        assert_eq!(mock.performed(), vec![AccountId::from("a"), "b".into(), "c".into()]);
    }

    #[tokio::test]
    async fn failures_consume_their_slot() {
        let mock = Arc::new(MockExecutor::new().fail_on("b", "HTTP 403"));
        let exec = executor(mock.clone());

        let (cp, result) = exec.run_batch(checkpoint(&["a", "b", "c"]), 3).await;
        assert_eq!(cp.cursor, 3);
        assert_eq!(result.succeeded, 2);
        assert_eq!(result.failed, 1);
        let failed = &result.details[1];
        assert_eq!(failed.outcome, ActionOutcome::Failed);
        assert!(failed.error.as_deref().unwrap().contains("403"));
    }

    #[tokio::test]
    async fn details_carry_categories() {
        let mock = Arc::new(MockExecutor::new());
        let exec = executor(mock);
        let mut cp = checkpoint(&["a"]);
        cp.categories.insert("a".into(), Category::Other);

        let (_, result) = exec.run_batch(cp, 1).await;
        assert_eq!(result.details[0].category, Some(Category::Other));
    }

    #[tokio::test]
    async fn interrupt_before_start_attempts_nothing() {
        let mock = Arc::new(MockExecutor::new());
        let exec = BatchExecutor::new(mock.clone(), Duration::ZERO, Arc::new(AtomicBool::new(true)));

        let (cp, result) = exec.run_batch(checkpoint(&["a", "b"]), 2).await;
        assert_eq!(result.state, BatchState::Interrupted);
        assert_eq!(cp.cursor, 0);
        assert!(cp.last_run.is_some());
        assert!(mock.performed().is_empty());
    }

    #[tokio::test]
    async fn interrupt_mid_batch_keeps_attempted_progress() {
        let cancelled = Arc::new(AtomicBool::new(false));
        let mock = Arc::new(MockExecutor::new().cancel_after(1, cancelled.clone()));
        let exec = BatchExecutor::new(mock.clone(), Duration::ZERO, cancelled);

        let (cp, result) = exec.run_batch(checkpoint(&["a", "b", "c"]), 3).await;
        assert_eq!(result.state, BatchState::Interrupted);
        assert_eq!(result.attempted, 1);
        assert_eq!(cp.cursor, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn interrupt_during_delay_skips_next_action() {
        let cancelled = Arc::new(AtomicBool::new(false));
        let mock = Arc::new(MockExecutor::new());
        let exec = BatchExecutor::new(mock.clone(), Duration::from_secs(3), cancelled.clone());

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            cancelled.store(true, Ordering::SeqCst);
        });

        let (cp, result) = exec.run_batch(checkpoint(&["a", "b", "c"]), 3).await;
        assert_eq!(result.state, BatchState::Interrupted);
        assert_eq!(result.attempted, 1);
        assert_eq!(cp.cursor, 1);
        assert_eq!(mock.performed(), vec![AccountId::from("a")]);
    }

    #[tokio::test(start_paused = true)]
    async fn delay_only_between_actions() {
        let mock = Arc::new(MockExecutor::new());
        let exec = BatchExecutor::new(mock, Duration::from_secs(3), Arc::new(AtomicBool::new(false)));

        let start = tokio::time::Instant::now();
        exec.run_batch(checkpoint(&["a", "b", "c"]), 3).await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(6), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(9), "{elapsed:?}");
    }
}
