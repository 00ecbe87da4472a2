//! Pass orchestration: refresh the action set, run one cycle, report status.
//!
//! Flow per cycle:
//! 1. Load the checkpoint (corruption is fatal).
//! 2. Run one batch from the cursor.
//! 3. Save the advanced checkpoint and append the action log.
//! 4. If the set was already exhausted, run a fresh diff + filter pass.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use followback_common::{AccountId, Config, FollowbackError};

use crate::action_log::ActionLog;
use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::classifier::{CacheStats, ClassificationGate};
use crate::diff::sorted_candidates;
use crate::executor::{BatchExecutor, BatchResult, BatchState};
use crate::filter::{admit, AdmissionRules, FilterOutcome, FilterStats, ImmunityFilter};
use crate::report::{read_report, report_file_name, write_report, ReportSummary};
use crate::traits::{ActionExecutor, ClassifierBackend, MembershipSource, ProfileFetcher};

/// Ids shown by `status`.
const PREVIEW_IDS: usize = 5;

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub batch_size: usize,
    pub action_delay: Duration,
    pub classify_delay: Duration,
    pub reports_dir: PathBuf,
    pub action_log_path: PathBuf,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            batch_size: config.batch_size,
            action_delay: config.action_delay,
            classify_delay: config.classify_delay,
            reports_dir: config.reports_dir(),
            action_log_path: config.action_log_path(),
        }
    }
}

/// The four transports a pipeline runs against.
pub struct Transports {
    pub membership: Arc<dyn MembershipSource>,
    pub profiles: Arc<dyn ProfileFetcher>,
    pub classifier: Arc<dyn ClassifierBackend>,
    pub executor: Arc<dyn ActionExecutor>,
}

#[derive(Debug, Clone)]
pub struct RefreshSummary {
    /// `None` when re-derived from a report.
    pub following: Option<usize>,
    pub followers: Option<usize>,
    pub stats: FilterStats,
    pub action_set: usize,
    pub report_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub batch: BatchResult,
    pub cursor: usize,
    pub total: usize,
    /// Set when the batch found the set exhausted and a new pass ran.
    pub refreshed: Option<RefreshSummary>,
}

pub struct Pipeline {
    membership: Arc<dyn MembershipSource>,
    gate: Arc<ClassificationGate>,
    filter: ImmunityFilter,
    executor: BatchExecutor,
    store: Arc<dyn CheckpointStore>,
    action_log: ActionLog,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        transports: Transports,
        store: Arc<dyn CheckpointStore>,
        settings: PipelineSettings,
        cancelled: Arc<AtomicBool>,
    ) -> Self {
        let gate = Arc::new(ClassificationGate::new(transports.classifier));
        let filter = ImmunityFilter::new(
            transports.profiles,
            gate.clone(),
            settings.classify_delay,
            cancelled.clone(),
        );
        let executor = BatchExecutor::new(transports.executor, settings.action_delay, cancelled);
        Self {
            membership: transports.membership,
            gate,
            filter,
            executor,
            store,
            action_log: ActionLog::new(&settings.action_log_path),
            settings,
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.gate.cache_stats()
    }

    // =========================================================================
    // refresh
    // =========================================================================

    /// Fetch membership, diff, classify, write a report and replace the
    /// checkpoint. Any failure before the save leaves the old record intact.
    pub async fn refresh(&self) -> Result<RefreshSummary, FollowbackError> {
        info!("Refreshing action set");
        let following = self
            .membership
            .fetch_following()
            .await
            .map_err(|e| FollowbackError::Membership(format!("{e:#}")))?;
        let followers = self
            .membership
            .fetch_followers()
            .await
            .map_err(|e| FollowbackError::Membership(format!("{e:#}")))?;

        let candidates = sorted_candidates(&following, &followers);
        info!(
            following = following.len(),
            followers = followers.len(),
            candidates = candidates.len(),
            "Computed non-reciprocal follows"
        );

        let outcome = self.filter.filter(&candidates).await?;
        let report_path = self
            .settings
            .reports_dir
            .join(report_file_name(Utc::now()));
        write_report(&report_path, &outcome.rows)?;

        let mut summary = replace_checkpoint(self.store.as_ref(), outcome, report_path)?;
        summary.following = Some(following.len());
        summary.followers = Some(followers.len());
        Ok(summary)
    }

    // =========================================================================
    // run_cycle
    // =========================================================================

    pub async fn run_cycle(&self) -> Result<CycleOutcome, FollowbackError> {
        let checkpoint = self.store.load().inspect_err(|e| {
            error!(error = %e, "Checkpoint unreadable, refusing to act");
        })?;

        let (checkpoint, batch) = self
            .executor
            .run_batch(checkpoint, self.settings.batch_size)
            .await;
        self.store.save(&checkpoint)?;

        if let Err(e) = self.action_log.append(&batch) {
            warn!(
                error = %e,
                path = %self.action_log.path().display(),
                "Could not append action log"
            );
        }

        let refreshed = if self.executor.state() == BatchState::Exhausted {
            Some(self.refresh().await?)
        } else {
            None
        };

        Ok(CycleOutcome {
            batch,
            cursor: checkpoint.cursor,
            total: checkpoint.total,
            refreshed,
        })
    }
}

// Store-only operations. These need no transports, so the CLI can run them
// without X credentials.

/// Replace the checkpoint with the action set admitted from `report`.
pub fn refresh_from_report(
    store: &dyn CheckpointStore,
    report: &Path,
    rules: &AdmissionRules,
) -> Result<RefreshSummary, FollowbackError> {
    let rows = read_report(report)?;
    info!(rows = rows.len(), report = %report.display(), "Re-deriving action set from report");
    let outcome = admit(&rows, rules);
    replace_checkpoint(store, outcome, report.to_path_buf())
}

fn replace_checkpoint(
    store: &dyn CheckpointStore,
    outcome: FilterOutcome,
    report_path: PathBuf,
) -> Result<RefreshSummary, FollowbackError> {
    let action_set = outcome.action_set.len();
    let checkpoint = Checkpoint::new(outcome.action_set, outcome.categories, Some(report_path.clone()));
    store.save(&checkpoint)?;

    info!(
        action_set,
        immune = outcome.stats.immune,
        report = %report_path.display(),
        "New action set saved"
    );
    Ok(RefreshSummary {
        following: None,
        followers: None,
        stats: outcome.stats,
        action_set,
        report_path,
    })
}

pub fn status(store: &dyn CheckpointStore) -> Result<StatusReport, FollowbackError> {
    let checkpoint = store.load()?;

    let report = match checkpoint.report_path.as_deref() {
        Some(path) if path.exists() => match read_report(path) {
            Ok(rows) => Some(ReportSummary::from_rows(&rows)),
            Err(e) => {
                warn!(error = %e, "Could not read classification report");
                None
            }
        },
        _ => None,
    };

    Ok(StatusReport {
        total: checkpoint.total,
        cursor: checkpoint.cursor,
        last_run: checkpoint.last_run,
        created_at: checkpoint.created_at,
        next_ids: checkpoint
            .remaining()
            .iter()
            .take(PREVIEW_IDS)
            .cloned()
            .collect(),
        report_path: checkpoint.report_path.clone(),
        report,
    })
}

#[derive(Debug, Clone)]
pub struct StatusReport {
    pub total: usize,
    pub cursor: usize,
    pub last_run: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub next_ids: Vec<AccountId>,
    pub report_path: Option<PathBuf>,
    pub report: Option<ReportSummary>,
}

impl StatusReport {
    pub fn remaining(&self) -> usize {
        self.total.saturating_sub(self.cursor)
    }

    pub fn percent_done(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.cursor as f64 * 100.0 / self.total as f64
        }
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.total == 0 {
            writeln!(f, "No action set. Run `followback refresh` to build one.")?;
        } else {
            writeln!(
                f,
                "Progress: {}/{} ({:.1}%), {} remaining",
                self.cursor,
                self.total,
                self.percent_done(),
                self.remaining()
            )?;
        }
        match self.last_run {
            Some(at) => writeln!(f, "Last run: {}", at.format("%Y-%m-%d %H:%M:%S UTC"))?,
            None => writeln!(f, "Last run: never")?,
        }
        if let Some(at) = self.created_at {
            writeln!(f, "Action set built: {}", at.format("%Y-%m-%d %H:%M:%S UTC"))?;
        }
        if !self.next_ids.is_empty() {
            let ids: Vec<&str> = self.next_ids.iter().map(|id| id.as_str()).collect();
            writeln!(f, "Next: {}", ids.join(", "))?;
        }
        if let Some(path) = &self.report_path {
            writeln!(f, "Report: {}", path.display())?;
        }
        if let Some(report) = &self.report {
            writeln!(
                f,
                "  {} classified: {} immune, {} not immune, {} analysis errors",
                report.rows, report.immune, report.not_immune, report.analysis_error
            )?;
            for (category, count) in &report.by_category {
                writeln!(f, "  {category:<12} {count}")?;
            }
        }
        Ok(())
    }
}
