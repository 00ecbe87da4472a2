use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::Notify;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use followback_common::{Config, FilterMode, FollowbackError, TransportKind};
use followback_engine::pipeline::{self, CycleOutcome, RefreshSummary};
use followback_engine::report::latest_report;
use followback_engine::{AdmissionRules, BatchState, FileCheckpointStore, Pipeline, PipelineSettings};

mod wiring;

#[derive(Parser)]
#[command(name = "followback")]
#[command(about = "Unfollow accounts that don't follow back, keeping engineers and researchers")]
#[command(version)]
struct Cli {
    /// Accounts per cycle (overrides BATCH_SIZE)
    #[arg(long, global = true)]
    batch_size: Option<usize>,

    /// x-api or dry-run (overrides TRANSPORT)
    #[arg(long, global = true)]
    transport: Option<TransportKind>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a cycle every CYCLE_INTERVAL_MINS until Ctrl-C
    Run,
    /// Run a single cycle and exit
    Once,
    /// Rebuild the action set
    Refresh {
        /// Re-derive from a classification report instead of the API
        /// (the newest one under DATA_DIR/reports when no path is given)
        #[arg(long, value_name = "PATH", num_args = 0..=1)]
        from_report: Option<Option<PathBuf>>,

        /// Use the aggressive admission preset with --from-report
        #[arg(long, requires = "from_report")]
        aggressive: bool,
    },
    /// Show progress of the current action set
    Status,
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("followback=info"))?;
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing()?;

    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    if let Some(batch_size) = cli.batch_size.filter(|n| *n > 0) {
        config.batch_size = batch_size;
    }
    if let Some(transport) = cli.transport {
        config.transport = transport;
    }
    config.log_redacted();

    let store = Arc::new(FileCheckpointStore::new(config.checkpoint_path()));

    match cli.command {
        Command::Status => {
            let status = pipeline::status(store.as_ref())?;
            print!("{status}");
        }
        Command::Refresh {
            from_report: Some(report),
            aggressive,
        } => {
            let report = match report {
                Some(path) => path,
                None => latest_report(&config.reports_dir()).with_context(|| {
                    format!("no classification report in {}", config.reports_dir().display())
                })?,
            };
            info!(report = %report.display(), "Using classification report");
            let mode = if aggressive { FilterMode::Aggressive } else { config.filter_mode };
            let summary = pipeline::refresh_from_report(store.as_ref(), &report, &AdmissionRules::for_mode(mode))?;
            log_refresh(&summary);
        }
        Command::Refresh { from_report: None, .. } => {
            let (pipeline, _) = build_pipeline(&config, store)?;
            let summary = pipeline.refresh().await?;
            log_refresh(&summary);
        }
        Command::Once => {
            let (pipeline, _) = build_pipeline(&config, store)?;
            let outcome = pipeline.run_cycle().await?;
            log_cycle(&outcome);
        }
        Command::Run => {
            let (pipeline, shutdown) = build_pipeline(&config, store)?;
            run_forever(&pipeline, &config, shutdown).await?;
        }
    }

    Ok(())
}

struct Shutdown {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

fn build_pipeline(config: &Config, store: Arc<FileCheckpointStore>) -> Result<(Pipeline, Shutdown)> {
    let transports = wiring::transports(config).context("wiring transports")?;

    let cancelled = Arc::new(AtomicBool::new(false));
    let notify = Arc::new(Notify::new());
    {
        let cancelled = cancelled.clone();
        let notify = notify.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Ctrl-C received, stopping after the current account");
                cancelled.store(true, Ordering::Relaxed);
                notify.notify_one();
            }
        });
    }

    let pipeline = Pipeline::new(
        transports,
        store,
        PipelineSettings::from_config(config),
        cancelled.clone(),
    );
    Ok((pipeline, Shutdown { cancelled, notify }))
}

async fn run_forever(pipeline: &Pipeline, config: &Config, shutdown: Shutdown) -> Result<()> {
    info!(
        interval_mins = config.cycle_interval.as_secs() / 60,
        batch_size = config.batch_size,
        "Scheduler started"
    );

    loop {
        match pipeline.run_cycle().await {
            Ok(outcome) => {
                log_cycle(&outcome);
                if outcome.batch.state == BatchState::Interrupted {
                    break;
                }
            }
            Err(FollowbackError::Interrupted) => break,
            Err(e @ FollowbackError::Checkpoint(_)) => return Err(e.into()),
            Err(e) => error!(error = %e, "Cycle failed, retrying next interval"),
        }

        if shutdown.cancelled.load(Ordering::Relaxed) {
            break;
        }
        tokio::select! {
            _ = tokio::time::sleep(config.cycle_interval) => {}
            _ = shutdown.notify.notified() => break,
        }
    }

    let stats = pipeline.cache_stats();
    info!(cached_classifications = stats.size, "Scheduler stopped");
    Ok(())
}

fn log_cycle(outcome: &CycleOutcome) {
    let batch = &outcome.batch;
    info!(
        state = ?batch.state,
        attempted = batch.attempted,
        succeeded = batch.succeeded,
        failed = batch.failed,
        cursor = outcome.cursor,
        total = outcome.total,
        "Cycle complete"
    );
    if batch.failed > 0 {
        warn!(failed = batch.failed, "Some actions failed; see the action log");
    }
    if let Some(summary) = &outcome.refreshed {
        log_refresh(summary);
    }
}

fn log_refresh(summary: &RefreshSummary) {
    info!(
        following = ?summary.following,
        followers = ?summary.followers,
        candidates = summary.stats.total_candidates,
        immune = summary.stats.immune,
        analysis_errors = summary.stats.analysis_errors,
        fetch_failures = summary.stats.profile_fetch_failures,
        action_set = summary.action_set,
        report = %summary.report_path.display(),
        "Action set rebuilt"
    );
}
