pub mod action_log;
pub mod checkpoint;
pub mod classifier;
pub mod diff;
pub mod executor;
pub mod filter;
pub mod pipeline;
pub mod report;
pub mod traits;
pub mod transports;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use action_log::{ActionLog, ActionRecord};
pub use checkpoint::{Checkpoint, CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
pub use classifier::{CacheStats, ClassificationGate};
pub use diff::diff;
pub use executor::{ActionDetail, ActionOutcome, BatchExecutor, BatchResult, BatchState};
pub use filter::{AdmissionRules, FilterOutcome, FilterStats, ImmunityFilter};
pub use pipeline::{CycleOutcome, Pipeline, PipelineSettings, RefreshSummary, StatusReport, Transports};
pub use report::{ReportRow, ReportSummary};
pub use transports::{DryRunExecutor, XTransport};
pub use traits::{ActionExecutor, BackendError, ClassifierBackend, MembershipSource, ProfileFetcher};
