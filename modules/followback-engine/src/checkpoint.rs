//! Durable progress record for the action pass.
//!
//! A checkpoint is the single source of truth for "what remains": the sorted
//! action set and a cursor into it. A new pass replaces the record wholesale.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use followback_common::{AccountId, Category, CheckpointError};

pub const CHECKPOINT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(rename = "v")]
    pub version: u32,
    pub action_set: Vec<AccountId>,
    pub cursor: usize,
    pub total: usize,
    pub last_run: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Category per action-set id, for labelling batch details.
    #[serde(default)]
    pub categories: BTreeMap<AccountId, Category>,
    /// Classification report this set was derived from.
    #[serde(default)]
    pub report_path: Option<PathBuf>,
}

impl Checkpoint {
    /// The record a first run starts from.
    pub fn empty() -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            action_set: Vec::new(),
            cursor: 0,
            total: 0,
            last_run: None,
            created_at: None,
            categories: BTreeMap::new(),
            report_path: None,
        }
    }

    /// Fresh record for a new pass. `action_set` must already be sorted.
    pub fn new(
        action_set: Vec<AccountId>,
        categories: BTreeMap<AccountId, Category>,
        report_path: Option<PathBuf>,
    ) -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            total: action_set.len(),
            action_set,
            cursor: 0,
            last_run: None,
            created_at: Some(Utc::now()),
            categories,
            report_path,
        }
    }

    /// Ids not yet attempted.
    pub fn remaining(&self) -> &[AccountId] {
        self.action_set.get(self.cursor..).unwrap_or(&[])
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.total
    }

    pub fn category_of(&self, id: &AccountId) -> Option<Category> {
        self.categories.get(id).copied()
    }

    pub fn validate(&self) -> Result<(), CheckpointError> {
        if self.version != CHECKPOINT_VERSION {
            return Err(CheckpointError::Corrupt(format!(
                "unsupported version {} (expected {CHECKPOINT_VERSION})",
                self.version
            )));
        }
        if self.total != self.action_set.len() {
            return Err(CheckpointError::Corrupt(format!(
                "total {} does not match action set length {}",
                self.total,
                self.action_set.len()
            )));
        }
        if self.cursor > self.total {
            return Err(CheckpointError::Corrupt(format!(
                "cursor {} beyond total {}",
                self.cursor, self.total
            )));
        }
        Ok(())
    }
}

impl Default for Checkpoint {
    fn default() -> Self {
        Self::empty()
    }
}

// ---------------------------------------------------------------------------
// Stores
// ---------------------------------------------------------------------------

pub trait CheckpointStore: Send + Sync {
    /// Current record, or [`Checkpoint::empty`] if none was ever saved.
    fn load(&self) -> Result<Checkpoint, CheckpointError>;

    fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError>;
}

/// JSON file, replaced atomically on every save.
pub struct FileCheckpointStore {
    path: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn load(&self) -> Result<Checkpoint, CheckpointError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "No checkpoint yet");
            return Ok(Checkpoint::empty());
        }
        let raw = fs::read_to_string(&self.path)?;
        let checkpoint: Checkpoint = serde_json::from_str(&raw)
            .map_err(|e| CheckpointError::Corrupt(format!("{}: {e}", self.path.display())))?;
        checkpoint.validate()?;
        Ok(checkpoint)
    }

    fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let json = serde_json::to_vec_pretty(checkpoint)
            .map_err(|e| CheckpointError::Serialize(e.to_string()))?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(&json)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| CheckpointError::Io(e.error))?;

        debug!(
            path = %self.path.display(),
            cursor = checkpoint.cursor,
            total = checkpoint.total,
            "Checkpoint saved"
        );
        Ok(())
    }
}

/// Process-local store. Round-trips through JSON so it behaves like the file
/// store with respect to what survives a save.
pub struct MemoryCheckpointStore {
    record: Mutex<Option<String>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self {
            record: Mutex::new(None),
        }
    }

    pub fn with_checkpoint(checkpoint: &Checkpoint) -> Result<Self, CheckpointError> {
        let store = Self::new();
        store.save(checkpoint)?;
        Ok(store)
    }
}

impl Default for MemoryCheckpointStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn load(&self) -> Result<Checkpoint, CheckpointError> {
        let record = self.record.lock().unwrap_or_else(|p| p.into_inner());
        match record.as_deref() {
            None => Ok(Checkpoint::empty()),
            Some(raw) => {
                let checkpoint: Checkpoint =
                    serde_json::from_str(raw).map_err(|e| CheckpointError::Corrupt(e.to_string()))?;
                checkpoint.validate()?;
                Ok(checkpoint)
            }
        }
    }

    fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let raw = serde_json::to_string(checkpoint)
            .map_err(|e| CheckpointError::Serialize(e.to_string()))?;
        *self.record.lock().unwrap_or_else(|p| p.into_inner()) = Some(raw);
        Ok(())
    }
}
