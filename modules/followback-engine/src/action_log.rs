//! Append-only action log: one JSON line per attempted action.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use followback_common::{AccountId, Category};

use crate::executor::{ActionOutcome, BatchResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub ts: DateTime<Utc>,
    pub id: AccountId,
    pub outcome: ActionOutcome,
    pub category: Option<Category>,
    pub error: Option<String>,
}

pub struct ActionLog {
    path: PathBuf,
}

impl ActionLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append every detail of `result`. Returns the number of lines written.
    pub fn append(&self, result: &BatchResult) -> Result<usize> {
        if result.details.is_empty() {
            return Ok(0);
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let ts = Utc::now();
        let mut buf = String::new();
        for detail in &result.details {
            let record = ActionRecord {
                ts,
                id: detail.id.clone(),
                outcome: detail.outcome,
                category: detail.category,
                error: detail.error.clone(),
            };
            buf.push_str(&serde_json::to_string(&record)?);
            buf.push('\n');
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("opening {}", self.path.display()))?;
        file.write_all(buf.as_bytes())?;
        Ok(result.details.len())
    }

    /// All records so far. Missing file reads as empty.
    pub fn read_all(&self) -> Result<Vec<ActionRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&self.path)?;
        raw.lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).with_context(|| format!("bad action log line: {l}")))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{ActionDetail, BatchState};

    fn batch(details: Vec<ActionDetail>) -> BatchResult {
        BatchResult {
            state: BatchState::BatchComplete,
            attempted: details.len(),
            succeeded: details.iter().filter(|d| d.outcome == ActionOutcome::Success).count(),
            failed: details.iter().filter(|d| d.outcome == ActionOutcome::Failed).count(),
            details,
        }
    }

    #[test]
    fn appends_one_line_per_detail() {
        let dir = tempfile::tempdir().unwrap();
        let log = ActionLog::new(dir.path().join("logs/actions.jsonl"));

        let first = batch(vec![ActionDetail {
            id: "a".into(),
            outcome: ActionOutcome::Success,
            category: Some(Category::Other),
            error: None,
        }]);
        let second = batch(vec![ActionDetail {
            id: "b".into(),
            outcome: ActionOutcome::Failed,
            category: None,
            error: Some("HTTP 429".into()),
        }]);
        assert_eq!(log.append(&first).unwrap(), 1);
        assert_eq!(log.append(&second).unwrap(), 1);

        let records = log.read_all().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, AccountId::from("a"));
        assert_eq!(records[1].outcome, ActionOutcome::Failed);
        assert_eq!(records[1].error.as_deref(), Some("HTTP 429"));

        let raw = fs::read_to_string(log.path()).unwrap();
        assert!(raw.lines().next().unwrap().contains("\"outcome\":\"success\""));
    }

    #[test]
    fn empty_batch_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let log = ActionLog::new(dir.path().join("actions.jsonl"));
        assert_eq!(log.append(&batch(Vec::new())).unwrap(), 0);
        assert!(!log.path().exists());
        assert!(log.read_all().unwrap().is_empty());
    }
}
