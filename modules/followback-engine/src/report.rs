//! Classification report: one CSV row per candidate of a pass.
//!
//! Column names and the `immunity_status` values are read back by
//! `refresh --from-report` and by people, so they do not change.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use followback_common::{AccountId, Category, ClassificationResult, FollowbackError, ImmunityStatus, Profile};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    pub account_id: AccountId,
    pub account_handle: String,
    pub display_name: String,
    pub bio: String,
    pub location: String,
    pub followers_count: u64,
    pub verified: bool,
    pub category: Category,
    pub immunity_status: ImmunityStatus,
    pub confidence: f64,
    pub reasoning: String,
}

impl ReportRow {
    pub fn new(profile: &Profile, result: &ClassificationResult) -> Self {
        Self {
            account_id: profile.id.clone(),
            account_handle: profile.handle.clone(),
            display_name: profile.display_name.clone(),
            bio: profile.bio.clone(),
            location: profile.location.clone(),
            followers_count: profile.followers_count,
            verified: profile.verified,
            category: result.category,
            immunity_status: result.immunity_status(),
            confidence: result.confidence,
            reasoning: result.reasoning.clone(),
        }
    }
}

/// `classification_YYYYMMDD_HHMMSS.csv`
pub fn report_file_name(at: DateTime<Utc>) -> String {
    format!("classification_{}.csv", at.format("%Y%m%d_%H%M%S"))
}

pub fn write_report(path: &Path, rows: &[ReportRow]) -> Result<(), FollowbackError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| FollowbackError::Report(format!("{}: {e}", parent.display())))?;
    }
    let report_err = |e: csv::Error| FollowbackError::Report(format!("{}: {e}", path.display()));

    let mut writer = csv::Writer::from_path(path).map_err(report_err)?;
    if rows.is_empty() {
        writer
            .write_record(HEADER)
            .map_err(report_err)?;
    }
    for row in rows {
        writer.serialize(row).map_err(report_err)?;
    }
    writer
        .flush()
        .map_err(|e| FollowbackError::Report(format!("{}: {e}", path.display())))?;
    Ok(())
}

pub fn read_report(path: &Path) -> Result<Vec<ReportRow>, FollowbackError> {
    let report_err = |e: csv::Error| FollowbackError::Report(format!("{}: {e}", path.display()));
    let mut reader = csv::Reader::from_path(path).map_err(report_err)?;
    reader
        .deserialize()
        .collect::<Result<Vec<ReportRow>, _>>()
        .map_err(report_err)
}

/// Most recent `classification_*.csv` in `dir`, by file name.
pub fn latest_report(dir: &Path) -> Option<PathBuf> {
    let entries = fs::read_dir(dir).ok()?;
    entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("classification_") && n.ends_with(".csv"))
        })
        .max()
}

const HEADER: [&str; 11] = [
    "account_id",
    "account_handle",
    "display_name",
    "bio",
    "location",
    "followers_count",
    "verified",
    "category",
    "immunity_status",
    "confidence",
    "reasoning",
];

/// Counts for `status`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportSummary {
    pub rows: usize,
    pub immune: usize,
    pub not_immune: usize,
    pub analysis_error: usize,
    pub by_category: BTreeMap<Category, usize>,
}

impl ReportSummary {
    pub fn from_rows(rows: &[ReportRow]) -> Self {
        let mut summary = Self {
            rows: rows.len(),
            ..Self::default()
        };
        for row in rows {
            match row.immunity_status {
                ImmunityStatus::Immune => summary.immune += 1,
                ImmunityStatus::NotImmune => summary.not_immune += 1,
                ImmunityStatus::AnalysisError => summary.analysis_error += 1,
            }
            *summary.by_category.entry(row.category).or_default() += 1;
        }
        summary
    }
}
