use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// --- Identity ---

/// Opaque account identifier. Two ids are the same account iff the strings
/// match; ordering is lexicographic so persisted action sets are reproducible.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AccountId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// --- Profile ---

/// Snapshot of an account's public description at classification time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: AccountId,
    /// `@username` without the `@`.
    pub handle: String,
    pub display_name: String,
    pub bio: String,
    pub location: String,
    pub followers_count: u64,
    pub verified: bool,
}

impl Profile {
    /// Stand-in used when the profile could not be fetched.
    pub fn empty(id: AccountId) -> Self {
        Self {
            handle: String::new(),
            display_name: String::new(),
            bio: String::new(),
            location: String::new(),
            followers_count: 0,
            verified: false,
            id,
        }
    }

    /// Handle if known, otherwise the raw id.
    pub fn label(&self) -> &str {
        if self.handle.is_empty() {
            self.id.as_str()
        } else {
            &self.handle
        }
    }
}

// --- Classification ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Engineer,
    Researcher,
    Academic,
    TechWorker,
    TechLeader,
    Other,
    Unknown,
    Error,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Engineer,
        Category::Researcher,
        Category::Academic,
        Category::TechWorker,
        Category::TechLeader,
        Category::Other,
        Category::Unknown,
        Category::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Engineer => "ENGINEER",
            Category::Researcher => "RESEARCHER",
            Category::Academic => "ACADEMIC",
            Category::TechWorker => "TECH_WORKER",
            Category::TechLeader => "TECH_LEADER",
            Category::Other => "OTHER",
            Category::Unknown => "UNKNOWN",
            Category::Error => "ERROR",
        }
    }

    /// Map a model-supplied label onto a category. Older prompt vocabularies
    /// (DEVELOPER, AI_RESEARCHER, TECH_EXECUTIVE, ...) are folded in; anything
    /// unrecognised is `Other`.
    pub fn from_label(label: &str) -> Category {
        let normalized = label.trim().to_ascii_uppercase().replace([' ', '-'], "_");
        if let Ok(category) = normalized.parse() {
            return category;
        }
        match normalized.as_str() {
            "DEVELOPER" | "PROGRAMMER" | "SOFTWARE_ENGINEER" => Category::Engineer,
            "AI_RESEARCHER" | "SCIENTIST" | "DATA_SCIENTIST" => Category::Researcher,
            "PROFESSOR" | "STUDENT_TECH" => Category::Academic,
            "TECH_EXECUTIVE" | "FOUNDER" | "CTO" => Category::TechLeader,
            "TECH_RELATED" | "CONTENT_CREATOR" => Category::TechWorker,
            _ => Category::Other,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown category: {s}"))
    }
}

/// Three-valued status written to classification reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImmunityStatus {
    Immune,
    NotImmune,
    AnalysisError,
}

impl ImmunityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImmunityStatus::Immune => "immune",
            ImmunityStatus::NotImmune => "not_immune",
            ImmunityStatus::AnalysisError => "analysis_error",
        }
    }
}

/// Clamp a confidence into `[0, 1]`. NaN carries no information and maps to
/// the neutral 0.5.
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.5
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub category: Category,
    pub immune: bool,
    pub confidence: f64,
    pub reasoning: String,
}

impl ClassificationResult {
    pub fn new(category: Category, immune: bool, confidence: f64, reasoning: impl Into<String>) -> Self {
        Self {
            category,
            immune,
            confidence: clamp_confidence(confidence),
            reasoning: reasoning.into(),
        }
    }

    pub fn immunity_status(&self) -> ImmunityStatus {
        match self.category {
            Category::Unknown | Category::Error => ImmunityStatus::AnalysisError,
            _ if self.immune => ImmunityStatus::Immune,
            _ => ImmunityStatus::NotImmune,
        }
    }
}
