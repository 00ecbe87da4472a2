//! Immunity filter: candidates in, action set out.
//!
//! Two entry points:
//! - [`ImmunityFilter::filter`] fetches and classifies every candidate.
//! - [`admit`] re-derives an action set from an earlier report without
//!   touching the classifier.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use followback_common::{
    AccountId, Category, ClassificationResult, FilterMode, FollowbackError, ImmunityStatus, Profile,
};

use crate::classifier::ClassificationGate;
use crate::report::ReportRow;
use crate::traits::ProfileFetcher;

/// Ids per profile lookup.
pub const PROFILE_CHUNK: usize = 100;

/// Reasoning prefix for rows classified from an empty stand-in profile.
pub const PROFILE_UNAVAILABLE: &str = "profile unavailable";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterStats {
    pub total_candidates: usize,
    pub immune: usize,
    pub eligible: usize,
    pub analysis_errors: usize,
    pub profile_fetch_failures: usize,
    pub by_category: BTreeMap<Category, usize>,
}

impl FilterStats {
    fn record(&mut self, category: Category, status: ImmunityStatus, immune: bool) {
        *self.by_category.entry(category).or_default() += 1;
        if status == ImmunityStatus::AnalysisError {
            self.analysis_errors += 1;
        }
        if immune {
            self.immune += 1;
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FilterOutcome {
    /// Sorted ascending.
    pub action_set: Vec<AccountId>,
    pub categories: BTreeMap<AccountId, Category>,
    pub stats: FilterStats,
    pub rows: Vec<ReportRow>,
}

impl FilterOutcome {
    fn finish(mut self) -> Self {
        self.action_set.sort();
        self.stats.eligible = self.action_set.len();
        self
    }
}

pub struct ImmunityFilter {
    profiles: Arc<dyn ProfileFetcher>,
    gate: Arc<ClassificationGate>,
    classify_delay: Duration,
    cancelled: Arc<AtomicBool>,
}

impl ImmunityFilter {
    pub fn new(
        profiles: Arc<dyn ProfileFetcher>,
        gate: Arc<ClassificationGate>,
        classify_delay: Duration,
        cancelled: Arc<AtomicBool>,
    ) -> Self {
        Self {
            profiles,
            gate,
            classify_delay,
            cancelled,
        }
    }

    /// Classify every candidate and keep the non-immune ones.
    ///
    /// Fails only with `Interrupted`; fetch and backend failures degrade to
    /// the empty profile and the gate's fallbacks.
    pub async fn filter(&self, candidates: &[AccountId]) -> Result<FilterOutcome, FollowbackError> {
        let mut outcome = FilterOutcome {
            stats: FilterStats {
                total_candidates: candidates.len(),
                ..FilterStats::default()
            },
            ..FilterOutcome::default()
        };

        info!(
            candidates = candidates.len(),
            backend = self.gate.backend_name(),
            "Filtering candidates"
        );

        let mut done = 0usize;
        for chunk in candidates.chunks(PROFILE_CHUNK) {
            let mut profiles = self.fetch_chunk(chunk).await;

            for id in chunk {
                if self.cancelled.load(Ordering::Relaxed) {
                    info!(classified = done, "Filter pass interrupted");
                    return Err(FollowbackError::Interrupted);
                }

                let (profile, substituted) = match profiles.remove(id) {
                    Some(p) => (p, false),
                    None => {
                        outcome.stats.profile_fetch_failures += 1;
                        (Profile::empty(id.clone()), true)
                    }
                };

                let (result, origin) = self.gate.classify_traced(&profile).await;
                self.include(&mut outcome, &profile, &result, substituted);
                done += 1;

                if done % 50 == 0 {
                    info!(classified = done, total = candidates.len(), "Filter progress");
                }
                if origin.consulted_backend() && done < candidates.len() && !self.classify_delay.is_zero() {
                    tokio::time::sleep(self.classify_delay).await;
                }
            }
        }

        let outcome = outcome.finish();
        info!(
            total = outcome.stats.total_candidates,
            immune = outcome.stats.immune,
            eligible = outcome.stats.eligible,
            analysis_errors = outcome.stats.analysis_errors,
            fetch_failures = outcome.stats.profile_fetch_failures,
            "Filter pass complete"
        );
        Ok(outcome)
    }

    async fn fetch_chunk(&self, chunk: &[AccountId]) -> HashMap<AccountId, Profile> {
        match self.profiles.fetch_profiles(chunk).await {
            Ok(map) => {
                if map.len() < chunk.len() {
                    warn!(requested = chunk.len(), returned = map.len(), "Some profiles unavailable");
                }
                map
            }
            Err(e) => {
                warn!(error = %e, ids = chunk.len(), "Profile lookup failed, using empty profiles");
                HashMap::new()
            }
        }
    }

    fn include(
        &self,
        outcome: &mut FilterOutcome,
        profile: &Profile,
        result: &ClassificationResult,
        substituted: bool,
    ) {
        let status = result.immunity_status();
        outcome.stats.record(result.category, status, result.immune);
        // UNKNOWN/ERROR rows are never acted on, whatever the immune flag says.
        if status == ImmunityStatus::NotImmune {
            outcome.action_set.push(profile.id.clone());
            outcome.categories.insert(profile.id.clone(), result.category);
        }
        let mut row = ReportRow::new(profile, result);
        if substituted {
            row.reasoning = format!("{PROFILE_UNAVAILABLE}; {}", row.reasoning);
        }
        outcome.rows.push(row);
    }
}

// ---------------------------------------------------------------------------
// Pre-classified admission
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct AdmissionRules {
    pub min_confidence: f64,
    pub exclude_categories: BTreeSet<Category>,
    pub min_followers: u64,
    pub max_followers: Option<u64>,
    pub exclude_verified: bool,
}

impl AdmissionRules {
    pub fn normal() -> Self {
        Self {
            min_confidence: 0.5,
            exclude_categories: BTreeSet::from([
                Category::Engineer,
                Category::Researcher,
                Category::Academic,
                Category::TechLeader,
            ]),
            min_followers: 0,
            max_followers: None,
            exclude_verified: false,
        }
    }

    pub fn aggressive() -> Self {
        let mut rules = Self::normal();
        rules.min_confidence = 0.7;
        rules.exclude_categories.insert(Category::TechWorker);
        rules.max_followers = Some(100_000);
        rules.exclude_verified = true;
        rules
    }

    pub fn for_mode(mode: FilterMode) -> Self {
        match mode {
            FilterMode::Normal => Self::normal(),
            FilterMode::Aggressive => Self::aggressive(),
        }
    }

    pub fn admits(&self, row: &ReportRow) -> bool {
        row.immunity_status == ImmunityStatus::NotImmune
            && row.confidence >= self.min_confidence
            && !self.exclude_categories.contains(&row.category)
            && row.followers_count >= self.min_followers
            && self.max_followers.is_none_or(|max| row.followers_count <= max)
            && !(self.exclude_verified && row.verified)
    }
}

/// Action set from a previously exported classification table.
pub fn admit(rows: &[ReportRow], rules: &AdmissionRules) -> FilterOutcome {
    let mut outcome = FilterOutcome {
        stats: FilterStats {
            total_candidates: rows.len(),
            ..FilterStats::default()
        },
        ..FilterOutcome::default()
    };

    for row in rows {
        outcome
            .stats
            .record(row.category, row.immunity_status, row.immunity_status == ImmunityStatus::Immune);
        if rules.admits(row) {
            outcome.action_set.push(row.account_id.clone());
            outcome.categories.insert(row.account_id.clone(), row.category);
        }
    }
    outcome.rows = rows.to_vec();
    outcome.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{profile, MockClassifier, MockProfiles};

    fn row(id: &str, category: Category, status: ImmunityStatus, confidence: f64) -> ReportRow {
        ReportRow {
            account_id: id.into(),
            account_handle: id.into(),
            display_name: String::new(),
            bio: String::new(),
            location: String::new(),
            followers_count: 500,
            verified: false,
            category,
            immunity_status: status,
            confidence,
            reasoning: String::new(),
        }
    }

    fn ids(raw: &[&str]) -> Vec<AccountId> {
        raw.iter().map(|s| AccountId::from(*s)).collect()
    }

    fn filter_with(profiles: MockProfiles, classifier: MockClassifier) -> ImmunityFilter {
        ImmunityFilter::new(
            Arc::new(profiles),
            Arc::new(ClassificationGate::new(Arc::new(classifier))),
            Duration::ZERO,
            Arc::new(AtomicBool::new(false)),
        )
    }

    #[tokio::test]
    async fn keeps_only_non_immune_candidates() {
        let profiles = MockProfiles::new()
            .with(profile("a", "Staff engineer working on compilers"))
            .with(profile("c", "Gardening, cooking and hiking"))
            .with(profile("d", "Photographer and occasional poet"));
        let classifier = MockClassifier::new()
            .on_id("a", ClassificationResult::new(Category::Engineer, true, 0.9, "compilers"))
            .on_id("c", ClassificationResult::new(Category::Other, false, 0.8, "hobbies"))
            .on_id("d", ClassificationResult::new(Category::Other, false, 0.7, "arts"));

        let out = filter_with(profiles, classifier)
            .filter(&ids(&["a", "c", "d"]))
            .await
            .unwrap();

        assert_eq!(out.action_set, ids(&["c", "d"]));
        assert_eq!(out.stats.immune, 1);
        assert_eq!(out.stats.eligible, 2);
        assert_eq!(out.stats.by_category[&Category::Other], 2);
        assert_eq!(out.rows.len(), 3);
        assert_eq!(out.categories[&AccountId::from("c")], Category::Other);
    }

    #[tokio::test]
    async fn missing_profiles_fall_back_to_empty() {
        let out = filter_with(MockProfiles::new(), MockClassifier::new())
            .filter(&ids(&["ghost"]))
            .await
            .unwrap();

        assert_eq!(out.stats.profile_fetch_failures, 1);
        // Empty bio short-circuits to not immune.
        assert_eq!(out.action_set, ids(&["ghost"]));
        assert_eq!(out.rows[0].reasoning, "profile unavailable; bio too short to classify");
    }

    #[tokio::test]
    async fn report_distinguishes_missing_profile_from_empty_bio() {
        let profiles = MockProfiles::new().with(profile("quiet", ""));
        let out = filter_with(profiles, MockClassifier::new())
            .filter(&ids(&["ghost", "quiet"]))
            .await
            .unwrap();
        assert_eq!(out.action_set, ids(&["ghost", "quiet"]));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("classification.csv");
        crate::report::write_report(&path, &out.rows).unwrap();
        let rows = crate::report::read_report(&path).unwrap();

        let ghost = rows.iter().find(|r| r.account_id == AccountId::from("ghost")).unwrap();
        let quiet = rows.iter().find(|r| r.account_id == AccountId::from("quiet")).unwrap();
        assert!(ghost.reasoning.starts_with(PROFILE_UNAVAILABLE));
        assert!(!quiet.reasoning.starts_with(PROFILE_UNAVAILABLE));
        assert_eq!(ghost.immunity_status, ImmunityStatus::NotImmune);
        assert_eq!(ghost.confidence, quiet.confidence);
    }

    #[tokio::test]
    async fn mislabelled_reply_is_never_acted_on() {
        let profiles = MockProfiles::new().with(profile("a", "Long enough bio to classify"));
        let classifier = MockClassifier::new()
            .on_id("a", ClassificationResult::new(Category::Unknown, false, 0.9, "unsure"));

        let out = filter_with(profiles, classifier).filter(&ids(&["a"])).await.unwrap();
        assert!(out.action_set.is_empty());
        assert_eq!(out.rows[0].immunity_status, ImmunityStatus::AnalysisError);
        assert!(admit(&out.rows, &AdmissionRules::normal()).action_set.is_empty());
    }

    #[tokio::test]
    async fn failed_lookup_degrades_whole_chunk() {
        let out = filter_with(MockProfiles::new().failing(), MockClassifier::new())
            .filter(&ids(&["a", "b"]))
            .await
            .unwrap();
        assert_eq!(out.stats.profile_fetch_failures, 2);
    }

    #[tokio::test]
    async fn unreachable_backend_never_admits() {
        let profiles = MockProfiles::new().with(profile("a", "Long enough bio to classify"));
        let classifier = MockClassifier::new()
            .fail_id("a", crate::traits::BackendError::Transport("connection reset".into()));

        let out = filter_with(profiles, classifier).filter(&ids(&["a"])).await.unwrap();
        assert!(out.action_set.is_empty());
        assert_eq!(out.stats.analysis_errors, 1);
        assert_eq!(out.rows[0].immunity_status, ImmunityStatus::AnalysisError);
    }

    #[tokio::test]
    async fn interrupt_aborts_the_pass() {
        let filter = ImmunityFilter::new(
            Arc::new(MockProfiles::new()),
            Arc::new(ClassificationGate::new(Arc::new(MockClassifier::new()))),
            Duration::ZERO,
            Arc::new(AtomicBool::new(true)),
        );
        let err = filter.filter(&ids(&["a"])).await.unwrap_err();
        assert!(matches!(err, FollowbackError::Interrupted));
    }

    #[tokio::test]
    async fn profiles_are_requested_in_chunks() {
        let profiles = Arc::new(MockProfiles::new());
        let filter = ImmunityFilter::new(
            profiles.clone(),
            Arc::new(ClassificationGate::new(Arc::new(MockClassifier::new()))),
            Duration::ZERO,
            Arc::new(AtomicBool::new(false)),
        );
        let candidates: Vec<AccountId> = (0..250).map(|i| AccountId::new(format!("{i:04}"))).collect();
        filter.filter(&candidates).await.unwrap();
        assert_eq!(profiles.lookup_sizes(), vec![100, 100, 50]);
    }

    #[test]
    fn normal_preset_excludes_professionals_and_low_confidence() {
        let rules = AdmissionRules::normal();
        assert!(rules.admits(&row("1", Category::Other, ImmunityStatus::NotImmune, 0.5)));
        assert!(rules.admits(&row("2", Category::TechWorker, ImmunityStatus::NotImmune, 0.8)));
        assert!(!rules.admits(&row("3", Category::Engineer, ImmunityStatus::NotImmune, 0.9)));
        assert!(!rules.admits(&row("4", Category::Other, ImmunityStatus::NotImmune, 0.49)));
        assert!(!rules.admits(&row("5", Category::Other, ImmunityStatus::Immune, 0.9)));
        assert!(!rules.admits(&row("6", Category::Unknown, ImmunityStatus::AnalysisError, 0.9)));
    }

    #[test]
    fn aggressive_preset_tightens_everything() {
        let rules = AdmissionRules::aggressive();
        assert!(!rules.admits(&row("1", Category::TechWorker, ImmunityStatus::NotImmune, 0.9)));
        assert!(!rules.admits(&row("2", Category::Other, ImmunityStatus::NotImmune, 0.6)));

        let mut big = row("3", Category::Other, ImmunityStatus::NotImmune, 0.9);
        big.followers_count = 100_001;
        assert!(!rules.admits(&big));
        big.followers_count = 100_000;
        assert!(rules.admits(&big));

        big.verified = true;
        assert!(!rules.admits(&big));
        assert!(AdmissionRules::normal().admits(&big));
    }

    #[test]
    fn admit_builds_sorted_action_set() {
        let rows = vec![
            row("z", Category::Other, ImmunityStatus::NotImmune, 0.9),
            row("a", Category::Other, ImmunityStatus::NotImmune, 0.9),
            row("m", Category::Researcher, ImmunityStatus::Immune, 0.9),
        ];
        let out = admit(&rows, &AdmissionRules::for_mode(FilterMode::Normal));
        assert_eq!(out.action_set, ids(&["a", "z"]));
        assert_eq!(out.stats.total_candidates, 3);
        assert_eq!(out.stats.immune, 1);
        assert_eq!(out.stats.eligible, 2);
    }
}
