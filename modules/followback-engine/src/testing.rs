// Test mocks for the followback pipeline.
//
// One mock per trait boundary:
// - MockMembership (MembershipSource): fixed followers, mutable following
// - MockProfiles (ProfileFetcher): HashMap-based id→Profile, records lookups
// - MockClassifier (ClassifierBackend): per-id scripted results, counts calls
// - MockExecutor (ActionExecutor): records performed ids, scripted failures
//
// Plus `profile()` for building fixtures.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use followback_common::{AccountId, Category, ClassificationResult, Profile};

use crate::traits::{ActionExecutor, BackendError, ClassifierBackend, MembershipSource, ProfileFetcher};

/// Profile with `handle == id` and the given bio.
pub fn profile(id: &str, bio: &str) -> Profile {
    Profile {
        handle: id.to_string(),
        display_name: id.to_uppercase(),
        bio: bio.to_string(),
        ..Profile::empty(id.into())
    }
}

fn id_set(ids: &[&str]) -> HashSet<AccountId> {
    ids.iter().map(|s| AccountId::from(*s)).collect()
}

// ---------------------------------------------------------------------------
// MockMembership
// ---------------------------------------------------------------------------

pub struct MockMembership {
    following: Mutex<HashSet<AccountId>>,
    followers: Mutex<HashSet<AccountId>>,
    fail: AtomicBool,
}

impl MockMembership {
    pub fn new(following: &[&str], followers: &[&str]) -> Self {
        Self {
            following: Mutex::new(id_set(following)),
            followers: Mutex::new(id_set(followers)),
            fail: AtomicBool::new(false),
        }
    }

    pub fn set_following(&self, ids: &[&str]) {
        *self.following.lock().unwrap() = id_set(ids);
    }

    /// Make every subsequent fetch fail (or succeed again).
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl MembershipSource for MockMembership {
    async fn fetch_following(&self) -> Result<HashSet<AccountId>> {
        if self.fail.load(Ordering::SeqCst) {
            bail!("following list unavailable");
        }
        Ok(self.following.lock().unwrap().clone())
    }

    async fn fetch_followers(&self) -> Result<HashSet<AccountId>> {
        if self.fail.load(Ordering::SeqCst) {
            bail!("followers list unavailable");
        }
        Ok(self.followers.lock().unwrap().clone())
    }
}

// ---------------------------------------------------------------------------
// MockProfiles
// ---------------------------------------------------------------------------

pub struct MockProfiles {
    profiles: HashMap<AccountId, Profile>,
    fail: bool,
    lookups: Mutex<Vec<usize>>,
}

impl MockProfiles {
    pub fn new() -> Self {
        Self {
            profiles: HashMap::new(),
            fail: false,
            lookups: Mutex::new(Vec::new()),
        }
    }

    pub fn with(mut self, profile: Profile) -> Self {
        self.profiles.insert(profile.id.clone(), profile);
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Size of each batch lookup, in call order.
    pub fn lookup_sizes(&self) -> Vec<usize> {
        self.lookups.lock().unwrap().clone()
    }
}

impl Default for MockProfiles {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProfileFetcher for MockProfiles {
    async fn fetch_profile(&self, id: &AccountId) -> Result<Profile> {
        if self.fail {
            bail!("profile service down");
        }
        self.profiles
            .get(id)
            .cloned()
            .ok_or_else(|| anyhow!("no profile for {id}"))
    }

    async fn fetch_profiles(&self, ids: &[AccountId]) -> Result<HashMap<AccountId, Profile>> {
        self.lookups.lock().unwrap().push(ids.len());
        if self.fail {
            bail!("profile service down");
        }
        Ok(ids
            .iter()
            .filter_map(|id| self.profiles.get(id).map(|p| (id.clone(), p.clone())))
            .collect())
    }
}

// ---------------------------------------------------------------------------
// MockClassifier
// ---------------------------------------------------------------------------

/// Scripted backend. Unscripted ids get `OTHER`, not immune, 0.8.
pub struct MockClassifier {
    scripted: HashMap<AccountId, Result<ClassificationResult, BackendError>>,
    calls: AtomicUsize,
}

impl MockClassifier {
    pub fn new() -> Self {
        Self {
            scripted: HashMap::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn on_id(mut self, id: &str, result: ClassificationResult) -> Self {
        self.scripted.insert(id.into(), Ok(result));
        self
    }

    pub fn fail_id(mut self, id: &str, error: BackendError) -> Self {
        self.scripted.insert(id.into(), Err(error));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClassifierBackend for MockClassifier {
    async fn classify(&self, profile: &Profile) -> Result<ClassificationResult, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.scripted.get(&profile.id) {
            Some(scripted) => scripted.clone(),
            None => Ok(ClassificationResult::new(Category::Other, false, 0.8, "unscripted")),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// ---------------------------------------------------------------------------
// MockExecutor
// ---------------------------------------------------------------------------

pub struct MockExecutor {
    failures: HashMap<AccountId, String>,
    performed: Mutex<Vec<AccountId>>,
    cancel_after: Option<(usize, Arc<AtomicBool>)>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self {
            failures: HashMap::new(),
            performed: Mutex::new(Vec::new()),
            cancel_after: None,
        }
    }

    pub fn fail_on(mut self, id: &str, message: &str) -> Self {
        self.failures.insert(id.into(), message.to_string());
        self
    }

    /// Raise `flag` once `n` actions have been performed.
    pub fn cancel_after(mut self, n: usize, flag: Arc<AtomicBool>) -> Self {
        self.cancel_after = Some((n, flag));
        self
    }

    /// Every id passed to `perform_action`, failures included.
    pub fn performed(&self) -> Vec<AccountId> {
        self.performed.lock().unwrap().clone()
    }
}

impl Default for MockExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ActionExecutor for MockExecutor {
    async fn perform_action(&self, id: &AccountId) -> Result<()> {
        let count = {
            let mut performed = self.performed.lock().unwrap();
            performed.push(id.clone());
            performed.len()
        };
        if let Some((n, flag)) = &self.cancel_after {
            if count >= *n {
                flag.store(true, Ordering::SeqCst);
            }
        }
        match self.failures.get(id) {
            Some(message) => bail!("{message}"),
            None => Ok(()),
        }
    }
}
