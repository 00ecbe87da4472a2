// Capability traits for the pipeline's external collaborators.
//
// MembershipSource: the two follow lists.
// ProfileFetcher: descriptive attributes per account.
// ClassifierBackend: the decision oracle, with a tagged error that keeps
//   "reply was unusable" apart from "oracle unreachable".
// ActionExecutor: the side effect itself.
//
// Concrete transports (X API, dry run, test mocks) implement these; the
// pipeline never sees which one it was given.

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

use followback_common::{AccountId, ClassificationResult, Profile};

// ---------------------------------------------------------------------------
// MembershipSource
// ---------------------------------------------------------------------------

#[async_trait]
pub trait MembershipSource: Send + Sync {
    /// Accounts the operator follows.
    async fn fetch_following(&self) -> Result<HashSet<AccountId>>;

    /// Accounts following the operator.
    async fn fetch_followers(&self) -> Result<HashSet<AccountId>>;
}

// ---------------------------------------------------------------------------
// ProfileFetcher
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ProfileFetcher: Send + Sync {
    async fn fetch_profile(&self, id: &AccountId) -> Result<Profile>;

    /// Fetch several profiles. Ids that could not be resolved are simply
    /// absent from the map. Transports with a batch endpoint override this.
    async fn fetch_profiles(&self, ids: &[AccountId]) -> Result<HashMap<AccountId, Profile>> {
        let mut out = HashMap::with_capacity(ids.len());
        for id in ids {
            match self.fetch_profile(id).await {
                Ok(profile) => {
                    out.insert(id.clone(), profile);
                }
                Err(e) => tracing::warn!(id = %id, error = %e, "Profile fetch failed"),
            }
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// ClassifierBackend
// ---------------------------------------------------------------------------

/// Why the backend did not produce a classification.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BackendError {
    /// A reply arrived but was unparseable or incomplete.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The backend could not be consulted (network, timeout, quota, HTTP).
    #[error("backend unavailable: {0}")]
    Transport(String),
}

#[async_trait]
pub trait ClassifierBackend: Send + Sync {
    async fn classify(&self, profile: &Profile) -> std::result::Result<ClassificationResult, BackendError>;

    /// Short name for logs.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// ActionExecutor
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// Perform the side effect. `Err` is a recorded failure, never a retry.
    async fn perform_action(&self, id: &AccountId) -> Result<()>;
}
