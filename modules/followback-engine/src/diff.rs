use std::collections::HashSet;

use followback_common::AccountId;

/// Accounts followed that do not follow back: `following - followers`.
///
/// Output order is unspecified; callers sort before persisting.
pub fn diff(following: &HashSet<AccountId>, followers: &HashSet<AccountId>) -> HashSet<AccountId> {
    following.difference(followers).cloned().collect()
}

/// `diff` sorted by identifier, the order action sets are persisted in.
pub fn sorted_candidates(following: &HashSet<AccountId>, followers: &HashSet<AccountId>) -> Vec<AccountId> {
    let mut candidates: Vec<AccountId> = diff(following, followers).into_iter().collect();
    candidates.sort();
    candidates
}
