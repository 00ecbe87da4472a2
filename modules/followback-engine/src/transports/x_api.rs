use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tracing::{debug, info};

use followback_common::{AccountId, Profile};
use x_client::{User, XClient, XError, LOOKUP_BATCH};

use crate::traits::{ActionExecutor, MembershipSource, ProfileFetcher};

pub fn profile_from_user(user: User) -> Profile {
    Profile {
        followers_count: user.followers_count(),
        id: AccountId::new(user.id),
        handle: user.username,
        display_name: user.name,
        bio: user.description.unwrap_or_default(),
        location: user.location.unwrap_or_default(),
        verified: user.verified.unwrap_or(false),
    }
}

/// X API v2 on behalf of one account.
///
/// Listing `following` already returns full user objects, so those profiles
/// are remembered and later lookups for them skip the network.
pub struct XTransport {
    client: XClient,
    user_id: String,
    seen: RwLock<HashMap<AccountId, Profile>>,
}

impl XTransport {
    pub fn new(client: XClient, user_id: impl Into<String>) -> Self {
        Self {
            client,
            user_id: user_id.into(),
            seen: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_credentials(token: &str, user_id: &str) -> Result<Self> {
        let client = XClient::new(token.to_string()).context("building X API client")?;
        Ok(Self::new(client, user_id))
    }

    pub fn remember(&self, profiles: impl IntoIterator<Item = Profile>) {
        let mut seen = self.seen.write().unwrap_or_else(|p| p.into_inner());
        for profile in profiles {
            seen.insert(profile.id.clone(), profile);
        }
    }

    fn recall(&self, id: &AccountId) -> Option<Profile> {
        self.seen
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(id)
            .cloned()
    }
}

#[async_trait]
impl MembershipSource for XTransport {
    async fn fetch_following(&self) -> Result<HashSet<AccountId>> {
        let users = self
            .client
            .following(&self.user_id)
            .await
            .context("listing following")?;
        let profiles: Vec<Profile> = users.into_iter().map(profile_from_user).collect();
        let ids = profiles.iter().map(|p| p.id.clone()).collect();
        info!(count = profiles.len(), "Fetched following");
        self.remember(profiles);
        Ok(ids)
    }

    async fn fetch_followers(&self) -> Result<HashSet<AccountId>> {
        let users = self
            .client
            .followers(&self.user_id)
            .await
            .context("listing followers")?;
        info!(count = users.len(), "Fetched followers");
        Ok(users.into_iter().map(|u| AccountId::new(u.id)).collect())
    }
}

#[async_trait]
impl ProfileFetcher for XTransport {
    async fn fetch_profile(&self, id: &AccountId) -> Result<Profile> {
        let mut found = self.fetch_profiles(std::slice::from_ref(id)).await?;
        found
            .remove(id)
            .with_context(|| format!("user {id} not found"))
    }

    async fn fetch_profiles(&self, ids: &[AccountId]) -> Result<HashMap<AccountId, Profile>> {
        let mut out = HashMap::with_capacity(ids.len());
        let mut missing = Vec::new();
        for id in ids {
            match self.recall(id) {
                Some(profile) => {
                    out.insert(id.clone(), profile);
                }
                None => missing.push(id.as_str().to_string()),
            }
        }

        if !missing.is_empty() {
            debug!(cached = out.len(), lookup = missing.len(), "Looking up profiles");
            for chunk in missing.chunks(LOOKUP_BATCH) {
                let users = self.client.users_by_ids(chunk).await.context("looking up users")?;
                let profiles: Vec<Profile> = users.into_iter().map(profile_from_user).collect();
                for profile in &profiles {
                    out.insert(profile.id.clone(), profile.clone());
                }
                self.remember(profiles);
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl ActionExecutor for XTransport {
    async fn perform_action(&self, id: &AccountId) -> Result<()> {
        match self.client.unfollow(&self.user_id, id.as_str()).await {
            Ok(false) => Ok(()),
            Ok(true) => bail!("still following {id} after unfollow"),
            Err(XError::RateLimited { reset_at }) => match reset_at {
                Some(at) => bail!("rate limited until {}", at.to_rfc3339()),
                None => bail!("rate limited"),
            },
            Err(e) => Err(e).with_context(|| format!("unfollowing {id}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn offline_transport() -> XTransport {
        let client = XClient::with_timeout("token".into(), Duration::from_secs(2))
            .unwrap()
            .with_base_url("http://127.0.0.1:9/2");
        XTransport::new(client, "42")
    }

    fn user(json: &str) -> User {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn user_maps_to_profile() {
        let p = profile_from_user(user(
            r#"{"id":"7","username":"ada","name":"Ada","description":"math",
                "location":"London","verified":true,
                "public_metrics":{"followers_count":1234}}"#,
        ));
        assert_eq!(p.id, AccountId::from("7"));
        assert_eq!(p.handle, "ada");
        assert_eq!(p.bio, "math");
        assert_eq!(p.followers_count, 1234);
        assert!(p.verified);
    }

    #[test]
    fn sparse_user_maps_to_defaults() {
        let p = profile_from_user(user(r#"{"id":"8","username":"b","name":"B"}"#));
        assert!(p.bio.is_empty());
        assert!(p.location.is_empty());
        assert_eq!(p.followers_count, 0);
        assert!(!p.verified);
    }

    #[tokio::test]
    async fn remembered_profiles_skip_the_network() {
        let transport = offline_transport();
        let mut p = Profile::empty("7".into());
        p.bio = "cached bio".into();
        transport.remember([p.clone()]);

        let found = transport.fetch_profiles(&["7".into()]).await.unwrap();
        assert_eq!(found[&AccountId::from("7")], p);
        assert_eq!(transport.fetch_profile(&"7".into()).await.unwrap(), p);
    }

    #[tokio::test]
    async fn unreachable_api_is_an_error() {
        let transport = offline_transport();
        assert!(transport.fetch_following().await.is_err());
        assert!(transport.fetch_profiles(&["1".into()]).await.is_err());
        assert!(transport.perform_action(&"1".into()).await.is_err());
    }
}
