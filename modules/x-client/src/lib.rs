pub mod error;
pub mod types;

pub use error::{Result, XError};
pub use types::{PublicMetrics, User, UserLookup, UserPage, USER_FIELDS};

use std::time::Duration;

use chrono::{TimeZone, Utc};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use types::{DataResponse, FollowingState, PageQuery};

const BASE_URL: &str = "https://api.x.com/2";

/// Largest page the follows endpoints accept.
const PAGE_SIZE: u32 = 1000;

/// Largest id batch `GET /2/users` accepts.
pub const LOOKUP_BATCH: usize = 100;

pub struct XClient {
    client: reqwest::Client,
    token: String,
    base_url: String,
}

impl XClient {
    /// `token` must be an OAuth 2.0 user-context bearer token with
    /// `follows.read follows.write users.read` scopes.
    pub fn new(token: String) -> Result<Self> {
        Self::with_timeout(token, Duration::from_secs(30))
    }

    pub fn with_timeout(token: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            token,
            base_url: BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Every account `user_id` follows, walking all pages.
    pub async fn following(&self, user_id: &str) -> Result<Vec<User>> {
        self.list_all(&format!("{}/users/{}/following", self.base_url, user_id))
            .await
    }

    /// Every account following `user_id`, walking all pages.
    pub async fn followers(&self, user_id: &str) -> Result<Vec<User>> {
        self.list_all(&format!("{}/users/{}/followers", self.base_url, user_id))
            .await
    }

    async fn list_all(&self, url: &str) -> Result<Vec<User>> {
        let mut users = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let query = PageQuery {
                max_results: PAGE_SIZE,
                user_fields: USER_FIELDS,
                pagination_token: token.as_deref(),
            };
            let resp = self
                .client
                .get(url)
                .bearer_auth(&self.token)
                .query(&query)
                .send()
                .await?;

            let page: UserPage = decode(resp).await?;
            tracing::debug!(url, count = page.meta.result_count, "Fetched user page");
            users.extend(page.data);

            match page.meta.next_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        tracing::info!(url, total = users.len(), "Fetched user listing");
        Ok(users)
    }

    /// Look up users by id, 100 per request. Ids the API cannot resolve are
    /// omitted from the result.
    pub async fn users_by_ids(&self, ids: &[String]) -> Result<Vec<User>> {
        let mut users = Vec::with_capacity(ids.len());

        for chunk in ids.chunks(LOOKUP_BATCH) {
            let url = format!("{}/users", self.base_url);
            let joined = chunk.join(",");
            let resp = self
                .client
                .get(&url)
                .bearer_auth(&self.token)
                .query(&[("ids", joined.as_str()), ("user.fields", USER_FIELDS)])
                .send()
                .await?;

            let lookup: UserLookup = decode(resp).await?;
            for problem in &lookup.errors {
                tracing::warn!(
                    id = problem.value.as_deref().unwrap_or("?"),
                    detail = problem.detail.as_deref().unwrap_or(""),
                    "User lookup problem"
                );
            }
            users.extend(lookup.data);
        }

        Ok(users)
    }

    /// Unfollow `target_user_id` on behalf of `source_user_id`. Returns the
    /// resulting following state (false once the unfollow took effect).
    pub async fn unfollow(&self, source_user_id: &str, target_user_id: &str) -> Result<bool> {
        let url = format!(
            "{}/users/{}/following/{}",
            self.base_url, source_user_id, target_user_id
        );
        let resp = self
            .client
            .delete(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        let body: DataResponse<FollowingState> = decode(resp).await?;
        Ok(body.data.following)
    }
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T> {
    let status = resp.status();

    if status == StatusCode::TOO_MANY_REQUESTS {
        let reset_at = resp
            .headers()
            .get("x-rate-limit-reset")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok())
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single());
        return Err(XError::RateLimited { reset_at });
    }

    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(XError::Api {
            status: status.as_u16(),
            message: body,
        });
    }

    let body = resp.text().await?;
    Ok(serde_json::from_str(&body)?)
}
