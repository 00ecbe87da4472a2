use serde::{Deserialize, Serialize};

/// `user.fields` requested on every user lookup.
pub const USER_FIELDS: &str = "description,location,verified,public_metrics";

/// A user object from the v2 API. Optional fields are absent unless requested
/// through `user.fields`.
#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub verified: Option<bool>,
    #[serde(default)]
    pub public_metrics: Option<PublicMetrics>,
}

impl User {
    pub fn followers_count(&self) -> u64 {
        self.public_metrics
            .as_ref()
            .map(|m| m.followers_count)
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublicMetrics {
    #[serde(default)]
    pub followers_count: u64,
    #[serde(default)]
    pub following_count: u64,
}

/// One page of a paginated user listing.
#[derive(Debug, Clone, Deserialize)]
pub struct UserPage {
    #[serde(default)]
    pub data: Vec<User>,
    #[serde(default)]
    pub meta: PageMeta,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageMeta {
    #[serde(default)]
    pub result_count: u32,
    pub next_token: Option<String>,
}

/// Response of `GET /2/users?ids=`. Unknown or suspended ids come back in
/// `errors` rather than failing the request.
#[derive(Debug, Clone, Deserialize)]
pub struct UserLookup {
    #[serde(default)]
    pub data: Vec<User>,
    #[serde(default)]
    pub errors: Vec<LookupProblem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LookupProblem {
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
}

/// Wrapper for single-object responses.
#[derive(Debug, Clone, Deserialize)]
pub struct DataResponse<T> {
    pub data: T,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FollowingState {
    pub following: bool,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct PageQuery<'a> {
    pub max_results: u32,
    #[serde(rename = "user.fields")]
    pub user_fields: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination_token: Option<&'a str>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_page_with_metrics() {
        let json = r#"{
            "data": [{
                "id": "2244994945",
                "username": "XDevelopers",
                "name": "Developers",
                "description": "The voice of the X Dev team",
                "location": "127.0.0.1",
                "verified": true,
                "public_metrics": {"followers_count": 583000, "following_count": 1900}
            }],
            "meta": {"result_count": 1, "next_token": "DFEDBNRFT3MHCZZZ"}
        }"#;

        let page: UserPage = serde_json::from_str(json).unwrap();
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].followers_count(), 583000);
        assert_eq!(page.data[0].verified, Some(true));
        assert_eq!(page.meta.next_token.as_deref(), Some("DFEDBNRFT3MHCZZZ"));
    }

    #[test]
    fn empty_last_page() {
        let page: UserPage = serde_json::from_str(r#"{"meta":{"result_count":0}}"#).unwrap();
        assert!(page.data.is_empty());
        assert!(page.meta.next_token.is_none());
    }

    #[test]
    fn lookup_with_partial_errors() {
        let json = r#"{
            "data": [{"id": "1", "username": "a", "name": "A"}],
            "errors": [{"value": "2", "detail": "Could not find user with ids: [2]."}]
        }"#;
        let lookup: UserLookup = serde_json::from_str(json).unwrap();
        assert_eq!(lookup.data[0].followers_count(), 0);
        assert_eq!(lookup.errors[0].value.as_deref(), Some("2"));
    }

    #[test]
    fn page_query_skips_missing_token() {
        let q = PageQuery {
            max_results: 1000,
            user_fields: USER_FIELDS,
            pagination_token: None,
        };
        let v = serde_json::to_value(&q).unwrap();
        assert_eq!(v["user.fields"], USER_FIELDS);
        assert!(v.get("pagination_token").is_none());
    }
}
