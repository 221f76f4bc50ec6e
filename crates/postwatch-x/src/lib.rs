//! X (Twitter) API v2 adapter.
//!
//! Implements the core `FeedPort` with two endpoints:
//! - `GET /2/users/by/username/:handle` (account lookup)
//! - `GET /2/users/:id/tweets` (latest original post, retweets and replies excluded)

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header::HeaderMap, StatusCode};
use serde::Deserialize;

use postwatch_core::{
    config::Config,
    domain::{AccountId, Post, PostId, TrackedAccount},
    errors::{Error, FeedError},
    feed::{FeedPort, FeedResult},
    Result,
};

pub const DEFAULT_BASE_URL: &str = "https://api.twitter.com";

/// Cooldown used when a 429 carries no usable reset header.
const DEFAULT_RATE_LIMIT_COOLDOWN: Duration = Duration::from_secs(60);
// The endpoint rejects max_results below 5.
const TIMELINE_PAGE_SIZE: u32 = 5;

#[derive(Clone, Debug)]
pub struct XClient {
    bearer_token: String,
    base_url: String,
    http: reqwest::Client,
}

impl XClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        Self::with_base_url(&cfg.x.bearer_token, DEFAULT_BASE_URL, cfg.http_timeout)
    }

    pub fn with_base_url(
        bearer_token: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("postwatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::External(format!("x http client build error: {e}")))?;
        Ok(Self {
            bearer_token: bearer_token.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> FeedResult<String> {
        let resp = self
            .http
            .get(format!("{}{path}", self.base_url))
            .bearer_auth(&self.bearer_token)
            .query(query)
            .send()
            .await
            .map_err(|e| FeedError::Transient(format!("x request error: {e}")))?;

        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp
            .text()
            .await
            .map_err(|e| FeedError::Transient(format!("x body read error: {e}")))?;

        if !status.is_success() {
            return Err(classify_status(status, &headers, &body, Utc::now()));
        }
        Ok(body)
    }
}

#[async_trait]
impl FeedPort for XClient {
    async fn resolve_account(&self, handle: &str) -> FeedResult<TrackedAccount> {
        let handle = handle.trim_start_matches('@');
        let body = self
            .get_json(&format!("/2/users/by/username/{handle}"), &[])
            .await
            .map_err(|e| match e {
                // 404 on the lookup route means the handle itself is unknown.
                FeedError::AccountNotFound(_) => FeedError::AccountNotFound(handle.to_string()),
                other => other,
            })?;
        parse_user(handle, &body)
    }

    async fn fetch_latest_post(&self, account: &TrackedAccount) -> FeedResult<Option<Post>> {
        let query = [
            ("max_results", TIMELINE_PAGE_SIZE.to_string()),
            ("exclude", "retweets,replies".to_string()),
            ("tweet.fields", "created_at".to_string()),
        ];
        let body = self
            .get_json(&format!("/2/users/{}/tweets", account.id.0), &query)
            .await
            .map_err(|e| match e {
                FeedError::AccountNotFound(_) => FeedError::AccountNotFound(account.handle.clone()),
                other => other,
            })?;
        let post = parse_latest(&body)?;
        if let Some(p) = &post {
            tracing::debug!(post_id = %p.id, "fetched latest post");
        }
        Ok(post)
    }
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    title: String,
    #[serde(default)]
    detail: String,
}

#[derive(Debug, Deserialize)]
struct UserEnvelope {
    data: Option<UserData>,
    #[serde(default)]
    errors: Vec<ApiError>,
}

#[derive(Debug, Deserialize)]
struct UserData {
    id: String,
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TimelineEnvelope {
    #[serde(default)]
    data: Vec<TweetData>,
    #[serde(default)]
    errors: Vec<ApiError>,
}

#[derive(Debug, Deserialize)]
struct TweetData {
    id: String,
    text: String,
    created_at: Option<DateTime<Utc>>,
}

/// Map a non-success response to the feed error taxonomy.
fn classify_status(status: StatusCode, headers: &HeaderMap, body: &str, now: DateTime<Utc>) -> FeedError {
    let excerpt = body.chars().take(200).collect::<String>();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            FeedError::Auth(format!("x returned {status}: {excerpt}"))
        }
        StatusCode::NOT_FOUND => FeedError::AccountNotFound(String::new()),
        StatusCode::TOO_MANY_REQUESTS => FeedError::RateLimited {
            retry_after: retry_after_from(headers, now).unwrap_or(DEFAULT_RATE_LIMIT_COOLDOWN),
        },
        _ => FeedError::Transient(format!("x returned {status}: {excerpt}")),
    }
}

/// Cooldown from `retry-after` (seconds) or `x-rate-limit-reset` (epoch seconds).
fn retry_after_from(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<i64>().ok())
    };

    if let Some(secs) = header("retry-after") {
        return Some(Duration::from_secs(secs.max(0) as u64));
    }
    let reset = header("x-rate-limit-reset")?;
    let wait = reset - now.timestamp();
    Some(Duration::from_secs(wait.max(1) as u64))
}

fn parse_user(handle: &str, body: &str) -> FeedResult<TrackedAccount> {
    let env: UserEnvelope = serde_json::from_str(body)
        .map_err(|e| FeedError::Transient(format!("x user json error: {e}")))?;

    // Unknown handles come back as 200 with an `errors` array and no `data`.
    let Some(user) = env.data else {
        let reason = env
            .errors
            .first()
            .map(|e| format!("{}: {}", e.title, e.detail))
            .unwrap_or_default();
        tracing::debug!(handle, reason = %reason, "user lookup returned no data");
        return Err(FeedError::AccountNotFound(handle.to_string()));
    };

    Ok(TrackedAccount {
        handle: user.username.unwrap_or_else(|| handle.to_string()),
        id: AccountId(user.id),
    })
}

fn parse_latest(body: &str) -> FeedResult<Option<Post>> {
    let env: TimelineEnvelope = serde_json::from_str(body)
        .map_err(|e| FeedError::Transient(format!("x timeline json error: {e}")))?;

    if env.data.is_empty() {
        if let Some(err) = env.errors.first() {
            return Err(FeedError::Transient(format!(
                "x timeline error: {}: {}",
                err.title, err.detail
            )));
        }
        return Ok(None);
    }

    let newest = env
        .data
        .into_iter()
        .map(|t| Post {
            id: PostId(t.id),
            text: t.text,
            created_at: t.created_at.unwrap_or_else(Utc::now),
        })
        .max_by(|a, b| a.id.cmp(&b.id));
    Ok(newest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn parses_user_lookup() {
        let body = r#"{"data":{"id":"178580925","name":"Shams Charania","username":"ShamsCharania"}}"#;
        let acct = parse_user("shamscharania", body).unwrap();
        assert_eq!(acct.id, AccountId("178580925".to_string()));
        assert_eq!(acct.handle, "ShamsCharania");
    }

    #[test]
    fn unknown_user_is_account_not_found() {
        let body = r#"{"errors":[{"value":"nobody_here","detail":"Could not find user with username: [nobody_here].","title":"Not Found Error","type":"https://api.twitter.com/2/problems/resource-not-found"}]}"#;
        assert_eq!(
            parse_user("nobody_here", body),
            Err(FeedError::AccountNotFound("nobody_here".to_string()))
        );
    }

    #[test]
    fn picks_newest_post_from_timeline() {
        let body = r#"{
          "data": [
            {"id":"1790000000000000002","text":"newest","created_at":"2025-02-06T19:05:00.000Z"},
            {"id":"1790000000000000001","text":"older","created_at":"2025-02-06T18:00:00.000Z"}
          ],
          "meta": {"result_count": 2}
        }"#;
        let post = parse_latest(body).unwrap().unwrap();
        assert_eq!(post.id, PostId::from("1790000000000000002"));
        assert_eq!(post.text, "newest");
        assert_eq!(post.created_at.to_rfc3339(), "2025-02-06T19:05:00+00:00");
    }

    #[test]
    fn empty_timeline_is_none() {
        let body = r#"{"meta":{"result_count":0}}"#;
        assert_eq!(parse_latest(body), Ok(None));
    }

    #[test]
    fn status_codes_map_to_feed_errors() {
        let now = Utc::now();
        let none = HeaderMap::new();
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, &none, "", now),
            FeedError::Auth(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::SERVICE_UNAVAILABLE, &none, "", now),
            FeedError::Transient(_)
        ));
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, &none, "", now),
            FeedError::RateLimited {
                retry_after: DEFAULT_RATE_LIMIT_COOLDOWN
            }
        );
    }

    #[test]
    fn rate_limit_reset_header_sets_cooldown() {
        let now = Utc::now();
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-rate-limit-reset",
            HeaderValue::from_str(&(now.timestamp() + 90).to_string()).unwrap(),
        );
        assert_eq!(
            retry_after_from(&headers, now),
            Some(Duration::from_secs(90))
        );

        headers.insert("retry-after", HeaderValue::from_static("30"));
        assert_eq!(
            retry_after_from(&headers, now),
            Some(Duration::from_secs(30))
        );
    }
}
