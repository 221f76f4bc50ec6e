use async_trait::async_trait;

use crate::{
    domain::{Post, TrackedAccount},
    errors::FeedError,
};

pub type FeedResult<T> = std::result::Result<T, FeedError>;

/// Narrow port over the social provider.
///
/// Implementations must not retry internally: the monitor owns retry policy so it can
/// line backoff up with its own sleep cadence. Request timeouts are the adapter's job.
#[async_trait]
pub trait FeedPort: Send + Sync {
    /// Look up the account behind `handle`.
    ///
    /// Fails with `AccountNotFound` for unknown handles and `Auth` when credentials
    /// are rejected.
    async fn resolve_account(&self, handle: &str) -> FeedResult<TrackedAccount>;

    /// Most recent original post of `account`, or `None` if it has none.
    async fn fetch_latest_post(&self, account: &TrackedAccount) -> FeedResult<Option<Post>>;
}
