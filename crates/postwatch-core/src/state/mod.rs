//! Persisted monitor state and the stores that keep it across restarts.

pub mod store;

use std::collections::BTreeMap;

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{AccountId, PostId, TrackedAccount};

pub use store::{JsonFileStore, MemoryStore, StateStore};

/// Days of per-day notification counts kept for usage reports.
pub const DAILY_HISTORY_DAYS: i64 = 30;

/// Everything the monitor needs to resume after a restart.
///
/// Serialized as one flat JSON object. Field aliases accept state files written by
/// the first (script) version of the monitor.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorState {
    #[serde(alias = "last_tweet_id")]
    pub last_seen_post_id: Option<PostId>,
    #[serde(alias = "total_tweets_sent")]
    pub notifications_sent: u64,
    pub last_poll_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,

    pub account_handle: Option<String>,
    pub account_id: Option<AccountId>,

    pub polls_total: u64,
    pub polls_rate_limited: u64,
    pub polls_failed: u64,
    pub last_notified_at: Option<DateTime<Utc>>,
    pub daily_notifications: BTreeMap<NaiveDate, u32>,
}

impl MonitorState {
    /// Resolved account from a previous run, if it was for the same handle.
    pub fn cached_account(&self, handle: &str) -> Option<TrackedAccount> {
        let cached = self.account_handle.as_deref()?;
        if !cached.eq_ignore_ascii_case(handle) {
            return None;
        }
        Some(TrackedAccount {
            handle: handle.to_string(),
            id: self.account_id.clone()?,
        })
    }

    pub fn remember_account(&mut self, account: &TrackedAccount) {
        self.account_handle = Some(account.handle.clone());
        self.account_id = Some(account.id.clone());
    }

    /// Move the dedup cursor forward. Never moves it backwards.
    pub fn advance_to(&mut self, id: &PostId) {
        if id.is_newer_than(self.last_seen_post_id.as_ref()) {
            self.last_seen_post_id = Some(id.clone());
        }
    }

    pub fn record_notification(&mut self, now: DateTime<Utc>) {
        self.notifications_sent += 1;
        self.last_notified_at = Some(now);
        *self.daily_notifications.entry(now.date_naive()).or_insert(0) += 1;
        self.prune_daily(now);
    }

    pub fn prune_daily(&mut self, now: DateTime<Utc>) {
        let cutoff = (now - ChronoDuration::days(DAILY_HISTORY_DAYS)).date_naive();
        self.daily_notifications.retain(|day, _| *day > cutoff);
    }

    pub fn notifications_on(&self, day: NaiveDate) -> u32 {
        self.daily_notifications.get(&day).copied().unwrap_or(0)
    }
}
