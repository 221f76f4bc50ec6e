//! Poll loop: fetch the latest post, dedup against persisted state, alert, persist, sleep.
//!
//! The monitor is the only writer of [`MonitorState`]. It owns every retry decision;
//! the feed and SMS ports are called exactly once per attempt.

use std::{future::Future, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::{
    config::{DeliveryGuarantee, MonitorSettings},
    domain::{MessageSid, Post, PostId, TrackedAccount},
    errors::{Error, FeedError, NotifyError},
    feed::{FeedPort, FeedResult},
    notify::{NotificationRequest, Notifier},
    retry::RetryPolicy,
    state::{MonitorState, StateStore},
    Result,
};

/// Where the monitor is in its cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Polling,
    Evaluating,
    Notifying,
    Sleeping,
    Stopped,
}

/// What a single poll cycle decided.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The account has no posts.
    NoPosts,
    /// Latest post is not newer than the dedup cursor.
    AlreadySeen(PostId),
    Notified { post_id: PostId, sid: MessageSid },
    /// Provider refused the message for good; cursor advanced anyway.
    SendRejected { post_id: PostId },
    /// Send did not go out this cycle; cursor left in place so the next cycle retries.
    SendDeferred { post_id: PostId },
    /// Fetch (or account lookup) never succeeded; state untouched.
    FetchSkipped,
    /// Shutdown was requested during a backoff sleep.
    Cancelled,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CycleReport {
    pub cycle: u64,
    pub outcome: CycleOutcome,
    /// Whether the end-of-cycle save reached the store.
    pub persisted: bool,
}

enum Attempt<T> {
    Done(T),
    GaveUp(String),
    Cancelled,
}

enum SendAttempt {
    Sent(MessageSid),
    Rejected(NotifyError),
    GaveUp(NotifyError),
    Cancelled,
}

/// Single-account poll loop.
///
/// Only the newest post seen in a cycle is ever alerted on. If several posts land
/// between two polls they collapse into one alert for the newest; the older ones
/// are never sent.
pub struct Monitor {
    settings: MonitorSettings,
    feed: Arc<dyn FeedPort>,
    notifier: Notifier,
    store: Arc<dyn StateStore>,
    shutdown: CancellationToken,

    state: MonitorState,
    account: Option<TrackedAccount>,
    phase: Phase,
    cycle: u64,
    // Any feed call throttled during the current cycle.
    throttled: bool,
}

impl Monitor {
    /// Build a monitor and load its persisted state.
    pub async fn open(
        settings: &MonitorSettings,
        feed: Arc<dyn FeedPort>,
        notifier: Notifier,
        store: Arc<dyn StateStore>,
        shutdown: CancellationToken,
    ) -> Self {
        let state = store.load().await;
        let account = state.cached_account(&settings.handle);
        if let Some(acct) = &account {
            tracing::info!(handle = %acct.handle, id = %acct.id.0, "using cached account id");
        }

        Self {
            settings: settings.clone(),
            feed,
            notifier,
            store,
            shutdown,
            state,
            account,
            phase: Phase::Idle,
            cycle: 0,
            throttled: false,
        }
    }

    pub fn state(&self) -> &MonitorState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn account(&self) -> Option<&TrackedAccount> {
        self.account.as_ref()
    }

    /// Poll until shutdown. Returns `Err` only for fatal configuration/auth failures.
    pub async fn run(&mut self) -> Result<()> {
        tracing::info!(
            handle = %self.settings.handle,
            interval_secs = self.settings.poll_interval.as_secs(),
            delivery = ?self.settings.delivery,
            "monitor started"
        );

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            let report = match self.run_cycle().await {
                Ok(report) => report,
                Err(e) => {
                    self.phase = Phase::Stopped;
                    tracing::error!(cycle = self.cycle, error = %e, "fatal error, stopping monitor");
                    return Err(e);
                }
            };
            if report.outcome == CycleOutcome::Cancelled {
                break;
            }

            self.phase = Phase::Sleeping;
            if !self.pause(self.settings.poll_interval).await {
                break;
            }
        }

        self.phase = Phase::Stopped;
        tracing::info!(cycles = self.cycle, "monitor stopped");
        Ok(())
    }

    /// One fetch → compare → (notify) → persist pass. No trailing sleep.
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        self.cycle += 1;
        self.phase = Phase::Polling;
        self.throttled = false;
        let started = Utc::now();
        self.state.polls_total += 1;
        tracing::debug!(cycle = self.cycle, "poll cycle started");

        let outcome = self.poll(started).await?;
        if self.throttled {
            self.state.polls_rate_limited += 1;
        }

        match &outcome {
            CycleOutcome::NoPosts | CycleOutcome::AlreadySeen(_) | CycleOutcome::Notified { .. } => {
                self.state.last_error = None;
            }
            CycleOutcome::FetchSkipped => self.state.polls_failed += 1,
            _ => {}
        }

        self.state.last_poll_at = Some(started);
        self.state.prune_daily(started);
        let persisted = self.persist().await;

        Ok(CycleReport {
            cycle: self.cycle,
            outcome,
            persisted,
        })
    }

    async fn poll(&mut self, now: DateTime<Utc>) -> Result<CycleOutcome> {
        let account = match self.ensure_account().await? {
            Attempt::Done(a) => a,
            Attempt::GaveUp(reason) => {
                self.state.last_error = Some(reason);
                return Ok(CycleOutcome::FetchSkipped);
            }
            Attempt::Cancelled => return Ok(CycleOutcome::Cancelled),
        };

        let feed = Arc::clone(&self.feed);
        let latest = match self
            .retry_feed("fetch_latest_post", || feed.fetch_latest_post(&account))
            .await?
        {
            Attempt::Done(p) => p,
            Attempt::GaveUp(reason) => {
                self.state.last_error = Some(reason);
                return Ok(CycleOutcome::FetchSkipped);
            }
            Attempt::Cancelled => return Ok(CycleOutcome::Cancelled),
        };

        self.phase = Phase::Evaluating;
        let Some(post) = latest else {
            tracing::debug!(cycle = self.cycle, "no posts");
            return Ok(CycleOutcome::NoPosts);
        };
        if !post.id.is_newer_than(self.state.last_seen_post_id.as_ref()) {
            tracing::debug!(cycle = self.cycle, post_id = %post.id, "latest post already seen");
            return Ok(CycleOutcome::AlreadySeen(post.id));
        }

        tracing::info!(cycle = self.cycle, post_id = %post.id, "new post");
        self.phase = Phase::Notifying;
        Ok(match self.settings.delivery {
            DeliveryGuarantee::AtLeastOnce => self.notify_then_advance(&account, post, now).await,
            DeliveryGuarantee::AtMostOnce => self.claim_then_notify(&account, post, now).await,
        })
    }

    async fn ensure_account(&mut self) -> Result<Attempt<TrackedAccount>> {
        if let Some(acct) = &self.account {
            return Ok(Attempt::Done(acct.clone()));
        }

        let feed = Arc::clone(&self.feed);
        let handle = self.settings.handle.clone();
        let attempt = self
            .retry_feed("resolve_account", || feed.resolve_account(&handle))
            .await?;
        if let Attempt::Done(acct) = &attempt {
            tracing::info!(handle = %acct.handle, id = %acct.id.0, "resolved account");
            self.state.remember_account(acct);
            self.account = Some(acct.clone());
        }
        Ok(attempt)
    }

    /// Send first, advance after. A failed save leaves the in-memory cursor advanced,
    /// so this process never repeats the alert; the next cycle re-attempts the save.
    async fn notify_then_advance(
        &mut self,
        account: &TrackedAccount,
        post: Post,
        now: DateTime<Utc>,
    ) -> CycleOutcome {
        let req = self.notifier.request_for(account, &post);
        match self.send_with_retry(&req).await {
            SendAttempt::Sent(sid) => {
                self.state.advance_to(&post.id);
                self.state.record_notification(now);
                CycleOutcome::Notified {
                    post_id: post.id,
                    sid,
                }
            }
            SendAttempt::Rejected(e) => {
                self.state.advance_to(&post.id);
                self.state.last_error = Some(e.to_string());
                CycleOutcome::SendRejected { post_id: post.id }
            }
            SendAttempt::GaveUp(e) => {
                self.state.last_error = Some(e.to_string());
                CycleOutcome::SendDeferred { post_id: post.id }
            }
            SendAttempt::Cancelled => CycleOutcome::Cancelled,
        }
    }

    /// Persist the advanced cursor before sending. If that save fails nothing is sent;
    /// if the send does not go out the claim is rolled back.
    async fn claim_then_notify(
        &mut self,
        account: &TrackedAccount,
        post: Post,
        now: DateTime<Utc>,
    ) -> CycleOutcome {
        let previous = self.state.last_seen_post_id.clone();
        let mut claimed = self.state.clone();
        claimed.advance_to(&post.id);
        claimed.last_poll_at = Some(now);

        if let Err(e) = self.store.save(&claimed).await {
            tracing::error!(
                cycle = self.cycle,
                kind = "persistence",
                post_id = %post.id,
                error = %e,
                "could not claim post before sending, deferring alert"
            );
            self.state.last_error = Some(e.to_string());
            return CycleOutcome::SendDeferred { post_id: post.id };
        }
        self.state = claimed;

        let req = self.notifier.request_for(account, &post);
        match self.send_with_retry(&req).await {
            SendAttempt::Sent(sid) => {
                self.state.record_notification(now);
                CycleOutcome::Notified {
                    post_id: post.id,
                    sid,
                }
            }
            SendAttempt::Rejected(e) => {
                self.state.last_error = Some(e.to_string());
                CycleOutcome::SendRejected { post_id: post.id }
            }
            SendAttempt::GaveUp(e) => {
                self.state.last_seen_post_id = previous;
                self.state.last_error = Some(e.to_string());
                CycleOutcome::SendDeferred { post_id: post.id }
            }
            SendAttempt::Cancelled => {
                self.state.last_seen_post_id = previous;
                CycleOutcome::Cancelled
            }
        }
    }

    async fn send_with_retry(&self, req: &NotificationRequest) -> SendAttempt {
        let policy = self.settings.send_retry;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.notifier.send(req).await {
                Ok(res) => return SendAttempt::Sent(res.sid),
                Err(e @ NotifyError::Permanent(_)) => {
                    tracing::error!(
                        cycle = self.cycle,
                        kind = e.kind(),
                        attempt,
                        error = %e,
                        "sms rejected, not retrying"
                    );
                    return SendAttempt::Rejected(e);
                }
                Err(e @ NotifyError::Transient(_)) => {
                    if !policy.allows_retry(attempt) {
                        tracing::error!(
                            cycle = self.cycle,
                            kind = e.kind(),
                            attempt,
                            error = %e,
                            "sms failed after all attempts, will retry next cycle"
                        );
                        return SendAttempt::GaveUp(e);
                    }
                    let wait = policy.delay_for(attempt);
                    tracing::warn!(
                        cycle = self.cycle,
                        kind = e.kind(),
                        attempt,
                        max_attempts = policy.max_attempts,
                        backoff_ms = wait.as_millis() as u64,
                        error = %e,
                        "sms send failed, backing off"
                    );
                    if !self.pause(wait).await {
                        return SendAttempt::Cancelled;
                    }
                }
            }
        }
    }

    /// Drive one feed call under the fetch policy.
    ///
    /// Provider cooldowns are honoured up to `max_rate_limit_stalls` times in a row;
    /// transient failures back off exponentially up to `max_attempts`. Auth and
    /// unknown-account failures come back as `Err`.
    async fn retry_feed<T, F, Fut>(&mut self, op_name: &'static str, mut op: F) -> Result<Attempt<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = FeedResult<T>>,
    {
        let policy: RetryPolicy = self.settings.fetch_retry;
        let mut attempt = 0u32;
        let mut stalls = 0u32;

        loop {
            match op().await {
                Ok(v) => return Ok(Attempt::Done(v)),
                Err(e) if e.is_fatal() => {
                    tracing::error!(
                        cycle = self.cycle,
                        op = op_name,
                        kind = e.kind(),
                        error = %e,
                        "fatal feed error"
                    );
                    return Err(Error::Feed(e));
                }
                Err(e @ FeedError::RateLimited { .. }) => {
                    self.throttled = true;
                    stalls += 1;
                    if stalls > self.settings.max_rate_limit_stalls {
                        tracing::warn!(
                            cycle = self.cycle,
                            op = op_name,
                            kind = e.kind(),
                            stalls,
                            "still rate limited, giving up until next poll"
                        );
                        return Ok(Attempt::GaveUp(e.to_string()));
                    }
                    let wait = policy.cooldown(e.retry_after().unwrap_or_default());
                    tracing::warn!(
                        cycle = self.cycle,
                        op = op_name,
                        kind = e.kind(),
                        stall = stalls,
                        max_stalls = self.settings.max_rate_limit_stalls,
                        wait_secs = wait.as_secs(),
                        "rate limited, honouring cooldown"
                    );
                    if !self.pause(wait).await {
                        return Ok(Attempt::Cancelled);
                    }
                }
                Err(e) => {
                    stalls = 0;
                    attempt += 1;
                    if !policy.allows_retry(attempt) {
                        tracing::error!(
                            cycle = self.cycle,
                            op = op_name,
                            kind = e.kind(),
                            attempt,
                            error = %e,
                            "feed call failed after all attempts, skipping cycle"
                        );
                        return Ok(Attempt::GaveUp(e.to_string()));
                    }
                    let wait = policy.delay_for(attempt);
                    tracing::warn!(
                        cycle = self.cycle,
                        op = op_name,
                        kind = e.kind(),
                        attempt,
                        max_attempts = policy.max_attempts,
                        backoff_ms = wait.as_millis() as u64,
                        error = %e,
                        "feed call failed, backing off"
                    );
                    if !self.pause(wait).await {
                        return Ok(Attempt::Cancelled);
                    }
                }
            }
        }
    }

    async fn persist(&mut self) -> bool {
        match self.store.save(&self.state).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(
                    cycle = self.cycle,
                    kind = "persistence",
                    error = %e,
                    "failed to save state, will retry next cycle"
                );
                false
            }
        }
    }

    /// Sleep unless shutdown arrives first. Returns false on shutdown.
    async fn pause(&self, dur: Duration) -> bool {
        tokio::select! {
            _ = self.shutdown.cancelled() => false,
            _ = tokio::time::sleep(dur) => true,
        }
    }
}
