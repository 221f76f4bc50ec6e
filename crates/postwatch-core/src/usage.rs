//! Status and usage summaries over persisted monitor state.
//!
//! Counters are lifetime totals except `daily_notifications`, which only keeps the
//! last 30 days; reports are therefore limited to that window.

use chrono::{Duration as ChronoDuration, NaiveDate};

use crate::state::{MonitorState, DAILY_HISTORY_DAYS};

/// Days with more alerts than this are flagged in reports.
pub const HIGH_VOLUME_THRESHOLD: u32 = 10;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UsageReport {
    pub days: u32,
    pub polls_total: u64,
    pub polls_rate_limited: u64,
    pub polls_failed: u64,
    pub notifications_total: u64,
    pub notifications_in_period: u64,
    /// Newest first, zero days omitted.
    pub daily: Vec<(NaiveDate, u32)>,
    pub high_volume_days: Vec<NaiveDate>,
}

impl UsageReport {
    pub fn from_state(state: &MonitorState, days: u32, today: NaiveDate) -> Self {
        let days = days.clamp(1, DAILY_HISTORY_DAYS as u32);
        let first = today - ChronoDuration::days(i64::from(days) - 1);

        let daily = state
            .daily_notifications
            .range(first..=today)
            .rev()
            .filter(|(_, n)| **n > 0)
            .map(|(d, n)| (*d, *n))
            .collect::<Vec<_>>();
        let high_volume_days = daily
            .iter()
            .filter(|(_, n)| *n > HIGH_VOLUME_THRESHOLD)
            .map(|(d, _)| *d)
            .collect();

        Self {
            days,
            polls_total: state.polls_total,
            polls_rate_limited: state.polls_rate_limited,
            polls_failed: state.polls_failed,
            notifications_total: state.notifications_sent,
            notifications_in_period: daily.iter().map(|(_, n)| u64::from(*n)).sum(),
            daily,
            high_volume_days,
        }
    }

    /// Share of polls that did not end in a skipped cycle.
    pub fn success_rate(&self) -> f64 {
        let total = self.polls_total.max(1) as f64;
        100.0 * (self.polls_total.saturating_sub(self.polls_failed)) as f64 / total
    }

    pub fn render(&self) -> String {
        let period = match self.days {
            1 => "24 hours".to_string(),
            n => format!("{n} days"),
        };
        let rule = "=".repeat(60);

        let mut lines = vec![
            rule.clone(),
            format!("postwatch usage report - last {period}"),
            rule.clone(),
            String::new(),
            "POLLING (lifetime)".to_string(),
            format!("  Total polls:        {}", self.polls_total),
            format!("  Rate limited polls: {}", self.polls_rate_limited),
            format!("  Failed polls:       {}", self.polls_failed),
            format!("  Success rate:       {:.1}%", self.success_rate()),
            String::new(),
            "ALERTS".to_string(),
            format!("  Sent in period:     {}", self.notifications_in_period),
            format!("  Sent (lifetime):    {}", self.notifications_total),
            String::new(),
            "DAILY BREAKDOWN".to_string(),
        ];

        if self.daily.is_empty() {
            lines.push("  No SMS activity in this period".to_string());
        } else {
            for (day, n) in &self.daily {
                lines.push(format!("  {day}: {n} SMS"));
            }
        }
        if !self.high_volume_days.is_empty() {
            let days = self
                .high_volume_days
                .iter()
                .map(|d| d.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            lines.push(String::new());
            lines.push(format!("HIGH VOLUME DAYS: {days}"));
        }
        lines.push(rule);
        lines.join("\n")
    }
}

/// Short human summary for `postwatch status`.
pub fn status_text(state: &MonitorState, handle: &str, today: NaiveDate) -> String {
    let or_none = |v: Option<String>| v.unwrap_or_else(|| "none".to_string());
    [
        format!("Monitoring:        @{handle}"),
        format!(
            "Account id:        {}",
            or_none(state.cached_account(handle).map(|a| a.id.0))
        ),
        format!(
            "Last seen post:    {}",
            or_none(state.last_seen_post_id.as_ref().map(|id| id.to_string()))
        ),
        format!("Alerts sent:       {}", state.notifications_sent),
        format!("Alerts today:      {}", state.notifications_on(today)),
        format!(
            "Last poll:         {}",
            or_none(state.last_poll_at.map(|t| t.to_rfc3339()))
        ),
        format!(
            "Last alert:        {}",
            or_none(state.last_notified_at.map(|t| t.to_rfc3339()))
        ),
        format!("Last error:        {}", or_none(state.last_error.clone())),
    ]
    .join("\n")
}
