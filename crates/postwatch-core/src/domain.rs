use std::{cmp::Ordering, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Provider account id (opaque string; numeric for X).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub String);

/// Provider post id.
///
/// Ordered the way the provider orders ids: two unsigned decimal ids compare
/// numerically (so `"99" < "100"`), anything else falls back to byte order.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct PostId(pub String);

// Older state files stored ids as JSON numbers.
impl<'de> Deserialize<'de> for PostId {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Str(String),
            Num(u64),
        }
        Ok(match Raw::deserialize(d)? {
            Raw::Str(s) => Self(s),
            Raw::Num(n) => Self(n.to_string()),
        })
    }
}

impl PostId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when `self` is strictly newer than `seen` (or nothing was seen yet).
    pub fn is_newer_than(&self, seen: Option<&PostId>) -> bool {
        match seen {
            None => true,
            Some(prev) => self > prev,
        }
    }

    fn numeric_digits(&self) -> Option<&str> {
        let s = self.0.as_str();
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let trimmed = s.trim_start_matches('0');
        Some(if trimmed.is_empty() { "0" } else { trimmed })
    }
}

impl Ord for PostId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.numeric_digits(), other.numeric_digits()) {
            (Some(a), Some(b)) => a
                .len()
                .cmp(&b.len())
                .then_with(|| a.cmp(b))
                .then_with(|| self.0.cmp(&other.0)),
            _ => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for PostId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PostId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The single account being watched. Immutable once resolved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackedAccount {
    pub handle: String,
    pub id: AccountId,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Post {
    pub id: PostId,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Provider-assigned id of a dispatched SMS (Twilio `sid`).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MessageSid(pub String);

impl fmt::Display for MessageSid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
