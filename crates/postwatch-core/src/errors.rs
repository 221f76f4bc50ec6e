use std::{path::PathBuf, time::Duration};

/// Core error type.
///
/// Adapter crates map their specific failures into [`FeedError`] / [`NotifyError`]
/// so the monitor can decide between retrying, skipping and stopping.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("persistence error: {path}: {reason}")]
    Persistence { path: PathBuf, reason: String },

    #[error("feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("notify error: {0}")]
    Notify(#[from] NotifyError),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failures surfaced by a [`crate::feed::FeedPort`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeedError {
    #[error("account not found: @{0}")]
    AccountNotFound(String),

    #[error("credentials rejected: {0}")]
    Auth(String),

    #[error("rate limited, retry after {}s", retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    #[error("transient failure: {0}")]
    Transient(String),
}

impl FeedError {
    /// Configuration problems that no amount of retrying will fix.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::AccountNotFound(_) | Self::Auth(_))
    }

    /// Provider-requested cooldown, if this is a throttling failure.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::AccountNotFound(_) => "account_not_found",
            Self::Auth(_) => "auth",
            Self::RateLimited { .. } => "rate_limited",
            Self::Transient(_) => "transient",
        }
    }
}

/// Failures surfaced by a [`crate::notify::SmsPort`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotifyError {
    #[error("transient send failure: {0}")]
    Transient(String),

    #[error("permanent send failure: {0}")]
    Permanent(String),
}

impl NotifyError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transient(_) => "transient",
            Self::Permanent(_) => "permanent",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_configuration_failures_are_fatal() {
        assert!(FeedError::AccountNotFound("x".into()).is_fatal());
        assert!(FeedError::Auth("401".into()).is_fatal());
        assert!(!FeedError::Transient("503".into()).is_fatal());
        assert!(!FeedError::RateLimited {
            retry_after: Duration::from_secs(30)
        }
        .is_fatal());
    }

    #[test]
    fn rate_limited_message_reports_seconds() {
        let e = FeedError::RateLimited {
            retry_after: Duration::from_secs(30),
        };
        assert_eq!(e.to_string(), "rate limited, retry after 30s");
    }
}
