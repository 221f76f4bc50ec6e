//! Outbound alerting: SMS port, request types and the notifier that formats alerts.

pub mod notifier;
pub mod port;
pub mod types;

pub use notifier::Notifier;
pub use port::{NotifyResult, SmsPort};
pub use types::{NotificationRequest, NotificationResult};
