use async_trait::async_trait;

use crate::{domain::MessageSid, errors::NotifyError, notify::types::NotificationRequest};

pub type NotifyResult<T> = std::result::Result<T, NotifyError>;

/// Hexagonal port for an SMS-style messaging provider.
///
/// One call is one outbound dispatch. Failures must be classified: `Transient` for
/// network/5xx/throttling (safe to retry), `Permanent` for anything that will not
/// succeed without outside intervention.
#[async_trait]
pub trait SmsPort: Send + Sync {
    async fn send_sms(&self, req: &NotificationRequest) -> NotifyResult<MessageSid>;
}
