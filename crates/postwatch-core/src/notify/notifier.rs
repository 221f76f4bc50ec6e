use std::sync::Arc;

use crate::{
    config::Config,
    domain::{Post, TrackedAccount},
    formatting::AlertTemplate,
    notify::{
        port::{NotifyResult, SmsPort},
        types::{NotificationRequest, NotificationResult},
    },
};

const TEST_MESSAGE: &str = "postwatch test: SMS alerts are working.";

/// Turns posts into SMS alerts and dispatches them. Never touches monitor state.
#[derive(Clone)]
pub struct Notifier {
    sms: Arc<dyn SmsPort>,
    from: String,
    to: String,
    template: AlertTemplate,
}

impl Notifier {
    pub fn new(cfg: &Config, sms: Arc<dyn SmsPort>) -> Self {
        Self::with_parts(
            sms,
            cfg.from_number.clone(),
            cfg.recipient_number.clone(),
            cfg.alert.clone(),
        )
    }

    pub fn with_parts(
        sms: Arc<dyn SmsPort>,
        from: impl Into<String>,
        to: impl Into<String>,
        template: AlertTemplate,
    ) -> Self {
        Self {
            sms,
            from: from.into(),
            to: to.into(),
            template,
        }
    }

    pub fn request_for(&self, account: &TrackedAccount, post: &Post) -> NotificationRequest {
        NotificationRequest {
            to: self.to.clone(),
            from: self.from.clone(),
            body: self.template.render(&account.handle, post),
            post_id: Some(post.id.clone()),
        }
    }

    /// Credential check message (`postwatch test-sms`).
    pub fn test_request(&self) -> NotificationRequest {
        NotificationRequest {
            to: self.to.clone(),
            from: self.from.clone(),
            body: TEST_MESSAGE.to_string(),
            post_id: None,
        }
    }

    /// Exactly one dispatch; retries are the caller's call.
    pub async fn send(&self, req: &NotificationRequest) -> NotifyResult<NotificationResult> {
        let sid = self.sms.send_sms(req).await?;
        tracing::info!(sid = %sid, to = %req.to, chars = req.body.chars().count(), "sms sent");
        Ok(NotificationResult { sid })
    }
}
