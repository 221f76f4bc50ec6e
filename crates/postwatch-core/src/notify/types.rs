use crate::domain::{MessageSid, PostId};

/// One SMS to dispatch. Built per new post, consumed once, never persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NotificationRequest {
    pub to: String,
    pub from: String,
    pub body: String,
    /// Post the alert was built from (for logs).
    pub post_id: Option<PostId>,
}

/// Successful dispatch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NotificationResult {
    pub sid: MessageSid,
}
