//! Twilio adapter (Programmable Messaging).
//!
//! Implements the core `SmsPort` over `POST /2010-04-01/Accounts/:sid/Messages.json`.
//! No retries here: the monitor decides what to do with a classified failure.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

use postwatch_core::{
    config::Config,
    domain::MessageSid,
    errors::{Error, NotifyError},
    notify::{NotificationRequest, NotifyResult, SmsPort},
    Result,
};

pub const DEFAULT_BASE_URL: &str = "https://api.twilio.com";

#[derive(Clone, Debug)]
pub struct TwilioSms {
    account_sid: String,
    auth_token: String,
    base_url: String,
    http: reqwest::Client,
}

impl TwilioSms {
    pub fn new(cfg: &Config) -> Result<Self> {
        Self::with_base_url(
            &cfg.twilio.account_sid,
            &cfg.twilio.auth_token,
            DEFAULT_BASE_URL,
            cfg.http_timeout,
        )
    }

    pub fn with_base_url(
        account_sid: impl Into<String>,
        auth_token: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::External(format!("twilio http client build error: {e}")))?;
        Ok(Self {
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.base_url, self.account_sid
        )
    }
}

#[async_trait]
impl SmsPort for TwilioSms {
    async fn send_sms(&self, req: &NotificationRequest) -> NotifyResult<MessageSid> {
        let form = [
            ("To", req.to.as_str()),
            ("From", req.from.as_str()),
            ("Body", req.body.as_str()),
        ];

        let resp = self
            .http
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&form)
            .send()
            .await
            .map_err(|e| NotifyError::Transient(format!("twilio request error: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| NotifyError::Transient(format!("twilio body read error: {e}")))?;

        if !status.is_success() {
            return Err(classify_failure(status, &body));
        }

        let msg = parse_message(&body)?;
        tracing::debug!(sid = %msg.sid, status = msg.status.as_deref().unwrap_or("unknown"), "twilio accepted message");
        Ok(MessageSid(msg.sid))
    }
}

#[derive(Debug, Deserialize)]
struct MessageResource {
    sid: String,
    status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorResource {
    code: Option<u32>,
    #[serde(default)]
    message: String,
}

fn parse_message(body: &str) -> NotifyResult<MessageResource> {
    // The message may already be queued; treat an unreadable 2xx as retryable anyway.
    serde_json::from_str(body)
        .map_err(|e| NotifyError::Transient(format!("twilio json error: {e}")))
}

/// Throttling and server faults are worth retrying; any other 4xx (bad number,
/// unverified sender, suspended account, rejected credentials) is not.
fn classify_failure(status: StatusCode, body: &str) -> NotifyError {
    let err: ErrorResource = serde_json::from_str(body).unwrap_or_default();
    let detail = match err.code {
        Some(code) => format!("twilio {status} (code {code}): {}", err.message),
        None => format!(
            "twilio {status}: {}",
            body.chars().take(200).collect::<String>()
        ),
    };

    if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        NotifyError::Transient(detail)
    } else {
        NotifyError::Permanent(detail)
    }
}
