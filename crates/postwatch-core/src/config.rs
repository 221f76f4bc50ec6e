use std::{
    env, fs,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use crate::{
    errors::Error,
    formatting::{AlertTemplate, DEFAULT_ALERT_HEADER, DEFAULT_MAX_SMS_LENGTH},
    retry::RetryPolicy,
    Result,
};

const REQUIRED_VARS: [&str; 6] = [
    "TWITTER_BEARER_TOKEN",
    "TWITTER_USERNAME",
    "TWILIO_ACCOUNT_SID",
    "TWILIO_AUTH_TOKEN",
    "TWILIO_PHONE_NUMBER",
    "RECIPIENT_PHONE_NUMBER",
];

/// What happens when state cannot be saved around a send.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DeliveryGuarantee {
    /// Send, then save. A lost save can re-send the alert after a restart.
    #[default]
    AtLeastOnce,
    /// Save the advanced cursor, then send. A crash after the save loses the alert.
    AtMostOnce,
}

impl FromStr for DeliveryGuarantee {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "at-least-once" => Ok(Self::AtLeastOnce),
            "at-most-once" => Ok(Self::AtMostOnce),
            other => Err(Error::Config(format!(
                "DELIVERY_GUARANTEE must be at-least-once or at-most-once, got {other:?}"
            ))),
        }
    }
}

/// Knobs of the poll loop itself.
#[derive(Clone, Debug)]
pub struct MonitorSettings {
    pub handle: String,
    pub poll_interval: Duration,
    pub fetch_retry: RetryPolicy,
    pub send_retry: RetryPolicy,
    /// Consecutive provider cooldowns honoured within one cycle.
    pub max_rate_limit_stalls: u32,
    pub delivery: DeliveryGuarantee,
}

impl MonitorSettings {
    pub fn new(handle: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            poll_interval: Duration::from_secs(120),
            fetch_retry: RetryPolicy::default(),
            send_retry: RetryPolicy::default(),
            max_rate_limit_stalls: 3,
            delivery: DeliveryGuarantee::default(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct XCredentials {
    pub bearer_token: String,
}

#[derive(Clone, Debug)]
pub struct TwilioCredentials {
    pub account_sid: String,
    pub auth_token: String,
}

/// Typed configuration, built once at startup and handed to every component.
#[derive(Clone, Debug)]
pub struct Config {
    pub x: XCredentials,
    pub twilio: TwilioCredentials,
    pub from_number: String,
    pub recipient_number: String,

    pub monitor: MonitorSettings,
    pub alert: AlertTemplate,

    pub state_file: PathBuf,
    pub http_timeout: Duration,
    pub log_file: Option<PathBuf>,
}

impl Config {
    /// Load from the process environment (plus `./.env`, which never overrides).
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).and_then(non_empty);

        let missing = REQUIRED_VARS
            .iter()
            .filter(|k| get(**k).is_none())
            .copied()
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            return Err(Error::Config(format!(
                "missing required environment variables: {}",
                missing.join(", ")
            )));
        }
        let required = |key: &str| get(key).unwrap_or_default();

        let handle = required("TWITTER_USERNAME")
            .trim()
            .trim_start_matches('@')
            .to_string();

        let min_backoff = Duration::from_millis(parse_or(&get, "MIN_BACKOFF_MS", 1000u64)?);
        let max_backoff = Duration::from_secs(parse_or(&get, "MAX_BACKOFF_SECS", 300u64)?);
        if min_backoff > max_backoff {
            return Err(Error::Config(
                "MIN_BACKOFF_MS must not exceed MAX_BACKOFF_SECS".to_string(),
            ));
        }
        let multiplier = parse_or(&get, "BACKOFF_MULTIPLIER", 2.0f64)?;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(Error::Config(
                "BACKOFF_MULTIPLIER must be a number >= 1".to_string(),
            ));
        }
        let backoff = RetryPolicy {
            max_attempts: 1,
            base_delay: min_backoff,
            multiplier,
            max_delay: max_backoff,
        };

        let poll_secs = parse_or(&get, "POLL_INTERVAL_SECS", 120u64)?;
        if poll_secs == 0 {
            return Err(Error::Config(
                "POLL_INTERVAL_SECS must be greater than zero".to_string(),
            ));
        }

        let monitor = MonitorSettings {
            handle,
            poll_interval: Duration::from_secs(poll_secs),
            fetch_retry: backoff.with_max_attempts(parse_or(&get, "FETCH_MAX_ATTEMPTS", 3u32)?),
            send_retry: backoff.with_max_attempts(parse_or(&get, "SEND_MAX_ATTEMPTS", 3u32)?),
            max_rate_limit_stalls: parse_or(&get, "MAX_RATE_LIMIT_STALLS", 3u32)?,
            delivery: match get("DELIVERY_GUARANTEE") {
                Some(v) => v.parse()?,
                None => DeliveryGuarantee::default(),
            },
        };

        let alert = AlertTemplate {
            header: get("ALERT_HEADER").unwrap_or_else(|| DEFAULT_ALERT_HEADER.to_string()),
            max_len: parse_or(&get, "MAX_SMS_LENGTH", DEFAULT_MAX_SMS_LENGTH)?,
        };
        if alert.max_len < alert.min_len() {
            return Err(Error::Config(format!(
                "MAX_SMS_LENGTH must be at least {} for the configured ALERT_HEADER",
                alert.min_len()
            )));
        }

        Ok(Self {
            x: XCredentials {
                bearer_token: required("TWITTER_BEARER_TOKEN"),
            },
            twilio: TwilioCredentials {
                account_sid: required("TWILIO_ACCOUNT_SID"),
                auth_token: required("TWILIO_AUTH_TOKEN"),
            },
            from_number: required("TWILIO_PHONE_NUMBER"),
            recipient_number: required("RECIPIENT_PHONE_NUMBER"),
            monitor,
            alert,
            state_file: PathBuf::from(get("STATE_FILE").unwrap_or_else(|| "data.json".to_string())),
            http_timeout: Duration::from_secs(parse_or(&get, "HTTP_TIMEOUT_SECS", 10u64)?),
            log_file: get("LOG_FILE").map(PathBuf::from),
        })
    }
}

/// Read an env-style `.env` file into the environment without overriding set variables.
pub fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        env::set_var(key, unquote(v.trim()));
    }
}

fn unquote(val: &str) -> &str {
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        &val[1..val.len() - 1]
    } else {
        val
    }
}

fn parse_or<T: FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T> {
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| Error::Config(format!("{key} has an invalid value: {raw:?}"))),
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_env() -> HashMap<&'static str, String> {
        [
            ("TWITTER_BEARER_TOKEN", "bearer"),
            ("TWITTER_USERNAME", "@ShamsCharania"),
            ("TWILIO_ACCOUNT_SID", "AC123"),
            ("TWILIO_AUTH_TOKEN", "secret"),
            ("TWILIO_PHONE_NUMBER", "+15550000001"),
            ("RECIPIENT_PHONE_NUMBER", "+15550000002"),
        ]
        .into_iter()
        .map(|(k, v)| (k, v.to_string()))
        .collect()
    }

    fn load(vars: &HashMap<&'static str, String>) -> Result<Config> {
        Config::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn defaults_apply_when_optional_vars_missing() {
        let cfg = load(&base_env()).unwrap();
        assert_eq!(cfg.monitor.handle, "ShamsCharania");
        assert_eq!(cfg.monitor.poll_interval, Duration::from_secs(120));
        assert_eq!(cfg.monitor.fetch_retry.max_attempts, 3);
        assert_eq!(cfg.monitor.send_retry.max_delay, Duration::from_secs(300));
        assert_eq!(cfg.monitor.max_rate_limit_stalls, 3);
        assert_eq!(cfg.monitor.delivery, DeliveryGuarantee::AtLeastOnce);
        assert_eq!(cfg.state_file, PathBuf::from("data.json"));
        assert_eq!(cfg.alert.max_len, 1600);
    }

    #[test]
    fn missing_required_vars_are_all_reported() {
        let mut vars = base_env();
        vars.remove("TWILIO_AUTH_TOKEN");
        vars.insert("RECIPIENT_PHONE_NUMBER", "   ".to_string());

        let err = load(&vars).unwrap_err().to_string();
        assert!(err.contains("TWILIO_AUTH_TOKEN"));
        assert!(err.contains("RECIPIENT_PHONE_NUMBER"));
    }

    #[test]
    fn overrides_are_parsed() {
        let mut vars = base_env();
        vars.insert("POLL_INTERVAL_SECS", "60".to_string());
        vars.insert("SEND_MAX_ATTEMPTS", "5".to_string());
        vars.insert("MIN_BACKOFF_MS", "250".to_string());
        vars.insert("DELIVERY_GUARANTEE", "AT_MOST_ONCE".to_string());

        let cfg = load(&vars).unwrap();
        assert_eq!(cfg.monitor.poll_interval, Duration::from_secs(60));
        assert_eq!(cfg.monitor.send_retry.max_attempts, 5);
        assert_eq!(cfg.monitor.fetch_retry.base_delay, Duration::from_millis(250));
        assert_eq!(cfg.monitor.delivery, DeliveryGuarantee::AtMostOnce);
    }

    #[test]
    fn invalid_numbers_are_config_errors() {
        let mut vars = base_env();
        vars.insert("POLL_INTERVAL_SECS", "soon".to_string());
        assert!(matches!(load(&vars), Err(Error::Config(_))));

        let mut vars = base_env();
        vars.insert("POLL_INTERVAL_SECS", "0".to_string());
        assert!(matches!(load(&vars), Err(Error::Config(_))));
    }

    #[test]
    fn sms_length_must_fit_the_alert_layout() {
        for len in ["0", "3", "159"] {
            let mut vars = base_env();
            vars.insert("MAX_SMS_LENGTH", len.to_string());
            assert!(matches!(load(&vars), Err(Error::Config(_))), "MAX_SMS_LENGTH={len}");
        }

        let mut vars = base_env();
        vars.insert("MAX_SMS_LENGTH", "160".to_string());
        vars.insert("ALERT_HEADER", "H".repeat(100));
        let err = load(&vars).unwrap_err().to_string();
        assert!(err.contains("MAX_SMS_LENGTH must be at least 222"));

        let mut vars = base_env();
        vars.insert("MAX_SMS_LENGTH", "160".to_string());
        assert_eq!(load(&vars).unwrap().alert.max_len, 160);
    }
}
