use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TransportError};

/// Default interval between fragment polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(300);

/// Default upper bound on the length of a message URL.
pub const DEFAULT_MAX_URL_LENGTH: usize = 4000;

/// Default number of transmissions of one reliable frame.
pub const DEFAULT_RELIABLE_MAX_ATTEMPTS: u32 = 8;

/// Where the host's callback document lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalTarget {
    /// URL of a callback document on the host's origin, resolved against
    /// the host location.
    Url(String),
    /// The host's own window; the guest writes to its parent.
    CurrentWindow,
}

/// Configuration of one hash transport.
///
/// Durations serialize as integer milliseconds. A guest takes `channel`
/// and `remote` from its own location and ignores the values here, along
/// with `local`, `container` and `ready_after`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HashTransportConfig {
    /// Channel id, unique per conversation.
    pub channel: String,
    /// URL of the guest document.
    pub remote: String,
    /// Host callback document.
    pub local: Option<LocalTarget>,
    /// Element id of a visible container for the guest frame.
    pub container: Option<String>,
    /// Interval between fragment polls.
    #[serde(with = "duration_ms")]
    pub poll_interval: Duration,
    /// Host becomes ready after this delay instead of waiting for the
    /// callback document to announce itself.
    #[serde(with = "option_duration_ms")]
    pub ready_after: Option<Duration>,
    /// Toggle the caller frame width on every send.
    pub resize_nudge: bool,
    /// Delay before the next chunk is handed to the wire. Derived from the
    /// receive mode when unset.
    #[serde(with = "option_duration_ms")]
    pub send_pacing: Option<Duration>,
    /// Upper bound on the length of a message URL.
    pub max_url_length: usize,
    /// Transmissions of one reliable frame before it is dropped.
    pub reliable_max_attempts: u32,
}

impl Default for HashTransportConfig {
    fn default() -> Self {
        Self {
            channel: String::new(),
            remote: String::new(),
            local: None,
            container: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            ready_after: None,
            resize_nudge: true,
            send_pacing: None,
            max_url_length: DEFAULT_MAX_URL_LENGTH,
            reliable_max_attempts: DEFAULT_RELIABLE_MAX_ATTEMPTS,
        }
    }
}

impl HashTransportConfig {
    /// Host configuration for `channel` talking to the guest at `remote`.
    pub fn host(
        channel: impl Into<String>,
        remote: impl Into<String>,
        local: LocalTarget,
    ) -> Self {
        Self {
            channel: channel.into(),
            remote: remote.into(),
            local: Some(local),
            ..Self::default()
        }
    }

    /// Parse a configuration from JSON.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|err| TransportError::InvalidConfig(err.to_string()))
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(TransportError::InvalidConfig(
                "poll_interval must be positive".to_string(),
            ));
        }
        if self.reliable_max_attempts == 0 {
            return Err(TransportError::InvalidConfig(
                "reliable_max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) fn validate_host(&self) -> Result<&LocalTarget> {
        if self.channel.is_empty() {
            return Err(TransportError::InvalidConfig(
                "channel must not be empty".to_string(),
            ));
        }
        if self.remote.is_empty() {
            return Err(TransportError::InvalidConfig(
                "remote must not be empty".to_string(),
            ));
        }
        self.local.as_ref().ok_or_else(|| {
            TransportError::InvalidConfig("host requires a local target".to_string())
        })
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

mod option_duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer
                .serialize_some(&u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|value| value.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_constants() {
        let config = HashTransportConfig::default();
        assert_eq!(config.poll_interval, Duration::from_millis(300));
        assert_eq!(config.max_url_length, 4000);
        assert!(config.resize_nudge);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn json_uses_milliseconds() {
        let mut config = HashTransportConfig::host(
            "c1",
            "https://guest.example/cb.html",
            LocalTarget::Url("hash.html".to_string()),
        );
        config.ready_after = Some(Duration::from_millis(250));

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["poll_interval"], 300);
        assert_eq!(json["ready_after"], 250);
        assert_eq!(json["send_pacing"], serde_json::Value::Null);
        assert_eq!(json["local"]["url"], "hash.html");

        let back: HashTransportConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = HashTransportConfig::from_json_str(
            r#"{"channel":"c1","remote":"https://g.example/","local":"current_window","poll_interval":50}"#,
        )
        .unwrap();
        assert_eq!(config.local, Some(LocalTarget::CurrentWindow));
        assert_eq!(config.poll_interval, Duration::from_millis(50));
        assert_eq!(config.max_url_length, DEFAULT_MAX_URL_LENGTH);
    }

    #[test]
    fn host_validation_rejects_missing_fields() {
        let config = HashTransportConfig::default();
        assert!(matches!(
            config.validate_host(),
            Err(TransportError::InvalidConfig(_))
        ));
        let mut config = HashTransportConfig::host("c1", "https://g.example/", LocalTarget::CurrentWindow);
        assert!(config.validate_host().is_ok());
        config.reliable_max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn malformed_json_is_invalid_config() {
        assert!(matches!(
            HashTransportConfig::from_json_str("{"),
            Err(TransportError::InvalidConfig(_))
        ));
    }
}
