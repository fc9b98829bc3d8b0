use crate::error::{KefError, Result};
use crate::protocol::{CodecVersion, DEFAULT_PORT};
use crate::retry::RetryPolicy;
use crate::types::SourceTable;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Construction options for a speaker controller
///
/// Every field has a default, so a JSON document only needs to name the
/// values it changes:
///
/// ```
/// use kef_wireless::SpeakerOptions;
///
/// let options = SpeakerOptions::from_json(r#"{ "maximum_volume": 0.6, "keep_alive": 5 }"#).unwrap();
/// assert_eq!(options.port, 50001);
/// assert_eq!(options.maximum_volume, 0.6);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeakerOptions {
    pub port: u16,

    /// Step used by `increase_volume` / `decrease_volume`
    pub volume_step: f64,

    /// Ceiling applied to every volume write, between 0 and 1
    pub maximum_volume: f64,

    pub codec: CodecVersion,

    pub sources: SourceTable,

    /// How long to wait for a reply after writing a command
    #[serde(with = "duration_secs")]
    pub reply_timeout: Duration,

    /// Bound for a single connection attempt
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,

    /// Idle time after which the socket is closed
    #[serde(with = "duration_secs")]
    pub keep_alive: Duration,

    #[serde(with = "duration_secs")]
    pub idle_poll_interval: Duration,

    pub max_connect_attempts: u32,

    /// The `n`-th refused connection attempt is followed by `n * step`
    #[serde(with = "duration_secs")]
    pub connect_backoff_step: Duration,

    /// Retries around a single command exchange
    pub command_retry: RetryPolicy,

    /// Retries around a whole controller operation
    pub operation_retry: RetryPolicy,

    /// Polls made by a confirmation loop before giving up
    pub confirm_attempts: u32,

    #[serde(with = "duration_secs")]
    pub source_poll_interval: Duration,

    #[serde(with = "duration_secs")]
    pub power_poll_interval: Duration,
}

impl Default for SpeakerOptions {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            volume_step: 0.05,
            maximum_volume: 1.0,
            codec: CodecVersion::default(),
            sources: SourceTable::default(),
            reply_timeout: Duration::from_secs(2),
            connect_timeout: Duration::from_secs(2),
            keep_alive: Duration::from_secs(20),
            idle_poll_interval: Duration::from_millis(500),
            max_connect_attempts: 10,
            connect_backoff_step: Duration::from_millis(100),
            command_retry: RetryPolicy::default(),
            operation_retry: RetryPolicy::default(),
            confirm_attempts: 5,
            source_poll_interval: Duration::from_millis(500),
            power_poll_interval: Duration::from_secs(1),
        }
    }
}

impl SpeakerOptions {
    /// Load options from a JSON document and validate them
    pub fn from_json(json: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(json)
            .map_err(|e| KefError::InvalidInput(format!("invalid speaker options: {}", e)))?;
        options.validate()?;
        Ok(options)
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_volume_step(mut self, step: f64) -> Self {
        self.volume_step = step;
        self
    }

    pub fn with_maximum_volume(mut self, maximum_volume: f64) -> Self {
        self.maximum_volume = maximum_volume;
        self
    }

    pub fn with_codec(mut self, codec: CodecVersion) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_sources(mut self, sources: SourceTable) -> Self {
        self.sources = sources;
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    pub fn with_command_retry(mut self, policy: RetryPolicy) -> Self {
        self.command_retry = policy;
        self
    }

    pub fn with_operation_retry(mut self, policy: RetryPolicy) -> Self {
        self.operation_retry = policy;
        self
    }

    /// Check value ranges; called by `from_json` and the controller constructors
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.maximum_volume) {
            return Err(KefError::InvalidInput(format!(
                "maximum_volume must be between 0 and 1, got {}",
                self.maximum_volume
            )));
        }
        if !self.volume_step.is_finite() {
            return Err(KefError::InvalidInput("volume_step must be finite".to_string()));
        }
        if self.max_connect_attempts == 0
            || self.confirm_attempts == 0
            || self.command_retry.max_attempts == 0
            || self.operation_retry.max_attempts == 0
        {
            return Err(KefError::InvalidInput(
                "attempt counts must be at least 1".to_string(),
            ));
        }
        let durations = [
            ("reply_timeout", self.reply_timeout),
            ("connect_timeout", self.connect_timeout),
            ("idle_poll_interval", self.idle_poll_interval),
        ];
        if let Some((name, _)) = durations.iter().find(|(_, d)| d.is_zero()) {
            return Err(KefError::InvalidInput(format!("{} must not be zero", name)));
        }
        Ok(())
    }
}

/// Serialize a `Duration` as fractional seconds
pub(crate) mod duration_secs {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Source;

    #[test]
    fn test_defaults() {
        let options = SpeakerOptions::default();
        assert_eq!(options.port, 50001);
        assert_eq!(options.volume_step, 0.05);
        assert_eq!(options.maximum_volume, 1.0);
        assert_eq!(options.codec, CodecVersion::Current);
        assert_eq!(options.max_connect_attempts, 10);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_from_json_partial() {
        let options = SpeakerOptions::from_json(
            r#"{ "port": 50002, "codec": "legacy", "reply_timeout": 0.25,
                 "operation_retry": { "max_attempts": 2 } }"#,
        )
        .unwrap();

        assert_eq!(options.port, 50002);
        assert_eq!(options.codec, CodecVersion::Legacy);
        assert_eq!(options.reply_timeout, Duration::from_millis(250));
        assert_eq!(options.operation_retry.max_attempts, 2);
        assert_eq!(options.operation_retry.base, 1.5);
        assert_eq!(options.keep_alive, Duration::from_secs(20));
    }

    #[test]
    fn test_from_json_source_table() {
        let options = SpeakerOptions::from_json(
            r#"{ "sources": [ { "source": "Usb", "code": 40 }, { "source": "Aux", "code": 41, "aliases": [42] } ] }"#,
        )
        .unwrap();

        assert_eq!(options.sources.code_for(Source::Usb), Some(40));
        assert_eq!(options.sources.decode(42), Some(Source::Aux));
        assert_eq!(options.sources.code_for(Source::Wifi), None);
    }

    #[test]
    fn test_from_json_rejects_bad_values() {
        assert!(matches!(
            SpeakerOptions::from_json(r#"{ "maximum_volume": 1.5 }"#),
            Err(KefError::InvalidInput(_))
        ));
        assert!(matches!(
            SpeakerOptions::from_json(r#"{ "max_connect_attempts": 0 }"#),
            Err(KefError::InvalidInput(_))
        ));
        assert!(matches!(
            SpeakerOptions::from_json(r#"{ "keep_alive": -1 }"#),
            Err(KefError::InvalidInput(_))
        ));
        assert!(matches!(
            SpeakerOptions::from_json("not json"),
            Err(KefError::InvalidInput(_))
        ));
    }
}
