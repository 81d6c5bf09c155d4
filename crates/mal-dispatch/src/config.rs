//! Runtime configuration with validation.

use mal_types::{MalError, QosLevel};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Dispatch and transaction-tracking settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Bound on synchronous waits. `None` waits forever.
    #[serde(with = "humantime_serde::option")]
    pub sync_timeout: Option<Duration>,
    /// Age after which abandoned transactions and sources are purged
    #[serde(with = "humantime_serde")]
    pub transaction_ttl: Duration,
    /// How often the purge runs
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,
    /// QoS level for consumer headers unless overridden
    pub default_qos_level: QosLevel,
    /// Priority for consumer headers unless overridden
    pub default_priority: u32,
    /// Inbound buffer of endpoints bound through `MalRuntime::bind`
    pub channel_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            sync_timeout: Some(Duration::from_secs(30)),
            transaction_ttl: Duration::from_secs(300),
            cleanup_interval: Duration::from_secs(30),
            default_qos_level: QosLevel::BestEffort,
            default_priority: 0,
            channel_capacity: mal_transport::DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl RuntimeConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sync_timeout == Some(Duration::ZERO) {
            return Err(ConfigError::InvalidTimeout(
                "sync_timeout cannot be 0; use none to wait forever".into(),
            ));
        }

        if self.transaction_ttl.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "transaction_ttl cannot be 0".into(),
            ));
        }

        if self.cleanup_interval.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "cleanup_interval cannot be 0".into(),
            ));
        }

        if let Some(timeout) = self.sync_timeout {
            if self.transaction_ttl < timeout {
                return Err(ConfigError::InvalidTimeout(
                    "transaction_ttl must not be shorter than sync_timeout".into(),
                ));
            }
        }

        if self.channel_capacity == 0 {
            return Err(ConfigError::InvalidLimit(
                "channel_capacity cannot be 0".into(),
            ));
        }

        Ok(())
    }

    /// Defaults overridden from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `MAL_SYNC_TIMEOUT`: e.g. `30s`, `500ms`, or `none`
    /// - `MAL_TRANSACTION_TTL`: e.g. `5m`
    /// - `MAL_CLEANUP_INTERVAL`: e.g. `30s`
    /// - `MAL_DEFAULT_QOS`: `BESTEFFORT`, `ASSURED`, `QUEUED`, `TIMELY` or 1-4
    /// - `MAL_DEFAULT_PRIORITY`: unsigned integer
    /// - `MAL_CHANNEL_CAPACITY`: unsigned integer
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(value) = env::var("MAL_SYNC_TIMEOUT") {
            config.sync_timeout = humantime_serde::parse_optional(&value)
                .map_err(|e| ConfigError::Env("MAL_SYNC_TIMEOUT", e.to_string()))?;
        }
        if let Ok(value) = env::var("MAL_TRANSACTION_TTL") {
            config.transaction_ttl = humantime_serde::parse_duration(&value)
                .map_err(|e| ConfigError::Env("MAL_TRANSACTION_TTL", e.to_string()))?;
        }
        if let Ok(value) = env::var("MAL_CLEANUP_INTERVAL") {
            config.cleanup_interval = humantime_serde::parse_duration(&value)
                .map_err(|e| ConfigError::Env("MAL_CLEANUP_INTERVAL", e.to_string()))?;
        }
        if let Ok(value) = env::var("MAL_DEFAULT_QOS") {
            config.default_qos_level = parse_qos(&value)
                .ok_or_else(|| ConfigError::Env("MAL_DEFAULT_QOS", value.clone()))?;
        }
        if let Ok(value) = env::var("MAL_DEFAULT_PRIORITY") {
            config.default_priority = value
                .parse()
                .map_err(|_| ConfigError::Env("MAL_DEFAULT_PRIORITY", value.clone()))?;
        }
        if let Ok(value) = env::var("MAL_CHANNEL_CAPACITY") {
            config.channel_capacity = value
                .parse()
                .map_err(|_| ConfigError::Env("MAL_CHANNEL_CAPACITY", value.clone()))?;
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_qos(value: &str) -> Option<QosLevel> {
    match value.trim().to_uppercase().as_str() {
        "BESTEFFORT" => Some(QosLevel::BestEffort),
        "ASSURED" => Some(QosLevel::Assured),
        "QUEUED" => Some(QosLevel::Queued),
        "TIMELY" => Some(QosLevel::Timely),
        other => other.parse().ok().and_then(QosLevel::from_ordinal),
    }
}

/// Configuration errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Invalid timeout value
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    /// Invalid size or count limit
    #[error("invalid limit: {0}")]
    InvalidLimit(String),
    /// Environment variable could not be parsed
    #[error("invalid value for {0}: {1}")]
    Env(&'static str, String),
}

impl From<ConfigError> for MalError {
    fn from(err: ConfigError) -> Self {
        MalError::Config(err.to_string())
    }
}

/// Humantime serde module for Duration serialization
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format_duration(*duration))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    fn format_duration(duration: Duration) -> String {
        if duration.subsec_millis() != 0 {
            format!("{}ms", duration.as_millis())
        } else {
            format!("{}s", duration.as_secs())
        }
    }

    /// `none` (any case) means no limit.
    pub fn parse_optional(s: &str) -> Result<Option<Duration>, &'static str> {
        if s.trim().eq_ignore_ascii_case("none") {
            Ok(None)
        } else {
            parse_duration(s).map(Some)
        }
    }

    pub fn parse_duration(s: &str) -> Result<Duration, &'static str> {
        let s = s.trim();
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| "invalid milliseconds")
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid seconds")
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.trim()
                .parse::<u64>()
                .map(|m| Duration::from_secs(m * 60))
                .map_err(|_| "invalid minutes")
        } else {
            // Try parsing as plain seconds
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid duration format")
        }
    }

    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};
        use std::time::Duration;

        pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match duration {
                Some(d) => serializer.serialize_str(&super::format_duration(*d)),
                None => serializer.serialize_str("none"),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
        where
            D: Deserializer<'de>,
        {
            let s = String::deserialize(deserializer)?;
            super::parse_optional(&s).map_err(serde::de::Error::custom)
        }
    }
}
