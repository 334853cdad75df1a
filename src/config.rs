//! Configuration management for the replay recorder
//!
//! Loads settings from environment variables (.env file)

use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::audio::FRAME_DURATION;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory receiving per-speaker replay files
    pub temp_audio_dir: PathBuf,
    /// How much history the ring buffer keeps
    pub retention: Duration,
    /// Replay length used when the caller does not ask for one
    pub default_replay: Duration,
    /// Shortest replay accepted
    pub min_replay: Duration,
    /// Longest replay accepted
    pub max_replay: Duration,
    /// Vendor string written into the comment header
    pub vendor: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            temp_audio_dir: PathBuf::from("temp_audio"),
            retention: Duration::from_secs(30 * 60),
            default_replay: Duration::from_secs(30),
            min_replay: Duration::from_secs(2),
            max_replay: Duration::from_secs(60),
            vendor: "voice-replay".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    ///
    /// Unset or empty keys fall back to [`Config::default`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|s| !s.trim().is_empty());

        let secs = |key: &str, default: Duration| -> Result<Duration, ConfigError> {
            match get(key) {
                Some(s) => s
                    .trim()
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .map_err(|_| ConfigError::InvalidValue(key.to_string(), s)),
                None => Ok(default),
            }
        };

        let temp_audio_dir = get("REPLAY_TEMP_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.temp_audio_dir);

        let retention = secs("REPLAY_RETENTION_SECS", defaults.retention)?;
        if retention < FRAME_DURATION {
            return Err(ConfigError::InvalidValue(
                "REPLAY_RETENTION_SECS".to_string(),
                format!("{}", retention.as_secs()),
            ));
        }

        let default_replay = secs("REPLAY_DEFAULT_SECS", defaults.default_replay)?;
        let min_replay = secs("REPLAY_MIN_SECS", defaults.min_replay)?;
        let max_replay = secs("REPLAY_MAX_SECS", defaults.max_replay)?;
        if min_replay > max_replay {
            return Err(ConfigError::InvalidValue(
                "REPLAY_MIN_SECS".to_string(),
                format!(
                    "{} exceeds REPLAY_MAX_SECS ({})",
                    min_replay.as_secs(),
                    max_replay.as_secs()
                ),
            ));
        }

        let vendor = get("OPUS_VENDOR").unwrap_or(defaults.vendor);

        Ok(Self {
            temp_audio_dir,
            retention,
            default_replay,
            min_replay,
            max_replay,
            vendor,
        })
    }

    /// Number of ring-buffer slots needed to cover the retention window
    pub fn buffer_capacity(&self) -> usize {
        ((self.retention.as_nanos() / FRAME_DURATION.as_nanos()) as usize).max(1)
    }

    /// Resolve the replay length for a request, clamped to the accepted range
    pub fn replay_duration(&self, requested: Option<Duration>) -> Duration {
        requested
            .unwrap_or(self.default_replay)
            .max(self.min_replay)
            .min(self.max_replay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert_eq!(config.temp_audio_dir, PathBuf::from("temp_audio"));
        assert_eq!(config.buffer_capacity(), 90_000);
        assert_eq!(config.default_replay, Duration::from_secs(30));
        assert_eq!(config.vendor, "voice-replay");
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("REPLAY_TEMP_DIR", "/tmp/replays"),
            ("REPLAY_RETENTION_SECS", "60"),
            ("REPLAY_MAX_SECS", "120"),
            ("OPUS_VENDOR", "bigbro"),
            ("REPLAY_MIN_SECS", ""),
        ]))
        .unwrap();
        assert_eq!(config.temp_audio_dir, PathBuf::from("/tmp/replays"));
        assert_eq!(config.buffer_capacity(), 3_000);
        assert_eq!(config.max_replay, Duration::from_secs(120));
        assert_eq!(config.min_replay, Duration::from_secs(2));
        assert_eq!(config.vendor, "bigbro");
    }

    #[test]
    fn test_invalid_values() {
        let err = Config::from_lookup(lookup(&[("REPLAY_MAX_SECS", "lots")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(key, _) if key == "REPLAY_MAX_SECS"));

        let err = Config::from_lookup(lookup(&[("REPLAY_MIN_SECS", "90")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(key, _) if key == "REPLAY_MIN_SECS"));

        let err = Config::from_lookup(lookup(&[("REPLAY_RETENTION_SECS", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(..)));
    }

    #[test]
    fn test_replay_duration_clamping() {
        let config = Config::default();
        assert_eq!(config.replay_duration(None), Duration::from_secs(30));
        assert_eq!(
            config.replay_duration(Some(Duration::from_secs(1))),
            Duration::from_secs(2)
        );
        assert_eq!(
            config.replay_duration(Some(Duration::from_secs(600))),
            Duration::from_secs(60)
        );
        assert_eq!(
            config.replay_duration(Some(Duration::from_secs(45))),
            Duration::from_secs(45)
        );
    }
}
