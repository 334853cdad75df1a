//! Recorder registry for guild capture contexts
//!
//! Each guild gets its own packet history so replays never mix audio from
//! unrelated servers.

use dashmap::DashMap;
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::recorder::{Clock, ReplayRecorder, SystemClock};

/// Recorder lookup for all guilds
pub struct RecorderRegistry {
    recorders: DashMap<u64, Arc<ReplayRecorder>>,
    config: Arc<Config>,
    clock: Arc<dyn Clock>,
}

impl RecorderRegistry {
    /// Create an empty registry
    pub fn new(config: Arc<Config>) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: Arc<Config>, clock: Arc<dyn Clock>) -> Self {
        Self {
            recorders: DashMap::new(),
            config,
            clock,
        }
    }

    /// Get the recorder for a guild, if one exists
    pub fn get(&self, guild_id: u64) -> Option<Arc<ReplayRecorder>> {
        self.recorders.get(&guild_id).map(|r| r.value().clone())
    }

    /// Get or lazily create the recorder for a guild
    pub fn get_or_create(&self, guild_id: u64) -> Arc<ReplayRecorder> {
        self.recorders
            .entry(guild_id)
            .or_insert_with(|| {
                info!("Creating replay recorder for guild {}", guild_id);
                Arc::new(ReplayRecorder::with_clock(&self.config, self.clock.clone()))
            })
            .value()
            .clone()
    }

    /// Stop tracking a guild, dropping its history
    pub fn remove(&self, guild_id: u64) -> Option<Arc<ReplayRecorder>> {
        self.recorders.remove(&guild_id).map(|(_, recorder)| recorder)
    }

    /// Number of guilds being tracked
    pub fn len(&self) -> usize {
        self.recorders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recorders.is_empty()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::SpeakerId;
    use std::time::Duration;

    fn registry() -> RecorderRegistry {
        let config = Config {
            retention: Duration::from_secs(10),
            ..Config::default()
        };
        RecorderRegistry::new(Arc::new(config))
    }

    #[test]
    fn test_recorders_are_per_guild() {
        let registry = registry();
        assert!(registry.get(1).is_none());

        let first = registry.get_or_create(1);
        let again = registry.get_or_create(1);
        assert!(Arc::ptr_eq(&first, &again));

        let other = registry.get_or_create(2);
        first.add_packet(SpeakerId(9), 0, &[1]);
        assert!(first.has_data());
        assert!(!other.has_data());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_remove() {
        let registry = registry();
        registry.get_or_create(5);
        assert!(registry.remove(5).is_some());
        assert!(registry.remove(5).is_none());
        assert!(registry.is_empty());
        assert_eq!(registry.config().retention, Duration::from_secs(10));
    }
}
