//! Cache configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tuning for an [`EntityCache`](crate::EntityCache).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Age after which a cached value is refetched on the next lookup.
    pub freshness: Duration,

    /// How long a fetch may be in flight before a new lookup gives up on
    /// it and fetches again.
    pub stuck_grace: Duration,

    /// Entries kept before idle ones are evicted.
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            freshness: Duration::from_secs(60),
            stuck_grace: Duration::from_secs(5),
            max_entries: 4096,
        }
    }
}

impl CacheConfig {
    /// Fixes out-of-range values. `max_entries` must be at least 1 and
    /// `stuck_grace` may not exceed `freshness`.
    pub fn validated(mut self) -> Self {
        if self.max_entries == 0 {
            tracing::warn!("max_entries is 0, using 1");
            self.max_entries = 1;
        }
        if self.stuck_grace > self.freshness {
            tracing::warn!(
                stuck_grace_ms = self.stuck_grace.as_millis() as u64,
                freshness_ms = self.freshness.as_millis() as u64,
                "stuck_grace exceeds freshness, clamping"
            );
            self.stuck_grace = self.freshness;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_config_default() {
        let config = CacheConfig::default();
        assert_eq!(config.freshness, Duration::from_secs(60));
        assert_eq!(config.stuck_grace, Duration::from_secs(5));
        assert_eq!(config.max_entries, 4096);
    }

    #[test]
    fn test_validated_clamps_grace_and_size() {
        let config = CacheConfig {
            freshness: Duration::from_secs(2),
            stuck_grace: Duration::from_secs(10),
            max_entries: 0,
        }
        .validated();
        assert_eq!(config.stuck_grace, Duration::from_secs(2));
        assert_eq!(config.max_entries, 1);
    }
}
