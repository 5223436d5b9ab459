//! Cache configuration.

use std::time::Duration;

/// Configuration for a cache instance.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries; least recently used entries go first.
    pub max_capacity: u64,

    /// Entries expire this long after insertion.
    pub ttl: Option<Duration>,

    /// Entries expire if not read within this duration.
    pub tti: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
            ttl: Some(Duration::from_secs(300)),
            tti: None,
        }
    }
}

impl CacheConfig {
    pub fn with_capacity(max_capacity: u64) -> Self {
        Self {
            max_capacity,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn ttl(mut self, duration: Duration) -> Self {
        self.ttl = Some(duration);
        self
    }

    #[must_use]
    pub fn tti(mut self, duration: Duration) -> Self {
        self.tti = Some(duration);
        self
    }

    /// Entries never expire by age (still bounded by capacity).
    #[must_use]
    pub fn no_ttl(mut self) -> Self {
        self.ttl = None;
        self
    }

    /// Short-lived membership and ban lookups.
    pub fn gate() -> Self {
        Self {
            max_capacity: 50_000,
            ttl: Some(Duration::from_secs(60)),
            tti: None,
        }
    }

    /// Per-user search results.
    pub fn search_results() -> Self {
        Self {
            max_capacity: 10_000,
            ttl: Some(Duration::from_secs(30 * 60)),
            tti: None,
        }
    }
}
