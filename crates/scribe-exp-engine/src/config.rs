//! Engine configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for one engine instance
///
/// Constructed per service instance and injected; there is no process-wide
/// singleton.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum cached experiment definitions
    pub cache_capacity: u64,
    /// How long a cached definition may serve before refresh
    pub cache_ttl: Duration,
    /// Deadline applied to every store call
    pub store_timeout: Duration,
}

impl EngineConfig {
    /// Create the default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With a definition-cache capacity
    #[inline]
    #[must_use]
    pub fn with_cache_capacity(mut self, capacity: u64) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// With a definition-cache TTL
    #[inline]
    #[must_use]
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// With a store-call deadline
    #[inline]
    #[must_use]
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 256,
            // Stale definitions are acceptable for seconds, not indefinitely
            cache_ttl: Duration::from_secs(30),
            store_timeout: Duration::from_secs(2),
        }
    }
}
