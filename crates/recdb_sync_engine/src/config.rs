//! Configuration for the sync engine.

use std::time::Duration;

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Base URL of the authoritative store.
    pub server_url: String,
    /// Request timeout handed to the HTTP client.
    pub timeout: Duration,
    /// Upper bound on resolution round-trips within one sync pass
    /// before the pass is declared failed.
    pub max_sync_passes: u32,
}

impl SyncConfig {
    /// Creates a configuration for the given server.
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            timeout: Duration::from_secs(30),
            max_sync_passes: 3,
        }
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the resolution round-trip bound.
    #[must_use]
    pub fn with_max_sync_passes(mut self, passes: u32) -> Self {
        self.max_sync_passes = passes.max(1);
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_builder() {
        let config = SyncConfig::new("https://sync.example.com")
            .with_timeout(Duration::from_secs(60))
            .with_max_sync_passes(5);

        assert_eq!(config.server_url, "https://sync.example.com");
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.max_sync_passes, 5);
    }

    #[test]
    fn at_least_one_pass() {
        let config = SyncConfig::new("x").with_max_sync_passes(0);
        assert_eq!(config.max_sync_passes, 1);
    }
}
