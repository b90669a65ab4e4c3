//! Configuration for the sync server.

/// Configuration for the sync server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Upper bound on instances accepted per reconcile request.
    pub max_delta_instances: usize,
}

impl ServerConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self {
            max_delta_instances: 10_000,
        }
    }

    /// Sets the per-request instance bound.
    #[must_use]
    pub fn with_max_delta_instances(mut self, max: usize) -> Self {
        self.max_delta_instances = max.max(1);
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}
