//! Stream adapter options.

use std::time::Duration;

use uuid::Uuid;

/// Default bound for register and close calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default bound for read and write calls.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(5);

/// Options for a hub-backed stream.
///
/// Defaults are applied first; builder methods override them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnConfig {
    /// Identity sent to the hub at registration.
    pub agent_id: String,

    /// Deadline applied to register and close calls.
    pub timeout: Duration,

    /// Deadline applied to read and write calls when no explicit deadline
    /// is set.
    pub io_timeout: Duration,
}

impl Default for ConnConfig {
    fn default() -> Self {
        Self {
            agent_id: Uuid::new_v4().to_string(),
            timeout: DEFAULT_TIMEOUT,
            io_timeout: DEFAULT_IO_TIMEOUT,
        }
    }
}

impl ConnConfig {
    /// Create a config with a freshly generated agent identity.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a caller-supplied agent identity.
    #[must_use]
    pub fn with_agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = agent_id.into();
        self
    }

    /// Override the register/close deadline.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the read/write deadline.
    #[must_use]
    pub const fn with_io_timeout(mut self, io_timeout: Duration) -> Self {
        self.io_timeout = io_timeout;
        self
    }
}
