//! Bootstrap registration of a terminal.
//!
//! Runs once at startup, before any stream exists, and only learns where
//! the agent should connect.

use std::{fmt, time::Duration};

use terminal_hub_core::{TerminalRegistry, TransportError, protocol::TerminalRegisterRequest};
use thiserror::Error;

/// Default bound for the bootstrap call.
pub const DEFAULT_REGISTRATION_TIMEOUT: Duration = Duration::from_secs(1);

/// Registration error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("Registration timed out after {0:?}")]
    Timeout(Duration),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),
}

/// Address handed out by the hub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalAddress {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for TerminalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Client for the one-shot terminal registration.
pub struct RegistrationClient<R> {
    registry: R,
    timeout: Duration,
}

impl<R: TerminalRegistry> RegistrationClient<R> {
    /// Create a client using the default one second bound.
    #[must_use]
    pub const fn new(registry: R) -> Self {
        Self {
            registry,
            timeout: DEFAULT_REGISTRATION_TIMEOUT,
        }
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Register a terminal and return the address to dial.
    ///
    /// # Errors
    /// `Timeout`, `Transport`, or `ProtocolViolation` for an empty host or
    /// a zero port.
    pub async fn register(
        &self,
        req: TerminalRegisterRequest,
    ) -> Result<TerminalAddress, RegistrationError> {
        let terminal_id = req.terminal_id.clone();
        let res = tokio::time::timeout(self.timeout, self.registry.register_terminal(req))
            .await
            .map_err(|_| RegistrationError::Timeout(self.timeout))??;

        if res.host.is_empty() || res.port == 0 {
            return Err(RegistrationError::ProtocolViolation(format!(
                "unusable address {:?}:{}",
                res.host, res.port
            )));
        }

        let address = TerminalAddress {
            host: res.host,
            port: res.port,
        };
        tracing::debug!(%terminal_id, %address, "Terminal registered");
        Ok(address)
    }
}
