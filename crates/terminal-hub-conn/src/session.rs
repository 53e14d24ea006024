//! Hub session state.

use terminal_hub_core::StreamError;

/// Session identity for one agent.
///
/// The hub-assigned id is absent until a registration succeeds and is
/// cleared again by a successful close.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    agent_id: String,
    id: Option<String>,
}

impl Session {
    /// Create an unregistered session.
    #[must_use]
    pub const fn new(agent_id: String) -> Self {
        Self { agent_id, id: None }
    }

    /// Identity sent at registration.
    #[must_use]
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    #[must_use]
    pub const fn is_registered(&self) -> bool {
        self.id.is_some()
    }

    /// The hub-assigned id, or `ClosedPipe` if there is none.
    ///
    /// # Errors
    /// Returns `ClosedPipe` when unregistered.
    pub fn id(&self) -> Result<&str, StreamError> {
        self.id.as_deref().ok_or(StreamError::ClosedPipe)
    }

    /// Store a newly assigned id, returning the one it replaces.
    pub fn attach(&mut self, id: String) -> Option<String> {
        self.id.replace(id)
    }

    /// Forget the current id.
    pub fn detach(&mut self) -> Option<String> {
        self.id.take()
    }
}
