//! Shell sessions for hub-tunneled terminals.
//!
//! Provides:
//! - `ShellCommand` - Resolve which shell to run
//! - `ShellProcess` - Spawn it in a PTY and bridge it onto a `TerminalStream`

pub mod service;
pub mod shell;

pub use service::{BridgeEnd, PtyError, ShellProcess};
pub use shell::ShellCommand;
