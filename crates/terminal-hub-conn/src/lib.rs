//! Terminal byte streams carried over hub RPCs.
//!
//! Provides:
//! - `HubConn` - Stream adapter issuing one hub call per operation
//! - `RegistrationClient` - Bootstrap handshake yielding a dial address
//! - `outcome` - Outcome code to stream error translation

pub mod conn;
pub mod outcome;
pub mod registration;
pub mod session;

pub use conn::HubConn;
pub use registration::{RegistrationClient, RegistrationError, TerminalAddress};
pub use session::Session;
