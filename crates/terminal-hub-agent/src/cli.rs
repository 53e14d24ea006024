//! Command line options.

use std::{path::PathBuf, time::Duration};

use clap::Parser;
use terminal_hub_core::ConnConfig;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "terminal-hub-agent")]
#[command(about = "Expose a local shell through a terminal hub")]
#[command(version)]
pub struct Cli {
    /// Hub address.
    #[arg(long, env = "TERMINAL_HUB_ADDR", value_name = "HOST:PORT", default_value = "localhost:8090")]
    pub hub: String,

    /// Identity presented to the hub. Generated when omitted.
    #[arg(long, value_name = "ID")]
    pub agent_id: Option<String>,

    /// Address this agent advertises at bootstrap.
    #[arg(long, value_name = "ADDR", default_value = "127.0.0.1")]
    pub address: String,

    /// Carry the terminal over hub calls instead of dialing the address the
    /// hub hands out.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub tunnel: bool,

    /// Shell command line. Defaults to the user's shell.
    #[arg(long, value_name = "CMD")]
    pub shell: Option<String>,

    /// Working directory for the shell.
    #[arg(long, value_name = "DIR")]
    pub cwd: Option<PathBuf>,

    /// Bound on hub register and close calls, in seconds.
    #[arg(long, value_name = "SECS", default_value_t = 10)]
    pub timeout_secs: u64,

    /// Bound on tunneled read and write calls, in seconds.
    #[arg(long, value_name = "SECS", default_value_t = 5)]
    pub io_timeout_secs: u64,
}

impl Cli {
    /// The agent identity, generating one if none was given.
    #[must_use]
    pub fn agent_id(&self) -> String {
        self.agent_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn conn_config(&self, agent_id: &str) -> ConnConfig {
        ConnConfig::new()
            .with_agent_id(agent_id)
            .with_timeout(Duration::from_secs(self.timeout_secs))
            .with_io_timeout(Duration::from_secs(self.io_timeout_secs))
    }
}
