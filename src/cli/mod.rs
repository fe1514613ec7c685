pub mod audit;
pub mod compliance;
pub mod config;
pub mod daemon;
pub mod dashboard;
pub mod event;
pub mod keys;
pub mod paths;

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;

use crate::config::Config;
use crate::service::SecurityCore;

#[derive(Parser)]
#[command(name = "secops")]
#[command(author, version, about = "Local security-operations core")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Key lifecycle and encryption
    Keys(keys::KeysArgs),

    /// Tamper-evident audit trail
    Audit(audit::AuditArgs),

    /// Compliance reports and status
    Compliance(compliance::ComplianceArgs),

    /// Submit a security event for detection
    Event(event::EventArgs),

    /// Show the security dashboard and component status
    Dashboard,

    /// Run the background monitors in the foreground until Ctrl-C
    Daemon(daemon::DaemonArgs),

    /// Configuration management
    Config(config::ConfigArgs),

    /// Show resolved XDG directory paths
    Paths,
}

/// Load config and open the persistent components.
pub(crate) fn open_core() -> Result<SecurityCore> {
    let config = Config::load()?;
    SecurityCore::init(config)
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
