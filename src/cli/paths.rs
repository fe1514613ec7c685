//! CLI subcommand: `secops paths`
//!
//! Prints all resolved XDG-compliant paths for debugging and scripting.

use anyhow::Result;

use crate::paths::Paths;

pub fn run() -> Result<()> {
    let paths = Paths::resolve()?;

    println!("secops Paths (XDG Base Directory)");
    println!("=================================");
    println!();
    println!("Config:     {}", paths.config_dir.display());
    println!("  config.toml:    {}", paths.config_file().display());
    println!();
    println!("Data:       {}", paths.data_dir.display());
    println!("  key store:      {}", paths.key_store().display());
    println!("  reports:        {}", paths.reports_dir().display());
    println!("  exports:        {}", paths.exports_dir().display());
    println!();
    println!("State:      {}", paths.state_dir.display());
    println!("  audit log:      {}", paths.audit_log().display());

    Ok(())
}
