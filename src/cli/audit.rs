use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::path::PathBuf;

use super::{open_core, print_json};
use crate::compliance::{AuditRecord, RiskLevel};

#[derive(Args)]
pub struct AuditArgs {
    #[command(subcommand)]
    pub command: AuditCommands,
}

#[derive(Subcommand)]
pub enum AuditCommands {
    /// Append a record to the audit trail
    Append {
        action: String,
        resource: String,
        /// e.g. success, failed, denied
        result: String,

        /// Compliance category (e.g. access_control, data_protection)
        #[arg(short, long)]
        category: String,

        #[arg(short, long)]
        user: Option<String>,

        /// low, medium, high or critical
        #[arg(short, long, default_value = "low")]
        risk: String,

        /// JSON object with extra details
        #[arg(short, long)]
        details: Option<String>,
    },

    /// Recompute hashes and check ordering of the whole trail
    Verify,

    /// Export recent audit events to CSV
    Export {
        /// Output file (default: <data>/exports/audit-<timestamp>.csv)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Days back from now
        #[arg(short, long, default_value_t = 30)]
        days: u32,
    },
}

pub fn run(args: AuditArgs, json: bool) -> Result<()> {
    let core = open_core()?;

    match args.command {
        AuditCommands::Append {
            action,
            resource,
            result,
            category,
            user,
            risk,
            details,
        } => {
            let mut record = AuditRecord::new(&action, &resource, &result, &category)
                .risk(risk.parse::<RiskLevel>()?);
            if let Some(user) = user {
                record = record.user(user);
            }
            if let Some(details) = details {
                let value: serde_json::Value =
                    serde_json::from_str(&details).context("--details must be JSON")?;
                record = record.details(value);
            }
            let event = core.append_audit_event(record)?;
            if json {
                return print_json(&event);
            }
            println!("Appended {} ({})", event.event_id, event.hash);
        }
        AuditCommands::Verify => {
            let (intact, violations) = core.verify_audit_integrity();
            let total = core.compliance().trail().len();
            if json {
                print_json(&serde_json::json!({
                    "intact": intact,
                    "events": total,
                    "violations": violations,
                }))?;
            } else {
                for violation in &violations {
                    println!("  {}", violation);
                }
            }
            if !intact {
                anyhow::bail!(
                    "Audit trail integrity check failed: {} violation(s) in {} events",
                    violations.len(),
                    total
                );
            }
            if !json {
                println!("Audit trail intact ({} events)", total);
            }
        }
        AuditCommands::Export { output, days } => {
            let path = match output {
                Some(path) => path,
                None => core.config().paths.exports_dir().join(format!(
                    "audit-{}.csv",
                    chrono::Utc::now().format("%Y%m%dT%H%M%S")
                )),
            };
            let written = core.export_audit_csv(&path, days)?;
            println!("Exported {} event(s) to {}", written, path.display());
        }
    }

    Ok(())
}
