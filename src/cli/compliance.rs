use anyhow::Result;
use clap::{Args, Subcommand};

use super::{open_core, print_json};
use crate::compliance::{ComplianceReport, Framework};

#[derive(Args)]
pub struct ComplianceArgs {
    #[command(subcommand)]
    pub command: ComplianceCommands,
}

#[derive(Subcommand)]
pub enum ComplianceCommands {
    /// Generate and save a framework report over the audit trail
    Report {
        /// GDPR, ISO27001, NIST or PCI_DSS
        framework: String,

        /// Days back from now (default: compliance.report_days)
        #[arg(short, long)]
        days: Option<u32>,
    },

    /// Audit totals, integrity and recently saved reports
    Status,
}

pub fn run(args: ComplianceArgs, json: bool) -> Result<()> {
    let core = open_core()?;

    match args.command {
        ComplianceCommands::Report { framework, days } => {
            let framework: Framework = framework.parse()?;
            let days = days.unwrap_or(core.config().compliance.report_days);
            let report = core.generate_compliance_report(framework, days)?;
            if json {
                return print_json(&report);
            }
            print_report(&report);
            if let Some(dir) = core.compliance().reports_dir() {
                println!("\nSaved to {}", dir.join(report.file_name()).display());
            }
        }
        ComplianceCommands::Status => {
            let status = core.compliance().status();
            if json {
                return print_json(&status);
            }
            println!("Compliance Status");
            println!("-----------------");
            println!("Audit events:   {}", status.total_audit_events);
            if let Some(last) = status.last_audit_event {
                println!("Last event:     {}", last.to_rfc3339());
            }
            println!(
                "Integrity:      {}",
                if status.audit_integrity {
                    "intact".to_string()
                } else {
                    format!("{} violation(s)", status.integrity_violations)
                }
            );
            let frameworks: Vec<&str> = status.frameworks_supported.iter().map(|f| f.id()).collect();
            println!("Frameworks:     {}", frameworks.join(", "));
            if !status.recent_reports.is_empty() {
                println!("\nRecent reports:");
                for r in &status.recent_reports {
                    println!(
                        "  {}  {:<9} {:>5.1}  {}",
                        r.generated_at.format("%Y-%m-%d %H:%M"),
                        r.framework.id(),
                        r.overall_score,
                        r.report_id
                    );
                }
            }
        }
    }

    Ok(())
}

fn print_report(report: &ComplianceReport) {
    println!("{} Compliance Report", report.framework.title());
    println!(
        "Period: {} .. {}",
        report.period_start.format("%Y-%m-%d"),
        report.period_end.format("%Y-%m-%d")
    );
    println!("Overall score: {:.1}", report.overall_score);
    println!("Events considered: {}\n", report.events_considered);

    for section in &report.sections {
        let risk = &section.risk_distribution;
        println!(
            "  {:<24} {:>5} events  {:>5.1}% success  risk L/M/H/C {}/{}/{}/{}",
            section.category,
            section.events_count,
            section.success_rate,
            risk.low,
            risk.medium,
            risk.high,
            risk.critical
        );
    }

    if !report.recommendations.is_empty() {
        println!("\nRecommendations:");
        for r in &report.recommendations {
            println!("  - {}", r);
        }
    }
}
