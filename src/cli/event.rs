use anyhow::Result;
use clap::Args;
use serde_json::Value;

use super::{open_core, print_json};
use crate::detection::SecurityEvent;

#[derive(Args)]
pub struct EventArgs {
    /// Event type (authentication, file_access, network, database, ...)
    pub event_type: String,

    #[arg(long)]
    pub resource: String,

    #[arg(long)]
    pub action: String,

    /// e.g. success, failed, denied
    #[arg(long)]
    pub result: String,

    #[arg(long)]
    pub source_ip: Option<String>,

    #[arg(long)]
    pub user: Option<String>,

    /// Metadata entry as key=value; values that parse as JSON keep their type
    #[arg(short, long = "meta", value_parser = parse_meta)]
    pub meta: Vec<(String, Value)>,
}

fn parse_meta(s: &str) -> Result<(String, Value), String> {
    let (key, raw) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{}`", s))?;
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

pub fn run(args: EventArgs, json: bool) -> Result<()> {
    let core = open_core()?;

    let mut builder = SecurityEvent::builder(args.event_type)
        .resource(args.resource)
        .action(args.action)
        .result(args.result);
    if let Some(ip) = args.source_ip {
        builder = builder.source_ip(ip);
    }
    if let Some(user) = args.user {
        builder = builder.user_id(user);
    }
    for (key, value) in args.meta {
        builder = builder.meta(key, value);
    }

    let outcome = core.submit_event(builder.build()?)?;
    if json {
        return print_json(&outcome);
    }

    println!("Event {} (risk {:.2})", outcome.event_id, outcome.risk_score);
    if outcome.detections.is_empty() && outcome.correlations.is_empty() {
        println!("  No threats detected");
    }
    for d in &outcome.detections {
        println!(
            "  [{}] {} (score {:.2})",
            d.severity, d.name, d.score
        );
    }
    for c in &outcome.correlations {
        println!(
            "  [{}] correlation {} over {} events",
            c.severity,
            c.rule_name,
            c.event_ids.len()
        );
    }
    for alert_id in &outcome.alert_ids {
        println!("  alert {}", alert_id);
    }
    if outcome.audit_event_id.is_none() {
        println!("  warning: event was not written to the audit trail");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_values_keep_json_types() {
        assert_eq!(
            parse_meta("attempt_count=8").unwrap(),
            ("attempt_count".to_string(), Value::from(8))
        );
        assert_eq!(
            parse_meta("unusual_location=true").unwrap().1,
            Value::Bool(true)
        );
        assert_eq!(
            parse_meta("file_path=/etc/passwd").unwrap().1,
            Value::String("/etc/passwd".into())
        );
        assert!(parse_meta("novalue").is_err());
    }
}
