use anyhow::Result;
use clap::Args;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use super::open_core;
use crate::service::SecurityCore;
use crate::detection::SecurityEvent;

#[derive(Args)]
pub struct DaemonArgs {
    /// Submit JSON security events read from stdin, one per line; exit at EOF
    #[arg(long)]
    pub stdin: bool,
}

pub async fn run(args: DaemonArgs) -> Result<()> {
    let core = open_core()?;

    println!("Starting secops daemon in foreground...");
    if core.config().monitors.enabled {
        core.start_monitors()?;
        println!(
            "  Monitors: correlation every {}, alert cleanup every {}, key check every {}",
            core.config().monitors.correlation_interval,
            core.config().monitors.alert_cleanup_interval,
            core.config().monitors.key_check_interval
        );
    } else {
        println!("  Monitors: disabled");
    }
    println!("  Audit log: {}", core.config().paths.audit_log().display());
    if args.stdin {
        println!("  Reading events from stdin until EOF");
    }
    println!("Use Ctrl+C to stop\n");

    if args.stdin {
        tokio::select! {
            res = read_events(&core) => res?,
            res = tokio::signal::ctrl_c() => res?,
        }
    } else {
        tokio::signal::ctrl_c().await?;
    }

    println!("\nShutting down...");
    core.shutdown().await;
    Ok(())
}

/// Submit each stdin line until EOF. Bad lines are logged and skipped.
async fn read_events(core: &SecurityCore) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        let event: SecurityEvent = match serde_json::from_str(&line) {
            Ok(event) => event,
            Err(e) => {
                warn!("stdin line {}: not a security event: {}", line_no, e);
                continue;
            }
        };
        match core.submit_event(event) {
            Ok(outcome) if !outcome.alert_ids.is_empty() => info!(
                "Event {} raised {} alert(s)",
                outcome.event_id,
                outcome.alert_ids.len()
            ),
            Ok(_) => {}
            Err(e) => warn!("stdin line {}: rejected: {}", line_no, e),
        }
    }

    info!("stdin closed after {} line(s)", line_no);
    Ok(())
}
