use anyhow::Result;
use serde::Serialize;

use super::{open_core, print_json};
use crate::alerting::DashboardSnapshot;
use crate::breaker::BreakerStatus;
use crate::detection::ThreatIntelligence;

#[derive(Serialize)]
struct Overview {
    dashboard: DashboardSnapshot,
    breakers: Vec<BreakerStatus>,
    threats: ThreatIntelligence,
}

pub fn run(json: bool) -> Result<()> {
    let core = open_core()?;
    let overview = Overview {
        dashboard: core.dashboard_snapshot(),
        breakers: core.breakers().status(),
        threats: core.detection().intelligence(),
    };
    if json {
        return print_json(&overview);
    }

    let d = &overview.dashboard;
    println!("Security Dashboard");
    println!("------------------");
    println!(
        "Score:          {} ({:?})",
        d.security_score.score, d.security_score.level
    );
    println!("Active alerts:  {}", d.active_alerts);
    println!("Alerts today:   {}", d.total_today);
    println!(
        "Monitoring:     {}",
        if d.monitoring_active { "running" } else { "stopped" }
    );
    for (severity, count) in &d.by_severity {
        println!("  {:<9} {}", severity.as_str(), count);
    }
    if !d.recent.is_empty() {
        println!("\nRecent alerts:");
        for a in &d.recent {
            println!(
                "  {}  {:<8} {:<24} {}",
                a.timestamp.format("%H:%M:%S"),
                a.severity.as_str(),
                a.alert_type.as_str(),
                a.title
            );
        }
    }

    println!("\nCircuit breakers:");
    for b in &overview.breakers {
        println!(
            "  {:<12} {:<9} ({} calls, {} failures)",
            b.name, b.state, b.metrics.total_requests, b.metrics.failed_requests
        );
    }

    let t = &overview.threats;
    println!(
        "\nThreats: {} buffered events, {} detections, most active: {}",
        t.buffered_events,
        t.total_occurrences,
        t.most_active_pattern.as_deref().unwrap_or("-")
    );

    if !d.recommendations.is_empty() {
        println!("\nRecommendations:");
        for r in &d.recommendations {
            println!("  - {}", r);
        }
    }
    Ok(())
}
