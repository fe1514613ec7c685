use std::fs;
use std::path::Path;

use super::{AuditEvent, ComplianceError};

pub const CSV_HEADERS: [&str; 9] = [
    "event_id",
    "timestamp",
    "user_id",
    "action",
    "resource",
    "result",
    "category",
    "risk_level",
    "details",
];

/// Write `events` to `path` as CSV with [`CSV_HEADERS`]. Returns the row count.
pub(crate) fn write_csv<'a>(
    path: &Path,
    events: impl IntoIterator<Item = &'a AuditEvent>,
) -> Result<usize, ComplianceError> {
    let context = || format!("Failed to export audit CSV to {}", path.display());

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| ComplianceError::io(context(), e))?;
    }

    let mut writer = csv::Writer::from_path(path).map_err(|e| ComplianceError::io(context(), e))?;
    writer
        .write_record(CSV_HEADERS)
        .map_err(|e| ComplianceError::io(context(), e))?;

    let mut rows = 0;
    for event in events {
        let timestamp = event.timestamp.to_rfc3339();
        let details = event.details.to_string();
        writer
            .write_record([
                event.event_id.as_str(),
                timestamp.as_str(),
                event.user_id.as_deref().unwrap_or(""),
                event.action.as_str(),
                event.resource.as_str(),
                event.result.as_str(),
                event.category.as_str(),
                event.risk_level.as_str(),
                details.as_str(),
            ])
            .map_err(|e| ComplianceError::io(context(), e))?;
        rows += 1;
    }

    writer.flush().map_err(|e| ComplianceError::io(context(), e))?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compliance::{AuditRecord, AuditTrail, RiskLevel};
    use serde_json::json;

    #[test]
    fn writes_header_and_quoted_details() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("exports").join("audit.csv");

        let trail = AuditTrail::in_memory();
        trail
            .append(
                AuditRecord::new("data_export", "/reports, q3", "success", "data_protection")
                    .user("alice")
                    .risk(RiskLevel::Medium)
                    .details(json!({"rows": 12, "format": "csv"})),
            )
            .unwrap();
        trail
            .append(AuditRecord::new("login", "/session", "failed", "access_control"))
            .unwrap();

        let events = trail.events();
        assert_eq!(write_csv(&path, &events).unwrap(), 2);

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(headers, CSV_HEADERS);

        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][2], "alice");
        assert_eq!(&rows[0][4], "/reports, q3");
        assert_eq!(&rows[0][7], "medium");
        assert_eq!(&rows[0][8], r#"{"format":"csv","rows":12}"#);
        assert_eq!(&rows[1][2], "");
    }
}
