use chrono::Timelike;
use once_cell::sync::Lazy;
use regex::{RegexSet, RegexSetBuilder};
use serde::{Deserialize, Serialize};

use super::SecurityEvent;

const LARGE_FILE_BYTES: f64 = 1_000_000.0;

static UNUSUAL_PATHS: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new([
        r"\.exe$",
        r"\.bat$",
        r"\.cmd$",
        r"\.scr$",
        r"\.pif$",
        r"\\windows\\",
        r"\\system32\\",
        r"/etc/",
        r"/bin/",
    ])
    .unwrap_or_else(|e| panic!("invalid unusual-path pattern: {}", e))
});

// Matched against the upper-cased query
static SQL_INJECTION: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new([
        r";\s*DROP",
        r";\s*DELETE",
        r";\s*UPDATE",
        r";\s*INSERT",
        r"UNION\s+SELECT",
        r"OR\s+\d+=\d+",
        r"--",
        r"/\*.*\*/",
        r";\s*EXEC",
    ])
    .unwrap_or_else(|e| panic!("invalid SQL pattern: {}", e))
});

static SCRIPT_INJECTION: Lazy<RegexSet> = Lazy::new(|| {
    RegexSetBuilder::new([
        r"<script[^>]*>.*?</script>",
        r"javascript:",
        r"vbscript:",
        r"on\w+\s*=",
        r"eval\s*\(",
        r"document\.cookie",
        r"window\.location",
    ])
    .case_insensitive(true)
    .build()
    .unwrap_or_else(|e| panic!("invalid script pattern: {}", e))
});

static HTML_INJECTION: Lazy<RegexSet> = Lazy::new(|| {
    RegexSetBuilder::new([
        r"<[^>]+>",
        r"&lt;[^&]+&gt;",
        r"<iframe[^>]*>",
        r"<object[^>]*>",
        r"<embed[^>]*>",
    ])
    .case_insensitive(true)
    .build()
    .unwrap_or_else(|e| panic!("invalid HTML pattern: {}", e))
});

/// Boolean predicates over a single event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Indicator {
    FailedLogin,
    SuccessfulLogin,
    UnauthorizedAccess,
    /// Admin panel or user management attempted and denied
    AdminFunctionAccess,
    LargeFileDownload,
    UnusualFileAccess,
    SuspiciousSqlPattern,
    DatabaseError,
    ScriptInjection,
    HtmlInjection,
    /// 02:00 to 05:59 UTC
    UnusualTimeAccess,
    RateLimitExceeded,
    UnusualLocation,
}

impl Indicator {
    pub fn matches(&self, e: &SecurityEvent) -> bool {
        let kind = e.event_type.as_str();
        let result = e.result.as_str();

        match self {
            Indicator::FailedLogin => kind == "authentication" && result == "failed",
            Indicator::SuccessfulLogin => kind == "authentication" && result == "success",
            Indicator::UnauthorizedAccess => kind == "access" && result == "denied",
            Indicator::AdminFunctionAccess => {
                matches!(e.action.as_str(), "admin_panel" | "user_management")
                    && result == "denied"
            }
            Indicator::LargeFileDownload => {
                kind == "file_access"
                    && e.metadata_f64("file_size").unwrap_or(0.0) > LARGE_FILE_BYTES
            }
            Indicator::UnusualFileAccess => {
                kind == "file_access" && UNUSUAL_PATHS.is_match(&e.resource.to_lowercase())
            }
            Indicator::SuspiciousSqlPattern => e
                .metadata_text("query")
                .is_some_and(|q| SQL_INJECTION.is_match(&q.to_uppercase())),
            Indicator::DatabaseError => kind == "database" && result == "error",
            Indicator::ScriptInjection => e
                .metadata_text("input_data")
                .is_some_and(|d| SCRIPT_INJECTION.is_match(&d)),
            Indicator::HtmlInjection => e
                .metadata_text("input_data")
                .is_some_and(|d| HTML_INJECTION.is_match(&d)),
            Indicator::UnusualTimeAccess => (2..=5).contains(&e.timestamp.hour()),
            Indicator::RateLimitExceeded => kind == "rate_limit" && result == "exceeded",
            Indicator::UnusualLocation => e.metadata_flag("unusual_location"),
        }
    }
}
