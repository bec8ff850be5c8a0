//! Sweep report for boundary contexts
//!
//! Emitted whenever a context's pin arena is swept, controlled by the
//! `TETHER_REPORT` env var:
//! - Unset / `0` → no report
//! - `1` → human-readable to stderr
//! - `json` → JSON to stderr
//! - `json:/path` → JSON to file

use serde::Serialize;
use std::io::Write;
use std::sync::OnceLock;
use tether_core::{ArenaStats, SweepSummary};

/// Env var read once per process
pub const REPORT_ENV: &str = "TETHER_REPORT";

// =============================================================================
// Report Configuration
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportFormat {
    Human,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportDestination {
    Stderr,
    File(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportConfig {
    pub format: ReportFormat,
    pub destination: ReportDestination,
}

impl ReportConfig {
    /// Parse from the `TETHER_REPORT` environment variable
    pub fn from_env() -> Option<Self> {
        let val = std::env::var(REPORT_ENV).ok()?;
        Self::parse(&val)
    }

    /// Parse a setting; unrecognized values are ignored with a warning
    pub fn parse(val: &str) -> Option<Self> {
        match val {
            "" | "0" => None,
            "1" => Some(ReportConfig {
                format: ReportFormat::Human,
                destination: ReportDestination::Stderr,
            }),
            "json" => Some(ReportConfig {
                format: ReportFormat::Json,
                destination: ReportDestination::Stderr,
            }),
            s if s.starts_with("json:") => Some(ReportConfig {
                format: ReportFormat::Json,
                destination: ReportDestination::File(s[5..].to_string()),
            }),
            _ => {
                tracing::warn!(value = val, "{} not recognized, ignoring", REPORT_ENV);
                None
            }
        }
    }
}

static REPORT_CONFIG: OnceLock<Option<ReportConfig>> = OnceLock::new();

fn report_config() -> &'static Option<ReportConfig> {
    REPORT_CONFIG.get_or_init(ReportConfig::from_env)
}

// =============================================================================
// Report Data
// =============================================================================

/// What triggered a sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepTrigger {
    /// `Context::shutdown`
    Shutdown,
    /// A context dropped without an explicit shutdown
    Drop,
    /// The process exit hook
    ProcessExit,
}

impl SweepTrigger {
    pub fn as_str(self) -> &'static str {
        match self {
            SweepTrigger::Shutdown => "shutdown",
            SweepTrigger::Drop => "drop",
            SweepTrigger::ProcessExit => "process exit",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    pub trigger: SweepTrigger,
    pub summary: SweepSummary,
    pub stats: ArenaStats,
}

// =============================================================================
// Formatting
// =============================================================================

pub fn format_human(report: &SweepReport) -> String {
    let stats = &report.stats;
    let reclaimed = &report.summary.reclaimed;
    let mut out = String::new();
    out.push_str("=== TETHER REPORT ===\n");
    out.push_str(&format!("Trigger:         {}\n", report.trigger.as_str()));
    out.push_str(&format!("Objects pinned:  {}\n", stats.pinned_total));
    out.push_str(&format!("  internal:        {}\n", stats.by_origin.internal));
    out.push_str(&format!("  boundary-new:    {}\n", stats.by_origin.boundary_new));
    out.push_str(&format!(
        "  boundary-lookup: {}\n",
        stats.by_origin.boundary_lookup
    ));
    out.push_str(&format!("Released:        {}\n", stats.released_explicitly));
    out.push_str(&format!("Swept (leaked):  {}\n", report.summary.total()));
    out.push_str(&format!("  internal:        {}\n", reclaimed.internal));
    out.push_str(&format!("  boundary-new:    {}\n", reclaimed.boundary_new));
    out.push_str(&format!("  boundary-lookup: {}\n", reclaimed.boundary_lookup));
    out.push_str("=====================\n");
    out
}

pub fn format_json(report: &SweepReport) -> String {
    serde_json::to_string(report).unwrap_or_else(|_| "{}".to_string())
}

// =============================================================================
// Emit
// =============================================================================

/// Write `report` according to `TETHER_REPORT`; no-op when unset
pub fn emit(report: &SweepReport) {
    if let Some(config) = report_config() {
        emit_with(config, report);
    }
}

pub fn emit_with(config: &ReportConfig, report: &SweepReport) {
    let output = match config.format {
        ReportFormat::Human => format_human(report),
        ReportFormat::Json => {
            let mut line = format_json(report);
            line.push('\n');
            line
        }
    };

    match &config.destination {
        ReportDestination::Stderr => {
            let _ = std::io::stderr().write_all(output.as_bytes());
        }
        ReportDestination::File(path) => {
            if let Ok(mut f) = std::fs::File::create(path) {
                let _ = f.write_all(output.as_bytes());
            } else {
                tracing::warn!(path = %path, "could not write report, using stderr");
                let _ = std::io::stderr().write_all(output.as_bytes());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_core::{Origin, PinArena, Value};

    fn sample() -> SweepReport {
        let mut arena = PinArena::new();
        let a = arena.pin(Value::int(1), Origin::BoundaryNew).unwrap();
        arena.pin(Value::int(2), Origin::BoundaryLookup).unwrap();
        arena.release(a);
        let summary = arena.finalize();
        SweepReport {
            trigger: SweepTrigger::Shutdown,
            summary,
            stats: arena.stats(),
        }
    }

    #[test]
    fn test_config_parse_variants() {
        assert_eq!(ReportConfig::parse(""), None);
        assert_eq!(ReportConfig::parse("0"), None);
        assert_eq!(
            ReportConfig::parse("1"),
            Some(ReportConfig {
                format: ReportFormat::Human,
                destination: ReportDestination::Stderr,
            })
        );
        assert_eq!(
            ReportConfig::parse("json"),
            Some(ReportConfig {
                format: ReportFormat::Json,
                destination: ReportDestination::Stderr,
            })
        );
        assert_eq!(
            ReportConfig::parse("json:/tmp/sweep.json"),
            Some(ReportConfig {
                format: ReportFormat::Json,
                destination: ReportDestination::File("/tmp/sweep.json".to_string()),
            })
        );
        assert_eq!(ReportConfig::parse("verbose"), None);
    }

    #[test]
    fn test_format_human() {
        let text = format_human(&sample());
        assert!(text.starts_with("=== TETHER REPORT ==="));
        assert!(text.contains("Objects pinned:  2"));
        assert!(text.contains("Released:        1"));
        assert!(text.contains("Swept (leaked):  1"));
    }

    #[test]
    fn test_format_json() {
        let json: serde_json::Value = serde_json::from_str(&format_json(&sample())).unwrap();
        assert_eq!(json["trigger"], "shutdown");
        assert_eq!(json["stats"]["pinned_total"], 2);
        assert_eq!(json["summary"]["reclaimed"]["boundary_lookup"], 1);
    }

    #[test]
    fn test_drop_trigger_named_in_json() {
        let report = SweepReport {
            trigger: SweepTrigger::Drop,
            ..sample()
        };
        let json: serde_json::Value = serde_json::from_str(&format_json(&report)).unwrap();
        assert_eq!(json["trigger"], "drop");
        assert_eq!(SweepTrigger::Drop.as_str(), "drop");
    }

    #[test]
    fn test_emit_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let config = ReportConfig {
            format: ReportFormat::Json,
            destination: ReportDestination::File(path.to_string_lossy().into_owned()),
        };
        emit_with(&config, &sample());
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("\"trigger\":\"shutdown\""));
    }
}
