//! Reporting and export — JSON and CSV artifact generation.
//!
//! - **JSON**: full scenario/soak reports with schema versioning
//! - **CSV**: final ranges per position and the per-step outcome tape
//!
//! All persisted reports include a `schema_version` field. Unknown versions
//! are rejected on load.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::audit::PositionSnapshot;
use crate::runner::{ScenarioReport, StepOutcome, SCHEMA_VERSION};
use crate::soak::SoakReport;

// ─── JSON export ────────────────────────────────────────────────────

/// Serialize a `ScenarioReport` to pretty JSON.
pub fn export_json(report: &ScenarioReport) -> Result<String> {
    serde_json::to_string_pretty(report).context("failed to serialize ScenarioReport to JSON")
}

/// Deserialize a `ScenarioReport` from JSON, rejecting unknown schema versions.
pub fn import_json(json: &str) -> Result<ScenarioReport> {
    let report: ScenarioReport =
        serde_json::from_str(json).context("failed to deserialize ScenarioReport from JSON")?;
    if report.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            report.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(report)
}

pub fn export_soak_json(report: &SoakReport) -> Result<String> {
    serde_json::to_string_pretty(report).context("failed to serialize SoakReport to JSON")
}

// ─── CSV export ─────────────────────────────────────────────────────

/// Export final ranges, one row per range.
///
/// Columns: position, owner, key, lower, upper, liquidity
pub fn export_ranges_csv(positions: &[PositionSnapshot]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["position", "owner", "key", "lower", "upper", "liquidity"])?;

    for p in positions {
        for r in &p.ranges {
            wtr.write_record([
                &p.id.0.to_string(),
                p.owner.as_deref().unwrap_or(""),
                p.key.as_deref().unwrap_or(""),
                &r.lower.to_string(),
                &r.upper.to_string(),
                &r.liquidity.to_string(),
            ])?;
        }
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Export the per-step outcome tape.
///
/// Columns: index, kind, caller, position, outcome, expected, passed, actions, applied
pub fn export_steps_csv(steps: &[StepOutcome]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "index", "kind", "caller", "position", "outcome", "expected", "passed", "actions",
        "applied",
    ])?;
    for s in steps {
        wtr.write_record([
            &s.index.to_string(),
            &s.kind,
            &s.caller,
            &s.position.map(|p| p.0.to_string()).unwrap_or_default(),
            &s.outcome,
            s.expected.as_deref().unwrap_or(""),
            &s.passed.to_string(),
            &s.actions.to_string(),
            &s.applied.to_string(),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Save the full artifact set for one scenario run.
///
/// Creates a directory named `{name}_{timestamp}/` under `output_dir`
/// containing:
/// - `report.json`: the full `ScenarioReport`
/// - `ranges.csv`: final ranges of every position
/// - `steps.csv`: per-step outcomes
///
/// Returns the path to the created directory.
pub fn save_artifacts(report: &ScenarioReport, output_dir: &Path) -> Result<PathBuf> {
    let dirname = format!(
        "{}_{}",
        report.name,
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    );
    let run_dir = output_dir.join(dirname);
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    std::fs::write(run_dir.join("report.json"), export_json(report)?)?;
    std::fs::write(run_dir.join("ranges.csv"), export_ranges_csv(&report.positions)?)?;
    std::fs::write(run_dir.join("steps.csv"), export_steps_csv(&report.steps)?)?;

    Ok(run_dir)
}

/// Load a `ScenarioReport` from an artifact directory's report.json.
pub fn load_artifacts(dir: &Path) -> Result<ScenarioReport> {
    let path = dir.join("report.json");
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    import_json(&json)
}

/// Save a soak report as `soak_{seed}_{timestamp}.json` under `output_dir`.
pub fn save_soak(report: &SoakReport, output_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create output dir: {}", output_dir.display()))?;
    let path = output_dir.join(format!(
        "soak_{}_{}.json",
        report.config.seed,
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    ));
    std::fs::write(&path, export_soak_json(report)?)?;
    Ok(path)
}
