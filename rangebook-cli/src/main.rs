//! Rangebook CLI — scenario replay, validation, soak and rebalance preview.
//!
//! Commands:
//! - `run` — replay a TOML scenario and save its artifacts
//! - `check` — load and validate a scenario without running it
//! - `soak` — seeded randomized run with fault injection and invariant audits
//! - `plan-rebalance` — print the action list a rebalance would produce

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use rangebook_core::rebalance::RebalancePlan;
use rangebook_core::{PositionId, RangeStore, RebalanceEngine, RebalanceParams};
use rangebook_runner::{
    run_scenario, run_soak, save_artifacts, save_soak, ScenarioConfig, ScenarioReport,
    SoakConfig, SoakReport,
};

#[derive(Parser)]
#[command(
    name = "rangebook",
    about = "Rangebook CLI — per-position liquidity ranges with atomic settlement"
)]
struct Cli {
    /// Log filter when RUST_LOG is unset (e.g. info, rangebook_core=debug).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Log format: pretty or json.
    #[arg(long, global = true, default_value = "pretty")]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a scenario file and save its report, ranges and step tape.
    Run {
        /// Path to a TOML scenario file.
        #[arg(long)]
        config: PathBuf,

        /// Output directory for artifacts.
        #[arg(long, visible_alias = "output", default_value = "results")]
        output_dir: PathBuf,

        /// Print the summary only; write no artifacts.
        #[arg(long, default_value_t = false)]
        no_save: bool,
    },
    /// Load and validate a scenario file.
    Check {
        /// Path to a TOML scenario file.
        #[arg(long)]
        config: PathBuf,
    },
    /// Randomized run with injected faults; fails on any invariant violation.
    Soak {
        #[arg(long, default_value_t = 42)]
        seed: u64,

        #[arg(long, default_value_t = 1_000)]
        steps: usize,

        /// Upper bound on the number of positions opened.
        #[arg(long, default_value_t = 8)]
        positions: usize,

        /// Probability that a step runs with an injected apply fault.
        #[arg(long, default_value_t = 0.1)]
        fault_rate: f64,

        /// Save the soak report as JSON into this directory.
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Print the actions a rebalance would produce for a set of ranges.
    PlanRebalance {
        /// Reference point the bands are centred on.
        #[arg(long, allow_hyphen_values = true)]
        reference: i32,

        /// Half-width of the inner band.
        #[arg(long, default_value_t = 500)]
        window: i32,

        /// Share of total liquidity placed in the inner band.
        #[arg(long, default_value_t = 80)]
        inner_percent: u8,

        /// Stored ranges as LOWER:UPPER:LIQUIDITY (repeatable).
        #[arg(long = "range", value_parser = parse_range, allow_hyphen_values = true)]
        ranges: Vec<(i32, i32, i128)>,

        /// Print the plan as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, &cli.log_format);

    match cli.command {
        Commands::Run {
            config,
            output_dir,
            no_save,
        } => run_cmd(config, output_dir, no_save),
        Commands::Check { config } => check_cmd(config),
        Commands::Soak {
            seed,
            steps,
            positions,
            fault_rate,
            output_dir,
        } => soak_cmd(
            SoakConfig {
                seed,
                steps,
                positions,
                fault_rate,
                params: RebalanceParams::default(),
            },
            output_dir,
        ),
        Commands::PlanRebalance {
            reference,
            window,
            inner_percent,
            ranges,
            json,
        } => plan_rebalance_cmd(
            reference,
            RebalanceParams {
                inner_percent,
                window,
            },
            &ranges,
            json,
        ),
    }
}

/// Initialize the tracing subscriber; RUST_LOG wins over `level`.
fn init_logging(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
        _ => {
            fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

fn run_cmd(config_path: PathBuf, output_dir: PathBuf, no_save: bool) -> Result<()> {
    let config = ScenarioConfig::from_file(&config_path)?;
    info!(path = %config_path.display(), name = %config.name, "loaded scenario");

    let report = run_scenario(&config)?;
    print_scenario_summary(&report);

    if !no_save {
        let run_dir = save_artifacts(&report, &output_dir)?;
        println!("Artifacts saved to: {}", run_dir.display());
    }

    if !report.passed() {
        std::process::exit(1);
    }
    Ok(())
}

fn check_cmd(config_path: PathBuf) -> Result<()> {
    let config = ScenarioConfig::from_file(&config_path)?;
    let hash = config.fingerprint()?;
    println!(
        "{}: {} pools, {} steps, hash {}",
        config.name,
        config.pools.len(),
        config.steps.len(),
        short_hash(&hash)
    );
    Ok(())
}

fn soak_cmd(config: SoakConfig, output_dir: Option<PathBuf>) -> Result<()> {
    let report = run_soak(&config)?;
    print_soak_summary(&report);

    if let Some(dir) = output_dir {
        let path = save_soak(&report, &dir)?;
        println!("Report saved to: {}", path.display());
    }

    if !report.passed() {
        std::process::exit(1);
    }
    Ok(())
}

fn plan_rebalance_cmd(
    reference: i32,
    params: RebalanceParams,
    ranges: &[(i32, i32, i128)],
    json: bool,
) -> Result<()> {
    let engine = RebalanceEngine::new(params)?;
    let mut store = RangeStore::new();
    for &(lower, upper, liquidity) in ranges {
        store
            .upsert(lower, upper, liquidity)
            .with_context(|| format!("invalid range {lower}:{upper}:{liquidity}"))?;
    }

    let plan = engine.plan(PositionId(1), &mut store, reference)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&plan.actions)?);
    } else {
        print_plan(&plan, &store);
    }
    Ok(())
}

/// First 16 characters of a hex hash, or all of it if shorter.
fn short_hash(hash: &str) -> &str {
    hash.get(..16).unwrap_or(hash)
}

/// Parse `LOWER:UPPER:LIQUIDITY`.
fn parse_range(s: &str) -> Result<(i32, i32, i128), String> {
    let parts: Vec<&str> = s.split(':').collect();
    let [lower, upper, liquidity] = parts.as_slice() else {
        return Err(format!("expected LOWER:UPPER:LIQUIDITY, got '{s}'"));
    };
    let lower = lower.parse::<i32>().map_err(|e| format!("bad lower '{lower}': {e}"))?;
    let upper = upper.parse::<i32>().map_err(|e| format!("bad upper '{upper}': {e}"))?;
    let liquidity = liquidity
        .parse::<i128>()
        .map_err(|e| format!("bad liquidity '{liquidity}': {e}"))?;
    if liquidity <= 0 {
        return Err(format!("liquidity must be positive, got {liquidity}"));
    }
    Ok((lower, upper, liquidity))
}

// ── Output ──

fn print_scenario_summary(report: &ScenarioReport) {
    println!();
    println!("=== Scenario: {} ===", report.name);
    println!("Hash:       {}", short_hash(&report.scenario_hash));
    println!("Steps:      {}", report.steps.len());
    println!("Positions:  {}", report.positions.len());
    println!("Sessions:   {}", report.sessions);
    println!("Applies:    {}", report.journal_len);
    println!();
    println!(
        "{:>4} {:<10} {:<10} {:>8} {:<28} {:>7}",
        "#", "Kind", "Caller", "Position", "Outcome", "Applied"
    );
    println!("{}", "-".repeat(72));
    for s in &report.steps {
        let mark = if s.passed { "" } else { " !" };
        println!(
            "{:>4} {:<10} {:<10} {:>8} {:<28} {:>7}{mark}",
            s.index,
            s.kind,
            s.caller,
            s.position.map(|p| p.to_string()).unwrap_or_else(|| "-".into()),
            s.outcome,
            s.applied,
        );
    }

    println!();
    for p in &report.positions {
        println!(
            "Position {} ({}) on {}: {} ranges, total {}",
            p.id,
            p.owner.as_deref().unwrap_or("?"),
            p.key.as_deref().unwrap_or("unbound"),
            p.ranges.len(),
            p.total_liquidity
                .map(|t| t.to_string())
                .unwrap_or_else(|| "overflow".into())
        );
        for r in &p.ranges {
            println!("  [{}, {}) {}", r.lower, r.upper, r.liquidity);
        }
    }
    print_violations(&report.violations);
}

fn print_soak_summary(report: &SoakReport) {
    println!();
    println!("=== Soak: seed {} ===", report.config.seed);
    println!("Steps:      {}", report.config.steps);
    println!("Committed:  {}", report.committed);
    println!("Failed:     {}", report.failed);
    println!("Faults:     {}", report.faults_injected);
    println!("Positions:  {}", report.positions.len());
    println!();
    for (kind, count) in &report.outcomes {
        println!("  {kind:<28} {count:>6}");
    }
    print_violations(&report.violations);
}

fn print_plan(plan: &RebalancePlan, store: &RangeStore) {
    println!("Total redistributed: {}", plan.total);
    if let Some(split) = plan.split {
        println!(
            "Split: inner {} / left {} / right {}",
            split.inner, split.left, split.right
        );
    }
    println!();
    for action in &plan.actions {
        println!("  {action}");
    }
    println!();
    println!("Resulting ranges:");
    for r in store.iter() {
        println!("  [{}, {}) {}", r.lower, r.upper, r.liquidity);
    }
}

fn print_violations(violations: &[String]) {
    println!();
    if violations.is_empty() {
        println!("Violations: none");
    } else {
        println!("Violations: {}", violations.len());
        for v in violations {
            println!("  {v}");
        }
    }
}
