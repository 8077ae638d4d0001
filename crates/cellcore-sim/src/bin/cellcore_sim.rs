//! Cellcore scenario runner
//!
//! Replays a TOML scenario against the capability coordinator and the
//! network display controllers on a simulated clock, then prints what
//! subscribers and the status bar would have seen.

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cellcore_sim::{Scenario, ScenarioReport, run_scenario};

/// Deterministic telephony scenario runner.
#[derive(Parser, Debug)]
#[command(name = "cellcore-sim", about = "Replay a cellcore telephony scenario")]
struct Cli {
    /// Scenario file (TOML).
    #[arg(long)]
    scenario: PathBuf,

    /// Override the scenario's fault-injection seed.
    #[arg(long)]
    seed: Option<u64>,

    /// Print the full report as JSON instead of a summary.
    #[arg(long, default_value_t = false)]
    json: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let scenario = Scenario::load(&cli.scenario)?;
    tracing::info!(path = %cli.scenario.display(), name = %scenario.name, "scenario loaded");

    let report = run_scenario(&scenario, cli.seed)?;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }
    Ok(())
}

fn print_summary(report: &ScenarioReport) {
    println!(
        "scenario {:?} (seed {}, {} ms simulated)",
        report.name, report.seed, report.duration_ms
    );
    println!(
        "  {} capability requests, {} rejected set_capability calls, {} unknown event codes",
        report.requests.len(),
        report.rejected_requests,
        report.unknown_codes
    );
    for b in &report.broadcasts {
        println!("  [{:>8} ms] {:?}", b.at_ms, b.result);
    }
    for (id, phone) in report.phones.iter().enumerate() {
        println!("  phone {id}: {} on {}", phone.raf, phone.logical_modem_id);
    }
    for u in &report.display_timeline {
        println!(
            "  [{:>8} ms] phone {} display {}",
            u.at_ms, u.phone_id, u.override_network_type
        );
    }
    for d in &report.displays {
        println!(
            "  phone {}: state {} showing {}",
            d.phone_id, d.state, d.override_network_type
        );
    }
}
