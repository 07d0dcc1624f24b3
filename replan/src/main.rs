/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use replan::config::{PlannerConfig, Scenario};
use replan::plan::ReconfigurationPlan;
use replan::scheduler::{ProblemBuilder, SchedulerError};

// ── CLI argument definition ───────────────────────────────────────────────────

/// Replan datacenter reconfiguration planner.
///
/// Example:
///   replan --scenario scenario.yaml --params params.yaml --time-limit 10
#[derive(Debug, Parser)]
#[command(
    name = "replan",
    about = "Replan – plans VM and node reconfigurations",
    long_about = None,
)]
struct Cli {
    /// Path to the YAML scenario (nodes, VMs, target states).
    #[arg(short = 's', long = "scenario")]
    scenario: PathBuf,

    /// Path to the YAML planner parameters.
    #[arg(short = 'p', long = "params")]
    params: Option<PathBuf>,

    /// Search budget in seconds, overriding the parameter file (0 = unbounded).
    #[arg(short = 't', long = "time-limit")]
    time_limit: Option<f64>,

    /// Stop at the first plan instead of minimising its duration.
    #[arg(long = "no-optimize", default_value_t = false)]
    no_optimize: bool,

    /// Print the plan as YAML instead of one action per line.
    #[arg(long = "yaml", default_value_t = false)]
    yaml: bool,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Level is controlled by the RUST_LOG env-var (e.g. RUST_LOG=debug).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    info!(
        scenario    = %cli.scenario.display(),
        params      = ?cli.params,
        time_limit  = ?cli.time_limit,
        no_optimize = cli.no_optimize,
        "Replan starting up"
    );

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let scenario = Scenario::load_from_file(&cli.scenario)?;

    let mut cfg = match &cli.params {
        Some(path) => PlannerConfig::load_from_file(path)?,
        None => {
            warn!("No parameter file provided, using default planner settings");
            PlannerConfig::default()
        }
    };
    if let Some(secs) = cli.time_limit {
        cfg.time_limit_secs = secs;
    }
    if cli.no_optimize {
        cfg.optimize = false;
    }
    cfg.validate().context("Invalid planner settings")?;

    // the search is CPU-bound; keep it off the runtime threads
    let outcome = tokio::task::spawn_blocking(move || plan(&scenario, &cfg))
        .await
        .context("Planner task failed")?;

    match outcome {
        Ok(plan) => print_plan(&plan, cli.yaml),
        Err(SchedulerError::Materialization { failures, partial }) => {
            warn!(actions = partial.len(), "Printing the partial plan");
            print_plan(&partial, cli.yaml)?;
            Err(SchedulerError::Materialization { failures, partial }.into())
        }
        Err(e) => Err(e.into()),
    }
}

fn plan(scenario: &Scenario, cfg: &PlannerConfig) -> Result<ReconfigurationPlan, SchedulerError> {
    ProblemBuilder::new(&scenario.infrastructure)
        .with_config(cfg)
        .with_targets(scenario.targets.clone())
        .with_unmanageable(scenario.unmanageable.iter().copied())
        .build()?
        .solve()
}

fn print_plan(plan: &ReconfigurationPlan, yaml: bool) -> Result<()> {
    if yaml {
        let out = serde_yaml::to_string(plan).context("Failed to serialise the plan")?;
        print!("{out}");
    } else {
        print!("{plan}");
    }
    info!(
        actions = plan.len(),
        duration = plan.duration(),
        "Plan printed"
    );
    Ok(())
}
