//! switchboard - シナリオ実行 CLI
//!
//! Loads configuration, builds a router, plays a scenario against it and
//! prints the final status as JSON on stdout.

mod scenario;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use serde::Serialize;
use switchboard_core::app::BuildError;
use switchboard_core::domain::{AgentView, TaskView};
use switchboard_core::observability::{LoggingError, init_logging};
use switchboard_core::{ConfigError, RouterBuilder, RouterStatus, SwitchboardConfig};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::scenario::{Scenario, ScenarioError, ScenarioRunner};

const DEMO_SCENARIO: &str = include_str!("../../../demos/support-desk.toml");

#[derive(Parser)]
#[command(name = "switchboard")]
#[command(about = "Task-to-agent routing engine")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "SWITCHBOARD_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play a scenario file against a fresh router
    Run {
        /// Scenario file (TOML)
        #[arg(value_name = "SCENARIO")]
        scenario: PathBuf,
    },
    /// Play the built-in support desk scenario
    Demo,
    /// Validate configuration
    Config {
        /// Print the effective configuration
        #[arg(long)]
        show: bool,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Logging(#[from] LoggingError),
    #[error("invalid router setup: {0}")]
    Build(#[from] BuildError),
    #[error(transparent)]
    Scenario(#[from] ScenarioError),
    #[error("failed to render output: {0}")]
    Output(String),
    #[error("router is inconsistent after the run ({0} violations)")]
    Inconsistent(usize),
}

/// Printed on stdout after a run.
#[derive(Serialize)]
struct RunReport {
    scenario: String,
    steps: usize,
    status: RouterStatus,
    agents: Vec<AgentView>,
    tasks: Vec<TaskView>,
    violations: Vec<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!("command failed: {e}");
        eprintln!("error: {e}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = match &cli.config {
        Some(path) => SwitchboardConfig::load_from_file(path)?,
        None => SwitchboardConfig::default(),
    };
    init_logging(&config.logging)?;

    match cli.command {
        Commands::Run { scenario } => {
            info!(path = %scenario.display(), "loading scenario");
            let scenario = Scenario::load_from_file(&scenario)?;
            play(&config, &scenario).await
        }
        Commands::Demo => play(&config, &Scenario::from_toml_str(DEMO_SCENARIO)?).await,
        Commands::Config { show } => {
            info!(router = %config.router.name, "configuration is valid");
            if show {
                let rendered =
                    toml::to_string_pretty(&config).map_err(|e| CliError::Output(e.to_string()))?;
                println!("{rendered}");
            }
            Ok(())
        }
    }
}

async fn play(config: &SwitchboardConfig, scenario: &Scenario) -> Result<(), CliError> {
    let app = RouterBuilder::from_config(config).build()?;
    let mut runner = ScenarioRunner::new(app.router, app.publisher);
    let steps = runner.run(scenario).await?;

    let router = runner.router();
    let report = RunReport {
        scenario: scenario.name.clone().unwrap_or_else(|| "unnamed".to_string()),
        steps,
        status: router.status().await,
        agents: router.list_agents().await,
        tasks: router.list_tasks().await,
        violations: router.audit().await,
    };
    let rendered =
        serde_json::to_string_pretty(&report).map_err(|e| CliError::Output(e.to_string()))?;
    println!("{rendered}");

    if report.violations.is_empty() {
        info!(steps, "scenario completed");
        Ok(())
    } else {
        for violation in &report.violations {
            warn!(%violation, "invariant violated");
        }
        Err(CliError::Inconsistent(report.violations.len()))
    }
}
