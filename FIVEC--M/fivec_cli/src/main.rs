use std::{
    fs,
    io::{self, Read},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use fivec_capacity::{
    rank_frontier, CapacityRuntime, Criterion, McdaOption, RouteOptions, SignalReading,
};
use serde::{Deserialize, Serialize};
use tokio::runtime::Runtime;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "fivec", version, about = "5C capacity decision, task, and routing pipeline")]
struct Cli {
    /// Capacity config (TOML); defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Enables debug tracing on stderr.
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Computes the decision for a reading.
    Decide {
        /// Reading JSON file, or `-` for stdin.
        reading: PathBuf,
    },
    /// Composes tasks for a reading.
    Tasks {
        /// Reading JSON file, or `-` for stdin.
        reading: PathBuf,
        /// Expands only this playbook instead of every matching one.
        #[arg(long)]
        playbook: Option<String>,
    },
    /// Routes a reading to a workspace screen.
    Route {
        /// Reading JSON file, or `-` for stdin.
        reading: PathBuf,
        #[command(flatten)]
        route: RouteArgs,
    },
    /// Runs decide, compose, persist, and route in one go.
    Process {
        /// Reading JSON file, or `-` for stdin.
        reading: PathBuf,
        #[command(flatten)]
        route: RouteArgs,
    },
    /// Lists playbooks, optionally only those keyed to a loop.
    Playbooks {
        /// Loop code filter.
        #[arg(long = "loop")]
        loop_code: Option<String>,
    },
    /// Ranks the Pareto frontier of an options file.
    Frontier {
        /// JSON file with `criteria` and `options`, or `-` for stdin.
        input: PathBuf,
    },
}

#[derive(clap::Args, Debug, Default)]
struct RouteArgs {
    /// Forces this capacity instead of the decision's primary.
    #[arg(long = "override")]
    override_primary: Option<String>,
    /// Bypasses the cooldown.
    #[arg(long)]
    life_safety: bool,
    /// Milliseconds since the last automatic route.
    #[arg(long)]
    last_route_ms_ago: Option<i64>,
    /// Cooldown to respect, in milliseconds.
    #[arg(long)]
    cooldown_ms: Option<u64>,
}

impl RouteArgs {
    fn options(&self) -> Result<RouteOptions> {
        let last_auto_route_at = match self.last_route_ms_ago {
            Some(ago) => Some(
                Duration::try_milliseconds(ago)
                    .and_then(|ago| Utc::now().checked_sub_signed(ago))
                    .context("--last-route-ms-ago out of range")?,
            ),
            None => None,
        };
        let mut options = RouteOptions {
            last_auto_route_at,
            respect_cooldown_ms: self.cooldown_ms,
            life_safety: self.life_safety,
            ..RouteOptions::default()
        };
        if let Some(raw) = &self.override_primary {
            options = options.with_override_str(raw)?;
        }
        Ok(options)
    }
}

#[derive(Debug, Deserialize)]
struct FrontierInput {
    criteria: Vec<Criterion>,
    options: Vec<McdaOption>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PlaybookSummary<'a> {
    id: &'a str,
    name: &'a str,
    loops: &'a [String],
    actions: usize,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let runtime = CapacityRuntime::bootstrap(cli.config.as_deref())?;
    match cli.command {
        Commands::Decide { reading } => {
            let decision = runtime.decide(&load_reading(&reading)?)?;
            print_json(&decision)
        }
        Commands::Tasks { reading, playbook } => {
            let decision = runtime.decide(&load_reading(&reading)?)?;
            let tasks = runtime.compose(&decision, playbook.as_deref())?;
            print_json(&tasks)
        }
        Commands::Route { reading, route } => {
            let decision = runtime.decide(&load_reading(&reading)?)?;
            let result = runtime.route(&decision, &route.options()?)?;
            if result.is_none() {
                eprintln!("route suppressed by cooldown");
            }
            print_json(&result)
        }
        Commands::Process { reading, route } => {
            let reading = load_reading(&reading)?;
            let options = route.options()?;
            let outcome = Runtime::new()?.block_on(runtime.process(&reading, &options))?;
            print_json(&outcome)
        }
        Commands::Playbooks { loop_code } => {
            let summaries: Vec<_> = runtime
                .playbooks()
                .iter()
                .filter(|pb| loop_code.as_deref().map_or(true, |code| pb.covers_loop(code)))
                .map(|pb| PlaybookSummary {
                    id: &pb.id,
                    name: &pb.name,
                    loops: &pb.loops,
                    actions: pb.actions.len(),
                })
                .collect();
            print_json(&summaries)
        }
        Commands::Frontier { input } => {
            let raw = read_input(&input)?;
            let input: FrontierInput =
                serde_json::from_str(&raw).context("parsing frontier input")?;
            print_json(&rank_frontier(&input.options, &input.criteria)?)
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "fivec_capacity=debug,info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut raw = String::new();
        io::stdin()
            .read_to_string(&mut raw)
            .context("reading stdin")?;
        Ok(raw)
    } else {
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
    }
}

fn load_reading(path: &Path) -> Result<SignalReading> {
    Ok(SignalReading::from_json(&read_input(path)?)?)
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
