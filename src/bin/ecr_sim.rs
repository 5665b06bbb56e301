//! `ecr-sim`: loads a node manifest and a packet schedule, runs the engine
//! to completion (or a tick budget), and writes the telemetry streams to
//! `--out-dir` as newline-delimited JSON.

use std::path::PathBuf;

use clap::Parser;
use ecr_core::config::Constants;
use ecr_core::engine::Engine;
use ecr_core::manifest::{parse_node_manifest, parse_packet_manifest};
use ecr_core::telemetry::JsonlTelemetry;

#[derive(Parser, Debug)]
#[command(name = "ecr-sim", about = "Energy-Constrained Routing mesh simulator")]
struct Args {
    /// Path to the node manifest (names, positions, battery, links).
    #[arg(long)]
    nodes: PathBuf,

    /// Path to the packet schedule (scheduled sends).
    #[arg(long)]
    packets: PathBuf,

    /// Maximum number of ticks to run before stopping unconditionally.
    #[arg(long, default_value_t = 10_000)]
    ticks: u64,

    /// Override a tunable, e.g. `--constant gamma=0.9`. May be repeated.
    #[arg(long = "constant", value_parser = parse_constant_override)]
    constants: Vec<(String, f64)>,

    /// Directory telemetry streams are written into.
    #[arg(long, default_value = "ecr-out")]
    out_dir: PathBuf,
}

fn parse_constant_override(raw: &str) -> Result<(String, f64), String> {
    let (name, value) = raw.split_once('=').ok_or_else(|| format!("expected name=value, got '{raw}'"))?;
    let value: f64 = value.parse().map_err(|_| format!("'{value}' is not a number"))?;
    Ok((name.to_string(), value))
}

fn main() {
    #[cfg(feature = "cli-logging")]
    pretty_env_logger::init();

    let args = Args::parse();

    if let Err(err) = run(args) {
        log::error!("{err}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let nodes_text = std::fs::read_to_string(&args.nodes)?;
    let packets_text = std::fs::read_to_string(&args.packets)?;

    let topology = parse_node_manifest(&nodes_text)?;
    let schedule = parse_packet_manifest(&packets_text)?;

    let mut constants = Constants::default();
    for (name, value) in &args.constants {
        if !constants.set_by_name(name, *value) {
            return Err(format!("unknown constant '{name}'").into());
        }
    }

    log::info!("loaded {} nodes, {} scheduled sends", topology.len(), schedule.len());

    let mut engine = Engine::new(topology, constants);
    for entry in schedule {
        engine.schedule(entry);
    }

    let mut sink = JsonlTelemetry::create(&args.out_dir)?;
    let stopped_at = engine.run(&mut sink, args.ticks);

    log::info!(
        "stopped at tick {stopped_at}, {} errors handled, mean final battery {:.4}, telemetry written to {}",
        sink.errors_handled(),
        sink.last_mean_battery(),
        args.out_dir.display(),
    );
    Ok(())
}
