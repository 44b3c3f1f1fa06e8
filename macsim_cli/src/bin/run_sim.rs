//! The simulator CLI (C10). Loads one scenario file, or every scenario file in a
//! directory, runs each to completion, and appends its metrics rows to a CSV named
//! after the scenario. Shaped after the teacher's `frog_cli/src/bin/run_sim.rs`:
//! `clap::Parser` args, a random seed unless one is pinned, `rayon` across a
//! directory of scenarios, `ExitCode::FAILURE` on a malformed scenario rather than
//! a panic.

use std::{
    fs::{create_dir_all, read_dir},
    path::{Path, PathBuf},
    process::ExitCode,
    sync::atomic::{AtomicU64, Ordering},
    time::Instant,
};

use clap::Parser;
use macsim_core::{
    scenario::Scenario,
    simulator::{write_mac_metrics_csv, write_routing_metrics_csv, Simulator},
};
use rand::{rng, Rng};
use rayon::prelude::*;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Suppress per-scenario progress messages.
    #[arg(short, long)]
    quiet: bool,

    /// Scenario file, or a directory containing scenario files.
    #[arg(short, long)]
    input: PathBuf,

    /// Directory to write metrics CSVs into. Defaults to `outputs/<n>` for a
    /// directory of scenarios, or the current directory for a single scenario.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Overrides the seed recorded in the scenario's run.
    #[arg(long)]
    seed: Option<u64>,

    /// Overrides the scenario's configured tick cap.
    #[arg(long)]
    tick_cap: Option<u64>,

    /// Overrides the scenario's configured backoff ceiling.
    #[arg(long)]
    max_backoff_cap: Option<u64>,

    /// Show timing information.
    #[arg(long)]
    time: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let output_dir = args.output.clone().unwrap_or_else(|| {
        if !args.input.is_dir() {
            PathBuf::from(".")
        } else {
            create_dir_all("outputs").expect("failed to create outputs/ directory");
            let count = read_dir("outputs").expect("failed to read outputs/ directory").count();
            let out_name = format!("outputs/{count}");
            create_dir_all(&out_name).expect("failed to create run output directory");
            PathBuf::from(out_name)
        }
    });

    if !args.input.is_dir() {
        return run_one(&args, &args.input, &output_dir);
    }

    let timer = args.time.then(Instant::now);
    let count = AtomicU64::new(0);
    let failures = AtomicU64::new(0);

    let entries: Vec<PathBuf> = match read_dir(&args.input) {
        Ok(dir) => dir.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
        Err(e) => {
            eprintln!("<Error> failed to read {:?}: {e}", args.input);
            return ExitCode::FAILURE;
        }
    };

    entries.par_iter().for_each(|path| {
        match run_one(&args, path, &output_dir) {
            ExitCode::SUCCESS => {
                count.fetch_add(1, Ordering::Relaxed);
            }
            _ => {
                failures.fetch_add(1, Ordering::Relaxed);
            }
        }
    });

    if let Some(timer) = timer {
        let final_count = count.load(Ordering::Relaxed);
        let final_time = timer.elapsed().as_secs_f32();
        println!(
            "Ran {final_count} scenarios in {:.4}s ({:.2} scenarios / s)",
            final_time,
            final_count as f32 / final_time
        );
    }

    if failures.load(Ordering::Relaxed) > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn run_one(args: &Args, path: &Path, output_dir: &Path) -> ExitCode {
    let scenario = match Scenario::load(path) {
        Ok(scenario) => scenario,
        Err(e) => {
            eprintln!("<Warning> skipping {path:?}: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut scenario = scenario;
    if let Some(tick_cap) = args.tick_cap {
        scenario.tick_cap = tick_cap;
    }
    if let Some(cap) = args.max_backoff_cap {
        scenario.max_backoff_cap = cap;
    }

    let seed = args.seed.unwrap_or_else(|| rng().random());

    if !args.quiet {
        println!("<Message> running '{}' (seed {seed})", scenario.name);
    }

    let mut simulator = Simulator::new(&scenario, seed);
    let summary = simulator.run();

    let mac_path = output_dir.join(format!("{}_mac.csv", scenario.name));
    let routing_path = output_dir.join(format!("{}_routing.csv", scenario.name));

    if let Err(e) = write_mac_metrics_csv(&mac_path, &summary.mac) {
        eprintln!("<Error> failed to write {mac_path:?}: {e}");
        return ExitCode::FAILURE;
    }
    if let Err(e) = write_routing_metrics_csv(&routing_path, &summary.routing) {
        eprintln!("<Error> failed to write {routing_path:?}: {e}");
        return ExitCode::FAILURE;
    }

    if !args.quiet {
        println!(
            "<Message> '{}' finished after {} ticks, {} of {} messages delivered",
            scenario.name,
            summary.ticks_run,
            summary.routing.len(),
            scenario.schedule.len(),
        );
    }

    ExitCode::SUCCESS
}
