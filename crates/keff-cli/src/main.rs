// ─────────────────────────────────────────────────────────────────────
// SCPN Criticality — Command-Line Driver
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! `keff`: run the k-eigenvalue mini-app on an in-process rank world.
//!
//! Parameters come from the built-in defaults, then an optional JSON
//! parameter file, then the command-line flags, in that order.

mod report;

use clap::Parser;
use keff_core::run_local;
use keff_types::config::{BoundaryCondition, SimulationConfig};
use keff_types::error::{KeffError, KeffResult};
use report::{summary_line, ConsoleReporter, ParametersBlock};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(version, about = "Distributed Monte Carlo k-eigenvalue mini-app", long_about = None)]
struct Args {
    /// JSON parameter file; flags below override its values
    #[arg(short, long)]
    params: Option<PathBuf>,

    /// Number of ranks (default: process-grid volume)
    #[arg(short, long)]
    ranks: Option<usize>,

    /// Particles per generation
    #[arg(short = 'n', long)]
    particles: Option<u64>,

    #[arg(short, long)]
    batches: Option<usize>,

    /// Generations per batch
    #[arg(short, long)]
    generations: Option<usize>,

    /// Active batches
    #[arg(short, long)]
    active: Option<usize>,

    #[arg(short, long)]
    seed: Option<u64>,

    /// Cube edge lengths in cm: one value for all axes, or x,y,z
    #[arg(long, value_delimiter = ',')]
    cube: Option<Vec<f64>>,

    /// Process grid px,py,pz
    #[arg(long, value_delimiter = ',')]
    grid: Option<Vec<usize>>,

    /// vacuum, reflect or periodic
    #[arg(long)]
    boundary: Option<BoundaryCondition>,

    #[arg(long)]
    nuclides: Option<usize>,

    /// Average neutrons per fission
    #[arg(long)]
    nu: Option<f64>,

    #[arg(long)]
    xs_fission: Option<f64>,

    #[arg(long)]
    xs_absorption: Option<f64>,

    #[arg(long)]
    xs_scatter: Option<f64>,

    /// Tally bins per axis
    #[arg(long)]
    bins: Option<usize>,

    /// Disable the flux tally
    #[arg(long, action)]
    no_tally: bool,

    /// Write the per-batch flux tally to this .npy file
    #[arg(long)]
    tally_file: Option<PathBuf>,

    /// Write the keff sequence to this JSON file
    #[arg(long)]
    keff_file: Option<PathBuf>,
}

fn triple<T: Copy>(name: &str, values: &[T]) -> KeffResult<[T; 3]> {
    match values {
        [v] => Ok([*v; 3]),
        [x, y, z] => Ok([*x, *y, *z]),
        _ => Err(KeffError::Config(format!(
            "--{name} takes one or three comma-separated values, got {}",
            values.len()
        ))),
    }
}

fn build_config(args: &Args) -> KeffResult<SimulationConfig> {
    let mut cfg = match &args.params {
        Some(path) => SimulationConfig::from_file(path)?,
        None => SimulationConfig::default(),
    };

    if let Some(v) = args.particles {
        cfg.run.particles = v;
    }
    if let Some(v) = args.batches {
        cfg.run.batches = v;
    }
    if let Some(v) = args.generations {
        cfg.run.generations = v;
    }
    if let Some(v) = args.active {
        cfg.run.active = v;
    }
    if let Some(v) = args.seed {
        cfg.run.seed = v;
    }
    if let Some(v) = &args.cube {
        cfg.geometry.cube = triple("cube", v)?;
    }
    if let Some(v) = &args.grid {
        cfg.geometry.grid = triple("grid", v)?;
    }
    if let Some(v) = args.boundary {
        cfg.geometry.boundary = v;
    }
    if let Some(v) = args.nuclides {
        cfg.material.nuclides = v;
    }
    if let Some(v) = args.nu {
        cfg.material.nu = v;
    }
    if let Some(v) = args.xs_fission {
        cfg.material.xs_fission = v;
    }
    if let Some(v) = args.xs_absorption {
        cfg.material.xs_absorption = v;
    }
    if let Some(v) = args.xs_scatter {
        cfg.material.xs_scatter = v;
    }
    if let Some(v) = args.bins {
        cfg.output.bins = v;
    }
    if args.no_tally {
        cfg.output.tally = false;
    }
    if let Some(path) = &args.tally_file {
        cfg.output.write_tally = true;
        cfg.output.tally_file = Some(path.clone());
    }
    if let Some(path) = &args.keff_file {
        cfg.output.write_keff = true;
        cfg.output.keff_file = Some(path.clone());
    }
    Ok(cfg)
}

fn run(args: &Args) -> KeffResult<()> {
    let config = build_config(args)?;
    let ranks = args.ranks.unwrap_or_else(|| config.grid_volume());

    config.validate()?;
    config.validate_process_grid(ranks)?;
    print!("{}", ParametersBlock { config: &config, ranks });

    let summary = run_local(&config, ranks, ConsoleReporter::default())?;
    println!("{}", summary_line(&summary));
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            eprintln!("keff: {e}");
            ExitCode::FAILURE
        }
    }
}
