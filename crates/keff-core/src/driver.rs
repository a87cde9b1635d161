// ─────────────────────────────────────────────────────────────────────
// SCPN Criticality — Run Driver
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Per-rank run lifecycle and the in-process launcher.

use crate::comm::{Communicator, LocalWorld};
use crate::eigenvalue::{BatchObserver, EigenvalueEngine};
use crate::geometry::Geometry;
use crate::material::Material;
use crate::output::{write_keff, write_tally, KeffDump};
use crate::random::{RandomStreams, Stream};
use crate::runtime::RuntimeContext;
use crate::source::init_source_bank;
use keff_types::config::SimulationConfig;
use keff_types::error::{KeffError, KeffResult, Phase, PhaseContext};
use serde::Serialize;
use std::sync::Mutex;
use std::time::Instant;

/// Outcome of a completed run, identical on every rank.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub ranks: usize,
    pub batch_keff: Vec<f64>,
    pub active_keff: Vec<f64>,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    /// Wall time of the batch loop between two barriers.
    pub elapsed_seconds: f64,
}

/// Full lifecycle of one rank: establish, set up, iterate, write results.
pub fn run_rank<C: Communicator>(
    comm: &C,
    config: &SimulationConfig,
    observer: &mut dyn BatchObserver,
) -> KeffResult<RunSummary> {
    let rank = comm.rank();
    let runtime = RuntimeContext::establish(comm, config).phase(rank, Phase::Setup)?;
    if runtime.is_root() {
        log::info!(
            "k-eigenvalue run: {} particles, {} batches ({} active) x {} generations on a {:?} grid",
            config.run.particles,
            config.run.batches,
            config.run.active,
            config.run.generations,
            config.geometry.grid
        );
    }

    let geometry = Geometry::new(config, &runtime.topology, rank);
    let mut rng = RandomStreams::new(config.run.seed);
    rng.select(Stream::Init);
    let material = Material::from_params(&config.material, &mut rng).phase(rank, Phase::Setup)?;
    let source = init_source_bank(comm, config, &geometry, &runtime, &mut rng)
        .phase(rank, Phase::SourceSampling)?;

    comm.barrier().phase(rank, Phase::Reduction)?;
    let start = Instant::now();

    let engine = EigenvalueEngine::new(comm, config, &runtime, &geometry, &material, source, rng)
        .phase(rank, Phase::Setup)?;
    let result = engine.run(observer)?;

    comm.barrier().phase(rank, Phase::Reduction)?;
    let elapsed_seconds = start.elapsed().as_secs_f64();

    let summary = RunSummary {
        ranks: runtime.size,
        batch_keff: result.batch_keff.clone(),
        active_keff: result.active_keff().to_vec(),
        mean: result.statistics.mean(),
        std: result.statistics.std(),
        elapsed_seconds,
    };

    if runtime.is_root() {
        if let Some(path) = config.keff_destination() {
            let dump = KeffDump {
                batch_keff: &summary.batch_keff,
                active_keff: &summary.active_keff,
                mean: summary.mean,
                std: summary.std,
            };
            write_keff(path, &dump).phase(rank, Phase::Output)?;
        }
        if let Some(path) = config.tally_destination() {
            write_tally(path, &result.tallies).phase(rank, Phase::Output)?;
        }
    }
    Ok(summary)
}

/// The error to report for a failed world: the first primary failure in
/// rank order, falling back to the first error of any kind.
pub fn primary_error(errors: Vec<KeffError>) -> Option<KeffError> {
    let mut first_secondary = None;
    for e in errors {
        if !e.is_secondary_abort() {
            return Some(e);
        }
        first_secondary.get_or_insert(e);
    }
    first_secondary
}

/// Run `config` on an in-process world of `ranks` threads. The observer
/// sees rank 0's batch reports.
pub fn run_local<O>(config: &SimulationConfig, ranks: usize, observer: O) -> KeffResult<RunSummary>
where
    O: BatchObserver + Send,
{
    let world = LocalWorld::new(ranks)?;
    let observer = Mutex::new(Some(observer));

    let results = world.run(|comm| {
        let taken = if comm.is_root() {
            observer.lock().unwrap_or_else(|p| p.into_inner()).take()
        } else {
            None
        };
        match taken {
            Some(mut o) => run_rank(comm, config, &mut o),
            None => run_rank(comm, config, &mut ()),
        }
    });

    let mut summaries = Vec::with_capacity(results.len());
    let mut errors = Vec::new();
    for res in results {
        match res {
            Ok(s) => summaries.push(s),
            Err(e) => errors.push(e),
        }
    }
    if let Some(e) = primary_error(errors) {
        log::error!("run failed: {e}");
        return Err(e);
    }
    summaries.into_iter().next().ok_or_else(|| KeffError::Communication {
        rank: 0,
        message: "world returned no results".to_string(),
    })
}
