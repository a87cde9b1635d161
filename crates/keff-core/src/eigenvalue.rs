// ─────────────────────────────────────────────────────────────────────
// SCPN Criticality — Eigenvalue Iteration
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Batch/generation power iteration for keff.
//!
//! Each generation transports the source bank, exchanges particles that
//! reached interior faces until none are in flight anywhere, estimates
//! keff from the global fission and source counts, then resamples the
//! fission bank into the next source so the global population stays at
//! the configured count.
//!
//! Histories are numbered globally per generation and every history seeks
//! the tracking stream to its own block, so results on a given process
//! count do not depend on thread scheduling or message arrival order.

use crate::bank::Bank;
use crate::comm::{tags, Communicator, ROOT};
use crate::decomposition::{apportion, offsets, Face};
use crate::geometry::Geometry;
use crate::material::Material;
use crate::particle::{decode_sites, encode_sites, Particle, SiteRecord};
use crate::random::{RandomStreams, Stream};
use crate::runtime::RuntimeContext;
use crate::source::fission_capacity;
use crate::tally::{assemble, Tally};
use crate::transport::{transport, Fate};
use keff_types::config::SimulationConfig;
use keff_types::error::{KeffError, KeffResult, Phase, PhaseContext};
use ndarray::Array3;
use serde::Serialize;

/// Lifecycle of the engine. Every batch report carries the state its
/// batch ran in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EngineState {
    Init,
    Inactive { batch: usize },
    Active { batch: usize },
    Done,
}

/// Progress record for one completed batch. Produced on every rank with
/// identical values; only rank 0 hands it to the observer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub batch: usize,
    pub state: EngineState,
    /// Position among active batches, `None` while inactive.
    pub active_index: Option<usize>,
    pub keff: f64,
    /// Running mean over active batches so far.
    pub mean: Option<f64>,
    /// Sample standard deviation of the active batches so far (n ≥ 2).
    pub std: Option<f64>,
    pub source_sites: u64,
    pub fission_sites: u64,
}

/// Receives per-batch results on rank 0.
pub trait BatchObserver {
    fn on_batch(&mut self, _report: &BatchReport) {}

    fn on_tally(&mut self, _active_index: usize, _flux: &Array3<f64>) {}
}

impl BatchObserver for () {}

/// Running keff statistics over active batches.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeffStatistics {
    values: Vec<f64>,
}

impl KeffStatistics {
    pub fn push(&mut self, keff: f64) {
        self.values.push(keff);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn mean(&self) -> Option<f64> {
        if self.values.is_empty() {
            return None;
        }
        Some(self.values.iter().sum::<f64>() / self.values.len() as f64)
    }

    pub fn std(&self) -> Option<f64> {
        let n = self.values.len();
        if n < 2 {
            return None;
        }
        let mean = self.mean()?;
        let var = self.values.iter().map(|k| (k - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
        Some(var.sqrt())
    }
}

/// Final state of an eigenvalue run.
#[derive(Debug, Clone)]
pub struct EigenvalueResult {
    /// keff of every batch, inactive ones included.
    pub batch_keff: Vec<f64>,
    pub statistics: KeffStatistics,
    /// Global flux per active batch, rank 0 only and only when a tally dump was requested.
    pub tallies: Vec<Array3<f64>>,
    pub state: EngineState,
}

impl EigenvalueResult {
    pub fn active_keff(&self) -> &[f64] {
        self.statistics.values()
    }
}

/// Resample `fission` into exactly `target` sites in `out`.
///
/// Oversized banks keep a uniform subset (reservoir selection); undersized
/// banks keep every site plus uniformly drawn duplicates. Draws come from
/// the active stream of `rng`.
pub fn resample(
    fission: &Bank,
    target: usize,
    rng: &mut RandomStreams,
    out: &mut Bank,
) -> KeffResult<()> {
    out.reset();
    let n_f = fission.len();
    if target == 0 {
        return Ok(());
    }
    if n_f == 0 {
        return Err(KeffError::InvalidSample(format!(
            "cannot draw {target} source sites from an empty fission bank"
        )));
    }
    let sites = fission.as_slice();
    if n_f >= target {
        out.extend(sites[..target].iter().copied())?;
        for (i, site) in sites.iter().enumerate().skip(target) {
            let j = rng.rni(0, i + 1);
            if j < target {
                out.as_mut_slice()[j] = *site;
            }
        }
    } else {
        for _ in 0..target - n_f {
            let j = rng.rni(0, n_f);
            out.append(sites[j])?;
        }
        out.extend(sites.iter().copied())?;
    }
    Ok(())
}

pub struct EigenvalueEngine<'a, C: Communicator> {
    comm: &'a C,
    config: &'a SimulationConfig,
    runtime: &'a RuntimeContext,
    geometry: &'a Geometry,
    material: &'a Material,
    tally: Tally,
    rng: RandomStreams,
    source: Bank,
    fission: Bank,
    outbound: [Vec<SiteRecord>; 6],
    statistics: KeffStatistics,
    state: EngineState,
}

impl<'a, C: Communicator> EigenvalueEngine<'a, C> {
    pub fn new(
        comm: &'a C,
        config: &'a SimulationConfig,
        runtime: &'a RuntimeContext,
        geometry: &'a Geometry,
        material: &'a Material,
        source: Bank,
        rng: RandomStreams,
    ) -> KeffResult<Self> {
        let fission = Bank::new(fission_capacity(config, runtime)?)?;
        Ok(EigenvalueEngine {
            comm,
            config,
            runtime,
            geometry,
            material,
            tally: Tally::new(geometry, config.output.bins, config.run.particles),
            rng,
            source,
            fission,
            outbound: Default::default(),
            statistics: KeffStatistics::default(),
            state: EngineState::Init,
        })
    }

    /// Run every batch. `observer` is consulted on rank 0 only.
    pub fn run(mut self, observer: &mut dyn BatchObserver) -> KeffResult<EigenvalueResult> {
        let rank = self.runtime.rank;
        let keep_tallies = self.runtime.is_root() && self.config.tally_destination().is_some();
        let mut batch_keff = Vec::with_capacity(self.config.run.batches);
        let mut tallies = Vec::new();

        for batch in 0..self.config.run.batches {
            let active_index = self.config.active_index(batch);
            self.state = match active_index {
                Some(_) => EngineState::Active { batch },
                None => EngineState::Inactive { batch },
            };
            self.tally.active = self.config.output.tally && active_index.is_some();

            let mut keff_sum = 0.0;
            let mut last = (0u64, 0u64);
            for generation in 0..self.config.run.generations {
                let (keff, source_sites, fission_sites) = self.run_generation(batch, generation)?;
                keff_sum += keff;
                last = (source_sites, fission_sites);
            }
            let keff = keff_sum / self.config.run.generations as f64;
            batch_keff.push(keff);

            if let Some(index) = active_index {
                self.statistics.push(keff);
                if self.tally.active {
                    let flux = self.gather_tally().phase(rank, Phase::Reduction)?;
                    if let Some(flux) = flux {
                        observer.on_tally(index, &flux);
                        if keep_tallies {
                            tallies.push(flux);
                        }
                    }
                    self.tally.reset();
                }
            }

            let report = BatchReport {
                batch,
                state: self.state,
                active_index,
                keff,
                mean: active_index.and(self.statistics.mean()),
                std: active_index.and(self.statistics.std()),
                source_sites: last.0,
                fission_sites: last.1,
            };
            if self.runtime.is_root() {
                observer.on_batch(&report);
            }
        }

        self.state = EngineState::Done;
        self.source.release();
        self.fission.release();
        Ok(EigenvalueResult {
            batch_keff,
            statistics: self.statistics,
            tallies,
            state: self.state,
        })
    }

    /// One generation; returns (keff, global source count, global fission count).
    fn run_generation(&mut self, batch: usize, generation: usize) -> KeffResult<(f64, u64, u64)> {
        let rank = self.runtime.rank;
        let block = (batch * self.config.run.generations + generation) as u64;

        let source_counts = self
            .comm
            .all_gather_u64(self.source.len() as u64)
            .phase(rank, Phase::Reduction)?;
        let global_source: u64 = source_counts.iter().sum();
        let first_history = block * self.config.run.particles + offsets(&source_counts)[rank];

        self.transport_source(first_history).phase(rank, Phase::Transport)?;
        let rounds = self.drain_handoffs().phase(rank, Phase::Handoff)?;

        let fission_counts = self
            .comm
            .all_gather_u64(self.fission.len() as u64)
            .phase(rank, Phase::Reduction)?;
        let global_fission: u64 = fission_counts.iter().sum();
        if global_fission == 0 {
            return Err(KeffError::PopulationExtinct { batch, generation })
                .phase(rank, Phase::PopulationControl);
        }
        let keff = global_fission as f64 / global_source.max(1) as f64;

        self.control_population(block, &fission_counts)
            .phase(rank, Phase::PopulationControl)?;

        log::debug!(
            "rank {rank} batch {batch} gen {generation}: keff {keff:.5}, {global_fission} fission sites, {rounds} hand-off rounds"
        );
        Ok((keff, global_source, global_fission))
    }

    fn transport_source(&mut self, first_history: u64) -> KeffResult<()> {
        let mut source = std::mem::take(&mut self.source);
        for (i, p) in source.as_mut_slice().iter_mut().enumerate() {
            p.history = first_history + i as u64;
            self.rng.seek(Stream::Track, p.history);
            p.seed = self.rng.state(Stream::Track);
            p.alive = true;
            self.track(p)?;
        }
        self.source = source;
        Ok(())
    }

    fn track(&mut self, p: &mut Particle) -> KeffResult<()> {
        let fate = transport(
            p,
            self.geometry,
            self.material,
            self.config.material.nu,
            &mut self.tally,
            &mut self.fission,
            &mut self.rng,
        )?;
        if let Fate::Handoff(face) = fate {
            self.outbound[face.index()].push(p.to_record());
        }
        Ok(())
    }

    /// Exchange and continue handed-off particles until no rank has any in
    /// flight. Returns the number of exchange rounds.
    fn drain_handoffs(&mut self) -> KeffResult<usize> {
        let mut rounds = 0;
        loop {
            let local = self.outbound.iter().map(Vec::len).sum::<usize>() as u64;
            let in_flight = self.comm.all_reduce_sum_u64(&[local])?;
            if in_flight.first().copied().unwrap_or(0) == 0 {
                return Ok(rounds);
            }
            rounds += 1;
            for arrived in self.exchange()? {
                let mut p = Particle::from_record(&arrived, self.geometry)?;
                self.track(&mut p)?;
            }
        }
    }

    /// Send every outbound buffer (empty ones included) and collect what
    /// the neighbours sent, in face order.
    fn exchange(&mut self) -> KeffResult<Vec<SiteRecord>> {
        for face in Face::ALL {
            let records = std::mem::take(&mut self.outbound[face.index()]);
            let dest = self.geometry.neighbor(face);
            self.comm.send(
                dest,
                tags::HANDOFF_BASE + face.index() as u32,
                encode_sites(&records)?,
            )?;
        }
        let mut arrived = Vec::new();
        for face in Face::ALL {
            // particles leaving a neighbour through `face` enter here through its opposite
            let src = self.geometry.neighbor(face.opposite());
            let bytes = self.comm.receive(src, tags::HANDOFF_BASE + face.index() as u32)?;
            arrived.extend(decode_sites(&bytes)?);
        }
        Ok(arrived)
    }

    fn control_population(&mut self, block: u64, fission_counts: &[u64]) -> KeffResult<()> {
        let targets = apportion(self.config.run.particles, fission_counts);
        let target = usize::try_from(targets[self.runtime.rank]).map_err(|_| {
            KeffError::BankAllocation {
                requested: usize::MAX,
            }
        })?;
        self.rng.seek(
            Stream::Other,
            block * self.runtime.size as u64 + self.runtime.rank as u64,
        );
        self.rng.select(Stream::Other);
        resample(&self.fission, target, &mut self.rng, &mut self.source)?;
        self.fission.reset();
        Ok(())
    }

    /// Gather the local flux blocks and assemble them on rank 0.
    fn gather_tally(&mut self) -> KeffResult<Option<Array3<f64>>> {
        match self.comm.gather_f64(ROOT, &self.tally.to_vec())? {
            Some(parts) => assemble(&parts, self.tally.bins, &self.runtime.topology).map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::LocalWorld;
    use crate::decomposition::CartesianTopology;
    use crate::source::init_source_bank;
    use keff_types::config::BoundaryCondition;

    fn bank_of(n: usize) -> Bank {
        let cfg = SimulationConfig::default();
        let topo = CartesianTopology::new([1, 1, 1], 1).expect("topology");
        let g = Geometry::new(&cfg, &topo, 0);
        let mut rng = RandomStreams::new(2);
        let mut bank = Bank::new(n).expect("bank");
        for i in 0..n {
            let mut p = Particle::sample_source(&g, &mut rng).expect("sample");
            p.history = i as u64;
            bank.append(p).expect("append");
        }
        bank
    }

    #[test]
    fn test_statistics() {
        let mut s = KeffStatistics::default();
        assert_eq!(s.mean(), None);
        s.push(1.0);
        assert_eq!(s.mean(), Some(1.0));
        assert_eq!(s.std(), None);
        s.push(1.2);
        s.push(0.8);
        assert!((s.mean().expect("mean") - 1.0).abs() < 1e-12);
        assert!((s.std().expect("std") - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_resample_oversized_keeps_distinct_subset() {
        let fission = bank_of(50);
        let mut out = Bank::new(0).expect("bank");
        let mut rng = RandomStreams::new(4);
        resample(&fission, 20, &mut rng, &mut out).expect("resample");
        assert_eq!(out.len(), 20);
        let mut ids: Vec<u64> = out.iter().map(|p| p.history).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 20);
    }

    #[test]
    fn test_resample_undersized_keeps_every_site() {
        let fission = bank_of(10);
        let mut out = Bank::new(0).expect("bank");
        let mut rng = RandomStreams::new(4);
        resample(&fission, 25, &mut rng, &mut out).expect("resample");
        assert_eq!(out.len(), 25);
        for i in 0..10u64 {
            assert!(out.iter().any(|p| p.history == i));
        }
        // every fission site appears after the 15 duplicates
        assert_eq!(out.get(15).map(|p| p.history), Some(0));
    }

    #[test]
    fn test_resample_exact_size_is_identity() {
        let fission = bank_of(8);
        let mut out = Bank::new(0).expect("bank");
        let mut rng = RandomStreams::new(4);
        resample(&fission, 8, &mut rng, &mut out).expect("resample");
        assert_eq!(out.as_slice(), fission.as_slice());
    }

    #[test]
    fn test_resample_from_empty_bank_fails() {
        let fission = Bank::new(0).expect("bank");
        let mut out = Bank::new(0).expect("bank");
        let mut rng = RandomStreams::new(4);
        assert!(resample(&fission, 0, &mut rng, &mut out).is_ok());
        assert!(resample(&fission, 3, &mut rng, &mut out).is_err());
    }

    #[derive(Default)]
    struct States(Vec<EngineState>);

    impl BatchObserver for States {
        fn on_batch(&mut self, report: &BatchReport) {
            self.0.push(report.state);
        }
    }

    #[test]
    fn test_engine_walks_inactive_then_active_batches() {
        let mut cfg = SimulationConfig::default();
        cfg.run.particles = 200;
        cfg.run.batches = 3;
        cfg.run.active = 2;
        cfg.geometry.cube = [10.0; 3];
        cfg.geometry.boundary = BoundaryCondition::Reflect;
        cfg.output.bins = 4;

        let world = LocalWorld::new(1).expect("world");
        let mut results = world.run(|comm| {
            let runtime = RuntimeContext::establish(comm, &cfg)?;
            let geometry = Geometry::new(&cfg, &runtime.topology, runtime.rank);
            let mut rng = RandomStreams::new(cfg.run.seed);
            rng.select(Stream::Init);
            let material = Material::from_params(&cfg.material, &mut rng)?;
            let source = init_source_bank(comm, &cfg, &geometry, &runtime, &mut rng)?;
            let engine =
                EigenvalueEngine::new(comm, &cfg, &runtime, &geometry, &material, source, rng)?;
            let mut states = States::default();
            let result = engine.run(&mut states)?;
            Ok((states.0, result.state))
        });

        let (states, last) = results.remove(0).expect("engine run");
        assert_eq!(
            states,
            vec![
                EngineState::Inactive { batch: 0 },
                EngineState::Active { batch: 1 },
                EngineState::Active { batch: 2 },
            ]
        );
        assert_eq!(last, EngineState::Done);
    }
}
