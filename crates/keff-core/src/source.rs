// ─────────────────────────────────────────────────────────────────────
// SCPN Criticality — Initial Source
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Initial source distribution.
//!
//! Rank 0 samples the whole starting population on the init stream, so the
//! initial source does not depend on the process count, then routes each
//! site to the rank owning its position.

use crate::bank::Bank;
use crate::comm::{tags, Communicator, ROOT};
use crate::geometry::Geometry;
use crate::particle::{decode_sites, encode_sites, Particle, SiteRecord};
use crate::random::{RandomStreams, Stream};
use crate::runtime::RuntimeContext;
use keff_types::config::SimulationConfig;
use keff_types::error::{KeffError, KeffResult};

/// Starting source-bank capacity: the full population on rank 0, a fair
/// share elsewhere. Fission banks start at twice this.
pub fn source_capacity(config: &SimulationConfig, runtime: &RuntimeContext) -> KeffResult<usize> {
    let n = usize::try_from(config.run.particles).map_err(|_| KeffError::BankAllocation {
        requested: usize::MAX,
    })?;
    Ok(if runtime.is_root() {
        n
    } else {
        (n / runtime.size).max(1)
    })
}

pub fn fission_capacity(config: &SimulationConfig, runtime: &RuntimeContext) -> KeffResult<usize> {
    source_capacity(config, runtime)?
        .checked_mul(2)
        .ok_or(KeffError::BankAllocation {
            requested: usize::MAX,
        })
}

/// Build this rank's share of the initial source.
pub fn init_source_bank<C: Communicator>(
    comm: &C,
    config: &SimulationConfig,
    geometry: &Geometry,
    runtime: &RuntimeContext,
    rng: &mut RandomStreams,
) -> KeffResult<Bank> {
    let mut bank = Bank::new(source_capacity(config, runtime)?)?;

    if runtime.is_root() {
        rng.select(Stream::Init);
        let mut outgoing: Vec<Vec<SiteRecord>> = vec![Vec::new(); runtime.size];
        for _ in 0..config.run.particles {
            let p = Particle::sample_source(geometry, rng)?;
            let owner = geometry.owner_of(p.position(), &runtime.topology);
            if owner == ROOT {
                bank.append(p)?;
            } else {
                outgoing[owner].push(p.to_record());
            }
        }
        for (dest, records) in outgoing.iter().enumerate().skip(1) {
            comm.send(dest, tags::SOURCE, encode_sites(records)?)?;
        }
        log::debug!(
            "initial source: {} sites sampled, {} kept on rank 0",
            config.run.particles,
            bank.len()
        );
    } else {
        let records = decode_sites(&comm.receive(ROOT, tags::SOURCE)?)?;
        for record in &records {
            bank.append(Particle::from_record(record, geometry)?)?;
        }
    }
    Ok(bank)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::LocalWorld;

    fn config(grid: [usize; 3], particles: u64) -> SimulationConfig {
        let mut cfg = SimulationConfig::default();
        cfg.run.particles = particles;
        cfg.geometry.cube = [10.0; 3];
        cfg.geometry.grid = grid;
        cfg
    }

    #[test]
    fn test_capacities() {
        let cfg = config([2, 2, 1], 1000);
        let world = LocalWorld::new(4).expect("world");
        let caps = world.run(|comm| {
            let rt = RuntimeContext::establish(comm, &cfg)?;
            Ok((source_capacity(&cfg, &rt)?, fission_capacity(&cfg, &rt)?))
        });
        assert_eq!(caps[0].as_ref().expect("root"), &(1000, 2000));
        assert_eq!(caps[3].as_ref().expect("rank 3"), &(250, 500));
    }

    #[test]
    fn test_sites_land_on_their_owner() {
        let cfg = config([2, 1, 2], 2000);
        let world = LocalWorld::new(4).expect("world");
        let counts = world.run(|comm| {
            let rt = RuntimeContext::establish(comm, &cfg)?;
            let geo = Geometry::new(&cfg, &rt.topology, rt.rank);
            let mut rng = RandomStreams::new(cfg.run.seed);
            let bank = init_source_bank(comm, &cfg, &geo, &rt, &mut rng)?;
            for p in &bank {
                assert_eq!(geo.owner_of(p.position(), &rt.topology), rt.rank);
            }
            Ok(bank.len() as u64)
        });
        let total: u64 = counts.into_iter().map(|c| c.expect("bank")).sum();
        assert_eq!(total, 2000);
    }

    #[test]
    fn test_single_rank_source_is_reproducible() {
        let cfg = config([1, 1, 1], 50);
        let world = LocalWorld::new(1).expect("world");
        let run = || {
            world.run(|comm| {
                let rt = RuntimeContext::establish(comm, &cfg)?;
                let geo = Geometry::new(&cfg, &rt.topology, 0);
                let mut rng = RandomStreams::new(7);
                let bank = init_source_bank(comm, &cfg, &geo, &rt, &mut rng)?;
                Ok(bank.iter().map(|p| p.x.to_bits()).collect::<Vec<_>>())
            })
        };
        let a = run().remove(0).expect("first");
        let b = run().remove(0).expect("second");
        assert_eq!(a.len(), 50);
        assert_eq!(a, b);
    }
}
