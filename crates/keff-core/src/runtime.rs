// ─────────────────────────────────────────────────────────────────────
// SCPN Criticality — Runtime Context
// © 1998–2026 Miroslav Šotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use crate::comm::Communicator;
use crate::decomposition::CartesianTopology;
use keff_types::config::SimulationConfig;
use keff_types::error::KeffResult;

/// Rank identity and process topology, fixed once the grid is established.
/// Kept apart from `SimulationConfig`, which never learns about ranks.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeContext {
    pub rank: usize,
    pub size: usize,
    pub topology: CartesianTopology,
    pub coords: [usize; 3],
    pub neighbors: [usize; 6],
}

impl RuntimeContext {
    /// Validate the configuration against the world and build the topology.
    ///
    /// Every rank runs the same checks on the same configuration, so every
    /// rank fails together. The failing check is logged once, by rank 0.
    pub fn establish<C: Communicator>(comm: &C, config: &SimulationConfig) -> KeffResult<Self> {
        let rank = comm.rank();
        let size = comm.size();
        let established = config
            .validate()
            .and_then(|_| config.validate_process_grid(size))
            .and_then(|_| CartesianTopology::new(config.geometry.grid, size));
        let topology = match established {
            Ok(t) => t,
            Err(e) => {
                if rank == 0 {
                    log::error!("{e}");
                }
                comm.abort(&e.to_string());
                return Err(e);
            }
        };
        Ok(RuntimeContext {
            rank,
            size,
            coords: topology.coords(rank),
            neighbors: topology.neighbors(rank),
            topology,
        })
    }

    pub fn is_root(&self) -> bool {
        self.rank == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::LocalWorld;
    use keff_types::error::KeffError;

    #[test]
    fn test_establish_on_matching_grid() {
        let mut cfg = SimulationConfig::default();
        cfg.geometry.grid = [2, 1, 2];
        let world = LocalWorld::new(4).expect("world");
        let contexts = world.run(|comm| RuntimeContext::establish(comm, &cfg));
        for (rank, ctx) in contexts.into_iter().enumerate() {
            let ctx = ctx.expect("context");
            assert_eq!(ctx.rank, rank);
            assert_eq!(ctx.size, 4);
            assert_eq!(ctx.topology.rank_of(ctx.coords), rank);
        }
    }

    #[test]
    fn test_mismatch_fails_every_rank() {
        let mut cfg = SimulationConfig::default();
        cfg.geometry.grid = [2, 2, 2];
        let world = LocalWorld::new(4).expect("world");
        let contexts = world.run(|comm| RuntimeContext::establish(comm, &cfg));
        for ctx in contexts {
            match ctx {
                Err(KeffError::ProcessGridMismatch { volume, size, .. }) => {
                    assert_eq!((volume, size), (8, 4));
                }
                other => panic!("Unexpected result: {other:?}"),
            }
        }
    }
}
