// ─────────────────────────────────────────────────────────────────────
// SCPN Criticality — Flux Tally
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Collision-estimator scalar-flux tally on a uniform mesh.
//!
//! Each rank holds the bins covering its own sub-cube; the global grid is
//! reassembled on rank 0 from the per-rank blocks.

use crate::decomposition::CartesianTopology;
use crate::geometry::Geometry;
use keff_types::error::{KeffError, KeffResult};
use ndarray::{s, Array3};

#[derive(Debug, Clone)]
pub struct Tally {
    /// Scoring enabled for the current batch.
    pub active: bool,
    /// Local bins per axis (global bins / grid extent).
    pub bins: [usize; 3],
    /// Bin width per axis (global edge / global bins).
    pub width: [f64; 3],
    origin: [f64; 3],
    /// Score per collision: 1 / (V_bin · N).
    norm: f64,
    pub flux: Array3<f64>,
}

impl Tally {
    pub fn new(geometry: &Geometry, global_bins: usize, n_particles: u64) -> Self {
        let mut bins = [0usize; 3];
        let mut width = [0.0; 3];
        for axis in 0..3 {
            bins[axis] = (global_bins / geometry.dims[axis]).max(1);
            width[axis] = geometry.global[axis] / global_bins as f64;
        }
        let bin_volume: f64 = width.iter().product();
        Tally {
            active: false,
            bins,
            width,
            origin: geometry.origin,
            norm: 1.0 / (bin_volume * n_particles.max(1) as f64),
            flux: Array3::zeros((bins[0], bins[1], bins[2])),
        }
    }

    fn bin_of(&self, position: [f64; 3]) -> [usize; 3] {
        let mut idx = [0usize; 3];
        for axis in 0..3 {
            let b = ((position[axis] - self.origin[axis]) / self.width[axis]).floor();
            idx[axis] = if b.is_finite() && b > 0.0 {
                (b as usize).min(self.bins[axis] - 1)
            } else {
                0
            };
        }
        idx
    }

    /// Score one collision at `position` in a medium of total cross section `xs_t`.
    pub fn score(&mut self, position: [f64; 3], xs_t: f64) {
        if !self.active || xs_t <= 0.0 {
            return;
        }
        let [i, j, k] = self.bin_of(position);
        self.flux[[i, j, k]] += self.norm / xs_t;
    }

    pub fn reset(&mut self) {
        self.flux.fill(0.0);
    }

    pub fn total(&self) -> f64 {
        self.flux.sum()
    }

    /// Flattened row-major copy for a gather.
    pub fn to_vec(&self) -> Vec<f64> {
        self.flux.iter().copied().collect()
    }
}

/// Stitch per-rank local grids (indexed by rank) into the global grid.
pub fn assemble(
    parts: &[Vec<f64>],
    local_bins: [usize; 3],
    topology: &CartesianTopology,
) -> KeffResult<Array3<f64>> {
    let dims = topology.dims();
    let per_rank: usize = local_bins.iter().product();
    if parts.len() != topology.size() {
        return Err(KeffError::Output(format!(
            "tally gather returned {} blocks for {} ranks",
            parts.len(),
            topology.size()
        )));
    }
    let [bx, by, bz] = local_bins;
    let mut global = Array3::zeros((bx * dims[0], by * dims[1], bz * dims[2]));
    for (rank, part) in parts.iter().enumerate() {
        if part.len() != per_rank {
            return Err(KeffError::Output(format!(
                "rank {rank} sent {} tally bins, expected {per_rank}",
                part.len()
            )));
        }
        let block = Array3::from_shape_vec((bx, by, bz), part.clone())
            .map_err(|e| KeffError::Output(format!("tally block of rank {rank}: {e}")))?;
        let [cx, cy, cz] = topology.coords(rank);
        global
            .slice_mut(s![
                cx * bx..(cx + 1) * bx,
                cy * by..(cy + 1) * by,
                cz * bz..(cz + 1) * bz
            ])
            .assign(&block);
    }
    Ok(global)
}

#[cfg(test)]
mod tests {
    use super::*;
    use keff_types::config::SimulationConfig;

    fn geometry(grid: [usize; 3], rank: usize) -> (Geometry, CartesianTopology) {
        let mut cfg = SimulationConfig::default();
        cfg.geometry.cube = [8.0; 3];
        cfg.geometry.grid = grid;
        let size = grid.iter().product();
        let topo = CartesianTopology::new(grid, size).expect("topology");
        (Geometry::new(&cfg, &topo, rank), topo)
    }

    #[test]
    fn test_inactive_tally_ignores_collisions() {
        let (g, _) = geometry([1, 1, 1], 0);
        let mut t = Tally::new(&g, 4, 100);
        t.score([1.0, 1.0, 1.0], 0.3);
        assert_eq!(t.total(), 0.0);
    }

    #[test]
    fn test_score_normalisation() {
        let (g, _) = geometry([1, 1, 1], 0);
        let mut t = Tally::new(&g, 4, 10);
        t.active = true;
        t.score([1.0, 3.0, 7.9], 0.5);
        // bin volume 2^3 = 8: 1 / (8 · 0.5 · 10)
        assert!((t.flux[[0, 1, 3]] - 0.025).abs() < 1e-15);
        t.reset();
        assert_eq!(t.total(), 0.0);
    }

    #[test]
    fn test_local_bins_use_rank_origin() {
        let (g, _) = geometry([2, 1, 1], 1);
        let mut t = Tally::new(&g, 4, 1);
        assert_eq!(t.bins, [2, 4, 4]);
        t.active = true;
        t.score([6.5, 0.5, 0.5], 1.0);
        assert!(t.flux[[1, 0, 0]] > 0.0);
        // Points on the far surface land in the last bin.
        t.score([8.0, 8.0, 8.0], 1.0);
        assert!(t.flux[[1, 3, 3]] > 0.0);
    }

    #[test]
    fn test_assemble_places_blocks_by_coords() {
        let (_, topo) = geometry([2, 1, 1], 0);
        let parts = vec![vec![1.0; 2 * 4 * 4], vec![2.0; 2 * 4 * 4]];
        let global = assemble(&parts, [2, 4, 4], &topo).expect("assemble");
        assert_eq!(global.dim(), (4, 4, 4));
        assert_eq!(global[[0, 3, 3]], 1.0);
        assert_eq!(global[[3, 0, 0]], 2.0);
        assert!(assemble(&parts[..1], [2, 4, 4], &topo).is_err());
    }
}
