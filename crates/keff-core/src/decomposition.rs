// ─────────────────────────────────────────────────────────────────────
// SCPN Criticality — Cartesian Domain Decomposition
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! 3D Cartesian process topology.
//!
//! The global cube is split into a (px × py × pz) grid of equal
//! sub-blocks, one per rank. Ranks are numbered row-major with the last
//! axis fastest, and every axis wraps around at the topology level so
//! each rank has exactly six face neighbours. Whether a particle may
//! actually cross the outer surface is decided by the boundary mode,
//! not by the topology.

use keff_types::error::{KeffError, KeffResult};

pub const NDIMS: usize = 3;

/// Which face of an axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Minus,
    Plus,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Minus => Side::Plus,
            Side::Plus => Side::Minus,
        }
    }
}

/// One of the six faces of a sub-block, indexed −x, +x, −y, +y, −z, +z.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Face {
    pub axis: usize,
    pub side: Side,
}

impl Face {
    pub const ALL: [Face; 6] = [
        Face { axis: 0, side: Side::Minus },
        Face { axis: 0, side: Side::Plus },
        Face { axis: 1, side: Side::Minus },
        Face { axis: 1, side: Side::Plus },
        Face { axis: 2, side: Side::Minus },
        Face { axis: 2, side: Side::Plus },
    ];

    pub fn index(self) -> usize {
        self.axis * 2 + usize::from(self.side == Side::Plus)
    }

    pub fn from_index(index: usize) -> Face {
        Face::ALL[index % 6]
    }

    pub fn opposite(self) -> Face {
        Face {
            axis: self.axis,
            side: self.side.opposite(),
        }
    }
}

/// Process-grid shape with wraparound on every axis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartesianTopology {
    dims: [usize; NDIMS],
}

impl CartesianTopology {
    /// Establish the topology for a world of `size` ranks.
    ///
    /// Fails with `ProcessGridMismatch` when the grid volume differs from
    /// the rank count; no decomposition exists in that case.
    pub fn new(dims: [usize; NDIMS], size: usize) -> KeffResult<Self> {
        if dims.iter().any(|&d| d == 0) {
            return Err(KeffError::Config(format!(
                "Process grid extents must be >= 1, got {dims:?}"
            )));
        }
        let volume: usize = dims.iter().product();
        if volume != size {
            return Err(KeffError::ProcessGridMismatch {
                grid: dims,
                volume,
                size,
            });
        }
        Ok(CartesianTopology { dims })
    }

    pub fn dims(&self) -> [usize; NDIMS] {
        self.dims
    }

    pub fn size(&self) -> usize {
        self.dims.iter().product()
    }

    /// Grid coordinates of `rank` (last axis fastest).
    pub fn coords(&self, rank: usize) -> [usize; NDIMS] {
        let [_, py, pz] = self.dims;
        [rank / (py * pz), (rank / pz) % py, rank % pz]
    }

    pub fn rank_of(&self, coords: [usize; NDIMS]) -> usize {
        let [_, py, pz] = self.dims;
        (coords[0] * py + coords[1]) * pz + coords[2]
    }

    /// Cartesian shift along `axis` by `disp` with wraparound.
    /// Returns (source, dest): the ranks `disp` steps behind and ahead.
    pub fn shift(&self, rank: usize, axis: usize, disp: isize) -> (usize, usize) {
        let coords = self.coords(rank);
        let extent = self.dims[axis] as isize;
        let here = coords[axis] as isize;
        let wrap = |c: isize| c.rem_euclid(extent) as usize;

        let mut src = coords;
        src[axis] = wrap(here - disp);
        let mut dest = coords;
        dest[axis] = wrap(here + disp);
        (self.rank_of(src), self.rank_of(dest))
    }

    /// Six face neighbours of `rank`, ordered as `Face::ALL`.
    pub fn neighbors(&self, rank: usize) -> [usize; 6] {
        let mut out = [0usize; 6];
        for axis in 0..NDIMS {
            let (minus, plus) = self.shift(rank, axis, 1);
            out[axis * 2] = minus;
            out[axis * 2 + 1] = plus;
        }
        out
    }
}

/// Split `n` items across `k` buckets in proportion to `weights`, so that
/// the buckets sum to exactly `n` (largest-remainder apportionment; ties go
/// to the lower index). Zero total weight yields all zeros.
pub fn apportion(n: u64, weights: &[u64]) -> Vec<u64> {
    let total: u128 = weights.iter().map(|&w| u128::from(w)).sum();
    if total == 0 {
        return vec![0; weights.len()];
    }
    let mut shares: Vec<u64> = Vec::with_capacity(weights.len());
    let mut remainders: Vec<(u128, usize)> = Vec::with_capacity(weights.len());
    for (i, &w) in weights.iter().enumerate() {
        let exact = u128::from(n) * u128::from(w);
        shares.push((exact / total) as u64);
        remainders.push((exact % total, i));
    }
    let assigned: u64 = shares.iter().sum();
    let mut left = n - assigned;
    remainders.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    for &(_, i) in &remainders {
        if left == 0 {
            break;
        }
        shares[i] += 1;
        left -= 1;
    }
    shares
}

/// Exclusive prefix sum: first global index owned by each rank.
pub fn offsets(counts: &[u64]) -> Vec<u64> {
    counts
        .iter()
        .scan(0u64, |acc, &c| {
            let start = *acc;
            *acc += c;
            Some(start)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topology_rejects_mismatch() {
        let err = CartesianTopology::new([2, 2, 2], 4).expect_err("volume 8 vs 4 ranks");
        match err {
            KeffError::ProcessGridMismatch { volume, size, .. } => {
                assert_eq!(volume, 8);
                assert_eq!(size, 4);
            }
            other => panic!("Unexpected error: {other:?}"),
        }
        assert!(CartesianTopology::new([0, 1, 1], 0).is_err());
    }

    #[test]
    fn test_coords_roundtrip_every_rank() {
        let topo = CartesianTopology::new([3, 2, 4], 24).expect("topology");
        for rank in 0..24 {
            let c = topo.coords(rank);
            assert!(c[0] < 3 && c[1] < 2 && c[2] < 4);
            assert_eq!(topo.rank_of(c), rank);
        }
        // Last axis fastest.
        assert_eq!(topo.coords(1), [0, 0, 1]);
        assert_eq!(topo.coords(4), [0, 1, 0]);
        assert_eq!(topo.coords(8), [1, 0, 0]);
    }

    #[test]
    fn test_shift_wraps_around() {
        let topo = CartesianTopology::new([4, 1, 1], 4).expect("topology");
        assert_eq!(topo.shift(0, 0, 1), (3, 1));
        assert_eq!(topo.shift(3, 0, 1), (2, 0));
        // Extent 1: both neighbours are the rank itself.
        assert_eq!(topo.shift(2, 1, 1), (2, 2));
    }

    #[test]
    fn test_neighbors_single_rank_are_self() {
        let topo = CartesianTopology::new([1, 1, 1], 1).expect("topology");
        assert_eq!(topo.neighbors(0), [0; 6]);
    }

    #[test]
    fn test_neighbors_2x2x2() {
        let topo = CartesianTopology::new([2, 2, 2], 8).expect("topology");
        // Rank 0 at (0,0,0): every neighbour differs in exactly one coordinate.
        assert_eq!(topo.neighbors(0), [4, 4, 2, 2, 1, 1]);
        assert_eq!(topo.neighbors(7), [3, 3, 5, 5, 6, 6]);
    }

    #[test]
    fn test_face_indexing() {
        for (i, face) in Face::ALL.iter().enumerate() {
            assert_eq!(face.index(), i);
            assert_eq!(Face::from_index(i), *face);
            assert_eq!(face.opposite().opposite(), *face);
            assert_eq!(face.opposite().axis, face.axis);
        }
        assert_eq!(Face::ALL[0].opposite().index(), 1);
    }

    #[test]
    fn test_apportion_sums_exactly() {
        let shares = apportion(1000, &[333, 333, 334]);
        assert_eq!(shares.iter().sum::<u64>(), 1000);
        let shares = apportion(10, &[1, 1, 1]);
        assert_eq!(shares, vec![4, 3, 3]);
        let shares = apportion(7, &[0, 5, 0]);
        assert_eq!(shares, vec![0, 7, 0]);
        assert_eq!(apportion(5, &[0, 0]), vec![0, 0]);
    }

    #[test]
    fn test_offsets_prefix_sum() {
        assert_eq!(offsets(&[3, 0, 5, 2]), vec![0, 3, 3, 8]);
        assert!(offsets(&[]).is_empty());
    }
}
