// ─────────────────────────────────────────────────────────────────────
// SCPN Criticality — Geometry
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Homogeneous cube geometry as seen by one rank.

use crate::decomposition::{CartesianTopology, Face, Side, NDIMS};
use keff_types::config::{BoundaryCondition, SimulationConfig};

/// Sub-cube owned by one rank, plus its neighbour table.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    /// Global cube edge lengths.
    pub global: [f64; NDIMS],
    /// Local sub-cube edge lengths (global / grid extent).
    pub local: [f64; NDIMS],
    /// Lower corner of the local sub-cube.
    pub origin: [f64; NDIMS],
    pub coords: [usize; NDIMS],
    pub dims: [usize; NDIMS],
    /// Neighbour ranks ordered −x, +x, −y, +y, −z, +z.
    pub neighbors: [usize; 6],
    pub bc: BoundaryCondition,
}

impl Geometry {
    pub fn new(config: &SimulationConfig, topology: &CartesianTopology, rank: usize) -> Self {
        let dims = topology.dims();
        let coords = topology.coords(rank);
        let global = config.geometry.cube;
        let mut local = [0.0; NDIMS];
        let mut origin = [0.0; NDIMS];
        for axis in 0..NDIMS {
            local[axis] = global[axis] / dims[axis] as f64;
            origin[axis] = coords[axis] as f64 * local[axis];
        }
        Geometry {
            global,
            local,
            origin,
            coords,
            dims,
            neighbors: topology.neighbors(rank),
            bc: config.geometry.boundary,
        }
    }

    pub fn neighbor(&self, face: Face) -> usize {
        self.neighbors[face.index()]
    }

    /// Coordinate of a local face along its axis. Shared faces evaluate to
    /// the same value on both ranks.
    pub fn face_position(&self, face: Face) -> f64 {
        let axis = face.axis;
        match face.side {
            Side::Minus => self.origin[axis],
            Side::Plus => (self.coords[axis] + 1) as f64 * self.local[axis],
        }
    }

    /// True when the local face lies on the outer surface of the global cube.
    pub fn is_global_face(&self, face: Face) -> bool {
        match face.side {
            Side::Minus => self.coords[face.axis] == 0,
            Side::Plus => self.coords[face.axis] + 1 == self.dims[face.axis],
        }
    }

    /// Grid coordinates of the sub-cube containing `position`, clamped into the grid.
    pub fn owner_coords(&self, position: [f64; NDIMS]) -> [usize; NDIMS] {
        let mut out = [0usize; NDIMS];
        for axis in 0..NDIMS {
            let c = (position[axis] / self.local[axis]).floor();
            out[axis] = if c.is_finite() && c > 0.0 {
                (c as usize).min(self.dims[axis] - 1)
            } else {
                0
            };
        }
        out
    }

    pub fn owner_of(&self, position: [f64; NDIMS], topology: &CartesianTopology) -> usize {
        topology.rank_of(self.owner_coords(position))
    }

    pub fn volume(&self) -> f64 {
        self.local.iter().product()
    }
}
