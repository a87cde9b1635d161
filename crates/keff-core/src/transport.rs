// ─────────────────────────────────────────────────────────────────────
// SCPN Criticality — Particle Tracking
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Analog particle tracking through one rank's sub-cube.
//!
//! A flight ends in a collision or on a face of the sub-cube, whichever is
//! nearer. Interior faces end the local part of the history with a
//! hand-off; faces on the outer cube surface apply the boundary condition.

use crate::bank::Bank;
use crate::decomposition::{Face, Side, NDIMS};
use crate::geometry::Geometry;
use crate::material::{Material, Reaction};
use crate::particle::Particle;
use crate::random::{RandomStreams, Stream};
use crate::tally::Tally;
use keff_types::config::BoundaryCondition;
use keff_types::error::KeffResult;

/// How the local part of a history ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fate {
    Absorbed,
    /// Fissioned; the parent is dead and its sites are banked.
    Fissioned,
    Leaked,
    /// Reached `Face`; continue on the neighbour across it.
    Handoff(Face),
}

/// Distance to the nearest sub-cube face ahead of the particle.
pub fn distance_to_boundary(p: &Particle, geometry: &Geometry) -> (f64, Face) {
    let pos = p.position();
    let dir = p.direction();
    let mut best = (f64::INFINITY, Face::ALL[0]);
    for axis in 0..NDIMS {
        let side = if dir[axis] > 0.0 {
            Side::Plus
        } else if dir[axis] < 0.0 {
            Side::Minus
        } else {
            continue;
        };
        let face = Face { axis, side };
        let d = ((geometry.face_position(face) - pos[axis]) / dir[axis]).max(0.0);
        if d < best.0 {
            best = (d, face);
        }
    }
    best
}

pub fn distance_to_collision(material: &Material, rng: &mut RandomStreams) -> f64 {
    -(1.0 - rng.prn()).ln() / material.xs_t
}

fn advance(p: &mut Particle, distance: f64) {
    p.x += distance * p.u;
    p.y += distance * p.v;
    p.z += distance * p.w;
}

/// Number of fission sites for one fission event, expected value `nu`.
pub fn fission_yield(nu: f64, rng: &mut RandomStreams) -> usize {
    let whole = nu.floor();
    let extra = usize::from(rng.prn() < nu - whole);
    whole as usize + extra
}

/// Apply what happens at a face the particle has just reached.
/// `None` means the flight continues on this rank.
pub fn apply_boundary(p: &mut Particle, face: Face, geometry: &Geometry) -> KeffResult<Option<Fate>> {
    if !geometry.is_global_face(face) {
        p.pending_crossing = true;
        return Ok(Some(Fate::Handoff(face)));
    }
    match geometry.bc {
        BoundaryCondition::Vacuum => {
            p.alive = false;
            Ok(Some(Fate::Leaked))
        }
        BoundaryCondition::Reflect => {
            let mut dir = p.direction();
            dir[face.axis] = -dir[face.axis];
            p.set_direction(dir)?;
            Ok(None)
        }
        BoundaryCondition::Periodic => {
            let mut pos = p.position();
            pos[face.axis] = match face.side {
                Side::Minus => geometry.global[face.axis],
                Side::Plus => 0.0,
            };
            p.set_position(pos);
            if geometry.dims[face.axis] == 1 {
                Ok(None)
            } else {
                p.pending_crossing = true;
                Ok(Some(Fate::Handoff(face)))
            }
        }
    }
}

/// Track `p` until it dies or leaves the sub-cube.
///
/// The tracking stream is resumed from `p.seed` and the cursor is stored
/// back into the particle, so a history continues with the same sequence
/// on whichever rank receives it.
pub fn transport(
    p: &mut Particle,
    geometry: &Geometry,
    material: &Material,
    nu: f64,
    tally: &mut Tally,
    fission_bank: &mut Bank,
    rng: &mut RandomStreams,
) -> KeffResult<Fate> {
    rng.restore(Stream::Track, p.seed);
    rng.select(Stream::Track);
    p.pending_crossing = false;

    let fate = loop {
        let (d_boundary, face) = distance_to_boundary(p, geometry);
        let d_collision = distance_to_collision(material, rng);

        if d_boundary <= d_collision {
            advance(p, d_boundary);
            // snap onto the face to keep the particle inside its block
            let mut pos = p.position();
            pos[face.axis] = geometry.face_position(face);
            p.set_position(pos);
            if let Some(fate) = apply_boundary(p, face, geometry)? {
                break fate;
            }
            continue;
        }

        advance(p, d_collision);
        tally.score(p.position(), material.xs_t);
        let nuclide = material.sample_nuclide(rng.prn());
        match Material::sample_reaction(nuclide, rng.prn()) {
            Reaction::Fission => {
                p.locate(geometry);
                for _ in 0..fission_yield(nu, rng) {
                    fission_bank.append(Particle::sample_fission(p, rng)?)?;
                }
                p.alive = false;
                break Fate::Fissioned;
            }
            Reaction::Absorption => {
                p.alive = false;
                break Fate::Absorbed;
            }
            Reaction::Scatter => p.sample_isotropic_direction(rng)?,
        }
    };

    p.locate(geometry);
    p.seed = rng.state(Stream::Track);
    Ok(fate)
}
