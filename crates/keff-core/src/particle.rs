// ─────────────────────────────────────────────────────────────────────
// SCPN Criticality — Particle Sites
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Particle sites and their fixed-layout wire record.
//!
//! `Particle` is the in-memory state used by the tracking loop.
//! `SiteRecord` is the pointer-free record exchanged between ranks: two
//! integer fields followed by eight doubles, `repr(C)`, 80 bytes. Hand-off
//! messages carry a small header with the layout version and record count.

use crate::geometry::Geometry;
use crate::random::RandomStreams;
use bytemuck::{Pod, Zeroable};
use keff_types::error::{KeffError, KeffResult};
use std::f64::consts::PI;

/// Tolerance on |Ω| − 1 for directions rebuilt from a record.
const DIRECTION_NORM_TOL: f64 = 1e-9;

/// Version of the `SiteRecord` byte layout.
pub const SITE_LAYOUT_VERSION: u32 = 1;
pub const SITE_RECORD_BYTES: usize = std::mem::size_of::<SiteRecord>();
const HEADER_BYTES: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    pub alive: bool,
    /// Set when the particle stopped on an interior sub-domain face and sits
    /// in an outbound hand-off buffer. The receiving rank clears it before
    /// resuming the flight; it is never set on a particle being tracked.
    pub pending_crossing: bool,
    /// Polar cosine.
    pub mu: f64,
    /// Azimuthal angle.
    pub phi: f64,
    pub u: f64,
    pub v: f64,
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Sub-domain grid coordinates of the block holding the particle.
    pub cell: [usize; 3],
    /// Position relative to the lower corner of that block.
    pub offset: [f64; 3],
    /// Global history index within the current generation.
    pub history: u64,
    /// Tracking-stream cursor, carried across hand-offs.
    pub seed: u64,
}

fn validate_mu(mu: f64) -> KeffResult<()> {
    if !mu.is_finite() || !(-1.0..=1.0).contains(&mu) {
        return Err(KeffError::InvalidSample(format!(
            "direction cosine mu = {mu} outside [-1, 1]"
        )));
    }
    Ok(())
}

impl Particle {
    fn at(position: [f64; 3]) -> Self {
        Particle {
            alive: true,
            pending_crossing: false,
            mu: 1.0,
            phi: 0.0,
            u: 1.0,
            v: 0.0,
            w: 0.0,
            x: position[0],
            y: position[1],
            z: position[2],
            cell: [0; 3],
            offset: [0.0; 3],
            history: 0,
            seed: 0,
        }
    }

    /// Uniform position in the global cube, isotropic direction.
    pub fn sample_source(geometry: &Geometry, rng: &mut RandomStreams) -> KeffResult<Self> {
        let mut p = Particle::at([0.0; 3]);
        p.sample_isotropic_direction(rng)?;
        p.x = rng.prn() * geometry.global[0];
        p.y = rng.prn() * geometry.global[1];
        p.z = rng.prn() * geometry.global[2];
        p.locate(geometry);
        Ok(p)
    }

    /// Fission site born at the parent's position with an isotropic direction.
    pub fn sample_fission(parent: &Particle, rng: &mut RandomStreams) -> KeffResult<Self> {
        let mut p = Particle::at(parent.position());
        p.cell = parent.cell;
        p.offset = parent.offset;
        p.sample_isotropic_direction(rng)?;
        Ok(p)
    }

    pub fn sample_isotropic_direction(&mut self, rng: &mut RandomStreams) -> KeffResult<()> {
        let mu = rng.prn() * 2.0 - 1.0;
        let phi = rng.prn() * 2.0 * PI;
        self.set_angles(mu, phi)
    }

    /// Set (mu, phi) and derive (u, v, w).
    pub fn set_angles(&mut self, mu: f64, phi: f64) -> KeffResult<()> {
        validate_mu(mu)?;
        let sin_theta = (1.0 - mu * mu).max(0.0).sqrt();
        self.mu = mu;
        self.phi = phi;
        self.u = mu;
        self.v = sin_theta * phi.cos();
        self.w = sin_theta * phi.sin();
        Ok(())
    }

    /// Set (u, v, w) and derive (mu, phi).
    pub fn set_direction(&mut self, dir: [f64; 3]) -> KeffResult<()> {
        let norm = (dir[0] * dir[0] + dir[1] * dir[1] + dir[2] * dir[2]).sqrt();
        if !norm.is_finite() || (norm - 1.0).abs() > DIRECTION_NORM_TOL {
            return Err(KeffError::InvalidSample(format!(
                "direction {dir:?} is not a unit vector (|Ω| = {norm})"
            )));
        }
        validate_mu(dir[0])?;
        self.u = dir[0];
        self.v = dir[1];
        self.w = dir[2];
        self.mu = dir[0];
        self.phi = dir[2].atan2(dir[1]).rem_euclid(2.0 * PI);
        Ok(())
    }

    pub fn position(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    pub fn direction(&self) -> [f64; 3] {
        [self.u, self.v, self.w]
    }

    pub fn set_position(&mut self, pos: [f64; 3]) {
        self.x = pos[0];
        self.y = pos[1];
        self.z = pos[2];
    }

    /// Recompute block coordinates and in-block offsets.
    pub fn locate(&mut self, geometry: &Geometry) {
        let pos = self.position();
        self.cell = geometry.owner_coords(pos);
        for axis in 0..3 {
            self.offset[axis] = pos[axis] - geometry.local[axis] * self.cell[axis] as f64;
        }
    }

    pub fn to_record(&self) -> SiteRecord {
        SiteRecord {
            history: self.history,
            seed: self.seed,
            x: self.x,
            y: self.y,
            z: self.z,
            u: self.u,
            v: self.v,
            w: self.w,
            mu: self.mu,
            phi: self.phi,
        }
    }

    /// Rebuild a live particle from a received record.
    pub fn from_record(record: &SiteRecord, geometry: &Geometry) -> KeffResult<Self> {
        let pos = [record.x, record.y, record.z];
        if pos.iter().any(|c| !c.is_finite()) {
            return Err(KeffError::InvalidSample(format!(
                "received site has non-finite position {pos:?}"
            )));
        }
        let mut p = Particle::at(pos);
        p.set_direction([record.u, record.v, record.w])?;
        p.phi = record.phi;
        p.history = record.history;
        p.seed = record.seed;
        p.locate(geometry);
        Ok(p)
    }
}

/// Fixed-layout site record for inter-rank transfer.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SiteRecord {
    pub history: u64,
    pub seed: u64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub u: f64,
    pub v: f64,
    pub w: f64,
    pub mu: f64,
    pub phi: f64,
}

/// Serialise records behind a `[version: u32, count: u32]` little-endian header.
pub fn encode_sites(records: &[SiteRecord]) -> KeffResult<Vec<u8>> {
    let count = u32::try_from(records.len()).map_err(|_| {
        KeffError::Wire(format!("{} records exceed one message", records.len()))
    })?;
    let body: &[u8] = bytemuck::cast_slice(records);
    let mut out = Vec::with_capacity(HEADER_BYTES + body.len());
    out.extend_from_slice(&SITE_LAYOUT_VERSION.to_le_bytes());
    out.extend_from_slice(&count.to_le_bytes());
    out.extend_from_slice(body);
    Ok(out)
}

pub fn decode_sites(bytes: &[u8]) -> KeffResult<Vec<SiteRecord>> {
    if bytes.len() < HEADER_BYTES {
        return Err(KeffError::Wire(format!(
            "message of {} bytes is shorter than the header",
            bytes.len()
        )));
    }
    let version = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    if version != SITE_LAYOUT_VERSION {
        return Err(KeffError::Wire(format!(
            "site layout version {version}, expected {SITE_LAYOUT_VERSION}"
        )));
    }
    let count = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
    let body = &bytes[HEADER_BYTES..];
    if body.len() != count * SITE_RECORD_BYTES {
        return Err(KeffError::Wire(format!(
            "header announces {count} records but body holds {} bytes",
            body.len()
        )));
    }
    Ok(body
        .chunks_exact(SITE_RECORD_BYTES)
        .map(bytemuck::pod_read_unaligned::<SiteRecord>)
        .collect())
}
