// ─────────────────────────────────────────────────────────────────────
// SCPN Criticality — Constants
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
/// Histories per run.
pub const DEFAULT_PARTICLES: u64 = 1_000_000;
pub const DEFAULT_BATCHES: usize = 10;
pub const DEFAULT_GENERATIONS: usize = 1;
pub const DEFAULT_ACTIVE: usize = 10;
pub const DEFAULT_NUCLIDES: usize = 1;
/// Tally bins per axis over the whole cube.
pub const DEFAULT_BINS: usize = 16;
pub const DEFAULT_SEED: u64 = 1;

/// Average neutrons per fission.
pub const DEFAULT_NU: f64 = 2.5;

/// Macroscopic cross sections [1/cm], tuned so that nu·Σf/Σa = 1.
pub const DEFAULT_XS_FISSION: f64 = 0.012;
pub const DEFAULT_XS_ABSORPTION: f64 = 0.03;
pub const DEFAULT_XS_SCATTER: f64 = 0.27;

/// Cube edge length [cm] on every axis.
pub const DEFAULT_CUBE_EDGE: f64 = 400.0;

/// Atomic density budget shared by all nuclides of the material.
pub const TOTAL_ATOM_DENSITY: f64 = 1.0;
