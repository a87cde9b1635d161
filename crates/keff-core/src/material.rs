// ─────────────────────────────────────────────────────────────────────
// SCPN Criticality — Material Cross Sections
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Multi-nuclide homogeneous material.
//!
//! Microscopic cross sections and atom densities are drawn at random and
//! then rescaled so that the density-weighted sums reproduce the
//! configured macroscopic values. Fission is a subset of absorption, so
//! Σt = Σa + Σs and keff ≈ ν Σf / Σa in an infinite medium.
//!
//! The three channels are rescaled independently, so with several
//! nuclides an individual nuclide can end up with σf > σa (about one in
//! five with the reference targets). Reaction sampling then treats every
//! draw below σf as fission and that nuclide removes σf / σt of its
//! collisions instead of σa / σt. The material as a whole absorbs more
//! than Σa and keff comes out below ν Σf / Σa. The builder logs a warning
//! for each such nuclide and keeps the values.

use crate::random::RandomStreams;
use keff_types::config::MaterialParams;
use keff_types::constants::TOTAL_ATOM_DENSITY;
use keff_types::error::{KeffError, KeffResult};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Nuclide {
    pub xs_f: f64,
    pub xs_a: f64,
    pub xs_s: f64,
    pub xs_t: f64,
    pub atom_density: f64,
}

/// Outcome of a collision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaction {
    Fission,
    Absorption,
    Scatter,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub nuclides: Vec<Nuclide>,
    pub xs_f: f64,
    pub xs_a: f64,
    pub xs_s: f64,
    pub xs_t: f64,
}

fn fraction(rng: &mut RandomStreams) -> KeffResult<f64> {
    let f = rng.prn();
    if !(0.0..=1.0).contains(&f) {
        return Err(KeffError::InvalidSample(format!(
            "sampled fraction {f} outside [0, 1]"
        )));
    }
    Ok(f)
}

/// Factor mapping a density-weighted raw sum onto `target`.
fn rescale_factor(channel: &str, sum: f64, target: f64) -> KeffResult<f64> {
    if target == 0.0 {
        return Ok(0.0);
    }
    if sum <= 0.0 || !sum.is_finite() {
        return Err(KeffError::InvalidSample(format!(
            "weighted {channel} sum {sum} cannot be rescaled to {target}"
        )));
    }
    Ok(target / sum)
}

impl Material {
    /// Draws on the active stream of `rng`. Callers select `Stream::Init`
    /// so every rank builds an identical material.
    pub fn build(
        n_nuclides: usize,
        xs_f: f64,
        xs_a: f64,
        xs_s: f64,
        rng: &mut RandomStreams,
    ) -> KeffResult<Self> {
        if n_nuclides == 0 {
            return Err(KeffError::Config(
                "material needs at least one nuclide".to_string(),
            ));
        }

        let mut nuclides = Vec::with_capacity(n_nuclides);
        let mut budget = TOTAL_ATOM_DENSITY;
        let (mut sum_f, mut sum_a, mut sum_s) = (0.0, 0.0, 0.0);

        for i in 0..n_nuclides {
            let atom_density = if i + 1 < n_nuclides {
                let d = fraction(rng)? * budget;
                budget -= d;
                d
            } else {
                budget
            };
            let raw_a = fraction(rng)?;
            let raw_f = fraction(rng)?;
            let raw_s = fraction(rng)?;
            sum_a += raw_a * atom_density;
            sum_f += raw_f * atom_density;
            sum_s += raw_s * atom_density;
            nuclides.push(Nuclide {
                xs_f: raw_f,
                xs_a: raw_a,
                xs_s: raw_s,
                xs_t: 0.0,
                atom_density,
            });
        }

        if n_nuclides == 1 {
            let only = &mut nuclides[0];
            only.xs_f = xs_f;
            only.xs_a = xs_a;
            only.xs_s = xs_s;
        } else {
            let scale_f = rescale_factor("fission", sum_f, xs_f)?;
            let scale_a = rescale_factor("absorption", sum_a, xs_a)?;
            let scale_s = rescale_factor("scattering", sum_s, xs_s)?;
            for n in nuclides.iter_mut() {
                n.xs_f *= scale_f;
                n.xs_a *= scale_a;
                n.xs_s *= scale_s;
            }
        }

        for (i, n) in nuclides.iter_mut().enumerate() {
            n.xs_t = n.xs_a + n.xs_s;
            if n.xs_f > n.xs_a {
                log::warn!(
                    "nuclide {i}: microscopic fission {:.4e} exceeds absorption {:.4e}",
                    n.xs_f,
                    n.xs_a
                );
            }
        }

        Ok(Material {
            nuclides,
            xs_f,
            xs_a,
            xs_s,
            xs_t: xs_a + xs_s,
        })
    }

    pub fn from_params(params: &MaterialParams, rng: &mut RandomStreams) -> KeffResult<Self> {
        Self::build(
            params.nuclides,
            params.xs_fission,
            params.xs_absorption,
            params.xs_scatter,
            rng,
        )
    }

    /// Collision nuclide for a uniform `xi` on [0, 1), by cumulative
    /// density × Σt. Round-off past the last bin selects the last nuclide.
    pub fn sample_nuclide(&self, xi: f64) -> &Nuclide {
        let cutoff = xi * self.xs_t;
        let mut cum = 0.0;
        for n in &self.nuclides {
            cum += n.atom_density * n.xs_t;
            if cutoff < cum {
                return n;
            }
        }
        // build() guarantees at least one nuclide
        &self.nuclides[self.nuclides.len() - 1]
    }

    /// Reaction on `nuclide` for a uniform `xi` on [0, 1).
    pub fn sample_reaction(nuclide: &Nuclide, xi: f64) -> Reaction {
        let cutoff = xi * nuclide.xs_t;
        if cutoff < nuclide.xs_f {
            Reaction::Fission
        } else if cutoff < nuclide.xs_a {
            Reaction::Absorption
        } else {
            Reaction::Scatter
        }
    }

    pub fn weighted_sums(&self) -> [f64; 3] {
        self.nuclides.iter().fold([0.0; 3], |acc, n| {
            [
                acc[0] + n.atom_density * n.xs_f,
                acc[1] + n.atom_density * n.xs_a,
                acc[2] + n.atom_density * n.xs_s,
            ]
        })
    }

    pub fn total_density(&self) -> f64 {
        self.nuclides.iter().map(|n| n.atom_density).sum()
    }
}
