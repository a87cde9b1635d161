// ─────────────────────────────────────────────────────────────────────
// SCPN Criticality — Config
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use crate::constants::*;
use crate::error::{KeffError, KeffResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Behaviour of a particle reaching the outer surface of the global cube.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundaryCondition {
    /// Particle leaks and its history ends.
    Vacuum,
    /// Normal direction component is negated.
    #[default]
    Reflect,
    /// Particle re-enters through the opposite face.
    Periodic,
}

impl fmt::Display for BoundaryCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BoundaryCondition::Vacuum => "vacuum",
            BoundaryCondition::Reflect => "reflect",
            BoundaryCondition::Periodic => "periodic",
        };
        f.write_str(name)
    }
}

impl FromStr for BoundaryCondition {
    type Err = KeffError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vacuum" | "0" => Ok(BoundaryCondition::Vacuum),
            "reflect" | "reflective" | "1" => Ok(BoundaryCondition::Reflect),
            "periodic" | "2" => Ok(BoundaryCondition::Periodic),
            other => Err(KeffError::Config(format!(
                "Unknown boundary condition '{other}' (expected vacuum, reflect or periodic)"
            ))),
        }
    }
}

/// Complete run configuration. Immutable once validated.
/// Every field is optional in the JSON parameter file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default)]
    pub run: RunParams,
    #[serde(default)]
    pub geometry: GeometryParams,
    #[serde(default)]
    pub material: MaterialParams,
    #[serde(default)]
    pub output: OutputParams,
}

/// Particle population and batch schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunParams {
    /// Global source population per generation.
    #[serde(default = "default_particles")]
    pub particles: u64,
    #[serde(default = "default_batches")]
    pub batches: usize,
    /// Generations per batch.
    #[serde(default = "default_generations")]
    pub generations: usize,
    /// Trailing batches that contribute to statistics and tallies.
    #[serde(default = "default_active")]
    pub active: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryParams {
    /// Global cube edge lengths [cm].
    #[serde(default = "default_cube")]
    pub cube: [f64; 3],
    /// Process-grid shape; its volume must equal the rank count.
    #[serde(default = "default_grid")]
    pub grid: [usize; 3],
    #[serde(default)]
    pub boundary: BoundaryCondition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialParams {
    #[serde(default = "default_nuclides")]
    pub nuclides: usize,
    #[serde(default = "default_nu")]
    pub nu: f64,
    #[serde(default = "default_xs_fission")]
    pub xs_fission: f64,
    #[serde(default = "default_xs_absorption")]
    pub xs_absorption: f64,
    #[serde(default = "default_xs_scatter")]
    pub xs_scatter: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputParams {
    /// Score the scalar-flux tally during active batches.
    #[serde(default = "default_tally")]
    pub tally: bool,
    /// Tally bins per axis over the whole cube.
    #[serde(default = "default_bins")]
    pub bins: usize,
    #[serde(default)]
    pub write_tally: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tally_file: Option<PathBuf>,
    #[serde(default)]
    pub write_keff: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keff_file: Option<PathBuf>,
}

fn default_particles() -> u64 {
    DEFAULT_PARTICLES
}
fn default_batches() -> usize {
    DEFAULT_BATCHES
}
fn default_generations() -> usize {
    DEFAULT_GENERATIONS
}
fn default_active() -> usize {
    DEFAULT_ACTIVE
}
fn default_seed() -> u64 {
    DEFAULT_SEED
}
fn default_cube() -> [f64; 3] {
    [DEFAULT_CUBE_EDGE; 3]
}
fn default_grid() -> [usize; 3] {
    [1, 1, 1]
}
fn default_nuclides() -> usize {
    DEFAULT_NUCLIDES
}
fn default_nu() -> f64 {
    DEFAULT_NU
}
fn default_xs_fission() -> f64 {
    DEFAULT_XS_FISSION
}
fn default_xs_absorption() -> f64 {
    DEFAULT_XS_ABSORPTION
}
fn default_xs_scatter() -> f64 {
    DEFAULT_XS_SCATTER
}
fn default_tally() -> bool {
    true
}
fn default_bins() -> usize {
    DEFAULT_BINS
}

impl Default for RunParams {
    fn default() -> Self {
        RunParams {
            particles: default_particles(),
            batches: default_batches(),
            generations: default_generations(),
            active: default_active(),
            seed: default_seed(),
        }
    }
}

impl Default for GeometryParams {
    fn default() -> Self {
        GeometryParams {
            cube: default_cube(),
            grid: default_grid(),
            boundary: BoundaryCondition::default(),
        }
    }
}

impl Default for MaterialParams {
    fn default() -> Self {
        MaterialParams {
            nuclides: default_nuclides(),
            nu: default_nu(),
            xs_fission: default_xs_fission(),
            xs_absorption: default_xs_absorption(),
            xs_scatter: default_xs_scatter(),
        }
    }
}

impl Default for OutputParams {
    fn default() -> Self {
        OutputParams {
            tally: default_tally(),
            bins: default_bins(),
            write_tally: false,
            tally_file: None,
            write_keff: false,
            keff_file: None,
        }
    }
}

impl SimulationConfig {
    /// Load from a JSON parameter file. Missing keys keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> KeffResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        Ok(config)
    }

    pub fn grid_volume(&self) -> usize {
        self.geometry.grid.iter().product()
    }

    pub fn inactive_batches(&self) -> usize {
        self.run.batches.saturating_sub(self.run.active)
    }

    /// Index among active batches, or None while the source is still converging.
    pub fn active_index(&self, batch: usize) -> Option<usize> {
        batch.checked_sub(self.inactive_batches())
    }

    /// Tally dump path, only when the dump is both enabled and has a destination.
    pub fn tally_destination(&self) -> Option<&Path> {
        match (&self.output.tally_file, self.output.write_tally && self.output.tally) {
            (Some(path), true) => Some(path.as_path()),
            _ => None,
        }
    }

    pub fn keff_destination(&self) -> Option<&Path> {
        match (&self.output.keff_file, self.output.write_keff) {
            (Some(path), true) => Some(path.as_path()),
            _ => None,
        }
    }

    /// Check the process-grid volume against the number of ranks in the world.
    pub fn validate_process_grid(&self, size: usize) -> KeffResult<()> {
        let volume = self.grid_volume();
        if volume != size {
            return Err(KeffError::ProcessGridMismatch {
                grid: self.geometry.grid,
                volume,
                size,
            });
        }
        Ok(())
    }

    /// Parameter sanity checks that do not depend on the runtime.
    pub fn validate(&self) -> KeffResult<()> {
        let run = &self.run;
        if run.particles == 0 {
            return Err(KeffError::Config("particles must be >= 1".to_string()));
        }
        if run.batches == 0 || run.generations == 0 {
            return Err(KeffError::Config(
                "batches and generations must be >= 1".to_string(),
            ));
        }
        if run.active == 0 || run.active > run.batches {
            return Err(KeffError::Config(format!(
                "active batches must be in [1, {}], got {}",
                run.batches, run.active
            )));
        }

        let geo = &self.geometry;
        if geo.cube.iter().any(|l| !l.is_finite() || *l <= 0.0) {
            return Err(KeffError::Config(format!(
                "cube edge lengths must be finite and > 0, got {:?}",
                geo.cube
            )));
        }
        if geo.grid.iter().any(|&p| p == 0) {
            return Err(KeffError::Config(format!(
                "process grid extents must be >= 1, got {:?}",
                geo.grid
            )));
        }

        let mat = &self.material;
        if mat.nuclides == 0 {
            return Err(KeffError::Config("nuclides must be >= 1".to_string()));
        }
        if !mat.nu.is_finite() || mat.nu <= 0.0 {
            return Err(KeffError::Config(format!(
                "nu must be finite and > 0, got {}",
                mat.nu
            )));
        }
        let xs = [mat.xs_fission, mat.xs_absorption, mat.xs_scatter];
        if xs.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(KeffError::Config(format!(
                "cross sections must be finite and >= 0, got {xs:?}"
            )));
        }
        if mat.xs_fission > mat.xs_absorption {
            return Err(KeffError::Config(format!(
                "fission cross section {} exceeds absorption cross section {}",
                mat.xs_fission, mat.xs_absorption
            )));
        }
        // Without absorption a history under reflecting or periodic
        // boundaries scatters forever.
        if mat.xs_absorption <= 0.0 {
            return Err(KeffError::Config(format!(
                "absorption cross section must be > 0, got {}",
                mat.xs_absorption
            )));
        }

        let out = &self.output;
        if out.bins == 0 {
            return Err(KeffError::Config("bins must be >= 1".to_string()));
        }
        if let Some(p) = geo.grid.iter().find(|&&p| out.bins % p != 0) {
            return Err(KeffError::Config(format!(
                "bins ({}) must be divisible by every process-grid extent (got {p})",
                out.bins
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_reference_problem() {
        let cfg = SimulationConfig::default();
        assert_eq!(cfg.run.particles, 1_000_000);
        assert_eq!(cfg.run.batches, 10);
        assert_eq!(cfg.run.generations, 1);
        assert_eq!(cfg.run.active, 10);
        assert_eq!(cfg.geometry.boundary, BoundaryCondition::Reflect);
        assert_eq!(cfg.geometry.grid, [1, 1, 1]);
        assert!((cfg.material.nu - 2.5).abs() < 1e-12);
        assert!((cfg.material.xs_absorption + cfg.material.xs_scatter - 0.3).abs() < 1e-12);
        assert!(cfg.output.tally);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let json = r#"{ "run": { "particles": 5000, "active": 4 },
                        "geometry": { "grid": [2, 1, 1], "boundary": "vacuum" } }"#;
        let cfg: SimulationConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.run.particles, 5000);
        assert_eq!(cfg.run.active, 4);
        assert_eq!(cfg.run.batches, 10);
        assert_eq!(cfg.geometry.grid, [2, 1, 1]);
        assert_eq!(cfg.geometry.boundary, BoundaryCondition::Vacuum);
        assert_eq!(cfg.geometry.cube, [400.0; 3]);
        assert_eq!(cfg.material.nuclides, 1);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "material": {{ "nuclides": 4 }} }}"#).unwrap();
        let cfg = SimulationConfig::from_file(file.path()).unwrap();
        assert_eq!(cfg.material.nuclides, 4);
    }

    #[test]
    fn test_from_file_reports_bad_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let err = SimulationConfig::from_file(file.path()).expect_err("bad JSON must fail");
        assert!(matches!(err, KeffError::Json(_)));
    }

    #[test]
    fn test_process_grid_mismatch() {
        let mut cfg = SimulationConfig::default();
        cfg.geometry.grid = [2, 2, 2];
        assert!(cfg.validate_process_grid(8).is_ok());
        match cfg.validate_process_grid(4) {
            Err(KeffError::ProcessGridMismatch { volume, size, .. }) => {
                assert_eq!(volume, 8);
                assert_eq!(size, 4);
            }
            other => panic!("Unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_validate_rejects_bad_parameters() {
        let mut cfg = SimulationConfig::default();
        cfg.run.active = 11;
        assert!(cfg.validate().is_err());

        let mut cfg = SimulationConfig::default();
        cfg.material.xs_fission = 0.05;
        assert!(cfg.validate().is_err());

        let mut cfg = SimulationConfig::default();
        cfg.geometry.cube[1] = f64::NAN;
        assert!(cfg.validate().is_err());

        let mut cfg = SimulationConfig::default();
        cfg.geometry.grid = [3, 1, 1];
        let err = cfg.validate().expect_err("16 bins cannot split over 3 ranks");
        assert!(err.to_string().contains("divisible"));
    }

    #[test]
    fn test_validate_rejects_pure_scatterer() {
        for boundary in [
            BoundaryCondition::Reflect,
            BoundaryCondition::Periodic,
            BoundaryCondition::Vacuum,
        ] {
            let mut cfg = SimulationConfig::default();
            cfg.geometry.boundary = boundary;
            cfg.material.xs_fission = 0.0;
            cfg.material.xs_absorption = 0.0;
            cfg.material.xs_scatter = 0.27;
            match cfg.validate() {
                Err(KeffError::Config(msg)) => assert!(msg.contains("absorption")),
                other => panic!("Unexpected result: {other:?}"),
            }
        }
    }

    #[test]
    fn test_active_index_schedule() {
        let mut cfg = SimulationConfig::default();
        cfg.run.batches = 5;
        cfg.run.active = 2;
        assert_eq!(cfg.inactive_batches(), 3);
        assert_eq!(cfg.active_index(2), None);
        assert_eq!(cfg.active_index(3), Some(0));
        assert_eq!(cfg.active_index(4), Some(1));
    }

    #[test]
    fn test_output_destinations_need_toggle_and_path() {
        let mut cfg = SimulationConfig::default();
        cfg.output.keff_file = Some(PathBuf::from("keff.json"));
        assert!(cfg.keff_destination().is_none());
        cfg.output.write_keff = true;
        assert_eq!(cfg.keff_destination(), Some(Path::new("keff.json")));

        cfg.output.write_tally = true;
        assert!(cfg.tally_destination().is_none());
        cfg.output.tally_file = Some(PathBuf::from("flux.npy"));
        assert!(cfg.tally_destination().is_some());
        cfg.output.tally = false;
        assert!(cfg.tally_destination().is_none());
    }

    #[test]
    fn test_boundary_condition_parsing() {
        assert_eq!("Reflect".parse::<BoundaryCondition>().unwrap(), BoundaryCondition::Reflect);
        assert_eq!("0".parse::<BoundaryCondition>().unwrap(), BoundaryCondition::Vacuum);
        assert_eq!(" periodic ".parse::<BoundaryCondition>().unwrap(), BoundaryCondition::Periodic);
        assert!("mirror".parse::<BoundaryCondition>().is_err());
        assert_eq!(BoundaryCondition::Periodic.to_string(), "periodic");
    }

    #[test]
    fn test_roundtrip_serialization() {
        let mut cfg = SimulationConfig::default();
        cfg.output.tally_file = Some(PathBuf::from("out/flux.npy"));
        let json = serde_json::to_string_pretty(&cfg).unwrap();
        let cfg2: SimulationConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg, cfg2);
    }
}
