// ─────────────────────────────────────────────────────────────────────
// SCPN Criticality — Result Files
// © 1998–2026 Miroslav Šotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! keff sequence as JSON, tally as a 4-D `.npy` (active batch × x × y × z).

use keff_types::error::{KeffError, KeffResult};
use ndarray::{Array3, Array4, Axis};
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeffDump<'a> {
    pub batch_keff: &'a [f64],
    pub active_keff: &'a [f64],
    pub mean: Option<f64>,
    pub std: Option<f64>,
}

pub fn write_keff(path: &Path, dump: &KeffDump<'_>) -> KeffResult<()> {
    let json = serde_json::to_string_pretty(dump)?;
    std::fs::write(path, json)?;
    log::info!("keff sequence written to {}", path.display());
    Ok(())
}

pub fn write_tally(path: &Path, tallies: &[Array3<f64>]) -> KeffResult<()> {
    let views: Vec<_> = tallies.iter().map(|t| t.view()).collect();
    let stacked: Array4<f64> = if views.is_empty() {
        Array4::zeros((0, 0, 0, 0))
    } else {
        ndarray::stack(Axis(0), &views)
            .map_err(|e| KeffError::Output(format!("tally batches differ in shape: {e}")))?
    };
    ndarray_npy::write_npy(path, &stacked)
        .map_err(|e| KeffError::Output(format!("failed to write {}: {e}", path.display())))?;
    log::info!(
        "tally of {} active batches written to {}",
        tallies.len(),
        path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray_npy::read_npy;

    #[test]
    fn test_write_tally_stacks_batches() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("tally.npy");
        let a = Array3::from_elem((2, 2, 2), 1.0);
        let b = Array3::from_elem((2, 2, 2), 3.0);
        write_tally(&path, &[a, b]).expect("write");
        let back: Array4<f64> = read_npy(&path).expect("read");
        assert_eq!(back.dim(), (2, 2, 2, 2));
        assert_eq!(back[[1, 1, 1, 1]], 3.0);
    }

    #[test]
    fn test_write_keff_json() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("keff.json");
        let batch = [1.1, 0.9, 1.0];
        let dump = KeffDump {
            batch_keff: &batch,
            active_keff: &batch[1..],
            mean: Some(0.95),
            std: None,
        };
        write_keff(&path, &dump).expect("write");
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).expect("read")).expect("json");
        assert_eq!(value["active_keff"].as_array().map(|a| a.len()), Some(2));
        assert!(value["std"].is_null());
    }

    #[test]
    fn test_unwritable_path_is_output_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("missing").join("tally.npy");
        let err = write_tally(&path, &[Array3::zeros((1, 1, 1))]).expect_err("no parent dir");
        assert!(matches!(err, KeffError::Output(_)));
    }
}
