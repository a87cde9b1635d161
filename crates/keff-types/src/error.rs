// ─────────────────────────────────────────────────────────────────────
// SCPN Criticality — Error Taxonomy
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use std::fmt;
use thiserror::Error;

/// Stage of a rank's lifecycle, attached to fatal errors for diagnosis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Setup,
    SourceSampling,
    Transport,
    Handoff,
    PopulationControl,
    Reduction,
    Output,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Setup => "setup",
            Phase::SourceSampling => "source sampling",
            Phase::Transport => "transport",
            Phase::Handoff => "particle hand-off",
            Phase::PopulationControl => "population control",
            Phase::Reduction => "reduction",
            Phase::Output => "output",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum KeffError {
    #[error("Product of processes per dimension {grid:?} = {volume} != total process count {size}")]
    ProcessGridMismatch {
        grid: [usize; 3],
        volume: usize,
        size: usize,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Bank allocation failed while growing to {requested} sites")]
    BankAllocation { requested: usize },

    #[error("Invalid sample: {0}")]
    InvalidSample(String),

    #[error("Wire format error: {0}")]
    Wire(String),

    #[error("Communication failure on rank {rank}: {message}")]
    Communication { rank: usize, message: String },

    #[error("Rank {rank} observed abort: {reason}")]
    Aborted { rank: usize, reason: String },

    #[error("Particle population extinct in batch {batch}, generation {generation}")]
    PopulationExtinct { batch: usize, generation: usize },

    #[error("Output error: {0}")]
    Output(String),

    #[error("Rank {rank} failed during {phase}: {source}")]
    Rank {
        rank: usize,
        phase: Phase,
        #[source]
        source: Box<KeffError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl KeffError {
    /// Attach rank and phase context. Already-contextualised errors pass through.
    pub fn in_phase(self, rank: usize, phase: Phase) -> Self {
        match self {
            KeffError::Rank { .. } | KeffError::Aborted { .. } => self,
            other => KeffError::Rank {
                rank,
                phase,
                source: Box::new(other),
            },
        }
    }

    /// The underlying error with all rank/phase wrappers removed.
    pub fn root_cause(&self) -> &KeffError {
        match self {
            KeffError::Rank { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// True when this rank only stopped because another rank failed first.
    pub fn is_secondary_abort(&self) -> bool {
        matches!(self.root_cause(), KeffError::Aborted { .. })
    }
}

pub type KeffResult<T> = Result<T, KeffError>;

/// Adds rank/phase context to a `KeffResult`.
pub trait PhaseContext<T> {
    fn phase(self, rank: usize, phase: Phase) -> KeffResult<T>;
}

impl<T> PhaseContext<T> for KeffResult<T> {
    fn phase(self, rank: usize, phase: Phase) -> KeffResult<T> {
        self.map_err(|e| e.in_phase(rank, phase))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_mismatch_message_names_both_counts() {
        let err = KeffError::ProcessGridMismatch {
            grid: [2, 2, 2],
            volume: 8,
            size: 4,
        };
        let msg = err.to_string();
        assert!(msg.contains("[2, 2, 2]"));
        assert!(msg.contains("= 8"));
        assert!(msg.contains("count 4"));
    }

    #[test]
    fn test_in_phase_wraps_once() {
        let err = KeffError::InvalidSample("mu = 1.5".to_string())
            .in_phase(3, Phase::Transport)
            .in_phase(0, Phase::Output);
        match &err {
            KeffError::Rank { rank, phase, .. } => {
                assert_eq!(*rank, 3);
                assert_eq!(*phase, Phase::Transport);
            }
            other => panic!("Unexpected error: {other:?}"),
        }
        assert!(matches!(err.root_cause(), KeffError::InvalidSample(_)));
        assert!(err.to_string().contains("during transport"));
    }

    #[test]
    fn test_aborts_are_not_wrapped() {
        let err = KeffError::Aborted {
            rank: 1,
            reason: "rank 0 failed".to_string(),
        }
        .in_phase(1, Phase::Reduction);
        assert!(err.is_secondary_abort());
        assert!(matches!(err, KeffError::Aborted { .. }));
    }

    #[test]
    fn test_phase_context_on_result() {
        let res: KeffResult<()> = Err(KeffError::Output("disk full".to_string()));
        let err = res.phase(2, Phase::Output).expect_err("must stay an error");
        assert!(err.to_string().starts_with("Rank 2 failed during output"));
    }
}
