use thiserror::Error;

use crate::data::model::PeptideKey;

// ---------------------------------------------------------------------------
// Calculator faults
// ---------------------------------------------------------------------------

/// A fault raised by a retention score calculator.
///
/// These never escape the scoring path on their own: the score cache and the
/// outlier refiner downgrade them to "no data" for the affected peptide.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalculatorError {
    #[error("calculator '{name}' is not connected to its backing store")]
    Disconnected { name: String },

    #[error("calculator '{name}' has no score for {peptide}")]
    UnknownPeptide { name: String, peptide: PeptideKey },

    #[error("calculator '{name}' is missing {missing} of its standard peptides")]
    IncompleteStandards { name: String, missing: usize },
}

// ---------------------------------------------------------------------------
// Session construction errors
// ---------------------------------------------------------------------------

/// Conditions surfaced to the caller while building or scheduling a session.
#[derive(Debug, Error)]
pub enum AlignmentError {
    /// An explicitly chosen calculator cannot produce a regression and it is
    /// not the calculator the previous session was already bound to.
    #[error("the retention time calculator '{name}' is not connected to its database")]
    CalculatorDisconnected { name: String },

    #[error("run-to-run regression requires an original replicate")]
    MissingOriginalRun,

    #[error("replicate index {index} is out of range ({count} replicates)")]
    ReplicateOutOfRange { index: usize, count: usize },

    #[error("failed to start background refinement")]
    Worker(#[from] std::io::Error),
}
