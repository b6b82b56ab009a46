use serde::{Deserialize, Serialize};

use super::model::{Document, Peptide};

// ---------------------------------------------------------------------------
// Point selection: which peptides contribute points to the regression
// ---------------------------------------------------------------------------

/// Which class of peptides a session plots.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum PointsType {
    /// Every non-decoy peptide.
    #[default]
    Targets,
    /// Only the document's retention time standards.
    Standards,
    /// Only decoy peptides.
    Decoys,
}

impl PointsType {
    /// Fall back to [`PointsType::Targets`] when the document has nothing of
    /// the requested class.
    pub fn effective(self, document: &Document) -> PointsType {
        match self {
            PointsType::Standards if !document.has_standards() => PointsType::Targets,
            PointsType::Decoys if !document.has_decoys() => PointsType::Targets,
            other => other,
        }
    }

    pub fn accepts(self, document: &Document, peptide: &Peptide) -> bool {
        match self {
            PointsType::Targets => !peptide.decoy,
            PointsType::Standards => document.is_standard(&peptide.key),
            PointsType::Decoys => peptide.decoy,
        }
    }
}

/// Return document indices of the peptides selected by `points`, in document
/// order. No fallback is applied here; see [`PointsType::effective`].
pub fn filtered_indices(document: &Document, points: PointsType) -> Vec<usize> {
    document
        .peptides
        .iter()
        .enumerate()
        .filter(|(_, pep)| points.accepts(document, pep))
        .map(|(i, _)| i)
        .collect()
}
