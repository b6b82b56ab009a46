use log::info;

use super::{AlignmentSession, RefineOutcome, SessionRequest};
use crate::calc::CalculatorRegistry;
use crate::data::model::{Document, PeptideKey};
use crate::error::AlignmentError;
use crate::regression::{Measurement, Regression, RegressionModel};

/// A session point's peptide and its position in the document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeptideRef {
    pub key: PeptideKey,
    pub doc_index: usize,
}

impl PeptideRef {
    pub fn new(key: PeptideKey, doc_index: usize) -> Self {
        PeptideRef { key, doc_index }
    }
}

impl AlignmentSession {
    /// The refined regression if there is one, else the unrefined one.
    pub fn best_regression(&self) -> Option<&Regression> {
        self.refined
            .as_ref()
            .map(|r| &r.regression)
            .or(self.regression.as_ref())
    }

    /// Model residuals are reported against: the document's predictor, the
    /// refined model or the unrefined one, in that order.
    pub fn residuals_model(&self) -> Option<&RegressionModel> {
        self.predictor
            .as_ref()
            .or_else(|| self.best_regression())
            .map(|r| &r.model)
    }

    pub fn is_outlier(&self, index: usize) -> bool {
        self.refined.as_ref().is_some_and(|r| r.is_outlier(index))
    }

    fn plotted(&self) -> impl Iterator<Item = (usize, &Measurement)> + '_ {
        self.measurements
            .iter()
            .enumerate()
            .filter(|(_, m)| m.is_observed())
    }

    /// Plotted points kept by the regression, in measurement order.
    pub fn inliers(&self) -> Vec<(f64, f64)> {
        self.plotted()
            .filter(|(i, _)| !self.is_outlier(*i))
            .map(|(_, m)| (m.x, m.y))
            .collect()
    }

    /// Plotted points rejected by refinement, in measurement order.
    pub fn outliers(&self) -> Vec<(f64, f64)> {
        self.plotted()
            .filter(|(i, _)| self.is_outlier(*i))
            .map(|(_, m)| (m.x, m.y))
            .collect()
    }

    pub fn outlier_peptides(&self) -> Vec<&PeptideRef> {
        self.plotted()
            .filter(|(i, _)| self.is_outlier(*i))
            .map(|(i, _)| &self.peptides[i])
            .collect()
    }

    pub fn has_outliers(&self) -> bool {
        self.plotted().any(|(i, _)| self.is_outlier(i))
    }

    /// Where `key` is plotted, if it is.
    pub fn point_for(&self, key: &PeptideKey) -> Option<(f64, f64)> {
        self.plotted()
            .find(|(i, _)| self.peptides[*i].key == *key)
            .map(|(_, m)| (m.x, m.y))
    }

    /// The plotted peptide nearest to `(x, y)`, if within `tolerance`.
    pub fn peptide_at(&self, x: f64, y: f64, tolerance: f64) -> Option<&PeptideRef> {
        self.plotted()
            .map(|(i, m)| (i, (m.x - x).hypot(m.y - y)))
            .filter(|(_, distance)| *distance <= tolerance)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| &self.peptides[i])
    }

    /// Measured minus predicted time for each plotted peptide.
    pub fn residuals(&self) -> Vec<(&PeptideRef, f64)> {
        let Some(model) = self.residuals_model() else {
            return Vec::new();
        };
        self.plotted()
            .map(|(i, m)| (&self.peptides[i], model.residual(m.x, m.y)))
            .collect()
    }
}

/// Peptides rejected when regressing every replicate's average time against
/// the automatically chosen calculator.
pub fn calc_outliers(
    document: &Document,
    registry: &CalculatorRegistry,
    threshold: f64,
    precision: Option<u32>,
    best_result: bool,
) -> Result<Vec<PeptideKey>, AlignmentError> {
    let request = SessionRequest {
        threshold,
        precision,
        best_result,
        refine: true,
        ..SessionRequest::default()
    };
    let session = AlignmentSession::build(document, registry, None, &request)?;
    let session = match session.try_refine(|| false) {
        RefineOutcome::Refined(refined) => refined,
        RefineOutcome::Unchanged => session,
    };
    let outliers: Vec<PeptideKey> = session
        .outlier_peptides()
        .into_iter()
        .map(|p| p.key.clone())
        .collect();
    info!("{} outliers in {}", outliers.len(), document.id());
    Ok(outliers)
}
