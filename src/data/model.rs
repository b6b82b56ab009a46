use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// PeptideKey – stable identity of a peptide within a document
// ---------------------------------------------------------------------------

/// Modified sequence text used as the peptide's identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeptideKey(String);

impl PeptideKey {
    pub fn new(sequence: impl Into<String>) -> Self {
        PeptideKey(sequence.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PeptideKey {
    fn from(s: &str) -> Self {
        PeptideKey::new(s)
    }
}

impl From<String> for PeptideKey {
    fn from(s: String) -> Self {
        PeptideKey(s)
    }
}

impl fmt::Display for PeptideKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// MeasuredTime – one (peptide, time) observation
// ---------------------------------------------------------------------------

/// A measured retention time. A time of `0.0` means "not observed".
#[derive(Debug, Clone, PartialEq)]
pub struct MeasuredTime {
    pub key: PeptideKey,
    pub time: f64,
}

impl MeasuredTime {
    pub fn new(key: PeptideKey, time: f64) -> Self {
        MeasuredTime { key, time }
    }
}

// ---------------------------------------------------------------------------
// Peptide – one row of the document
// ---------------------------------------------------------------------------

/// A peptide with its measured times across replicates.
#[derive(Debug, Clone, PartialEq)]
pub struct Peptide {
    pub key: PeptideKey,
    pub decoy: bool,
    /// Measured time per replicate, `None` where the peptide was not found.
    pub times: Vec<Option<f64>>,
    /// Replicate holding this peptide's best peak, if any.
    pub best_result: Option<usize>,
}

impl Peptide {
    pub fn new(key: impl Into<PeptideKey>, times: Vec<Option<f64>>) -> Self {
        Peptide {
            key: key.into(),
            decoy: false,
            times,
            best_result: None,
        }
    }

    pub fn decoy(mut self) -> Self {
        self.decoy = true;
        self
    }

    pub fn with_best_result(mut self, replicate: usize) -> Self {
        self.best_result = Some(replicate);
        self
    }

    /// Time in one replicate, or the mean over all replicates that observed
    /// the peptide when `replicate` is `None`.
    pub fn time(&self, replicate: Option<usize>) -> Option<f64> {
        match replicate {
            Some(i) => self.times.get(i).copied().flatten(),
            None => {
                let observed: Vec<f64> = self.times.iter().filter_map(|t| *t).collect();
                if observed.is_empty() {
                    None
                } else {
                    Some(observed.iter().sum::<f64>() / observed.len() as f64)
                }
            }
        }
    }

    /// Time in the replicate holding the best peak.
    pub fn best_time(&self) -> Option<f64> {
        self.best_result.and_then(|i| self.time(Some(i)))
    }
}

// ---------------------------------------------------------------------------
// PredictionModel – the document's configured retention time predictor
// ---------------------------------------------------------------------------

/// Linear predictor stored with the document settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionModel {
    pub calculator: String,
    pub slope: f64,
    pub intercept: f64,
    #[serde(default)]
    pub window: f64,
}

// ---------------------------------------------------------------------------
// Document – an immutable snapshot of the peptide list
// ---------------------------------------------------------------------------

static NEXT_DOCUMENT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a document snapshot.
///
/// Every constructed [`Document`] gets a fresh id, so two snapshots with equal
/// contents are still different documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(u64);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "doc#{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct Document {
    id: DocumentId,
    /// Replicate (run) names, indexing `Peptide::times`.
    pub replicates: Vec<String>,
    pub peptides: Vec<Peptide>,
    /// Retention time standard peptides declared by the document.
    pub standards: BTreeSet<PeptideKey>,
    pub prediction: Option<PredictionModel>,
}

impl Document {
    pub fn new(replicates: Vec<String>, peptides: Vec<Peptide>) -> Self {
        Document {
            id: DocumentId(NEXT_DOCUMENT_ID.fetch_add(1, Ordering::Relaxed)),
            replicates,
            peptides,
            standards: BTreeSet::new(),
            prediction: None,
        }
    }

    pub fn with_standards(mut self, standards: impl IntoIterator<Item = PeptideKey>) -> Self {
        self.standards = standards.into_iter().collect();
        self
    }

    pub fn with_prediction(mut self, prediction: PredictionModel) -> Self {
        self.prediction = Some(prediction);
        self
    }

    pub fn id(&self) -> DocumentId {
        self.id
    }

    /// Number of peptides.
    pub fn len(&self) -> usize {
        self.peptides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peptides.is_empty()
    }

    pub fn replicate_count(&self) -> usize {
        self.replicates.len()
    }

    pub fn is_standard(&self, key: &PeptideKey) -> bool {
        self.standards.contains(key)
    }

    /// Whether any peptide in the document is a declared standard.
    pub fn has_standards(&self) -> bool {
        self.peptides.iter().any(|p| self.is_standard(&p.key))
    }

    pub fn has_decoys(&self) -> bool {
        self.peptides.iter().any(|p| p.decoy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_get_distinct_ids() {
        let a = Document::new(vec!["r1".into()], Vec::new());
        let b = Document::new(vec!["r1".into()], Vec::new());
        assert_ne!(a.id(), b.id());
        assert_eq!(a.clone().id(), a.id());
    }

    #[test]
    fn time_without_replicate_averages_observed_runs() {
        let pep = Peptide::new("PEPTIDEK", vec![Some(10.0), None, Some(14.0)]);
        assert_eq!(pep.time(None), Some(12.0));
        assert_eq!(pep.time(Some(1)), None);
        assert_eq!(pep.time(Some(7)), None);
        assert_eq!(Peptide::new("X", vec![None]).time(None), None);
    }

    #[test]
    fn best_time_follows_best_result() {
        let pep = Peptide::new("PEPTIDEK", vec![Some(10.0), Some(11.5)]).with_best_result(1);
        assert_eq!(pep.best_time(), Some(11.5));
        assert_eq!(Peptide::new("X", vec![Some(1.0)]).best_time(), None);
    }

    #[test]
    fn standards_only_count_when_present() {
        let doc = Document::new(
            vec!["r1".into()],
            vec![Peptide::new("AAA", vec![Some(1.0)])],
        )
        .with_standards([PeptideKey::from("BBB")]);
        assert!(!doc.has_standards());
        assert!(!doc.has_decoys());
    }
}
