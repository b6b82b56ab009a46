use std::collections::{BTreeSet, HashMap};

use super::Calculator;
use crate::data::model::PeptideKey;
use crate::error::CalculatorError;

/// Name of the internal calculator used for run-to-run alignment.
pub const RUN_TO_RUN_NAME: &str = "run-to-run";

/// Calculator backed by a fixed peptide → score table.
///
/// Imported score columns become dictionary calculators, and run-to-run
/// alignment uses one whose "scores" are the original run's measured times.
#[derive(Debug, Clone)]
pub struct DictionaryCalculator {
    name: String,
    scores: HashMap<PeptideKey, f64>,
    standards: BTreeSet<PeptideKey>,
    connected: bool,
}

impl DictionaryCalculator {
    pub fn new(
        name: impl Into<String>,
        scores: impl IntoIterator<Item = (PeptideKey, f64)>,
    ) -> Self {
        DictionaryCalculator {
            name: name.into(),
            scores: scores.into_iter().collect(),
            standards: BTreeSet::new(),
            connected: true,
        }
    }

    /// Calculator for run-to-run alignment over the original run's times.
    /// Unobserved (zero) times are left out so they never score.
    pub fn run_to_run(original_times: impl IntoIterator<Item = (PeptideKey, f64)>) -> Self {
        Self::new(
            RUN_TO_RUN_NAME,
            original_times.into_iter().filter(|(_, t)| *t != 0.0),
        )
    }

    pub fn with_standards(mut self, standards: impl IntoIterator<Item = PeptideKey>) -> Self {
        self.standards = standards.into_iter().collect();
        self
    }

    /// Mark the backing store as unreachable.
    pub fn disconnected(mut self) -> Self {
        self.connected = false;
        self
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    fn check_connected(&self) -> Result<(), CalculatorError> {
        if self.connected {
            Ok(())
        } else {
            Err(CalculatorError::Disconnected {
                name: self.name.clone(),
            })
        }
    }
}

impl Calculator for DictionaryCalculator {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_usable(&self) -> bool {
        self.connected
    }

    fn score(&self, peptide: &PeptideKey) -> Result<f64, CalculatorError> {
        self.check_connected()?;
        self.scores
            .get(peptide)
            .copied()
            .ok_or_else(|| CalculatorError::UnknownPeptide {
                name: self.name.clone(),
                peptide: peptide.clone(),
            })
    }

    fn required_standards(
        &self,
        peptides: &[PeptideKey],
    ) -> Result<BTreeSet<PeptideKey>, CalculatorError> {
        self.check_connected()?;
        let present: BTreeSet<PeptideKey> = peptides
            .iter()
            .filter(|p| self.standards.contains(*p))
            .cloned()
            .collect();
        if present.len() < self.standards.len() {
            return Err(CalculatorError::IncompleteStandards {
                name: self.name.clone(),
                missing: self.standards.len() - present.len(),
            });
        }
        Ok(present)
    }
}
