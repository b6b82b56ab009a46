//! Per-calculator score memoization.
//!
//! Each calculator's scores live in their own shared table. Deriving a cache
//! from a previous session's cache shares those tables; the first write to a
//! shared table copies it, so two sessions extending the same parent never
//! see each other's entries.

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;

use super::Calculator;
use crate::data::model::{MeasuredTime, PeptideKey};
use crate::error::CalculatorError;
use crate::regression::Measurement;

type ScoreTable = HashMap<PeptideKey, f64>;

#[derive(Debug, Clone, Default)]
pub struct ScoreCache {
    tables: HashMap<String, Arc<ScoreTable>>,
}

impl ScoreCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from `previous`'s entries, or empty.
    pub fn derive(previous: Option<&ScoreCache>) -> Self {
        previous.cloned().unwrap_or_default()
    }

    pub fn cached(&self, calculator: &str, peptide: &PeptideKey) -> Option<f64> {
        self.tables.get(calculator)?.get(peptide).copied()
    }

    /// Cached score, or compute and remember it. Faults are not cached.
    pub fn get_score(
        &mut self,
        calculator: &dyn Calculator,
        peptide: &PeptideKey,
    ) -> Result<f64, CalculatorError> {
        if let Some(score) = self.cached(calculator.name(), peptide) {
            return Ok(score);
        }
        let score = calculator.score(peptide)?;
        let table = self.tables.entry(calculator.name().to_string()).or_default();
        Arc::make_mut(table).insert(peptide.clone(), score);
        Ok(score)
    }

    /// Drop and recompute every entry belonging to `calculator`, leaving
    /// other calculators' entries untouched.
    pub fn recalculate_for(&mut self, calculator: &dyn Calculator) {
        let Some(stale) = self.tables.get(calculator.name()) else {
            return;
        };
        let mut fresh = ScoreTable::with_capacity(stale.len());
        for peptide in stale.keys() {
            match calculator.score(peptide) {
                Ok(score) => {
                    fresh.insert(peptide.clone(), score);
                }
                Err(e) => debug!("Dropping cached score: {e}"),
            }
        }
        debug!(
            "Recalculated {} scores for calculator {}",
            fresh.len(),
            calculator.name()
        );
        self.tables
            .insert(calculator.name().to_string(), Arc::new(fresh));
    }

    /// Pair each measured time with its score. Unscorable peptides get a NaN
    /// score so they stay in place but never enter a fit.
    pub fn score_times(
        &mut self,
        calculator: &dyn Calculator,
        times: &[MeasuredTime],
    ) -> Vec<Measurement> {
        let mut faults = 0;
        let measurements: Vec<Measurement> = times
            .iter()
            .map(|t| {
                let x = self.get_score(calculator, &t.key).unwrap_or_else(|_| {
                    faults += 1;
                    f64::NAN
                });
                Measurement::new(t.key.clone(), x, t.time)
            })
            .collect();
        if faults > 0 {
            debug!("{faults} peptides have no {} score", calculator.name());
        }
        measurements
    }

    /// Total number of cached scores across calculators.
    pub fn len(&self) -> usize {
        self.tables.values().map(|t| t.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn calculator_len(&self, calculator: &str) -> usize {
        self.tables.get(calculator).map_or(0, |t| t.len())
    }
}
