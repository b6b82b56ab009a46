//! Retention score calculators.
//!
//! A calculator maps a peptide to a number that correlates with its elution
//! time. Concrete predictors live outside this crate; the only built-in one is
//! the table-backed [`DictionaryCalculator`], which also serves run-to-run
//! alignment by echoing another run's measured times.

pub mod cache;
pub mod dictionary;
pub mod selector;

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::data::model::PeptideKey;
use crate::error::CalculatorError;

pub use cache::ScoreCache;
pub use dictionary::DictionaryCalculator;
pub use selector::{Binding, CalculatorSelector, Unbound};

/// Scoring capability consumed by the regression engine.
pub trait Calculator: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    /// Whether the calculator can currently produce scores at all.
    fn is_usable(&self) -> bool;

    fn score(&self, peptide: &PeptideKey) -> Result<f64, CalculatorError>;

    /// Standard peptides the calculator needs among `peptides` to stay
    /// calibrated. These are never rejected as outliers.
    fn required_standards(
        &self,
        peptides: &[PeptideKey],
    ) -> Result<BTreeSet<PeptideKey>, CalculatorError>;
}

pub type CalculatorRef = Arc<dyn Calculator>;

/// Identity comparison of two calculator handles.
pub fn same_calculator(a: &CalculatorRef, b: &CalculatorRef) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

pub(crate) fn same_binding(a: Option<&CalculatorRef>, b: Option<&CalculatorRef>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => same_calculator(a, b),
        (None, None) => true,
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// CalculatorRegistry – the user's ordered calculator list
// ---------------------------------------------------------------------------

/// Ordered list of candidate calculators. Automatic selection walks it in
/// order; explicit selection looks a calculator up by name.
#[derive(Debug, Clone, Default)]
pub struct CalculatorRegistry {
    calculators: Vec<CalculatorRef>,
}

impl CalculatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, calculator: CalculatorRef) {
        log::debug!("Registered calculator: {}", calculator.name());
        self.calculators.push(calculator);
    }

    pub fn by_name(&self, name: &str) -> Option<&CalculatorRef> {
        self.calculators.iter().find(|c| c.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CalculatorRef> {
        self.calculators.iter()
    }

    pub fn len(&self) -> usize {
        self.calculators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calculators.is_empty()
    }
}

impl FromIterator<CalculatorRef> for CalculatorRegistry {
    fn from_iter<I: IntoIterator<Item = CalculatorRef>>(iter: I) -> Self {
        CalculatorRegistry {
            calculators: iter.into_iter().collect(),
        }
    }
}
