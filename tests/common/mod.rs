#![allow(dead_code)]

use std::sync::Arc;

use rusty_rt::calc::{CalculatorRef, CalculatorRegistry, DictionaryCalculator};
use rusty_rt::data::model::{Document, Peptide, PeptideKey};

/// (sequence, score, run1 time, run2 time). Times follow 2·score + 1 with a
/// small run shift, except `BADK` which elutes far too late in run1.
pub const ROWS: &[(&str, f64, f64, f64)] = &[
    ("AAK", 1.0, 3.0, 3.2),
    ("CCK", 2.0, 5.0, 5.2),
    ("DDK", 3.0, 7.0, 7.2),
    ("EEK", 4.0, 9.0, 9.2),
    ("FFK", 5.0, 11.0, 11.2),
    ("GGK", 6.0, 13.0, 13.2),
    ("BADK", 7.0, 60.0, 15.2),
    ("HHK", 8.0, 17.0, 17.2),
];

pub fn document() -> Document {
    let mut peptides: Vec<Peptide> = ROWS
        .iter()
        .map(|&(seq, _, t1, t2)| Peptide::new(seq, vec![Some(t1), Some(t2)]).with_best_result(0))
        .collect();
    peptides.push(Peptide::new("DECOYK", vec![Some(30.0), Some(30.0)]).decoy());
    Document::new(vec!["run1".into(), "run2".into()], peptides)
        .with_standards([PeptideKey::from("AAK"), PeptideKey::from("HHK")])
}

pub fn scores(name: &str) -> CalculatorRef {
    Arc::new(DictionaryCalculator::new(
        name,
        ROWS.iter().map(|&(seq, score, _, _)| (PeptideKey::from(seq), score)),
    ))
}

pub fn offline(name: &str) -> CalculatorRef {
    Arc::new(DictionaryCalculator::new(name, Vec::new()).disconnected())
}

pub fn registry(calculators: impl IntoIterator<Item = CalculatorRef>) -> CalculatorRegistry {
    calculators.into_iter().collect()
}

/// Two observed peptides on a falling line plus one never observed: a fit
/// exists but no point can be rejected.
pub fn unrefinable() -> (Document, CalculatorRegistry) {
    let doc = Document::new(
        vec!["run1".into()],
        vec![
            Peptide::new("AAK", vec![Some(10.0)]),
            Peptide::new("CCK", vec![Some(5.0)]),
            Peptide::new("DDK", vec![None]),
        ],
    );
    let calc: CalculatorRef = Arc::new(DictionaryCalculator::new(
        "ssr",
        [("AAK", 1.0), ("CCK", 2.0), ("DDK", 3.0)]
            .into_iter()
            .map(|(seq, score)| (PeptideKey::from(seq), score)),
    ));
    (doc, registry([calc]))
}
