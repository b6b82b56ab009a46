use std::collections::BTreeSet;

use log::{debug, info, warn};

use super::{is_above_threshold, Measurement, Regression, RegressionFitter};
use crate::calc::CalculatorRef;
use crate::data::model::PeptideKey;

// ---------------------------------------------------------------------------
// Refinement result
// ---------------------------------------------------------------------------

/// Outcome of a refinement that changed something.
#[derive(Debug, Clone)]
pub struct Refinement {
    pub regression: Regression,
    /// Rejected measurement indices, ascending.
    pub outliers: BTreeSet<usize>,
    /// Number of fits performed, the initial one included.
    pub iterations: usize,
    /// Whether the loop stopped on the cancellation predicate.
    pub cancelled: bool,
}

impl Refinement {
    /// Indices of the accepted measurements among `0..count`, in order.
    pub fn inliers(&self, count: usize) -> Vec<usize> {
        inliers(count, &self.outliers)
    }

    pub fn r(&self) -> f64 {
        self.regression.r()
    }

    pub fn is_outlier(&self, index: usize) -> bool {
        self.outliers.contains(&index)
    }
}

// ---------------------------------------------------------------------------
// OutlierRefiner
// ---------------------------------------------------------------------------

/// Iteratively rejects the worst-fitting variable point until the
/// correlation reaches the threshold.
///
/// Standards required by the calculator are never rejected. In run-to-run
/// mode there are no standards and a zero time on either run marks a point
/// as unobserved.
#[derive(Debug, Clone, Copy)]
pub struct OutlierRefiner {
    threshold: f64,
    precision: Option<u32>,
    run_to_run: bool,
}

impl OutlierRefiner {
    pub fn new(threshold: f64, precision: Option<u32>) -> Self {
        OutlierRefiner {
            threshold,
            precision,
            run_to_run: false,
        }
    }

    pub fn run_to_run(mut self, run_to_run: bool) -> Self {
        self.run_to_run = run_to_run;
        self
    }

    /// Refine the regression of `measurements`.
    ///
    /// Returns `None` when refinement changes nothing: the calculator is
    /// unusable, no fit is possible, or no fitted point ends up rejected.
    /// Unobserved points are outliers from the start and do not count as a
    /// change.
    /// `is_cancelled` is polled between iterations; cancelling yields the
    /// best result so far.
    pub fn refine<F>(
        &self,
        calculator: &CalculatorRef,
        measurements: &[Measurement],
        is_cancelled: F,
    ) -> Option<Refinement>
    where
        F: Fn() -> bool,
    {
        let mut outliers: BTreeSet<usize> = measurements
            .iter()
            .enumerate()
            .filter(|(_, m)| !m.is_observed() || (self.run_to_run && m.x == 0.0))
            .map(|(i, _)| i)
            .collect();

        if !calculator.is_usable() {
            debug!("Calculator {} unusable, skipping refinement", calculator.name());
            return None;
        }

        let standards = self.standards(calculator, measurements);
        let mut variable: Vec<usize> = (0..measurements.len())
            .filter(|i| !outliers.contains(i) && !standards.contains(&measurements[*i].key))
            .collect();

        let count = measurements.len();
        let mut current =
            RegressionFitter::fit_subset(calculator, measurements, inliers(count, &outliers))?;
        let mut iterations = 1;
        let mut removed = 0;
        let mut cancelled = false;

        loop {
            if is_above_threshold(current.r(), self.threshold, self.precision) {
                break;
            }
            if is_cancelled() {
                info!("Refinement cancelled after {iterations} iterations");
                cancelled = true;
                break;
            }
            if current.statistics.len() <= 2 {
                break;
            }
            let Some(position) = worst_point(&current, measurements, &variable) else {
                break;
            };
            let rejected = variable.remove(position);
            outliers.insert(rejected);
            match RegressionFitter::fit_subset(calculator, measurements, inliers(count, &outliers)) {
                Some(next) => {
                    current = next;
                    iterations += 1;
                    removed += 1;
                }
                None => {
                    outliers.remove(&rejected);
                    break;
                }
            }
        }

        if removed == 0 {
            debug!("Refinement rejected no fitted point");
            return None;
        }
        info!(
            "Refined regression: {removed} rejected, {} outliers, r = {:.4} after {iterations} iterations",
            outliers.len(),
            current.r()
        );
        Some(Refinement {
            regression: current,
            outliers,
            iterations,
            cancelled,
        })
    }

    fn standards(&self, calculator: &CalculatorRef, measurements: &[Measurement]) -> BTreeSet<PeptideKey> {
        if self.run_to_run {
            return BTreeSet::new();
        }
        let keys: Vec<PeptideKey> = measurements.iter().map(|m| m.key.clone()).collect();
        calculator.required_standards(&keys).unwrap_or_else(|e| {
            warn!("Ignoring standard peptides: {e}");
            BTreeSet::new()
        })
    }
}

fn inliers(count: usize, outliers: &BTreeSet<usize>) -> Vec<usize> {
    (0..count).filter(|i| !outliers.contains(i)).collect()
}

/// Position in `variable` of the fitted point with the largest absolute
/// residual. The first of equal residuals wins.
fn worst_point(current: &Regression, measurements: &[Measurement], variable: &[usize]) -> Option<usize> {
    let model = &current.model;
    let mut worst: Option<(usize, f64)> = None;
    for (position, &index) in variable.iter().enumerate() {
        let m = &measurements[index];
        if !m.is_observed() {
            continue;
        }
        let residual = (m.y - model.predict(m.x)).abs();
        if worst.map_or(true, |(_, r)| residual > r) {
            worst = Some((position, residual));
        }
    }
    worst.map(|(position, _)| position)
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::sync::Arc;

    use super::*;
    use crate::calc::DictionaryCalculator;

    fn calculator() -> CalculatorRef {
        Arc::new(DictionaryCalculator::new("test", Vec::new()))
    }

    fn points(xy: &[(f64, f64)]) -> Vec<Measurement> {
        xy.iter()
            .enumerate()
            .map(|(i, &(x, y))| Measurement::new(format!("P{i}").into(), x, y))
            .collect()
    }

    /// y = 2x + 1 with one gross outlier at index 6.
    fn line_with_outlier() -> Vec<Measurement> {
        points(&[
            (1.0, 3.0),
            (2.0, 5.0),
            (3.0, 7.0),
            (4.0, 9.0),
            (5.0, 11.0),
            (6.0, 13.0),
            (7.0, 60.0),
        ])
    }

    #[test]
    fn removes_the_gross_outlier() {
        let refined = OutlierRefiner::new(0.99, None)
            .refine(&calculator(), &line_with_outlier(), || false)
            .unwrap();
        assert_eq!(refined.outliers, BTreeSet::from([6]));
        assert_eq!(refined.inliers(7), vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(refined.r(), 1.0);
        assert!(!refined.cancelled);
    }

    #[test]
    fn removes_largest_residual_of_three_points() {
        // The least-squares line through all three leaves the middle point
        // with the largest residual (23.3 versus 11.7 for either end).
        let data = points(&[(1.0, 10.0), (2.0, 20.0), (3.0, 100.0)]);
        let refined = OutlierRefiner::new(0.99, None)
            .refine(&calculator(), &data, || false)
            .unwrap();
        assert_eq!(refined.outliers.len(), 1);
        assert_eq!(refined.outliers, BTreeSet::from([1]));
        assert_eq!(refined.r(), 1.0);
    }

    #[test]
    fn zero_times_are_outliers_before_any_fit() {
        let mut data = line_with_outlier();
        data.push(Measurement::new("MISSING".into(), 8.0, 0.0));
        let refined = OutlierRefiner::new(0.99, None)
            .refine(&calculator(), &data, || false)
            .unwrap();
        assert!(refined.is_outlier(7));
        assert!(refined.is_outlier(6));
    }

    #[test]
    fn run_to_run_treats_zero_original_time_as_unobserved() {
        let mut data = points(&[(1.0, 3.0), (2.0, 5.0), (3.0, 7.0)]);
        data.push(Measurement::new("NOORIG".into(), 0.0, 4.0));
        let refined = OutlierRefiner::new(0.99, None)
            .run_to_run(true)
            .refine(&calculator(), &data, || false)
            .unwrap();
        assert_eq!(refined.outliers, BTreeSet::from([3]));
    }

    #[test]
    fn standards_are_never_rejected() {
        let keys: Vec<PeptideKey> = line_with_outlier().iter().map(|m| m.key.clone()).collect();
        let calc: CalculatorRef =
            Arc::new(DictionaryCalculator::new("irt", Vec::new()).with_standards([keys[6].clone()]));
        let refined = OutlierRefiner::new(0.99, None)
            .refine(&calc, &line_with_outlier(), || false)
            .unwrap();
        assert!(!refined.is_outlier(6));
        assert!(!refined.outliers.is_empty());
    }

    #[test]
    fn incomplete_standards_are_treated_as_none() {
        let calc: CalculatorRef = Arc::new(
            DictionaryCalculator::new("irt", Vec::new()).with_standards([PeptideKey::from("ABSENT")]),
        );
        let refined = OutlierRefiner::new(0.99, None)
            .refine(&calc, &line_with_outlier(), || false)
            .unwrap();
        assert_eq!(refined.outliers, BTreeSet::from([6]));
    }

    #[test]
    fn unusable_calculator_is_a_no_op() {
        let calc: CalculatorRef = Arc::new(DictionaryCalculator::new("off", Vec::new()).disconnected());
        assert!(OutlierRefiner::new(0.99, None)
            .refine(&calc, &line_with_outlier(), || false)
            .is_none());
    }

    #[test]
    fn cancellation_keeps_best_effort_state() {
        let mut data = line_with_outlier();
        data.push(Measurement::new("MISSING".into(), 8.0, 0.0));
        data.push(Measurement::new("LATE".into(), 9.0, 100.0));
        let polls = Cell::new(0);
        let refined = OutlierRefiner::new(0.99, None)
            .refine(&calculator(), &data, || {
                polls.set(polls.get() + 1);
                polls.get() > 1
            })
            .unwrap();
        assert!(refined.cancelled);
        assert_eq!(polls.get(), 2);
        // One gross outlier rejected, the other left for lack of time.
        assert_eq!(refined.outliers.len(), 2);
        assert!(refined.is_outlier(7));
        assert!(refined.r() < 0.99);
    }

    #[test]
    fn cancellation_before_any_change_is_a_no_op() {
        assert!(OutlierRefiner::new(0.99, None)
            .refine(&calculator(), &line_with_outlier(), || true)
            .is_none());

        let mut data = line_with_outlier();
        data.push(Measurement::new("MISSING".into(), 8.0, 0.0));
        assert!(OutlierRefiner::new(0.99, None)
            .refine(&calculator(), &data, || true)
            .is_none());
    }

    #[test]
    fn unobserved_points_alone_are_not_a_refinement() {
        // Two fitted points with r = -1: nothing can be removed.
        let data = points(&[(1.0, 10.0), (2.0, 5.0), (3.0, 0.0)]);
        assert!(OutlierRefiner::new(0.99, None)
            .refine(&calculator(), &data, || false)
            .is_none());
    }

    #[test]
    fn all_standards_leave_nothing_to_reject() {
        let data = line_with_outlier();
        let keys: Vec<PeptideKey> = data.iter().map(|m| m.key.clone()).collect();
        let calc: CalculatorRef =
            Arc::new(DictionaryCalculator::new("irt", Vec::new()).with_standards(keys));
        let mut with_missing = data;
        with_missing.push(Measurement::new("MISSING".into(), 8.0, 0.0));
        assert!(OutlierRefiner::new(0.99, None)
            .refine(&calc, &with_missing, || false)
            .is_none());
    }

    #[test]
    fn already_conforming_data_is_a_no_op() {
        let data = points(&[(1.0, 3.0), (2.0, 5.0), (3.0, 7.0)]);
        assert!(OutlierRefiner::new(0.99, None)
            .refine(&calculator(), &data, || false)
            .is_none());
    }
}
