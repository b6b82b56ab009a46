use super::{Measurement, Regression, RegressionModel, Statistics};
use crate::calc::CalculatorRef;

/// Acceptance band half-width, in residual standard deviations.
pub const WINDOW_STD_DEVS: f64 = 2.0;

/// Ordinary least-squares fitter shared by score-based and run-to-run
/// regression.
pub struct RegressionFitter;

impl RegressionFitter {
    /// Fit over every observed measurement.
    pub fn fit(calculator: &CalculatorRef, measurements: &[Measurement]) -> Option<Regression> {
        Self::fit_subset(calculator, measurements, 0..measurements.len())
    }

    /// Fit over the observed measurements among `indices`.
    ///
    /// Returns `None` when the calculator is unusable, fewer than two points
    /// are observed, or all points share one `x`.
    pub fn fit_subset(
        calculator: &CalculatorRef,
        measurements: &[Measurement],
        indices: impl IntoIterator<Item = usize>,
    ) -> Option<Regression> {
        if !calculator.is_usable() {
            return None;
        }
        let (indices, points) = observed_points(measurements, indices);
        let n = points.len();
        if n < 2 {
            return None;
        }

        let (mean_x, mean_y) = means(&points);
        let (mut sxx, mut sxy) = (0.0, 0.0);
        for &(x, y) in &points {
            sxx += (x - mean_x) * (x - mean_x);
            sxy += (x - mean_x) * (y - mean_y);
        }
        if sxx == 0.0 {
            return None;
        }
        let slope = sxy / sxx;
        let intercept = mean_y - slope * mean_x;

        let predictions: Vec<f64> = points.iter().map(|&(x, _)| slope * x + intercept).collect();
        let window = WINDOW_STD_DEVS * residual_std_dev(&points, &predictions);
        let r = pearson(&points);

        Some(Regression {
            model: RegressionModel::new(slope, intercept, window, calculator.clone()),
            statistics: Statistics {
                indices,
                points,
                predictions,
                r,
            },
        })
    }

    /// Statistics of an existing model over the observed measurements, used
    /// for the document's configured predictor.
    pub fn evaluate(model: RegressionModel, measurements: &[Measurement]) -> Option<Regression> {
        let (indices, points) = observed_points(measurements, 0..measurements.len());
        if points.len() < 2 {
            return None;
        }
        let predictions = points.iter().map(|&(x, _)| model.predict(x)).collect();
        let r = pearson(&points);
        Some(Regression {
            model,
            statistics: Statistics {
                indices,
                points,
                predictions,
                r,
            },
        })
    }
}

fn observed_points(
    measurements: &[Measurement],
    indices: impl IntoIterator<Item = usize>,
) -> (Vec<usize>, Vec<(f64, f64)>) {
    indices
        .into_iter()
        .filter_map(|i| measurements.get(i).map(|m| (i, m)))
        .filter(|(_, m)| m.is_observed())
        .map(|(i, m)| (i, (m.x, m.y)))
        .unzip()
}

fn means(points: &[(f64, f64)]) -> (f64, f64) {
    let n = points.len() as f64;
    let (sx, sy) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), &(x, y)| (sx + x, sy + y));
    (sx / n, sy / n)
}

/// Pearson correlation; zero when either axis has no variance.
pub fn pearson(points: &[(f64, f64)]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    let (mean_x, mean_y) = means(points);
    let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
    for &(x, y) in points {
        let dx = x - mean_x;
        let dy = y - mean_y;
        sxx += dx * dx;
        syy += dy * dy;
        sxy += dx * dy;
    }
    if sxx == 0.0 || syy == 0.0 {
        return 0.0;
    }
    (sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0)
}

fn residual_std_dev(points: &[(f64, f64)], predictions: &[f64]) -> f64 {
    let n = points.len();
    if n <= 2 {
        return 0.0;
    }
    let ss: f64 = points
        .iter()
        .zip(predictions)
        .map(|(&(_, y), &p)| (y - p) * (y - p))
        .sum();
    (ss / (n - 2) as f64).sqrt()
}

#[cfg(test)]
mod tests {
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

    #[test]
    fn exact_line_has_unit_correlation_and_zero_window() {
        let fit = RegressionFitter::fit(&calculator(), &points(&[(1.0, 3.0), (2.0, 5.0), (3.0, 7.0)]))
            .unwrap();
        assert!((fit.model.slope - 2.0).abs() < 1e-12);
        assert!((fit.model.intercept - 1.0).abs() < 1e-12);
        assert_eq!(fit.r(), 1.0);
        assert!(fit.model.window.abs() < 1e-9);
        assert_eq!(fit.statistics.predictions.len(), 3);
    }

    #[test]
    fn unobserved_points_are_left_out() {
        let data = points(&[(1.0, 10.0), (2.0, 0.0), (3.0, 30.0), (f64::NAN, 4.0)]);
        let fit = RegressionFitter::fit(&calculator(), &data).unwrap();
        assert_eq!(fit.statistics.indices, vec![0, 2]);
        assert_eq!(fit.statistics.points, vec![(1.0, 10.0), (3.0, 30.0)]);
    }

    #[test]
    fn too_few_points_yield_no_regression() {
        assert!(RegressionFitter::fit(&calculator(), &points(&[(1.0, 10.0)])).is_none());
        assert!(RegressionFitter::fit(&calculator(), &points(&[(1.0, 10.0), (1.0, 12.0)])).is_none());
    }

    #[test]
    fn unusable_calculator_yields_no_regression() {
        let calc: CalculatorRef = Arc::new(DictionaryCalculator::new("off", Vec::new()).disconnected());
        assert!(RegressionFitter::fit(&calc, &points(&[(1.0, 1.0), (2.0, 2.0)])).is_none());
    }

    #[test]
    fn window_scales_with_scatter() {
        let data = points(&[(1.0, 1.0), (2.0, 3.0), (3.0, 2.0), (4.0, 4.0)]);
        let fit = RegressionFitter::fit(&calculator(), &data).unwrap();
        assert!(fit.model.window > 0.0);
        assert!(fit.r() < 1.0);
        for &(x, y) in &fit.statistics.points {
            assert!(fit.model.contains(x, y));
        }
    }

    #[test]
    fn evaluate_keeps_the_given_model() {
        let model = RegressionModel::new(1.0, 0.0, 0.5, calculator());
        let eval = RegressionFitter::evaluate(model, &points(&[(1.0, 1.5), (2.0, 2.5)])).unwrap();
        assert_eq!(eval.model.slope, 1.0);
        assert_eq!(eval.statistics.predictions, vec![1.0, 2.0]);
        assert_eq!(eval.r(), 1.0);
    }
}
