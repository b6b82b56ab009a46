//! Linear retention time regression and iterative outlier rejection.
//!
//! [`fit::RegressionFitter`] computes an ordinary least-squares line with its
//! Pearson correlation; [`refine::OutlierRefiner`] repeatedly drops the worst
//! conforming point until the correlation reaches a threshold.

pub mod fit;
pub mod refine;

use std::fmt;

use crate::calc::CalculatorRef;
use crate::data::model::PeptideKey;

pub use fit::RegressionFitter;
pub use refine::{OutlierRefiner, Refinement};

/// Decimal digits `r` is rounded to before comparing with the threshold.
pub const THRESHOLD_PRECISION: u32 = 4;

/// Decimal digits residuals are rounded to, absorbing numerical noise.
pub const RESIDUAL_PRECISION: u32 = 6;

/// Beyond this an `f64` has no decimal digits left to round.
pub const MAX_PRECISION: u32 = 15;

/// Round `value` to `digits` decimals, capped at [`MAX_PRECISION`].
pub fn round_to(value: f64, digits: u32) -> f64 {
    let factor = 10f64.powi(digits.min(MAX_PRECISION) as i32);
    (value * factor).round() / factor
}

/// Whether `r`, rounded to `precision` digits, meets `threshold`.
pub fn is_above_threshold(r: f64, threshold: f64, precision: Option<u32>) -> bool {
    round_to(r, precision.unwrap_or(THRESHOLD_PRECISION)) >= threshold
}

// ---------------------------------------------------------------------------
// Measurement – one regression point
// ---------------------------------------------------------------------------

/// A peptide's score (or other-run time) against its measured time.
///
/// `y == 0` marks a peptide that was not observed; peptides the calculator
/// could not score carry a NaN `x`.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub key: PeptideKey,
    pub x: f64,
    pub y: f64,
}

impl Measurement {
    pub fn new(key: PeptideKey, x: f64, y: f64) -> Self {
        Measurement { key, x, y }
    }

    /// Usable in a fit: observed and scored.
    pub fn is_observed(&self) -> bool {
        self.y != 0.0 && self.y.is_finite() && self.x.is_finite()
    }
}

// ---------------------------------------------------------------------------
// RegressionModel
// ---------------------------------------------------------------------------

/// A fitted line plus the half-width of its acceptance band.
#[derive(Clone)]
pub struct RegressionModel {
    pub slope: f64,
    pub intercept: f64,
    pub window: f64,
    calculator: CalculatorRef,
}

impl RegressionModel {
    pub fn new(slope: f64, intercept: f64, window: f64, calculator: CalculatorRef) -> Self {
        RegressionModel {
            slope,
            intercept,
            window,
            calculator,
        }
    }

    pub fn calculator(&self) -> &CalculatorRef {
        &self.calculator
    }

    pub fn predict(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }

    /// Measured minus predicted time.
    pub fn residual(&self, x: f64, y: f64) -> f64 {
        round_to(y - self.predict(x), RESIDUAL_PRECISION)
    }

    /// Whether `(x, y)` falls inside the acceptance band.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        (y - self.predict(x)).abs() <= self.window
    }
}

impl fmt::Debug for RegressionModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegressionModel")
            .field("slope", &self.slope)
            .field("intercept", &self.intercept)
            .field("window", &self.window)
            .field("calculator", &self.calculator.name())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Goodness of fit over exactly the points a model was fitted to.
#[derive(Debug, Clone, PartialEq)]
pub struct Statistics {
    /// Measurement indices of the fitted points, ascending.
    pub indices: Vec<usize>,
    pub points: Vec<(f64, f64)>,
    /// Model prediction for each point.
    pub predictions: Vec<f64>,
    pub r: f64,
}

impl Statistics {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// A model together with the statistics of the fit that produced it.
#[derive(Debug, Clone)]
pub struct Regression {
    pub model: RegressionModel,
    pub statistics: Statistics,
}

impl Regression {
    pub fn r(&self) -> f64 {
        self.statistics.r
    }

    pub fn is_above_threshold(&self, threshold: f64, precision: Option<u32>) -> bool {
        is_above_threshold(self.statistics.r, threshold, precision)
    }
}
