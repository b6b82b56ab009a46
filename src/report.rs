use std::fmt;

use serde::Serialize;

use crate::regression::{round_to, RegressionModel, THRESHOLD_PRECISION};
use crate::session::AlignmentSession;

// ---------------------------------------------------------------------------
// RegressionSummary – the slope / intercept / window / r label
// ---------------------------------------------------------------------------

/// Fitted line and correlation as shown next to a regression plot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegressionSummary {
    pub slope: Option<f64>,
    pub intercept: Option<f64>,
    pub window: Option<f64>,
    /// Rounded to the threshold precision.
    pub r: Option<f64>,
}

impl RegressionSummary {
    pub fn new(model: Option<&RegressionModel>, r: Option<f64>, precision: Option<u32>) -> Self {
        let precision = precision.unwrap_or(THRESHOLD_PRECISION);
        RegressionSummary {
            slope: model.map(|m| m.slope),
            intercept: model.map(|m| m.intercept),
            window: model.map(|m| m.window),
            r: r.map(|r| round_to(r, precision)),
        }
    }

    /// Summary of the regression a session currently shows.
    pub fn of(session: &AlignmentSession) -> Self {
        let regression = session.best_regression();
        RegressionSummary::new(
            regression.map(|r| &r.model),
            regression.map(|r| r.r()),
            session.request().precision,
        )
    }
}

fn fixed(value: Option<f64>, digits: usize) -> String {
    value.map_or_else(|| "?".to_string(), |v| format!("{v:.digits$}"))
}

impl fmt::Display for RegressionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "slope = {}, intercept = {}",
            fixed(self.slope, 2),
            fixed(self.intercept, 2)
        )?;
        writeln!(f, "window = {}", fixed(self.window, 1))?;
        match self.r {
            Some(r) => write!(f, "r = {r}"),
            None => write!(f, "r = ?"),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionReport – what the command line prints
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub document: String,
    pub calculator: Option<String>,
    pub run_to_run: bool,
    pub points: usize,
    pub inliers: usize,
    pub refined: bool,
    pub regression: RegressionSummary,
    pub outliers: Vec<String>,
}

impl SessionReport {
    pub fn new(session: &AlignmentSession) -> Self {
        SessionReport {
            document: session.document_id().to_string(),
            calculator: session.calculator().map(|c| c.name().to_string()),
            run_to_run: session.request().run_to_run,
            points: session.measurements().iter().filter(|m| m.is_observed()).count(),
            inliers: session.inliers().len(),
            refined: session.refinement().is_some(),
            regression: RegressionSummary::of(session),
            outliers: session
                .outlier_peptides()
                .into_iter()
                .map(|p| p.key.to_string())
                .collect(),
        }
    }
}

impl fmt::Display for SessionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let calculator = match (&self.calculator, self.run_to_run) {
            (_, true) => "run-to-run",
            (Some(name), false) => name.as_str(),
            (None, false) => "none",
        };
        writeln!(f, "Document:   {}", self.document)?;
        writeln!(f, "Calculator: {calculator}")?;
        writeln!(
            f,
            "Points:     {} plotted, {} inliers{}",
            self.points,
            self.inliers,
            if self.refined { " (refined)" } else { "" }
        )?;
        writeln!(f, "{}", self.regression)?;
        if !self.outliers.is_empty() {
            writeln!(f, "Outliers ({}):", self.outliers.len())?;
            for peptide in &self.outliers {
                writeln!(f, "  {peptide}")?;
            }
        }
        Ok(())
    }
}
