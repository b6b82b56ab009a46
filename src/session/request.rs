use crate::data::filter::PointsType;
use crate::data::model::Document;

/// Default correlation a refined regression must reach.
pub const DEFAULT_THRESHOLD: f64 = 0.95;

/// Everything a session is built for, besides the document itself.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRequest {
    /// Replicate providing the measured times; `None` averages every
    /// replicate that observed a peptide.
    pub target_index: Option<usize>,
    /// Replicate regressed against in run-to-run mode.
    pub original_index: Option<usize>,
    pub run_to_run: bool,
    /// Use each peptide's best peak instead of `target_index`.
    pub best_result: bool,
    pub threshold: f64,
    pub precision: Option<u32>,
    pub refine: bool,
    pub points: PointsType,
    /// Explicitly chosen calculator; `None` picks one automatically.
    pub calculator: Option<String>,
}

impl Default for SessionRequest {
    fn default() -> Self {
        SessionRequest {
            target_index: None,
            original_index: None,
            run_to_run: false,
            best_result: false,
            threshold: DEFAULT_THRESHOLD,
            precision: None,
            refine: true,
            points: PointsType::Targets,
            calculator: None,
        }
    }
}

impl SessionRequest {
    /// Regress `target` against `original` instead of against scores.
    pub fn run_to_run(target: usize, original: usize) -> Self {
        SessionRequest {
            target_index: Some(target),
            original_index: Some(original),
            run_to_run: true,
            ..Self::default()
        }
    }

    /// Best-peak times do not apply between two fixed runs.
    pub fn effective_best_result(&self) -> bool {
        self.best_result && !self.run_to_run
    }

    /// The request as a session built from `document` records it.
    pub fn normalized(&self, document: &Document) -> SessionRequest {
        SessionRequest {
            best_result: self.effective_best_result(),
            points: self.points.effective(document),
            ..self.clone()
        }
    }
}
