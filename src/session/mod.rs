//! Immutable regression sessions.
//!
//! An [`AlignmentSession`] is everything computed for one document and one
//! [`SessionRequest`]: the measured points, the calculator they were scored
//! with, the unrefined regression and, once refined, the outlier partition.
//! Sessions are never mutated after construction. Refinement builds a new
//! session from the old one's fields, so a session another thread is
//! reading never changes underneath it.

pub mod query;
pub mod request;

use std::collections::HashSet;
use std::sync::Arc;

use log::{debug, info};

use crate::calc::{
    same_binding, CalculatorRef, CalculatorRegistry, CalculatorSelector, DictionaryCalculator,
    ScoreCache, Unbound,
};
use crate::data::filter::filtered_indices;
use crate::data::model::{Document, DocumentId, MeasuredTime};
use crate::error::AlignmentError;
use crate::regression::{
    Measurement, OutlierRefiner, Refinement, Regression, RegressionFitter, RegressionModel,
};

pub use query::{calc_outliers, PeptideRef};
pub use request::SessionRequest;

/// Result of asking a session to refine itself.
#[derive(Debug, Clone)]
pub enum RefineOutcome {
    /// Already refined, or refinement had nothing to change.
    Unchanged,
    Refined(AlignmentSession),
}

#[derive(Debug, Clone)]
pub struct AlignmentSession {
    document_id: DocumentId,
    /// The request as normalized against the document.
    request: SessionRequest,
    /// Whether this session still wants refinement.
    refine: bool,
    peptides: Vec<PeptideRef>,
    measurements: Vec<Measurement>,
    calculator: Option<CalculatorRef>,
    cache: ScoreCache,
    regression: Option<Regression>,
    refined: Option<Refinement>,
    predictor: Option<Regression>,
}

/// The three parallel lists a session is built from.
#[derive(Default)]
struct Rows {
    peptides: Vec<PeptideRef>,
    times: Vec<MeasuredTime>,
    /// Original-run times, run-to-run only.
    originals: Vec<f64>,
}

type Bound = (Option<CalculatorRef>, Vec<Measurement>, Option<Regression>);

impl AlignmentSession {
    /// Build a session for `document`.
    ///
    /// `previous` is the session currently on display. Its score cache is
    /// carried over and its calculator decides whether an unreachable
    /// explicit calculator is reported or quietly left without a regression.
    pub fn build(
        document: &Document,
        registry: &CalculatorRegistry,
        previous: Option<&AlignmentSession>,
        request: &SessionRequest,
    ) -> Result<Self, AlignmentError> {
        let count = document.replicate_count();
        check_replicate(request.target_index, count)?;
        if request.run_to_run {
            let original = request
                .original_index
                .ok_or(AlignmentError::MissingOriginalRun)?;
            check_replicate(Some(original), count)?;
        }

        let request = request.normalized(document);
        let rows = collect_rows(document, &request);
        let mut cache = ScoreCache::derive(previous.map(|p| &p.cache));

        let (calculator, measurements, regression) = if request.run_to_run {
            bind_run_to_run(&rows)
        } else {
            bind_scores(registry, previous, &request, &rows, &mut cache)?
        };

        let predictor = match (&calculator, &document.prediction) {
            (Some(calc), Some(model)) if !request.run_to_run && model.calculator == calc.name() => {
                let model =
                    RegressionModel::new(model.slope, model.intercept, model.window, calc.clone());
                RegressionFitter::evaluate(model, &measurements)
            }
            _ => None,
        };

        let mut session = AlignmentSession {
            document_id: document.id(),
            refine: false,
            peptides: rows.peptides,
            measurements,
            calculator,
            cache,
            regression,
            refined: None,
            predictor,
            request,
        };
        session.refine = session.request.refine && !session.is_refined();

        info!(
            "Built session for {} with {} points ({}), r = {}",
            session.document_id,
            session.measurements.len(),
            session
                .calculator
                .as_ref()
                .map_or("no calculator", |c| c.name()),
            session
                .regression
                .as_ref()
                .map_or_else(|| "?".to_string(), |r| format!("{:.4}", r.r()))
        );
        Ok(session)
    }

    pub fn document_id(&self) -> DocumentId {
        self.document_id
    }

    pub fn request(&self) -> &SessionRequest {
        &self.request
    }

    pub fn calculator(&self) -> Option<&CalculatorRef> {
        self.calculator.as_ref()
    }

    pub fn peptides(&self) -> &[PeptideRef] {
        &self.peptides
    }

    pub fn measurements(&self) -> &[Measurement] {
        &self.measurements
    }

    pub fn cache(&self) -> &ScoreCache {
        &self.cache
    }

    /// Regression over every observed point.
    pub fn regression(&self) -> Option<&Regression> {
        self.regression.as_ref()
    }

    pub fn refinement(&self) -> Option<&Refinement> {
        self.refined.as_ref()
    }

    /// The document's configured predictor evaluated over this session's
    /// points.
    pub fn predictor(&self) -> Option<&Regression> {
        self.predictor.as_ref()
    }

    /// Whether background refinement should still run for this session.
    pub fn needs_refinement(&self) -> bool {
        self.refine && !self.is_refined()
    }

    /// Refined, or already good enough that refining would change nothing.
    pub fn is_refined(&self) -> bool {
        self.refined.is_some()
            || self.regression.as_ref().is_some_and(|r| {
                r.is_above_threshold(self.request.threshold, self.request.precision)
            })
    }

    pub fn is_valid_for_document(&self, id: DocumentId) -> bool {
        self.document_id == id
    }

    /// Whether this session already answers `request` for `document`, so
    /// nothing needs rebuilding.
    pub fn is_valid_for(
        &self,
        document: &Document,
        request: &SessionRequest,
        registry: &CalculatorRegistry,
    ) -> bool {
        if !self.is_valid_for_document(document.id()) {
            return false;
        }
        let request = request.normalized(document);
        let own = &self.request;
        if own.run_to_run != request.run_to_run
            || own.target_index != request.target_index
            || own.original_index != request.original_index
            || own.best_result != request.best_result
            || own.threshold != request.threshold
            || own.precision != request.precision
            || own.points != request.points
        {
            return false;
        }
        if !request.run_to_run && !self.binding_matches(&request, registry) {
            return false;
        }
        self.refine == request.refine || (request.refine && self.is_refined())
    }

    fn binding_matches(&self, request: &SessionRequest, registry: &CalculatorRegistry) -> bool {
        if self.request.calculator != request.calculator {
            return false;
        }
        let registered = request
            .calculator
            .as_deref()
            .and_then(|name| registry.by_name(name))
            .or_else(|| {
                self.calculator
                    .as_ref()
                    .and_then(|c| registry.by_name(c.name()))
            });
        same_binding(self.calculator.as_ref(), registered)
    }

    /// Reject outliers until the correlation reaches the threshold.
    ///
    /// `is_cancelled` is polled between iterations; a cancelled refinement
    /// still yields the points rejected so far.
    pub fn try_refine<F>(&self, is_cancelled: F) -> RefineOutcome
    where
        F: Fn() -> bool,
    {
        if self.is_refined() {
            return RefineOutcome::Unchanged;
        }
        let Some(calculator) = &self.calculator else {
            debug!("Session for {} has no calculator to refine", self.document_id);
            return RefineOutcome::Unchanged;
        };
        let refiner = OutlierRefiner::new(self.request.threshold, self.request.precision)
            .run_to_run(self.request.run_to_run);
        match refiner.refine(calculator, &self.measurements, is_cancelled) {
            Some(refinement) => RefineOutcome::Refined(self.with_refinement(refinement)),
            None => RefineOutcome::Unchanged,
        }
    }

    /// Shared-handle form of [`try_refine`](Self::try_refine): the same
    /// handle comes back when nothing changed.
    pub fn refine<F>(self: &Arc<Self>, is_cancelled: F) -> Arc<Self>
    where
        F: Fn() -> bool,
    {
        match self.try_refine(is_cancelled) {
            RefineOutcome::Unchanged => Arc::clone(self),
            RefineOutcome::Refined(session) => Arc::new(session),
        }
    }

    fn with_refinement(&self, refinement: Refinement) -> Self {
        AlignmentSession {
            refined: Some(refinement),
            ..self.clone()
        }
    }
}

fn check_replicate(index: Option<usize>, count: usize) -> Result<(), AlignmentError> {
    match index {
        Some(index) if index >= count => Err(AlignmentError::ReplicateOutOfRange { index, count }),
        _ => Ok(()),
    }
}

fn collect_rows(document: &Document, request: &SessionRequest) -> Rows {
    let mut rows = Rows::default();
    let mut seen = HashSet::new();
    for index in filtered_indices(document, request.points) {
        let peptide = &document.peptides[index];
        // First occurrence wins, dropped from all three lists at once.
        if request.run_to_run && !seen.insert(&peptide.key) {
            debug!("Skipping repeated peptide {}", peptide.key);
            continue;
        }
        let time = if request.best_result {
            peptide.best_time()
        } else {
            peptide.time(request.target_index)
        };
        rows.peptides.push(PeptideRef::new(peptide.key.clone(), index));
        rows.times
            .push(MeasuredTime::new(peptide.key.clone(), time.unwrap_or(0.0)));
        if request.run_to_run {
            rows.originals
                .push(peptide.time(request.original_index).unwrap_or(0.0));
        }
    }
    rows
}

fn bind_run_to_run(rows: &Rows) -> Bound {
    let pairs = || rows.times.iter().zip(&rows.originals);
    let calculator: CalculatorRef = Arc::new(DictionaryCalculator::run_to_run(
        pairs().map(|(t, &original)| (t.key.clone(), original)),
    ));
    let measurements: Vec<Measurement> = pairs()
        .map(|(t, &original)| Measurement::new(t.key.clone(), original, t.time))
        .collect();
    let regression = RegressionFitter::fit(&calculator, &measurements);
    (Some(calculator), measurements, regression)
}

fn bind_scores(
    registry: &CalculatorRegistry,
    previous: Option<&AlignmentSession>,
    request: &SessionRequest,
    rows: &Rows,
    cache: &mut ScoreCache,
) -> Result<Bound, AlignmentError> {
    let mut selector = CalculatorSelector::new(registry).explicit(request.calculator.as_deref());
    if let Some(previous) = previous {
        selector = selector.previous(previous.calculator.as_ref());
    }
    match selector.select(&rows.times, cache) {
        Ok(binding) => Ok((
            Some(binding.calculator),
            binding.measurements,
            Some(binding.regression),
        )),
        Err(Unbound::Fatal { name }) => Err(AlignmentError::CalculatorDisconnected { name }),
        Err(Unbound::Empty { calculator }) => {
            let measurements = rows
                .times
                .iter()
                .map(|t| Measurement::new(t.key.clone(), f64::NAN, t.time))
                .collect();
            Ok((calculator, measurements, None))
        }
    }
}
