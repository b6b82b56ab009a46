use log::{debug, info, warn};

use super::{same_binding, same_calculator, CalculatorRef, CalculatorRegistry, ScoreCache};
use crate::data::model::MeasuredTime;
use crate::regression::{Measurement, Regression, RegressionFitter};

/// A calculator that produced a regression over the measured times.
#[derive(Debug, Clone)]
pub struct Binding {
    pub calculator: CalculatorRef,
    pub measurements: Vec<Measurement>,
    pub regression: Regression,
}

/// Why no calculator could be bound.
#[derive(Debug, Clone)]
pub enum Unbound {
    /// The explicitly chosen calculator is unreachable and differs from the
    /// previous binding. Reported to the user.
    Fatal { name: String },
    /// Nothing to show. `calculator` keeps an explicit choice so a repeated
    /// failure is recognised as unchanged next time.
    Empty { calculator: Option<CalculatorRef> },
}

/// Picks the calculator a session is bound to.
pub struct CalculatorSelector<'a> {
    registry: &'a CalculatorRegistry,
    explicit: Option<&'a str>,
    /// The previous session's binding, `None` when there was no previous session.
    previous: Option<Option<&'a CalculatorRef>>,
}

impl<'a> CalculatorSelector<'a> {
    pub fn new(registry: &'a CalculatorRegistry) -> Self {
        CalculatorSelector {
            registry,
            explicit: None,
            previous: None,
        }
    }

    /// Bind to the named calculator instead of choosing automatically. A name
    /// missing from the registry falls back to automatic selection.
    pub fn explicit(mut self, name: Option<&'a str>) -> Self {
        self.explicit = name;
        self
    }

    pub fn previous(mut self, previous: Option<&'a CalculatorRef>) -> Self {
        self.previous = Some(previous);
        self
    }

    /// The calculator an explicit name resolves to, if any.
    pub fn resolve_explicit(&self) -> Option<&'a CalculatorRef> {
        let name = self.explicit?;
        let found = self.registry.by_name(name);
        if found.is_none() {
            warn!("Calculator '{name}' is not registered, choosing automatically");
        }
        found
    }

    pub fn select(
        &self,
        times: &[MeasuredTime],
        cache: &mut ScoreCache,
    ) -> Result<Binding, Unbound> {
        if let Some(calculator) = self.resolve_explicit() {
            return self.select_explicit(calculator, times, cache);
        }

        for candidate in self.registry.iter() {
            if !candidate.is_usable() {
                debug!("Skipping unusable calculator {}", candidate.name());
                continue;
            }
            if let Some(binding) = self.try_bind(candidate, times, cache) {
                info!("Selected calculator {}", candidate.name());
                return Ok(binding);
            }
        }
        debug!("No calculator produced a regression");
        Err(Unbound::Empty { calculator: None })
    }

    fn select_explicit(
        &self,
        calculator: &CalculatorRef,
        times: &[MeasuredTime],
        cache: &mut ScoreCache,
    ) -> Result<Binding, Unbound> {
        if calculator.is_usable() {
            if let Some(binding) = self.try_bind(calculator, times, cache) {
                return Ok(binding);
            }
        }
        match self.previous {
            Some(previous) if !same_binding(previous, Some(calculator)) => {
                warn!("Calculator {} is not connected", calculator.name());
                Err(Unbound::Fatal {
                    name: calculator.name().to_string(),
                })
            }
            _ => {
                debug!("Calculator {} still unavailable", calculator.name());
                Err(Unbound::Empty {
                    calculator: Some(calculator.clone()),
                })
            }
        }
    }

    fn try_bind(
        &self,
        calculator: &CalculatorRef,
        times: &[MeasuredTime],
        cache: &mut ScoreCache,
    ) -> Option<Binding> {
        // Entries cached under this name may come from an older definition.
        if let Some(Some(previous)) = self.previous {
            if !same_calculator(previous, calculator) {
                cache.recalculate_for(calculator.as_ref());
            }
        }
        let measurements = cache.score_times(calculator.as_ref(), times);
        let regression = RegressionFitter::fit(calculator, &measurements)?;
        Some(Binding {
            calculator: calculator.clone(),
            measurements,
            regression,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::calc::DictionaryCalculator;
    use crate::data::model::PeptideKey;

    fn times() -> Vec<MeasuredTime> {
        vec![
            MeasuredTime::new("AAK".into(), 10.0),
            MeasuredTime::new("CCK".into(), 20.0),
            MeasuredTime::new("DDK".into(), 30.0),
        ]
    }

    fn scores(name: &str) -> CalculatorRef {
        Arc::new(DictionaryCalculator::new(
            name,
            [
                (PeptideKey::from("AAK"), 1.0),
                (PeptideKey::from("CCK"), 2.0),
                (PeptideKey::from("DDK"), 3.0),
            ],
        ))
    }

    fn offline(name: &str) -> CalculatorRef {
        Arc::new(DictionaryCalculator::new(name, Vec::new()).disconnected())
    }

    fn empty(name: &str) -> CalculatorRef {
        Arc::new(DictionaryCalculator::new(name, Vec::new()))
    }

    #[test]
    fn automatic_selection_takes_first_usable_with_regression() {
        let registry: CalculatorRegistry =
            [offline("irt"), empty("nothing"), scores("ssr"), scores("later")]
                .into_iter()
                .collect();
        let binding = CalculatorSelector::new(&registry)
            .select(&times(), &mut ScoreCache::new())
            .unwrap();
        assert_eq!(binding.calculator.name(), "ssr");
        assert_eq!(binding.measurements.len(), 3);
    }

    #[test]
    fn automatic_selection_without_candidates_is_empty() {
        let registry: CalculatorRegistry = [offline("irt")].into_iter().collect();
        let result = CalculatorSelector::new(&registry).select(&times(), &mut ScoreCache::new());
        assert!(matches!(result, Err(Unbound::Empty { calculator: None })));
    }

    #[test]
    fn unknown_explicit_name_falls_back_to_automatic() {
        let registry: CalculatorRegistry = [scores("ssr")].into_iter().collect();
        let binding = CalculatorSelector::new(&registry)
            .explicit(Some("missing"))
            .select(&times(), &mut ScoreCache::new())
            .unwrap();
        assert_eq!(binding.calculator.name(), "ssr");
    }

    #[test]
    fn switching_to_a_disconnected_calculator_is_fatal() {
        let registry: CalculatorRegistry = [scores("ssr"), offline("irt")].into_iter().collect();
        let previous = registry.by_name("ssr").cloned();
        let result = CalculatorSelector::new(&registry)
            .explicit(Some("irt"))
            .previous(previous.as_ref())
            .select(&times(), &mut ScoreCache::new());
        assert!(matches!(result, Err(Unbound::Fatal { name }) if name == "irt"));
    }

    #[test]
    fn repeated_disconnection_degrades_silently() {
        let registry: CalculatorRegistry = [offline("irt")].into_iter().collect();
        let previous = registry.by_name("irt").cloned();
        let result = CalculatorSelector::new(&registry)
            .explicit(Some("irt"))
            .previous(previous.as_ref())
            .select(&times(), &mut ScoreCache::new());
        match result {
            Err(Unbound::Empty { calculator: Some(c) }) => assert_eq!(c.name(), "irt"),
            other => panic!("expected silent empty binding, got {other:?}"),
        }
    }

    #[test]
    fn first_session_with_disconnected_calculator_is_silent() {
        let registry: CalculatorRegistry = [offline("irt")].into_iter().collect();
        let result = CalculatorSelector::new(&registry)
            .explicit(Some("irt"))
            .select(&times(), &mut ScoreCache::new());
        assert!(matches!(result, Err(Unbound::Empty { calculator: Some(_) })));
    }
}
