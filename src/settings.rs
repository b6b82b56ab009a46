//! Persisted regression settings.
//!
//! Read from a JSON file; every field is optional and falls back to its
//! default. Command-line flags override individual fields afterwards.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::data::filter::PointsType;
use crate::session::request::{SessionRequest, DEFAULT_THRESHOLD};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentSettings {
    /// Explicitly chosen calculator name; automatic selection when absent.
    pub calculator: Option<String>,
    pub threshold: f64,
    /// Digits `r` is rounded to before comparing with `threshold`.
    pub precision: Option<u32>,
    pub refine: bool,
    pub best_result: bool,
    pub points: PointsType,
}

impl Default for AlignmentSettings {
    fn default() -> Self {
        AlignmentSettings {
            calculator: None,
            threshold: DEFAULT_THRESHOLD,
            precision: None,
            refine: true,
            best_result: false,
            points: PointsType::Targets,
        }
    }
}

impl AlignmentSettings {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading settings file {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("parsing settings file {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self).context("serializing settings")?;
        std::fs::write(path, text)
            .with_context(|| format!("writing settings file {}", path.display()))
    }

    /// Request for `target` (or all replicates), regressed against
    /// `original` when given.
    pub fn to_request(&self, target: Option<usize>, original: Option<usize>) -> SessionRequest {
        SessionRequest {
            target_index: target,
            original_index: original,
            run_to_run: original.is_some(),
            best_result: self.best_result,
            threshold: self.threshold,
            precision: self.precision,
            refine: self.refine,
            points: self.points,
            calculator: self.calculator.clone(),
        }
    }
}
