use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use arrow::array::{
    Array, AsArray, BooleanArray, Float32Array, Float64Array, Int32Array, Int64Array, StringArray,
};
use arrow::datatypes::DataType;
use log::info;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde::Deserialize;

use super::model::{Document, Peptide, PeptideKey, PredictionModel};
use crate::calc::{CalculatorRegistry, DictionaryCalculator};

/// Column holding the peptide's modified sequence.
pub const SEQUENCE_COLUMN: &str = "sequence";
pub const DECOY_COLUMN: &str = "decoy";
pub const STANDARD_COLUMN: &str = "standard";
pub const BEST_RESULT_COLUMN: &str = "best_result";
/// Prefix of per-replicate retention time columns, e.g. `rt:run1`.
pub const TIME_PREFIX: &str = "rt:";
/// Prefix of per-calculator score columns, e.g. `score:SSRCalc`.
pub const SCORE_PREFIX: &str = "score:";

/// A loaded document together with the score tables it carried.
#[derive(Debug)]
pub struct LoadedDocument {
    pub document: Document,
    pub calculators: Vec<DictionaryCalculator>,
}

impl LoadedDocument {
    /// Registry of the imported calculators, in column order.
    pub fn registry(&self) -> CalculatorRegistry {
        let mut registry = CalculatorRegistry::new();
        for calculator in &self.calculators {
            registry.register(Arc::new(calculator.clone()));
        }
        registry
    }
}

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load a peptide document from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.parquet` – one row per peptide with `rt:<run>` and `score:<calc>` columns
/// * `.json`    – `{ "replicates": [...], "peptides": [...], "prediction": {...} }`
/// * `.csv`     – same columns as Parquet; empty cells are missing values
pub fn load_file(path: &Path) -> Result<LoadedDocument> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let loaded = match ext.as_str() {
        "parquet" | "pq" => load_parquet(path),
        "json" => load_json(path),
        "csv" => load_csv(path),
        other => bail!("Unsupported file extension: .{other}"),
    }?;
    info!(
        "Loaded {} peptides, {} replicates, {} calculators from {}",
        loaded.document.len(),
        loaded.document.replicate_count(),
        loaded.calculators.len(),
        path.display()
    );
    Ok(loaded)
}

// ---------------------------------------------------------------------------
// Row assembly shared by every format
// ---------------------------------------------------------------------------

/// One peptide row as read from a table.
#[derive(Debug, Default)]
struct Row {
    sequence: String,
    decoy: bool,
    standard: bool,
    best_result: Option<usize>,
    times: Vec<Option<f64>>,
    scores: Vec<Option<f64>>,
}

/// Where the recognised columns sit in a table header.
#[derive(Debug)]
struct Layout {
    sequence: usize,
    decoy: Option<usize>,
    standard: Option<usize>,
    best_result: Option<usize>,
    /// (column index, replicate name)
    times: Vec<(usize, String)>,
    /// (column index, calculator name)
    scores: Vec<(usize, String)>,
}

impl Layout {
    fn from_headers<'a>(headers: impl IntoIterator<Item = &'a str>) -> Result<Self> {
        let mut sequence = None;
        let mut layout = Layout {
            sequence: 0,
            decoy: None,
            standard: None,
            best_result: None,
            times: Vec::new(),
            scores: Vec::new(),
        };
        for (i, header) in headers.into_iter().enumerate() {
            match header {
                SEQUENCE_COLUMN => sequence = Some(i),
                DECOY_COLUMN => layout.decoy = Some(i),
                STANDARD_COLUMN => layout.standard = Some(i),
                BEST_RESULT_COLUMN => layout.best_result = Some(i),
                h => {
                    if let Some(run) = h.strip_prefix(TIME_PREFIX) {
                        layout.times.push((i, run.to_string()));
                    } else if let Some(calc) = h.strip_prefix(SCORE_PREFIX) {
                        layout.scores.push((i, calc.to_string()));
                    }
                }
            }
        }
        layout.sequence = sequence.with_context(|| format!("missing '{SEQUENCE_COLUMN}' column"))?;
        if layout.times.is_empty() {
            bail!("no retention time columns (expected '{TIME_PREFIX}<replicate>')");
        }
        Ok(layout)
    }

    fn replicates(&self) -> Vec<String> {
        self.times.iter().map(|(_, name)| name.clone()).collect()
    }

    fn calculators(&self) -> Vec<String> {
        self.scores.iter().map(|(_, name)| name.clone()).collect()
    }
}

fn assemble(
    replicates: Vec<String>,
    calculator_names: Vec<String>,
    rows: Vec<Row>,
    prediction: Option<PredictionModel>,
) -> Result<LoadedDocument> {
    let mut peptides = Vec::with_capacity(rows.len());
    let mut standards = Vec::new();
    let mut tables: Vec<Vec<(PeptideKey, f64)>> = vec![Vec::new(); calculator_names.len()];

    for (row_no, row) in rows.into_iter().enumerate() {
        if row.times.len() != replicates.len() {
            bail!(
                "Row {row_no}: {} times for {} replicates",
                row.times.len(),
                replicates.len()
            );
        }
        if let Some(best) = row.best_result {
            if best >= replicates.len() {
                bail!("Row {row_no}: best_result {best} is not a replicate index");
            }
        }
        let key = PeptideKey::new(row.sequence);
        for (table, score) in tables.iter_mut().zip(row.scores) {
            if let Some(score) = score {
                table.push((key.clone(), score));
            }
        }
        if row.standard {
            standards.push(key.clone());
        }
        let mut peptide = Peptide::new(key, row.times);
        peptide.decoy = row.decoy;
        peptide.best_result = row.best_result;
        peptides.push(peptide);
    }

    let calculators = calculator_names
        .into_iter()
        .zip(tables)
        .map(|(name, scores)| {
            DictionaryCalculator::new(name, scores).with_standards(standards.iter().cloned())
        })
        .collect();

    let mut document = Document::new(replicates, peptides).with_standards(standards);
    document.prediction = prediction;
    Ok(LoadedDocument {
        document,
        calculators,
    })
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct DocumentFile {
    replicates: Vec<String>,
    peptides: Vec<PeptideRecord>,
    #[serde(default)]
    prediction: Option<PredictionModel>,
}

#[derive(Debug, Deserialize)]
struct PeptideRecord {
    sequence: String,
    #[serde(default)]
    decoy: bool,
    #[serde(default)]
    standard: bool,
    #[serde(default)]
    best_result: Option<usize>,
    times: Vec<Option<f64>>,
    #[serde(default)]
    scores: BTreeMap<String, f64>,
}

/// Expected JSON schema:
///
/// ```json
/// {
///   "replicates": ["run1", "run2"],
///   "peptides": [
///     { "sequence": "PEPTIDEK", "times": [12.1, null], "scores": { "SSRCalc": 20.4 } },
///     { "sequence": "LGGNEQVTR", "standard": true, "times": [8.0, 8.2] }
///   ],
///   "prediction": { "calculator": "SSRCalc", "slope": 1.1, "intercept": 4.9, "window": 2.0 }
/// }
/// ```
///
/// Calculators are the union of the score names, sorted by name.
fn load_json(path: &Path) -> Result<LoadedDocument> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let file: DocumentFile = serde_json::from_str(&text).context("parsing JSON")?;

    let mut names: Vec<String> = file
        .peptides
        .iter()
        .flat_map(|p| p.scores.keys().cloned())
        .collect();
    names.sort();
    names.dedup();

    let rows = file
        .peptides
        .into_iter()
        .map(|p| Row {
            scores: names.iter().map(|n| p.scores.get(n).copied()).collect(),
            sequence: p.sequence,
            decoy: p.decoy,
            standard: p.standard,
            best_result: p.best_result,
            times: p.times,
        })
        .collect();

    assemble(file.replicates, names, rows, file.prediction)
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// CSV layout:  header row with column names, one peptide per row.
/// `rt:<replicate>` and `score:<calculator>` cells hold floats; an empty
/// cell is a missing value.  `decoy` / `standard` take `true` / `false`
/// (or `1` / `0`).
fn load_csv(path: &Path) -> Result<LoadedDocument> {
    let mut reader = csv::Reader::from_path(path).context("opening CSV")?;
    let headers = reader.headers().context("reading CSV headers")?.clone();
    let layout = Layout::from_headers(headers.iter())?;

    let mut rows = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        let cell = |i: usize| record.get(i).unwrap_or("").trim();

        let sequence = cell(layout.sequence);
        if sequence.is_empty() {
            bail!("CSV row {row_no}: empty sequence");
        }
        let flag = |col: Option<usize>, name: &str| -> Result<bool> {
            col.map_or(Ok(false), |i| parse_flag(cell(i), row_no, name))
        };
        let best_result = match layout.best_result.map(cell) {
            None | Some("") => None,
            Some(s) => Some(
                s.parse::<usize>()
                    .with_context(|| format!("Row {row_no}, best_result: '{s}' is not an index"))?,
            ),
        };

        rows.push(Row {
            sequence: sequence.to_string(),
            decoy: flag(layout.decoy, DECOY_COLUMN)?,
            standard: flag(layout.standard, STANDARD_COLUMN)?,
            best_result,
            times: layout
                .times
                .iter()
                .map(|(i, name)| parse_optional_float(cell(*i), row_no, name))
                .collect::<Result<_>>()?,
            scores: layout
                .scores
                .iter()
                .map(|(i, name)| parse_optional_float(cell(*i), row_no, name))
                .collect::<Result<_>>()?,
        });
    }

    assemble(layout.replicates(), layout.calculators(), rows, None)
}

fn parse_optional_float(s: &str, row: usize, col: &str) -> Result<Option<f64>> {
    if s.is_empty() {
        return Ok(None);
    }
    s.parse::<f64>()
        .map(Some)
        .with_context(|| format!("Row {row}, {col}: '{s}' is not a number"))
}

fn parse_flag(s: &str, row: usize, col: &str) -> Result<bool> {
    match s.to_ascii_lowercase().as_str() {
        "" | "false" | "0" => Ok(false),
        "true" | "1" => Ok(true),
        other => bail!("Row {row}, {col}: '{other}' is not a boolean"),
    }
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a Parquet peptide table.
///
/// Expected schema:
/// - `sequence`: Utf8 or LargeUtf8
/// - `decoy`, `standard`: Boolean (optional)
/// - `best_result`: Int32 or Int64 replicate index (optional, nullable)
/// - `rt:<replicate>`, `score:<calculator>`: Float64 or Float32, nullable
///
/// Works with files written by both **Pandas** (`df.to_parquet()`) and
/// **Polars** (`df.write_parquet()`).
fn load_parquet(path: &Path) -> Result<LoadedDocument> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .context("reading parquet metadata")?;
    let layout = Layout::from_headers(
        builder
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().as_str()),
    )?;
    let reader = builder.build().context("building parquet reader")?;

    let mut rows = Vec::new();

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;

        for row in 0..batch.num_rows() {
            let row_no = rows.len();
            let sequence = extract_string(batch.column(layout.sequence), row)
                .with_context(|| format!("Row {row_no}: failed to read '{SEQUENCE_COLUMN}'"))?;
            let flag = |col: Option<usize>| -> Result<bool> {
                col.map_or(Ok(false), |i| {
                    extract_bool(batch.column(i), row).map(|b| b.unwrap_or(false))
                })
            };
            let best_result = match layout.best_result {
                Some(i) => extract_index(batch.column(i), row)
                    .with_context(|| format!("Row {row_no}: failed to read '{BEST_RESULT_COLUMN}'"))?,
                None => None,
            };
            let floats = |cols: &[(usize, String)]| -> Result<Vec<Option<f64>>> {
                cols.iter()
                    .map(|(i, name)| {
                        extract_f64(batch.column(*i), row)
                            .with_context(|| format!("Row {row_no}: failed to read '{name}'"))
                    })
                    .collect()
            };

            rows.push(Row {
                sequence,
                decoy: flag(layout.decoy)?,
                standard: flag(layout.standard)?,
                best_result,
                times: floats(&layout.times)?,
                scores: floats(&layout.scores)?,
            });
        }
    }

    assemble(layout.replicates(), layout.calculators(), rows, None)
}

// -- Parquet / Arrow helpers --

fn extract_string(col: &Arc<dyn Array>, row: usize) -> Result<String> {
    if col.is_null(row) {
        bail!("null sequence");
    }
    match col.data_type() {
        DataType::Utf8 => {
            let arr = col
                .as_any()
                .downcast_ref::<StringArray>()
                .context("expected StringArray")?;
            Ok(arr.value(row).to_string())
        }
        DataType::LargeUtf8 => Ok(col.as_string::<i64>().value(row).to_string()),
        other => bail!("Expected Utf8 column, got {other:?}"),
    }
}

/// A nullable float cell; null and NaN both mean "missing".
fn extract_f64(col: &Arc<dyn Array>, row: usize) -> Result<Option<f64>> {
    if col.is_null(row) {
        return Ok(None);
    }
    let value = if let Some(arr) = col.as_any().downcast_ref::<Float64Array>() {
        arr.value(row)
    } else if let Some(arr) = col.as_any().downcast_ref::<Float32Array>() {
        arr.value(row) as f64
    } else {
        bail!("Expected Float64 or Float32 column, got {:?}", col.data_type())
    };
    Ok(Some(value).filter(|v| !v.is_nan()))
}

fn extract_bool(col: &Arc<dyn Array>, row: usize) -> Result<Option<bool>> {
    if col.is_null(row) {
        return Ok(None);
    }
    let arr = col
        .as_any()
        .downcast_ref::<BooleanArray>()
        .with_context(|| format!("Expected Boolean column, got {:?}", col.data_type()))?;
    Ok(Some(arr.value(row)))
}

fn extract_index(col: &Arc<dyn Array>, row: usize) -> Result<Option<usize>> {
    if col.is_null(row) {
        return Ok(None);
    }
    let value = match col.data_type() {
        DataType::Int32 => col
            .as_any()
            .downcast_ref::<Int32Array>()
            .context("expected Int32Array")?
            .value(row) as i64,
        DataType::Int64 => col
            .as_any()
            .downcast_ref::<Int64Array>()
            .context("expected Int64Array")?
            .value(row),
        other => bail!("Expected Int32 or Int64 column, got {other:?}"),
    };
    // Negative indices mean "no best result".
    Ok(usize::try_from(value).ok())
}
