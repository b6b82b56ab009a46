/// Data layer: the peptide document, loading, and point selection.
///
/// Architecture:
/// ```text
///  .parquet / .json / .csv
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse file → Document + score tables
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │ Document  │  Vec<Peptide>, per-replicate times, standards
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  filter   │  targets / standards / decoys → document indices
///   └──────────┘
/// ```

pub mod loader;
pub mod model;
pub mod filter;
