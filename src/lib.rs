//! Retention time regression with iterative outlier rejection.
//!
//! Peptide retention times are regressed against a calculator's scores (or
//! against another run's times), the worst-fitting peptides are rejected
//! until the correlation reaches a threshold, and the result is published
//! through a lock-free snapshot slot so slow refinements never overwrite
//! fresher sessions.

pub mod app;
pub mod calc;
pub mod data;
pub mod error;
pub mod regression;
pub mod report;
pub mod session;
pub mod settings;
pub mod state;
