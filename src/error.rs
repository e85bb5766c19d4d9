//! Error types for the all-out test analysis

use thiserror::Error;

/// Errors that halt an analysis.
///
/// Metric-level problems (empty windows, division by zero, thresholds never
/// reached) are not errors; they surface as [`crate::types::MetricValue::Undefined`].
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing columns: {} (available: {})", missing.join(", "), available.join(", "))]
    MissingColumns {
        missing: Vec<String>,
        available: Vec<String>,
    },

    #[error("Unknown column '{name}' (available: {})", available.join(", "))]
    UnknownColumn {
        name: String,
        available: Vec<String>,
    },

    #[error("Workbook has no worksheet")]
    NoWorksheet,

    #[error("Input table has no header row")]
    EmptyTable,

    #[error("No usable samples after cleaning ({dropped} rows dropped)")]
    EmptyDataset { dropped: usize },

    #[error("Invalid phase boundaries: {0}")]
    InvalidBoundaries(String),

    #[error("Invalid engine configuration: {0}")]
    InvalidConfig(String),

    #[error("Chart rendering error: {0}")]
    Chart(String),

    #[error("Report generation error: {0}")]
    Report(String),
}
