//! allout-smo2 - Analysis engine for 30-second all-out tests with muscle oxygenation
//!
//! A recording (time, one or two SmO2 channels, power) is split into four
//! phases by three user-chosen boundaries and reduced to a fixed set of power
//! and oxygenation metrics:
//! table loading → column mapping and cleaning → metrics → chart and report.
//!
//! ## Modules
//!
//! - **Input**: [`table`] reads delimited files and spreadsheets, [`mapping`] picks and cleans the columns
//! - **Engine**: [`metrics`] computes every metric from a cleaned series and [`config`]
//! - **Session**: [`session`] recomputes everything when boundaries or settings change,
//!   and [`summary`] describes the cleaned series
//! - **Output**: [`chart`] (SVG) and [`report`] (text and PDF), with [`athlete`] details

pub mod athlete;
pub mod chart;
pub mod config;
pub mod error;
pub mod mapping;
pub mod metrics;
pub mod report;
pub mod session;
pub mod summary;
pub mod table;
pub mod types;

pub use athlete::AthleteInfo;
pub use config::{EngineConfig, HalfTimeReference, Preset, RecoveryBaseline, TimeWindow};
pub use error::AnalysisError;
pub use mapping::{CleaningReport, ColumnMapping, ColumnSelection};
pub use metrics::MetricsEngine;
pub use session::{analyze, Analysis, AnalysisSession};
pub use summary::{ChannelSummary, SeriesSummary};
pub use table::RawTable;
pub use types::{
    MetricValue, MetricsRecord, Phase, PhaseBoundaries, Sample, SampleSeries, UndefinedReason,
};

/// Crate version, embedded in JSON output
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for JSON output
pub const PRODUCER_NAME: &str = "allout-smo2";
