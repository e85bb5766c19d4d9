//! Analysis session
//!
//! A session holds everything the user has chosen for one recording: the
//! raw table, the column selection, the phase boundaries and the engine
//! configuration. Every change is followed by a full recomputation through
//! [`analyze`], which has no hidden state.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::AnalysisError;
use crate::mapping::{CleaningReport, ColumnMapping, ColumnSelection};
use crate::metrics::MetricsEngine;
use crate::summary::SeriesSummary;
use crate::table::RawTable;
use crate::types::{MetricsRecord, PhaseBoundaries, SampleSeries};

/// Result of one recomputation
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub analysis_id: Uuid,
    pub computed_at: DateTime<Utc>,
    pub mapping: ColumnMapping,
    pub cleaning: CleaningReport,
    pub boundaries: PhaseBoundaries,
    pub config: EngineConfig,
    #[serde(skip)]
    pub series: SampleSeries,
    pub summary: SeriesSummary,
    pub metrics: MetricsRecord,
}

/// Run the full analysis: resolve columns, clean, validate boundaries, compute metrics.
pub fn analyze(
    table: &RawTable,
    selection: &ColumnSelection,
    boundaries: PhaseBoundaries,
    config: &EngineConfig,
) -> Result<Analysis, AnalysisError> {
    config.validate()?;

    let mapping = ColumnMapping::resolve(table, selection)?;
    let (series, cleaning) = mapping.extract(table)?;

    let empty = || AnalysisError::EmptyDataset {
        dropped: cleaning.dropped_rows,
    };
    let max_time = series.max_time().ok_or_else(empty)?;
    boundaries.validate(max_time)?;
    let summary = SeriesSummary::from_series(&series).ok_or_else(empty)?;

    let metrics = MetricsEngine::new(config.clone()).compute(&series, &boundaries);

    Ok(Analysis {
        analysis_id: Uuid::new_v4(),
        computed_at: Utc::now(),
        mapping,
        cleaning,
        boundaries,
        config: config.clone(),
        series,
        summary,
        metrics,
    })
}

/// Per-recording state for interactive use
#[derive(Debug, Clone)]
pub struct AnalysisSession {
    table: RawTable,
    selection: ColumnSelection,
    boundaries: PhaseBoundaries,
    config: EngineConfig,
}

impl AnalysisSession {
    /// Start a session with default boundaries, configuration and detected columns
    pub fn new(table: RawTable) -> Self {
        Self {
            table,
            selection: ColumnSelection::default(),
            boundaries: PhaseBoundaries::default(),
            config: EngineConfig::default(),
        }
    }

    pub fn from_path(path: &Path, delimiter: Option<u8>) -> Result<Self, AnalysisError> {
        Ok(Self::new(RawTable::from_path(path, delimiter)?))
    }

    pub fn table(&self) -> &RawTable {
        &self.table
    }

    pub fn selection(&self) -> &ColumnSelection {
        &self.selection
    }

    pub fn boundaries(&self) -> PhaseBoundaries {
        self.boundaries
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn set_selection(&mut self, selection: ColumnSelection) {
        self.selection = selection;
    }

    pub fn set_boundaries(&mut self, boundaries: PhaseBoundaries) {
        self.boundaries = boundaries;
    }

    pub fn set_config(&mut self, config: EngineConfig) {
        self.config = config;
    }

    /// Columns the current selection resolves to
    pub fn mapping(&self) -> Result<ColumnMapping, AnalysisError> {
        ColumnMapping::resolve(&self.table, &self.selection)
    }

    /// Recompute everything from the current state
    pub fn recompute(&self) -> Result<Analysis, AnalysisError> {
        let analysis = analyze(&self.table, &self.selection, self.boundaries, &self.config)?;
        info!(
            id = %analysis.analysis_id,
            samples = analysis.series.len(),
            dropped = analysis.cleaning.dropped_rows,
            t1 = self.boundaries.t1,
            t2 = self.boundaries.t2,
            t3 = self.boundaries.t3,
            "analysis recomputed"
        );
        Ok(analysis)
    }
}
