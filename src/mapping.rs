//! Column mapping and cleaning
//!
//! Resolves which table columns hold time, SmO2 and power, either from an
//! explicit user selection or by matching header names, then converts the
//! selected cells to numbers. Rows with an unparseable or missing time,
//! primary SmO2 or power cell are dropped.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::AnalysisError;
use crate::table::RawTable;
use crate::types::{Sample, SampleSeries};

/// Header fragments that identify each column (case-insensitive)
const TIME_HINTS: [&str; 3] = ["time[s]", "temps", "time"];
const SMO2_HINTS: [&str; 1] = ["smo2"];
const SECONDARY_SMO2_HINTS: [&str; 4] = ["smo2 - 2", "smo2_2", "smo2 2", "smo2-2"];
const POWER_HINTS: [&str; 3] = ["power", "puissance", "target"];

/// Header names chosen for each logical column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub time: String,
    pub smo2_primary: String,
    pub smo2_secondary: Option<String>,
    pub power: String,
}

/// Partial user selection; unset columns fall back to header detection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSelection {
    pub time: Option<String>,
    pub smo2_primary: Option<String>,
    pub smo2_secondary: Option<String>,
    pub power: Option<String>,
}

/// Outcome of cleaning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleaningReport {
    pub total_rows: usize,
    pub kept_rows: usize,
    pub dropped_rows: usize,
}

impl ColumnMapping {
    /// Detect every column from the header names
    pub fn detect(table: &RawTable) -> Result<Self, AnalysisError> {
        Self::resolve(table, &ColumnSelection::default())
    }

    /// Combine a user selection with header detection for the unset columns
    pub fn resolve(table: &RawTable, selection: &ColumnSelection) -> Result<Self, AnalysisError> {
        let headers = table.headers();
        let available = || headers.to_vec();

        let explicit = |name: &Option<String>| -> Result<Option<String>, AnalysisError> {
            match name {
                Some(n) if table.column_index(n).is_some() => Ok(Some(n.clone())),
                Some(n) => Err(AnalysisError::UnknownColumn {
                    name: n.clone(),
                    available: available(),
                }),
                None => Ok(None),
            }
        };

        let smo2_secondary = match explicit(&selection.smo2_secondary)? {
            Some(name) => Some(name),
            None => find_header(headers, &SECONDARY_SMO2_HINTS, &[]),
        };
        let taken: Vec<&str> = smo2_secondary.iter().map(String::as_str).collect();

        let time = explicit(&selection.time)?.or_else(|| find_header(headers, &TIME_HINTS, &[]));
        let smo2_primary = explicit(&selection.smo2_primary)?
            .or_else(|| find_header(headers, &SMO2_HINTS, &taken));
        let power =
            explicit(&selection.power)?.or_else(|| find_header(headers, &POWER_HINTS, &[]));

        match (time, smo2_primary, power) {
            (Some(time), Some(smo2_primary), Some(power)) => {
                let mapping = Self {
                    time,
                    smo2_primary,
                    smo2_secondary,
                    power,
                };
                debug!(?mapping, "columns resolved");
                Ok(mapping)
            }
            (time, smo2, power) => {
                let missing = [("time", time), ("smo2", smo2), ("power", power)]
                    .into_iter()
                    .filter(|(_, found)| found.is_none())
                    .map(|(label, _)| label.to_string())
                    .collect();
                Err(AnalysisError::MissingColumns {
                    missing,
                    available: available(),
                })
            }
        }
    }

    /// Convert the mapped columns into a cleaned series
    pub fn extract(&self, table: &RawTable) -> Result<(SampleSeries, CleaningReport), AnalysisError> {
        let index = |name: &str| {
            table
                .column_index(name)
                .ok_or_else(|| AnalysisError::UnknownColumn {
                    name: name.to_string(),
                    available: table.headers().to_vec(),
                })
        };

        let time_col = index(&self.time)?;
        let smo2_col = index(&self.smo2_primary)?;
        let power_col = index(&self.power)?;
        let secondary_col = self.smo2_secondary.as_deref().map(index).transpose()?;

        let total_rows = table.row_count();
        let mut samples = Vec::with_capacity(total_rows);

        for row in 0..total_rows {
            let number = |col: usize| table.cell(row, col).and_then(parse_number);
            let (Some(time), Some(smo2), Some(power)) =
                (number(time_col), number(smo2_col), number(power_col))
            else {
                continue;
            };

            let mut sample = Sample::new(time, smo2, power);
            sample.smo2_secondary = secondary_col.and_then(number);
            samples.push(sample);
        }

        let report = CleaningReport {
            total_rows,
            kept_rows: samples.len(),
            dropped_rows: total_rows - samples.len(),
        };

        if samples.is_empty() {
            return Err(AnalysisError::EmptyDataset {
                dropped: report.dropped_rows,
            });
        }
        if report.dropped_rows > 0 {
            warn!(
                dropped = report.dropped_rows,
                total = report.total_rows,
                "rows with missing or non-numeric values dropped"
            );
        }

        Ok((SampleSeries::new(samples), report))
    }
}

/// First header containing any hint, skipping headers in `exclude`
fn find_header(headers: &[String], hints: &[&str], exclude: &[&str]) -> Option<String> {
    hints.iter().find_map(|hint| {
        headers
            .iter()
            .filter(|h| !exclude.contains(&h.as_str()))
            .find(|h| h.to_lowercase().contains(hint))
            .cloned()
    })
}

/// Parse a numeric cell; empty, non-numeric and non-finite cells are missing
fn parse_number(cell: &str) -> Option<f64> {
    cell.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn moxy_table() -> RawTable {
        RawTable::parse(
            "Time[s],SmO2[%],SmO2 - 2[%],Power -  2[W]\n\
             0,60,70,300\n\
             1,59,,310\n\
             2,abc,68,320\n\
             3,57,67,\n\
             4,56,66,290\n",
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_detect_columns() {
        let mapping = ColumnMapping::detect(&moxy_table()).unwrap();
        assert_eq!(
            mapping,
            ColumnMapping {
                time: "Time[s]".to_string(),
                smo2_primary: "SmO2[%]".to_string(),
                smo2_secondary: Some("SmO2 - 2[%]".to_string()),
                power: "Power -  2[W]".to_string(),
            }
        );
    }

    #[test]
    fn test_detect_french_headers() {
        let table = RawTable::parse("Temps,SmO2,Puissance\n0,60,300\n", None).unwrap();
        let mapping = ColumnMapping::detect(&table).unwrap();
        assert_eq!(mapping.time, "Temps");
        assert_eq!(mapping.power, "Puissance");
        assert_eq!(mapping.smo2_secondary, None);
    }

    #[test]
    fn test_missing_columns_lists_available() {
        let table = RawTable::parse("Time,HR\n0,120\n", None).unwrap();
        match ColumnMapping::detect(&table) {
            Err(AnalysisError::MissingColumns { missing, available }) => {
                assert_eq!(missing, vec!["smo2".to_string(), "power".to_string()]);
                assert_eq!(available, vec!["Time".to_string(), "HR".to_string()]);
            }
            other => panic!("expected MissingColumns, got {:?}", other),
        }
    }

    #[test]
    fn test_explicit_selection_overrides_detection() {
        let table = RawTable::parse("t,Muscle,Watts,Power\n0,60,300,1\n", None).unwrap();
        let selection = ColumnSelection {
            time: Some("t".to_string()),
            smo2_primary: Some("Muscle".to_string()),
            power: Some("Watts".to_string()),
            ..Default::default()
        };
        let mapping = ColumnMapping::resolve(&table, &selection).unwrap();
        assert_eq!(mapping.power, "Watts");

        let bad = ColumnSelection {
            time: Some("nope".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            ColumnMapping::resolve(&table, &bad),
            Err(AnalysisError::UnknownColumn { .. })
        ));
    }

    #[test]
    fn test_extract_drops_incomplete_rows() {
        let table = moxy_table();
        let mapping = ColumnMapping::detect(&table).unwrap();
        let (series, report) = mapping.extract(&table).unwrap();

        assert_eq!(
            report,
            CleaningReport {
                total_rows: 5,
                kept_rows: 3,
                dropped_rows: 2,
            }
        );
        let times: Vec<f64> = series.samples().iter().map(|s| s.time).collect();
        assert_eq!(times, vec![0.0, 1.0, 4.0]);
        // missing secondary cell keeps the row
        assert_eq!(series.samples()[1].smo2_secondary, None);
        assert!(series.has_secondary());
    }

    #[test]
    fn test_extract_empty_after_cleaning() {
        let table = RawTable::parse("Time,SmO2,Power\nx,y,z\n", None).unwrap();
        let mapping = ColumnMapping::detect(&table).unwrap();
        assert!(matches!(
            mapping.extract(&table),
            Err(AnalysisError::EmptyDataset { dropped: 1 })
        ));
    }
}
