//! Raw tabular input
//!
//! Reads a CSV or spreadsheet recording into untyped string cells. Column
//! selection and numeric conversion happen later, in [`crate::mapping`].

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AnalysisError;

/// Delimiters tried when none is given
const CANDIDATE_DELIMITERS: [u8; 3] = [b',', b';', b'\t'];

/// Extensions read as workbooks rather than delimited text
const SPREADSHEET_EXTENSIONS: [&str; 5] = ["xlsx", "xlsm", "xlsb", "xls", "ods"];

/// Header row plus string cells, as read from the file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    /// Read a recording, choosing the reader from the file extension
    ///
    /// Workbooks are read from their first worksheet. For delimited text the
    /// delimiter is sniffed from the header line when `None`.
    pub fn from_path(path: &Path, delimiter: Option<u8>) -> Result<Self, AnalysisError> {
        let table = if is_spreadsheet(path) {
            Self::from_spreadsheet(path)?
        } else {
            Self::from_reader(BufReader::new(File::open(path)?), delimiter)?
        };
        debug!(
            path = %path.display(),
            columns = table.headers.len(),
            rows = table.rows.len(),
            "table loaded"
        );
        Ok(table)
    }

    /// Read the first worksheet of a workbook; the first row holds the headers
    pub fn from_spreadsheet(path: &Path) -> Result<Self, AnalysisError> {
        let mut workbook = open_workbook_auto(path)?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or(AnalysisError::NoWorksheet)??;

        let mut rows = range
            .rows()
            .map(|row| row.iter().map(cell_text).collect::<Vec<String>>());
        let headers = rows.next().unwrap_or_default();
        if headers.iter().all(|h| h.is_empty()) {
            return Err(AnalysisError::EmptyTable);
        }

        Ok(Self::new(headers, rows.collect()))
    }

    pub fn from_reader<R: Read>(mut reader: R, delimiter: Option<u8>) -> Result<Self, AnalysisError> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        Self::parse(&text, delimiter)
    }

    pub fn parse(text: &str, delimiter: Option<u8>) -> Result<Self, AnalysisError> {
        let text = text.trim_start_matches('\u{feff}');
        let delimiter = delimiter.unwrap_or_else(|| sniff_delimiter(text));

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        if headers.iter().all(|h| h.is_empty()) {
            return Err(AnalysisError::EmptyTable);
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        Ok(Self::new(headers, rows))
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// The first `n` rows (fewer when the table is shorter)
    pub fn head(&self, n: usize) -> &[Vec<String>] {
        &self.rows[..n.min(self.rows.len())]
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Index of the column with exactly this header
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Cell at `(row, column)`; short rows read as missing
    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .map(String::as_str)
    }
}

fn is_spreadsheet(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SPREADSHEET_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Workbook cell as text; numbers keep their shortest representation
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.trim().to_string(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(d) => d.as_f64().to_string(),
        _ => String::new(),
    }
}

/// Pick the candidate delimiter that occurs most often on the header line
fn sniff_delimiter(text: &str) -> u8 {
    let header = text.lines().next().unwrap_or_default();
    CANDIDATE_DELIMITERS
        .iter()
        .copied()
        .map(|d| (d, header.bytes().filter(|&b| b == d).count()))
        .filter(|&(_, count)| count > 0)
        .max_by_key(|&(_, count)| count)
        .map(|(d, _)| d)
        .unwrap_or(b',')
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_comma() {
        let table = RawTable::parse("Time[s],SmO2[%],Power[W]\n0,60,300\n1,59,310\n", None).unwrap();
        assert_eq!(table.headers(), &["Time[s]", "SmO2[%]", "Power[W]"]);
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.cell(1, 2), Some("310"));
        assert_eq!(table.column_index("SmO2[%]"), Some(1));
        assert_eq!(table.head(1), &[vec!["0", "60", "300"]]);
        assert_eq!(table.head(10).len(), 2);
    }

    #[test]
    fn test_sniff_semicolon_and_tab() {
        let table = RawTable::parse("Temps;SmO2;Puissance\n0;60;300\n", None).unwrap();
        assert_eq!(table.headers().len(), 3);

        let table = RawTable::parse("Time\tSmO2\tPower\n0\t60\t300\n", None).unwrap();
        assert_eq!(table.cell(0, 1), Some("60"));
    }

    #[test]
    fn test_short_rows_and_bom() {
        let table = RawTable::parse("\u{feff}Time,SmO2,Power\n0,60\n", None).unwrap();
        assert_eq!(table.headers()[0], "Time");
        assert_eq!(table.cell(0, 2), None);
    }

    #[test]
    fn test_spreadsheet_extension() {
        assert!(is_spreadsheet(Path::new("test.xlsx")));
        assert!(is_spreadsheet(Path::new("TEST.XLS")));
        assert!(!is_spreadsheet(Path::new("test.csv")));
        assert!(!is_spreadsheet(Path::new("test")));
    }

    #[test]
    fn test_read_workbook() {
        use crate::mapping::ColumnMapping;
        use rust_xlsxwriter::Workbook;

        let dir = std::env::temp_dir().join(format!("allout-table-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("test.xlsx");

        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        for (col, header) in ["Time[s]", "SmO2[%]", "Power[W]"].iter().enumerate() {
            sheet.write_string(0, col as u16, *header).unwrap();
        }
        let data = [[0.0, 60.0, 300.0], [10.0, 55.0, 280.0], [20.0, 50.5, 260.0]];
        for (row, values) in data.iter().enumerate() {
            for (col, value) in values.iter().enumerate() {
                sheet.write_number(row as u32 + 1, col as u16, *value).unwrap();
            }
        }
        workbook.save(&path).unwrap();

        let table = RawTable::from_path(&path, None).unwrap();
        assert_eq!(table.headers(), &["Time[s]", "SmO2[%]", "Power[W]"]);
        assert_eq!(table.row_count(), 3);
        assert_eq!(table.cell(2, 1), Some("50.5"));

        let mapping = ColumnMapping::detect(&table).unwrap();
        let (series, report) = mapping.extract(&table).unwrap();
        assert_eq!(report.dropped_rows, 0);
        assert_eq!(series.max_time(), Some(20.0));
        assert_eq!(series.samples()[0].power, 300.0);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_empty_input() {
        assert!(matches!(
            RawTable::parse("", None),
            Err(AnalysisError::EmptyTable)
        ));
    }
}
