//! Worksheet access and the header-row mapping shared by every backend.
//!
//! A worksheet is read as a grid of cell strings. Row 1 names the columns and
//! each following row is mapped to a typed value by header name, so column
//! order in the sheet does not matter. Positions handed back to writers are
//! 1-based sheet coordinates.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

use crate::error::AccessError;
use crate::record::{AllowedValue, Record, Student};

pub const RECORD_COLUMNS: [&str; 5] = ["student_name", "date", "assignment", "lap", "value"];
pub const VALUE_COLUMN: &str = "value";
pub const STUDENT_COLUMN: &str = "student";
pub const ALLOWED_VALUE_COLUMNS: [&str; 4] = ["assignment", "lap", "value", "points"];

/// A single cell written by [`Worksheet::append_row`].
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Text(String),
    Integer(i64),
}

impl CellValue {
    pub fn as_text(&self) -> String {
        match self {
            CellValue::Text(s) => s.clone(),
            CellValue::Integer(n) => n.to_string(),
        }
    }
}

/// Raw access to one named table of the backing spreadsheet.
#[async_trait]
pub trait Worksheet: Send + Sync {
    fn title(&self) -> &str;

    /// Every non-empty row of the worksheet, header included.
    async fn get_all_values(&self) -> Result<Vec<Vec<String>>, AccessError>;

    /// Appends one row after the last row holding data.
    async fn append_row(&self, row: &[CellValue]) -> Result<(), AccessError>;

    /// Overwrites a single cell. `row` and `col` are 1-based.
    async fn update_cell(&self, row: usize, col: usize, value: &str) -> Result<(), AccessError>;
}

/// Converts a 1-based column number to its letter name (1 → A, 27 → AA).
pub fn column_letter(col: usize) -> String {
    let mut col = col;
    let mut result = String::new();
    while col > 0 {
        col -= 1;
        result.push(((col % 26) as u8 + b'A') as char);
        col /= 26;
    }
    result.chars().rev().collect()
}

/// A1 name of a 1-based cell position.
pub fn a1_cell(row: usize, col: usize) -> String {
    format!("{}{}", column_letter(col), row)
}

#[derive(Clone, Debug)]
pub struct DataRow {
    /// 1-based sheet row this data came from.
    pub row: usize,
    pub cells: Vec<String>,
}

/// A worksheet split into its header and data rows.
#[derive(Clone, Debug)]
pub struct TableRows {
    pub table: String,
    pub header: Vec<String>,
    pub rows: Vec<DataRow>,
}

impl TableRows {
    pub fn from_values(table: &str, values: Vec<Vec<String>>) -> Self {
        let mut values = values.into_iter();
        let header = values.next().unwrap_or_default();
        let width = header.len();

        let rows = values
            .enumerate()
            .filter_map(|(i, mut cells)| {
                if cells.iter().all(|c| c.trim().is_empty()) {
                    return None;
                }
                if cells.len() < width {
                    cells.resize(width, String::new());
                }
                Some(DataRow { row: i + 2, cells })
            })
            .collect();

        TableRows {
            table: table.to_string(),
            header,
            rows,
        }
    }

    /// 0-based index of a header.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| h == name)
    }

    pub fn require_column(&self, name: &str) -> Result<usize, AccessError> {
        self.column(name)
            .ok_or_else(|| AccessError::malformed(&self.table, format!("missing column {name:?}")))
    }

    fn require_columns<const N: usize>(&self, names: [&str; N]) -> Result<[usize; N], AccessError> {
        let mut out = [0; N];
        for (slot, name) in out.iter_mut().zip(names) {
            *slot = self.require_column(name)?;
        }
        Ok(out)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn parse_integer(table: &str, column: &str, row: usize, raw: &str) -> Result<i64, AccessError> {
    let trimmed = raw.trim();
    if let Ok(n) = trimmed.parse::<i64>() {
        return Ok(n);
    }
    match trimmed.parse::<f64>() {
        Ok(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => Ok(f as i64),
        _ => Err(AccessError::malformed(
            table,
            format!("row {row}: {column} {raw:?} is not an integer"),
        )),
    }
}

fn parse_number(table: &str, column: &str, row: usize, raw: &str) -> Result<f64, AccessError> {
    raw.trim().parse::<f64>().map_err(|_| {
        AccessError::malformed(table, format!("row {row}: {column} {raw:?} is not a number"))
    })
}

/// A record together with the sheet row it was read from.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredRecord {
    pub row: usize,
    pub record: Record,
}

/// One fresh read of the records worksheet.
#[derive(Clone, Debug, Default)]
pub struct RecordSnapshot {
    pub header: Vec<String>,
    pub rows: Vec<StoredRecord>,
}

impl RecordSnapshot {
    pub fn from_rows(rows: &TableRows) -> Result<Self, AccessError> {
        if rows.is_empty() {
            return Ok(RecordSnapshot {
                header: rows.header.clone(),
                rows: Vec::new(),
            });
        }

        let [student, date, assignment, lap, value] = rows.require_columns(RECORD_COLUMNS)?;
        let mut stored = Vec::with_capacity(rows.rows.len());
        for data in &rows.rows {
            let cells = &data.cells;
            stored.push(StoredRecord {
                row: data.row,
                record: Record {
                    student_name: cells[student].clone(),
                    date: cells[date].clone(),
                    assignment: cells[assignment].clone(),
                    lap: parse_integer(&rows.table, "lap", data.row, &cells[lap])?,
                    value: cells[value].clone(),
                },
            });
        }

        Ok(RecordSnapshot {
            header: rows.header.clone(),
            rows: stored,
        })
    }

    /// 1-based position of the value column, if the header has one.
    pub fn value_column(&self) -> Option<usize> {
        self.header.iter().position(|h| h == VALUE_COLUMN).map(|i| i + 1)
    }

    pub fn records(&self) -> Vec<Record> {
        self.rows.iter().map(|s| s.record.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

pub fn parse_students(rows: &TableRows) -> Result<Vec<Student>, AccessError> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let col = rows.require_column(STUDENT_COLUMN)?;
    Ok(rows
        .rows
        .iter()
        .map(|r| Student {
            name: r.cells[col].clone(),
        })
        .collect())
}

pub fn parse_allowed_values(rows: &TableRows) -> Result<Vec<AllowedValue>, AccessError> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let [assignment, lap, value, points] = rows.require_columns(ALLOWED_VALUE_COLUMNS)?;
    rows.rows
        .iter()
        .map(|r| {
            Ok(AllowedValue {
                assignment: r.cells[assignment].clone(),
                lap: parse_integer(&rows.table, "lap", r.row, &r.cells[lap])?,
                value: r.cells[value].clone(),
                points: parse_number(&rows.table, "points", r.row, &r.cells[points])?,
            })
        })
        .collect()
}

/// Typed access to the records worksheet.
#[derive(Clone)]
pub struct RecordTable {
    sheet: Arc<dyn Worksheet>,
}

impl RecordTable {
    pub fn new(sheet: Arc<dyn Worksheet>) -> Self {
        RecordTable { sheet }
    }

    pub fn title(&self) -> &str {
        self.sheet.title()
    }

    pub async fn fetch_snapshot(&self) -> Result<RecordSnapshot, AccessError> {
        let values = self.sheet.get_all_values().await?;
        RecordSnapshot::from_rows(&TableRows::from_values(self.sheet.title(), values))
    }

    pub async fn fetch_all(&self) -> Result<Vec<Record>, AccessError> {
        Ok(self.fetch_snapshot().await?.records())
    }

    /// Writes the header row into a worksheet that has no cells yet.
    pub async fn append_header(&self) -> Result<(), AccessError> {
        let header = RECORD_COLUMNS.map(|name| CellValue::Text(name.to_string()));
        self.sheet.append_row(&header).await
    }

    pub async fn append_row(&self, record: &Record) -> Result<(), AccessError> {
        let row = [
            CellValue::Text(record.student_name.clone()),
            CellValue::Text(record.date.clone()),
            CellValue::Text(record.assignment.clone()),
            CellValue::Integer(record.lap),
            CellValue::Text(record.value.clone()),
        ];
        self.sheet.append_row(&row).await
    }

    pub async fn update_cell(&self, row: usize, col: usize, value: &str) -> Result<(), AccessError> {
        self.sheet.update_cell(row, col, value).await
    }
}

/// The read-only lookup tables that constrain the form.
#[derive(Clone)]
pub struct ReferenceTables {
    students: Arc<dyn Worksheet>,
    allowed_values: Arc<dyn Worksheet>,
}

impl ReferenceTables {
    pub fn new(students: Arc<dyn Worksheet>, allowed_values: Arc<dyn Worksheet>) -> Self {
        ReferenceTables {
            students,
            allowed_values,
        }
    }

    pub async fn students(&self) -> Result<Vec<Student>, AccessError> {
        let values = self.students.get_all_values().await?;
        parse_students(&TableRows::from_values(self.students.title(), values))
    }

    pub async fn allowed_values(&self) -> Result<Vec<AllowedValue>, AccessError> {
        let values = self.allowed_values.get_all_values().await?;
        parse_allowed_values(&TableRows::from_values(self.allowed_values.title(), values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    #[test]
    fn column_letters() {
        assert_eq!(column_letter(1), "A");
        assert_eq!(column_letter(5), "E");
        assert_eq!(column_letter(26), "Z");
        assert_eq!(column_letter(27), "AA");
        assert_eq!(column_letter(52), "AZ");
        assert_eq!(column_letter(703), "AAA");
        assert_eq!(a1_cell(7, 5), "E7");
    }

    #[test]
    fn empty_sheet_is_an_empty_snapshot() {
        let snapshot = RecordSnapshot::from_rows(&TableRows::from_values("records", vec![])).unwrap();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.value_column(), None);

        let header_only = grid(&[&RECORD_COLUMNS]);
        let snapshot =
            RecordSnapshot::from_rows(&TableRows::from_values("records", header_only)).unwrap();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.value_column(), Some(5));
    }

    #[test]
    fn rows_map_by_header_name() {
        let values = grid(&[
            &["value", "lap", "assignment", "date", "student_name"],
            &["B", "1", "Essay", "2024-01-01", "Alice"],
            &["", "", "", "", ""],
            &["A", "2.0", "Essay", "2024-01-02", "Bob"],
        ]);
        let snapshot = RecordSnapshot::from_rows(&TableRows::from_values("records", values)).unwrap();

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.value_column(), Some(1));
        assert_eq!(snapshot.rows[0].row, 2);
        assert_eq!(snapshot.rows[0].record.student_name, "Alice");
        assert_eq!(snapshot.rows[0].record.value, "B");
        // the blank row still occupies sheet row 3
        assert_eq!(snapshot.rows[1].row, 4);
        assert_eq!(snapshot.rows[1].record.lap, 2);
    }

    #[test]
    fn short_rows_are_padded() {
        let values = grid(&[&RECORD_COLUMNS, &["Alice", "2024-01-01", "Essay", "1"]]);
        let snapshot = RecordSnapshot::from_rows(&TableRows::from_values("records", values)).unwrap();
        assert_eq!(snapshot.rows[0].record.value, "");
    }

    #[test]
    fn bad_lap_is_malformed() {
        let values = grid(&[&RECORD_COLUMNS, &["Alice", "2024-01-01", "Essay", "one", "A"]]);
        let err = RecordSnapshot::from_rows(&TableRows::from_values("records", values)).unwrap_err();
        assert!(matches!(err, AccessError::Malformed { .. }));
    }

    #[test]
    fn lap_outside_integer_range_is_malformed() {
        assert_eq!(parse_integer("records", "lap", 2, "2.0").unwrap(), 2);
        assert_eq!(parse_integer("records", "lap", 2, "-3").unwrap(), -3);
        for raw in ["1e30", "-1e30", "9223372036854775808.0", "inf", "NaN"] {
            let err = parse_integer("records", "lap", 2, raw).unwrap_err();
            assert!(matches!(err, AccessError::Malformed { .. }), "{raw}");
        }
    }

    #[test]
    fn missing_column_is_malformed_only_with_data() {
        let values = grid(&[&["student_name", "date"], &["Alice", "2024-01-01"]]);
        let err = RecordSnapshot::from_rows(&TableRows::from_values("records", values)).unwrap_err();
        assert!(err.to_string().contains("missing column"));
    }

    #[test]
    fn allowed_values_parse_points() {
        let values = grid(&[
            &["assignment", "lap", "value", "points"],
            &["Essay", "1", "A", "10"],
            &["Essay", "1", "B", "5.5"],
        ]);
        let parsed = parse_allowed_values(&TableRows::from_values("allowed_values", values)).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].points, 5.5);
        assert_eq!(parsed[0].lap, 1);
    }
}
