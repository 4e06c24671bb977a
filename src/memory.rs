//! In-memory workbook used by tests and by `--in-memory` local runs.
//!
//! Mirrors what the sheets service returns: trailing empty cells and rows are
//! trimmed on read, appends land after the last row holding data, and cell
//! writes may address any position in the grid. Every call is recorded so
//! tests can assert on the exact reads and writes issued.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::AccessError;
use crate::table::{CellValue, Worksheet};

/// Record of a worksheet operation for test assertions.
#[derive(Debug, Clone, PartialEq)]
pub enum SheetOp {
    Read {
        sheet: String,
    },
    Append {
        sheet: String,
        row: Vec<CellValue>,
    },
    Update {
        sheet: String,
        row: usize,
        col: usize,
        value: String,
    },
}

impl SheetOp {
    pub fn is_write(&self) -> bool {
        !matches!(self, SheetOp::Read { .. })
    }
}

/// Seed file layout: worksheet title to its grid of cells.
#[derive(Debug, Deserialize)]
#[serde(transparent)]
struct Seed(HashMap<String, Vec<Vec<serde_json::Value>>>);

fn cell_text(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Clone, Default)]
pub struct MemoryWorkbook {
    sheets: Arc<Mutex<HashMap<String, Vec<Vec<String>>>>>,
    operations: Arc<Mutex<Vec<SheetOp>>>,
    fail_sheets: Arc<Mutex<HashSet<String>>>,
}

impl MemoryWorkbook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a workbook from a JSON object of `title -> [[cell, ...], ...]`.
    /// Numbers and booleans become their text form.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let Seed(seed) = serde_json::from_str(json)?;
        let book = Self::new();
        for (title, rows) in seed {
            let rows = rows
                .into_iter()
                .map(|r| r.into_iter().map(cell_text).collect())
                .collect();
            lock(&book.sheets).insert(title, rows);
        }
        Ok(book)
    }

    /// Adds (or replaces) a worksheet.
    pub fn with_sheet(self, title: &str, rows: &[&[&str]]) -> Self {
        let rows = rows
            .iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect();
        lock(&self.sheets).insert(title.to_string(), rows);
        self
    }

    pub fn worksheet(&self, title: &str) -> MemoryWorksheet {
        MemoryWorksheet {
            book: self.clone(),
            title: title.to_string(),
        }
    }

    /// Current raw contents of a worksheet.
    pub fn rows(&self, title: &str) -> Option<Vec<Vec<String>>> {
        lock(&self.sheets).get(title).cloned()
    }

    pub fn operations(&self) -> Vec<SheetOp> {
        lock(&self.operations).clone()
    }

    pub fn writes(&self) -> Vec<SheetOp> {
        self.operations().into_iter().filter(SheetOp::is_write).collect()
    }

    pub fn reads_of(&self, title: &str) -> usize {
        self.operations()
            .iter()
            .filter(|op| matches!(op, SheetOp::Read { sheet } if sheet == title))
            .count()
    }

    pub fn clear_operations(&self) {
        lock(&self.operations).clear();
    }

    /// Makes every call against `title` fail with a rejection until healed.
    pub fn fail_sheet(&self, title: &str) {
        lock(&self.fail_sheets).insert(title.to_string());
    }

    pub fn heal_sheet(&self, title: &str) {
        lock(&self.fail_sheets).remove(title);
    }

    fn check(&self, title: &str) -> Result<(), AccessError> {
        if lock(&self.fail_sheets).contains(title) {
            return Err(AccessError::Rejected {
                status: 503,
                message: format!("injected failure for {title}"),
            });
        }
        if !lock(&self.sheets).contains_key(title) {
            return Err(AccessError::WorksheetNotFound(title.to_string()));
        }
        Ok(())
    }

    fn record(&self, op: SheetOp) {
        lock(&self.operations).push(op);
    }
}

/// A handle to one worksheet of a [`MemoryWorkbook`].
#[derive(Debug, Clone)]
pub struct MemoryWorksheet {
    book: MemoryWorkbook,
    title: String,
}

#[async_trait]
impl Worksheet for MemoryWorksheet {
    fn title(&self) -> &str {
        &self.title
    }

    async fn get_all_values(&self) -> Result<Vec<Vec<String>>, AccessError> {
        self.book.record(SheetOp::Read {
            sheet: self.title.clone(),
        });
        self.book.check(&self.title)?;

        let sheets = lock(&self.book.sheets);
        let mut rows: Vec<Vec<String>> = sheets
            .get(&self.title)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(|mut row| {
                while row.last().is_some_and(|c| c.is_empty()) {
                    row.pop();
                }
                row
            })
            .collect();
        while rows.last().is_some_and(|r| r.is_empty()) {
            rows.pop();
        }
        Ok(rows)
    }

    async fn append_row(&self, row: &[CellValue]) -> Result<(), AccessError> {
        self.book.record(SheetOp::Append {
            sheet: self.title.clone(),
            row: row.to_vec(),
        });
        self.book.check(&self.title)?;

        let mut sheets = lock(&self.book.sheets);
        let grid = sheets
            .get_mut(&self.title)
            .ok_or_else(|| AccessError::WorksheetNotFound(self.title.clone()))?;
        while grid
            .last()
            .is_some_and(|r| r.iter().all(|c| c.is_empty()))
        {
            grid.pop();
        }
        grid.push(row.iter().map(CellValue::as_text).collect());
        Ok(())
    }

    async fn update_cell(&self, row: usize, col: usize, value: &str) -> Result<(), AccessError> {
        self.book.record(SheetOp::Update {
            sheet: self.title.clone(),
            row,
            col,
            value: value.to_string(),
        });
        self.book.check(&self.title)?;
        if row == 0 || col == 0 {
            return Err(AccessError::Rejected {
                status: 400,
                message: format!("invalid cell position ({row}, {col})"),
            });
        }

        let mut sheets = lock(&self.book.sheets);
        let grid = sheets
            .get_mut(&self.title)
            .ok_or_else(|| AccessError::WorksheetNotFound(self.title.clone()))?;
        if grid.len() < row {
            grid.resize(row, Vec::new());
        }
        let cells = &mut grid[row - 1];
        if cells.len() < col {
            cells.resize(col, String::new());
        }
        cells[col - 1] = value.to_string();
        Ok(())
    }
}
