#![allow(dead_code)]

use std::sync::Arc;

use tracker::form::{CacheSettings, FormController};
use tracker::memory::MemoryWorkbook;
use tracker::reconciler::SheetRecordStore;
use tracker::table::{RecordTable, ReferenceTables};

pub const RECORDS_HEADER: &[&str] = &["student_name", "date", "assignment", "lap", "value"];

/// Alice already has a "B" for Essay lap 1 on 2024-01-01.
pub fn workbook() -> MemoryWorkbook {
    MemoryWorkbook::new()
        .with_sheet(
            "records",
            &[RECORDS_HEADER, &["Alice", "2024-01-01", "Essay", "1", "B"]],
        )
        .with_sheet("students", &[&["student"], &["Chen"], &["Alice"], &["Bob"], &["Alice"]])
        .with_sheet(
            "allowed_values",
            &[
                &["assignment", "lap", "value", "points"],
                &["Essay", "1", "B", "5"],
                &["Essay", "1", "A", "10"],
                &["Lab Report", "2", "Complete", "10"],
                &["Lab Report", "2", "In Progress", "5"],
                &["Essay", "3", "Done", "1"],
            ],
        )
}

pub fn empty_workbook() -> MemoryWorkbook {
    workbook().with_sheet("records", &[RECORDS_HEADER])
}

pub fn store(book: &MemoryWorkbook) -> SheetRecordStore {
    SheetRecordStore::new(RecordTable::new(Arc::new(book.worksheet("records"))))
}

pub fn controller_with(book: &MemoryWorkbook, settings: CacheSettings) -> FormController {
    FormController::new(
        Arc::new(store(book)),
        ReferenceTables::new(
            Arc::new(book.worksheet("students")),
            Arc::new(book.worksheet("allowed_values")),
        ),
        settings,
    )
}

pub fn controller(book: &MemoryWorkbook) -> FormController {
    controller_with(book, CacheSettings::default())
}

pub fn record_rows(book: &MemoryWorkbook) -> Vec<Vec<String>> {
    book.rows("records").unwrap_or_default()
}
