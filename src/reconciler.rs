//! Insert-or-update of records against the records worksheet.
//!
//! Every upsert starts from a fresh read of the whole table, finds the first
//! row carrying the same natural key, and either rewrites that row's value
//! cell or appends a new row. Nothing guards the gap between the read and the
//! write: a concurrent writer can make the computed row position stale, or
//! two writers can both append the same key.

use async_trait::async_trait;

use crate::error::AccessError;
use crate::record::{Record, RecordKey, UpsertOutcome};
use crate::table::RecordTable;

/// Keyed access to persisted records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Every record currently stored, in table order.
    async fn list(&self) -> Result<Vec<Record>, AccessError>;

    /// The first record with this key, in table order.
    async fn find(&self, key: &RecordKey) -> Result<Option<Record>, AccessError>;

    async fn upsert(&self, record: &Record) -> Result<UpsertOutcome, AccessError>;
}

/// Linear-scan store over a records worksheet.
#[derive(Clone)]
pub struct SheetRecordStore {
    table: RecordTable,
}

impl SheetRecordStore {
    pub fn new(table: RecordTable) -> Self {
        SheetRecordStore { table }
    }
}

#[async_trait]
impl RecordStore for SheetRecordStore {
    async fn list(&self) -> Result<Vec<Record>, AccessError> {
        self.table.fetch_all().await
    }

    async fn find(&self, key: &RecordKey) -> Result<Option<Record>, AccessError> {
        let records = self.table.fetch_all().await?;
        Ok(records.into_iter().find(|r| key.matches(r)))
    }

    async fn upsert(&self, record: &Record) -> Result<UpsertOutcome, AccessError> {
        let snapshot = self.table.fetch_snapshot().await?;
        let key = record.key();
        let mut matches = snapshot.rows.iter().filter(|s| key.matches(&s.record));

        let Some(existing) = matches.next() else {
            if snapshot.header.is_empty() {
                log::info!("{} has no header; writing it first", self.table.title());
                self.table.append_header().await?;
            }
            self.table.append_row(record).await?;
            log::info!("inserted {key} = {:?}", record.value);
            return Ok(UpsertOutcome::Inserted);
        };

        let duplicates = matches.count();
        if duplicates > 0 {
            log::warn!(
                "{key} has {duplicates} duplicate row(s); updating the first at row {}",
                existing.row
            );
        }

        let col = snapshot.value_column().ok_or_else(|| {
            AccessError::malformed(self.table.title(), "missing column \"value\"")
        })?;
        self.table.update_cell(existing.row, col, &record.value).await?;
        log::info!(
            "updated {key} at row {}: {:?} -> {:?}",
            existing.row,
            existing.record.value,
            record.value
        );
        Ok(UpsertOutcome::Updated)
    }
}

/// Upserts one value by its key fields.
pub async fn upsert_value(
    store: &dyn RecordStore,
    student_name: &str,
    date: &str,
    assignment: &str,
    lap: i64,
    value: &str,
) -> Result<UpsertOutcome, AccessError> {
    let key = RecordKey::new(student_name, date, assignment, lap);
    store.upsert(&Record::new(key, value)).await
}
