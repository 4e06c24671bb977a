use clap::Parser;
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::form::{CacheSettings, FormController};
use crate::memory::MemoryWorkbook;
use crate::reconciler::SheetRecordStore;
use crate::sheets::{Credentials, SheetsClient};
use crate::table::{RecordTable, ReferenceTables, Worksheet};

/// Academic monitoring form backed by a Google spreadsheet.
#[derive(Debug, Clone, Parser)]
#[command(name = "tracker")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Address the web server listens on.
    #[arg(long, env = "TRACKER_BIND", default_value = "127.0.0.1:3000")]
    pub bind: String,

    /// Name of the spreadsheet holding the tables.
    #[arg(long, env = "TRACKER_SPREADSHEET", default_value = "Assignment_tracking_sample_data")]
    pub spreadsheet: String,

    /// Spreadsheet id; skips the lookup by name.
    #[arg(long, env = "TRACKER_SPREADSHEET_ID")]
    pub spreadsheet_id: Option<String>,

    #[arg(long, env = "TRACKER_RECORDS_SHEET", default_value = "records")]
    pub records_sheet: String,

    #[arg(long, env = "TRACKER_STUDENTS_SHEET", default_value = "students")]
    pub students_sheet: String,

    #[arg(long, env = "TRACKER_ALLOWED_SHEET", default_value = "allowed_values")]
    pub allowed_sheet: String,

    /// Path to a service-account JSON key.
    #[arg(long, env = "TRACKER_SERVICE_ACCOUNT")]
    pub service_account: Option<PathBuf>,

    /// Service-account JSON key passed inline. Wins over the path.
    #[arg(long, env = "TRACKER_SERVICE_ACCOUNT_JSON", hide_env_values = true)]
    pub service_account_json: Option<String>,

    /// Seconds the records table is served from cache.
    #[arg(long, env = "TRACKER_RECORDS_TTL_SECS", default_value_t = 30)]
    pub records_ttl_secs: u64,

    /// Seconds the students and allowed-values tables are served from cache.
    #[arg(long, env = "TRACKER_REFERENCE_TTL_SECS", default_value_t = 60)]
    pub reference_ttl_secs: u64,

    /// Keep the tables in memory instead of talking to Google.
    #[arg(long)]
    pub in_memory: bool,

    /// JSON file with the initial in-memory tables.
    #[arg(long, requires = "in_memory")]
    pub seed: Option<PathBuf>,
}

impl Config {
    pub fn credentials(&self) -> Credentials {
        if let Some(json) = &self.service_account_json {
            Credentials::Json(json.clone())
        } else if let Some(path) = &self.service_account {
            Credentials::File(path.clone())
        } else {
            Credentials::Discover
        }
    }

    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            records_ttl: Duration::from_secs(self.records_ttl_secs),
            reference_ttl: Duration::from_secs(self.reference_ttl_secs),
        }
    }

    /// Opens the configured backend and wires the form controller to it.
    pub async fn controller(&self) -> Result<FormController, Box<dyn Error>> {
        let (records, students, allowed): (
            Arc<dyn Worksheet>,
            Arc<dyn Worksheet>,
            Arc<dyn Worksheet>,
        ) = if self.in_memory {
            let book = match &self.seed {
                Some(path) => MemoryWorkbook::from_json(&std::fs::read_to_string(path)?)?,
                None => MemoryWorkbook::new()
                    .with_sheet(&self.records_sheet, &[&crate::table::RECORD_COLUMNS])
                    .with_sheet(&self.students_sheet, &[&[crate::table::STUDENT_COLUMN]])
                    .with_sheet(&self.allowed_sheet, &[&crate::table::ALLOWED_VALUE_COLUMNS]),
            };
            log::info!("using in-memory tables");
            (
                Arc::new(book.worksheet(&self.records_sheet)),
                Arc::new(book.worksheet(&self.students_sheet)),
                Arc::new(book.worksheet(&self.allowed_sheet)),
            )
        } else {
            let client = Arc::new(
                SheetsClient::connect(
                    &self.credentials(),
                    &self.spreadsheet,
                    self.spreadsheet_id.clone(),
                )
                .await?,
            );
            log::info!("using spreadsheet {:?}", self.spreadsheet);
            (
                Arc::new(client.worksheet(&self.records_sheet)),
                Arc::new(client.worksheet(&self.students_sheet)),
                Arc::new(client.worksheet(&self.allowed_sheet)),
            )
        };

        let store = SheetRecordStore::new(RecordTable::new(records));
        Ok(FormController::new(
            Arc::new(store),
            ReferenceTables::new(students, allowed),
            self.cache_settings(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_sample_spreadsheet() {
        let config = Config::try_parse_from(["tracker"]).unwrap();
        assert_eq!(config.records_sheet, "records");
        assert_eq!(config.students_sheet, "students");
        assert_eq!(config.allowed_sheet, "allowed_values");
        assert_eq!(config.cache_settings().records_ttl, Duration::from_secs(30));
        assert_eq!(config.cache_settings().reference_ttl, Duration::from_secs(60));
    }

    #[test]
    fn inline_key_wins_over_path() {
        let config = Config::try_parse_from([
            "tracker",
            "--service-account",
            "key.json",
            "--service-account-json",
            "{}",
        ])
        .unwrap();
        assert!(matches!(config.credentials(), Credentials::Json(_)));
    }

    #[test]
    fn seed_requires_in_memory() {
        assert!(Config::try_parse_from(["tracker", "--seed", "demos/seed.json"]).is_err());
    }
}
