//! Google Sheets backend.
//!
//! One [`SheetsClient`] is built at startup and shared by every worksheet
//! handle. The spreadsheet is located by name through the Drive API the first
//! time it is needed; later calls reuse the resolved id.

use async_trait::async_trait;
use gcp_auth::{CustomServiceAccount, TokenProvider};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

use crate::error::AccessError;
use crate::table::{CellValue, Worksheet, a1_cell};

const SHEETS_API: &str = "https://sheets.googleapis.com/v4";
const DRIVE_API: &str = "https://www.googleapis.com/drive/v3";
const SPREADSHEET_MIME: &str = "application/vnd.google-apps.spreadsheet";

pub const SCOPES: [&str; 2] = [
    "https://www.googleapis.com/auth/spreadsheets",
    "https://www.googleapis.com/auth/drive",
];

/// Where the service-account key comes from.
#[derive(Debug, Clone)]
pub enum Credentials {
    /// Path to a service-account JSON key file.
    File(PathBuf),
    /// The JSON key itself, usually injected as a secret.
    Json(String),
    /// Application default credentials from the environment.
    Discover,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct DriveFileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
struct DriveFile {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ValueRangeBody<'a, T: Serialize> {
    #[serde(skip_serializing_if = "Option::is_none")]
    range: Option<&'a str>,
    major_dimension: &'static str,
    values: [&'a [T]; 1],
}

pub struct SheetsClient {
    http: reqwest::Client,
    token_provider: Arc<dyn TokenProvider>,
    spreadsheet_name: String,
    spreadsheet_id: OnceCell<String>,
}

// TokenProvider has no Debug impl
impl std::fmt::Debug for SheetsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SheetsClient")
            .field("spreadsheet_name", &self.spreadsheet_name)
            .field("spreadsheet_id", &self.spreadsheet_id.get())
            .field("token_provider", &"<TokenProvider>")
            .finish()
    }
}

fn transport(e: reqwest::Error) -> AccessError {
    AccessError::Transport(e.to_string())
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, AccessError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "unknown error".to_string());
    let message = serde_json::from_str::<ApiErrorResponse>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body);

    Err(AccessError::Rejected {
        status: status.as_u16(),
        message,
    })
}

/// Drive search expression matching a spreadsheet by exact name.
pub fn drive_query(name: &str) -> String {
    let escaped = name.replace('\\', "\\\\").replace('\'', "\\'");
    format!("name = '{escaped}' and mimeType = '{SPREADSHEET_MIME}' and trashed = false")
}

/// A1 range for a whole worksheet, or one cell of it.
pub fn sheet_range(title: &str, cell: Option<&str>) -> String {
    let quoted = format!("'{}'", title.replace('\'', "''"));
    match cell {
        Some(cell) => format!("{quoted}!{cell}"),
        None => quoted,
    }
}

fn cell_text(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

async fn token_provider(credentials: &Credentials) -> Result<Arc<dyn TokenProvider>, AccessError> {
    let auth = |e: gcp_auth::Error| AccessError::Auth(e.to_string());
    match credentials {
        Credentials::File(path) => {
            let account = CustomServiceAccount::from_file(path).map_err(auth)?;
            Ok(Arc::new(account))
        }
        Credentials::Json(json) => {
            let account = CustomServiceAccount::from_json(json).map_err(auth)?;
            Ok(Arc::new(account))
        }
        Credentials::Discover => gcp_auth::provider().await.map_err(auth),
    }
}

impl SheetsClient {
    /// Builds the client. No network call is made until the first read or
    /// write. With `spreadsheet_id` set the name lookup is skipped.
    pub async fn connect(
        credentials: &Credentials,
        spreadsheet_name: &str,
        spreadsheet_id: Option<String>,
    ) -> Result<Self, AccessError> {
        let token_provider = token_provider(credentials).await?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(transport)?;

        Ok(SheetsClient {
            http,
            token_provider,
            spreadsheet_name: spreadsheet_name.to_string(),
            spreadsheet_id: OnceCell::new_with(spreadsheet_id),
        })
    }

    pub fn worksheet(self: &Arc<Self>, title: &str) -> SheetsWorksheet {
        SheetsWorksheet {
            client: Arc::clone(self),
            title: title.to_string(),
        }
    }

    async fn access_token(&self) -> Result<String, AccessError> {
        let token = self
            .token_provider
            .token(&SCOPES)
            .await
            .map_err(|e| AccessError::Auth(e.to_string()))?;
        Ok(token.as_str().to_string())
    }

    /// Resolves the spreadsheet id once; concurrent first callers share the lookup.
    pub async fn spreadsheet_id(&self) -> Result<&str, AccessError> {
        self.spreadsheet_id
            .get_or_try_init(|| self.lookup_spreadsheet())
            .await
            .map(String::as_str)
    }

    async fn lookup_spreadsheet(&self) -> Result<String, AccessError> {
        log::debug!("looking up spreadsheet {:?}", self.spreadsheet_name);
        let token = self.access_token().await?;
        let query = drive_query(&self.spreadsheet_name);

        let response = self
            .http
            .get(format!("{DRIVE_API}/files"))
            .bearer_auth(&token)
            .query(&[
                ("q", query.as_str()),
                ("fields", "files(id,name)"),
                ("supportsAllDrives", "true"),
                ("includeItemsFromAllDrives", "true"),
            ])
            .send()
            .await
            .map_err(transport)?;

        let list: DriveFileList = ensure_success(response).await?.json().await.map_err(transport)?;
        let file = list
            .files
            .into_iter()
            .next()
            .ok_or_else(|| AccessError::SpreadsheetNotFound(self.spreadsheet_name.clone()))?;

        log::info!("opened spreadsheet {:?} ({})", self.spreadsheet_name, file.id);
        Ok(file.id)
    }

    async fn values_url(&self, range: &str) -> Result<String, AccessError> {
        let id = self.spreadsheet_id().await?;
        Ok(format!(
            "{SHEETS_API}/spreadsheets/{id}/values/{}",
            urlencoding::encode(range)
        ))
    }
}

/// One worksheet of the spreadsheet behind a [`SheetsClient`].
#[derive(Debug, Clone)]
pub struct SheetsWorksheet {
    client: Arc<SheetsClient>,
    title: String,
}

#[async_trait]
impl Worksheet for SheetsWorksheet {
    fn title(&self) -> &str {
        &self.title
    }

    async fn get_all_values(&self) -> Result<Vec<Vec<String>>, AccessError> {
        let url = self.client.values_url(&sheet_range(&self.title, None)).await?;
        let token = self.client.access_token().await?;
        log::debug!("reading worksheet {:?}", self.title);

        let response = self
            .client
            .http
            .get(&url)
            .bearer_auth(&token)
            .query(&[
                ("majorDimension", "ROWS"),
                ("valueRenderOption", "FORMATTED_VALUE"),
            ])
            .send()
            .await
            .map_err(transport)?;

        let range: ValueRange = ensure_success(response).await?.json().await.map_err(transport)?;
        Ok(range
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect())
    }

    async fn append_row(&self, row: &[CellValue]) -> Result<(), AccessError> {
        let url = self.client.values_url(&sheet_range(&self.title, None)).await?;
        let token = self.client.access_token().await?;
        log::debug!("appending row to worksheet {:?}", self.title);

        let body = ValueRangeBody {
            range: None,
            major_dimension: "ROWS",
            values: [row],
        };
        let response = self
            .client
            .http
            .post(format!("{url}:append"))
            .bearer_auth(&token)
            .query(&[
                ("valueInputOption", "RAW"),
                ("insertDataOption", "INSERT_ROWS"),
            ])
            .json(&body)
            .send()
            .await
            .map_err(transport)?;

        ensure_success(response).await?;
        Ok(())
    }

    async fn update_cell(&self, row: usize, col: usize, value: &str) -> Result<(), AccessError> {
        let range = sheet_range(&self.title, Some(&a1_cell(row, col)));
        let url = self.client.values_url(&range).await?;
        let token = self.client.access_token().await?;
        log::debug!("updating {range}");

        let body = ValueRangeBody {
            range: Some(&range),
            major_dimension: "ROWS",
            values: [&[value]],
        };
        let response = self
            .client
            .http
            .put(&url)
            .bearer_auth(&token)
            .query(&[("valueInputOption", "USER_ENTERED")])
            .json(&body)
            .send()
            .await
            .map_err(transport)?;

        ensure_success(response).await?;
        Ok(())
    }
}
