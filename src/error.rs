use thiserror::Error;

/// Failure talking to, or making sense of, the backing spreadsheet.
///
/// None of these are retried: the interaction that hit one fails as a whole
/// and the user repeats it.
#[derive(Debug, Error)]
pub enum AccessError {
    /// Credential material could not be loaded or a token could not be minted.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The request never produced a response (DNS, TLS, timeout, ...).
    #[error("request to the sheets service failed: {0}")]
    Transport(String),

    /// The service answered with a non-success status.
    #[error("sheets service rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("spreadsheet not found: {0}")]
    SpreadsheetNotFound(String),

    #[error("worksheet not found: {0}")]
    WorksheetNotFound(String),

    /// The worksheet was read but its contents do not fit the expected layout.
    #[error("malformed worksheet {table}: {reason}")]
    Malformed { table: String, reason: String },
}

impl AccessError {
    pub fn malformed(table: &str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            table: table.to_string(),
            reason: reason.into(),
        }
    }
}

/// Errors surfaced by the form controller.
#[derive(Debug, Error)]
pub enum FormError {
    /// No allowed values exist for the chosen assignment/lap pair.
    #[error("No allowed values defined for this assignment/lap combination.")]
    Configuration { assignment: String, lap: i64 },

    /// A submitted value is not among the allowed values for its pair.
    #[error("value {value:?} is not allowed for assignment {assignment:?}, lap {lap}")]
    UnknownValue {
        assignment: String,
        lap: i64,
        value: String,
    },

    #[error(transparent)]
    Access(#[from] AccessError),
}

impl FormError {
    /// True for errors caused by the reference data or the submitted input
    /// rather than by the backing store.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            FormError::Configuration { .. } | FormError::UnknownValue { .. }
        )
    }
}
