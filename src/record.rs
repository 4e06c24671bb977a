use serde::{Deserialize, Serialize};
use std::fmt;

/// One persisted status entry: a student's value for an assignment lap on a date.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct Record {
    pub student_name: String,
    /// ISO-8601 date, no time component.
    pub date: String,
    pub assignment: String,
    pub lap: i64,
    pub value: String,
}

/// The fields identifying a [`Record`] for upsert purposes.
///
/// Matching is exact: no trimming, no case-folding, no coercion.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq, Hash)]
pub struct RecordKey {
    pub student_name: String,
    pub date: String,
    pub assignment: String,
    pub lap: i64,
}

impl Record {
    pub fn new(key: RecordKey, value: impl Into<String>) -> Self {
        Record {
            student_name: key.student_name,
            date: key.date,
            assignment: key.assignment,
            lap: key.lap,
            value: value.into(),
        }
    }

    pub fn key(&self) -> RecordKey {
        RecordKey {
            student_name: self.student_name.clone(),
            date: self.date.clone(),
            assignment: self.assignment.clone(),
            lap: self.lap,
        }
    }
}

impl RecordKey {
    pub fn new(
        student_name: impl Into<String>,
        date: impl Into<String>,
        assignment: impl Into<String>,
        lap: i64,
    ) -> Self {
        RecordKey {
            student_name: student_name.into(),
            date: date.into(),
            assignment: assignment.into(),
            lap,
        }
    }

    pub fn matches(&self, record: &Record) -> bool {
        record.student_name == self.student_name
            && record.date == self.date
            && record.assignment == self.assignment
            && record.lap == self.lap
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/lap {}",
            self.student_name, self.date, self.assignment, self.lap
        )
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct Student {
    pub name: String,
}

/// A permitted value for one assignment lap, ranked by `points`.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct AllowedValue {
    pub assignment: String,
    pub lap: i64,
    pub value: String,
    pub points: f64,
}

/// What the reconciler did with a record.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

impl UpsertOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpsertOutcome::Inserted => "inserted",
            UpsertOutcome::Updated => "updated",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "inserted" => Some(UpsertOutcome::Inserted),
            "updated" => Some(UpsertOutcome::Updated),
            _ => None,
        }
    }
}

impl fmt::Display for UpsertOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
