use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::TtlCache;
use crate::error::{AccessError, FormError};
use crate::reconciler::RecordStore;
use crate::record::{AllowedValue, Record, RecordKey, Student, UpsertOutcome};
use crate::table::ReferenceTables;

pub const EMPTY_SHEET_WARNING: &str = "Sheet is empty. First entry will create data.";
pub const NO_VALUE_NOTICE: &str = "No value saved yet; selecting one will create a new record.";

/// How long reads of each table are served from memory.
#[derive(Debug, Clone, Copy)]
pub struct CacheSettings {
    pub records_ttl: Duration,
    pub reference_ttl: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        CacheSettings {
            records_ttl: Duration::from_secs(30),
            reference_ttl: Duration::from_secs(60),
        }
    }
}

/// What the user has picked so far. Unset or unknown entries fall back to the
/// first option of each list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Selection {
    pub date: Option<NaiveDate>,
    pub student: Option<String>,
    pub assignment: Option<String>,
    pub lap: Option<i64>,
}

/// The choices offered by the form's select boxes, each sorted ascending.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct FormOptions {
    pub students: Vec<String>,
    pub assignments: Vec<String>,
    pub laps: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ValueOption {
    pub value: String,
    pub points: f64,
    pub selected: bool,
}

/// Everything needed to render the form once.
#[derive(Debug, Clone, Serialize)]
pub struct FormView {
    pub date: String,
    pub options: FormOptions,
    pub student: Option<String>,
    pub assignment: Option<String>,
    pub lap: Option<i64>,
    /// Set when the records table holds no rows yet.
    pub warning: Option<String>,
    /// Set when the chosen assignment/lap has no allowed values; the value
    /// list is then empty and nothing may be saved.
    pub config_error: Option<String>,
    pub current_value: Option<String>,
    pub notice: Option<String>,
    pub value_options: Vec<ValueOption>,
}

impl FormView {
    pub fn selected_value(&self) -> Option<&str> {
        self.value_options
            .iter()
            .find(|o| o.selected)
            .map(|o| o.value.as_str())
    }

    pub fn can_save(&self) -> bool {
        self.config_error.is_none() && self.student.is_some() && !self.value_options.is_empty()
    }
}

pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

pub fn success_message(outcome: UpsertOutcome) -> String {
    format!("Successfully {outcome} record.")
}

fn distinct_sorted<T: Ord + Clone>(items: impl IntoIterator<Item = T>) -> Vec<T> {
    items.into_iter().collect::<BTreeSet<T>>().into_iter().collect()
}

fn pick<T: PartialEq + Clone>(chosen: Option<&T>, options: &[T]) -> Option<T> {
    chosen
        .filter(|c| options.contains(c))
        .or_else(|| options.first())
        .cloned()
}

/// Allowed values for one assignment lap, highest points first. Ties keep
/// table order.
pub fn ordered_values(all: &[AllowedValue], assignment: &str, lap: i64) -> Vec<AllowedValue> {
    let mut values: Vec<AllowedValue> = all
        .iter()
        .filter(|v| v.assignment == assignment && v.lap == lap)
        .cloned()
        .collect();
    values.sort_by(|a, b| b.points.total_cmp(&a.points));
    values
}

/// Index of the option to pre-select: the saved value when it is still
/// allowed, otherwise the first (highest ranked) option.
pub fn default_index(labels: &[String], current: Option<&str>) -> usize {
    current
        .and_then(|c| labels.iter().position(|l| l == c))
        .unwrap_or(0)
}

/// Drives the data-entry form: builds what to show from the reference tables
/// and saved records, and saves submissions through a [`RecordStore`].
pub struct FormController {
    store: Arc<dyn RecordStore>,
    reference: ReferenceTables,
    students: TtlCache<Vec<Student>>,
    allowed_values: TtlCache<Vec<AllowedValue>>,
    records: TtlCache<Vec<Record>>,
}

impl FormController {
    pub fn new(
        store: Arc<dyn RecordStore>,
        reference: ReferenceTables,
        settings: CacheSettings,
    ) -> Self {
        FormController {
            store,
            reference,
            students: TtlCache::new("students", settings.reference_ttl),
            allowed_values: TtlCache::new("allowed_values", settings.reference_ttl),
            records: TtlCache::new("records", settings.records_ttl),
        }
    }

    pub async fn students(&self) -> Result<Vec<Student>, AccessError> {
        self.students
            .get_or_fetch(|| self.reference.students())
            .await
    }

    pub async fn allowed_values(&self) -> Result<Vec<AllowedValue>, AccessError> {
        self.allowed_values
            .get_or_fetch(|| self.reference.allowed_values())
            .await
    }

    /// Saved records, served from the cache while it is fresh.
    pub async fn records(&self) -> Result<Vec<Record>, AccessError> {
        self.records.get_or_fetch(|| self.store.list()).await
    }

    pub async fn options(&self) -> Result<FormOptions, AccessError> {
        let students = self.students().await?;
        let allowed = self.allowed_values().await?;

        Ok(FormOptions {
            students: distinct_sorted(students.into_iter().map(|s| s.name)),
            assignments: distinct_sorted(allowed.iter().map(|v| v.assignment.clone())),
            laps: distinct_sorted(allowed.iter().map(|v| v.lap)),
        })
    }

    pub async fn value_options(
        &self,
        assignment: &str,
        lap: i64,
    ) -> Result<Vec<AllowedValue>, FormError> {
        let values = ordered_values(&self.allowed_values().await?, assignment, lap);
        if values.is_empty() {
            return Err(FormError::Configuration {
                assignment: assignment.to_string(),
                lap,
            });
        }
        Ok(values)
    }

    /// The saved value for a key, from the cached records.
    pub async fn current_value(&self, key: &RecordKey) -> Result<Option<String>, AccessError> {
        let records = self.records().await?;
        Ok(records
            .into_iter()
            .find(|r| key.matches(r))
            .map(|r| r.value)
            .filter(|v| !v.is_empty()))
    }

    pub async fn view(&self, selection: &Selection, today: NaiveDate) -> Result<FormView, FormError> {
        let options = self.options().await?;
        let records = self.records().await?;

        let date = selection.date.unwrap_or(today).to_string();
        let student = pick(selection.student.as_ref(), &options.students);
        let assignment = pick(selection.assignment.as_ref(), &options.assignments);
        let lap = pick(selection.lap.as_ref(), &options.laps);

        let mut view = FormView {
            date,
            student,
            assignment,
            lap,
            warning: records.is_empty().then(|| EMPTY_SHEET_WARNING.to_string()),
            config_error: None,
            current_value: None,
            notice: None,
            value_options: Vec::new(),
            options,
        };

        let assignment = view.assignment.clone().unwrap_or_default();
        let lap = view.lap.unwrap_or_default();
        let allowed = match self.value_options(&assignment, lap).await {
            Ok(values) => values,
            Err(err @ FormError::Configuration { .. }) => {
                view.config_error = Some(err.to_string());
                return Ok(view);
            }
            Err(err) => return Err(err),
        };

        if let Some(student) = view.student.clone() {
            let key = RecordKey::new(student, view.date.as_str(), assignment, lap);
            view.current_value = self.current_value(&key).await?;
        }

        let labels: Vec<String> = allowed.iter().map(|v| v.value.clone()).collect();
        let selected = default_index(&labels, view.current_value.as_deref());
        view.value_options = allowed
            .into_iter()
            .enumerate()
            .map(|(i, v)| ValueOption {
                value: v.value,
                points: v.points,
                selected: i == selected,
            })
            .collect();

        view.notice = Some(match &view.current_value {
            Some(value) => format!("Currently saved value: {value}"),
            None => NO_VALUE_NOTICE.to_string(),
        });

        Ok(view)
    }

    /// Saves a value. Nothing is written when the assignment/lap has no
    /// allowed values or the value is not one of them. On success every cache
    /// is dropped so the next view reflects the write.
    pub async fn submit(&self, record: &Record) -> Result<UpsertOutcome, FormError> {
        let allowed = self.value_options(&record.assignment, record.lap).await?;
        if !allowed.iter().any(|v| v.value == record.value) {
            return Err(FormError::UnknownValue {
                assignment: record.assignment.clone(),
                lap: record.lap,
                value: record.value.clone(),
            });
        }

        let outcome = self.store.upsert(record).await?;
        self.invalidate();
        Ok(outcome)
    }

    pub fn invalidate(&self) {
        self.students.invalidate();
        self.allowed_values.invalidate();
        self.records.invalidate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allowed(assignment: &str, lap: i64, value: &str, points: f64) -> AllowedValue {
        AllowedValue {
            assignment: assignment.to_string(),
            lap,
            value: value.to_string(),
            points,
        }
    }

    #[test]
    fn values_order_by_points_descending() {
        let all = vec![
            allowed("Essay", 1, "B", 5.0),
            allowed("Essay", 2, "Z", 99.0),
            allowed("Essay", 1, "A", 10.0),
            allowed("Essay", 1, "C", 5.0),
        ];
        let labels: Vec<String> = ordered_values(&all, "Essay", 1)
            .into_iter()
            .map(|v| v.value)
            .collect();
        assert_eq!(labels, vec!["A", "B", "C"]);
        assert!(ordered_values(&all, "Essay", 3).is_empty());
    }

    #[test]
    fn default_index_prefers_saved_value() {
        let labels = vec!["A".to_string(), "B".to_string()];
        assert_eq!(default_index(&labels, Some("B")), 1);
        assert_eq!(default_index(&labels, Some("retired")), 0);
        assert_eq!(default_index(&labels, None), 0);
    }

    #[test]
    fn pick_falls_back_to_first() {
        let laps = vec![1, 2, 3];
        assert_eq!(pick(Some(&2), &laps), Some(2));
        assert_eq!(pick(Some(&9), &laps), Some(1));
        assert_eq!(pick(None, &laps), Some(1));
        assert_eq!(pick::<i64>(None, &[]), None);
    }

    #[test]
    fn distinct_sorted_dedups() {
        assert_eq!(distinct_sorted(vec![3, 1, 3, 2]), vec![1, 2, 3]);
    }
}
