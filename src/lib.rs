/*!
# Assignment Tracker

A small data-entry form for recording per-student, per-assignment, per-lap
status values into a Google spreadsheet, with update-or-insert semantics.

## Overview

Teachers pick a date, a student, an assignment and a lap, then choose one of
the values allowed for that assignment lap. Saving writes the value back to
the spreadsheet: the matching row is updated in place when one exists,
otherwise a new row is appended.

## Architecture

### Tables
The spreadsheet holds three worksheets, each with a header row:
- `records`: `student_name`, `date`, `assignment`, `lap`, `value`
- `students`: `student`
- `allowed_values`: `assignment`, `lap`, `value`, `points`

### Layers
- **Worksheet access** (`table`, `sheets`, `memory`): raw read/append/update
  of one worksheet, backed by the Sheets REST API or by memory
- **Reconciler** (`reconciler`): decides insert vs. update for a record key
- **Form controller** (`form`): builds the choices shown to the user from
  the reference tables and saves submissions; reads go through a TTL cache
  (`cache`) that is dropped after every save
- **Web** (`app`, `config`): axum server rendering the form and a small
  JSON API

## Caveats

Saves re-read the table before writing but are not transactional. Two
concurrent saves of the same key can both append, and a row inserted or
removed between the read and the write makes the computed cell position
stale. Duplicate keys are left alone; the first row in table order wins.

## REST API Endpoints

- `GET /` - The form
- `POST /save` - Save from the form, then redirect back to it
- `GET /api/options` - Students, assignments and laps
- `GET /api/values?assignment=..&lap=..` - Allowed values, best first
- `GET /api/records` - Saved records
- `POST /api/records` - Upsert one record
*/

pub mod cache;
pub mod error;
pub mod form;
pub mod memory;
pub mod reconciler;
pub mod record;
pub mod table;

#[cfg(feature = "web")]
pub mod app;
#[cfg(feature = "web")]
pub mod config;
#[cfg(feature = "web")]
pub mod sheets;

pub use error::{AccessError, FormError};
pub use form::{CacheSettings, FormController, FormView, Selection};
pub use memory::MemoryWorkbook;
pub use reconciler::{RecordStore, SheetRecordStore};
pub use record::{AllowedValue, Record, RecordKey, Student, UpsertOutcome};
pub use table::{RecordTable, ReferenceTables, Worksheet};
