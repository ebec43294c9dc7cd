//! CSV ingestion for companies and incentives.
//!
//! Both readers key columns by header name, trim every field and treat
//! blank cells as missing. Loading is all-or-nothing: rows are parsed
//! fully before the store replaces its table contents.

use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use tracing::warn;

use crate::error::StorageError;

/// Offset-aware timestamps are stored in UTC.
const UTC_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.fZ";
const NAIVE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// A company row read from CSV, before it has an ID.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewCompany {
    /// Registered name.
    pub company_name: String,
    /// Primary activity label.
    pub cae_primary_label: Option<String>,
    /// Trade description.
    pub trade_description_native: Option<String>,
    /// Website.
    pub website: Option<String>,
}

/// An incentive row read from CSV, before it has an ID.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewIncentive {
    /// Programme title.
    pub title: Option<String>,
    /// Official description.
    pub description: Option<String>,
    /// Generated summary.
    pub ai_description: Option<String>,
    /// Supporting document links.
    pub document_urls: Option<String>,
    /// Publication timestamp, normalized.
    pub publication_date: Option<String>,
    /// Window start, normalized.
    pub start_date: Option<String>,
    /// Window end, normalized.
    pub end_date: Option<String>,
    /// Total budget.
    pub total_budget: Option<f64>,
    /// Source link.
    pub source_link: Option<String>,
}

/// Header-indexed view over one CSV record.
struct CsvRow<'a> {
    headers: &'a csv::StringRecord,
    record: &'a csv::StringRecord,
}

impl CsvRow<'_> {
    /// Trimmed value of the first non-blank column among `names`.
    fn field(&self, names: &[&str]) -> Option<String> {
        names.iter().find_map(|name| {
            let idx = self.headers.iter().position(|h| h.trim() == *name)?;
            let value = self.record.get(idx)?.trim();
            (!value.is_empty()).then(|| value.to_string())
        })
    }
}

fn csv_error(path: &Path, err: &csv::Error) -> StorageError {
    StorageError::Csv {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

fn read_rows<T>(
    path: &Path,
    mut map: impl FnMut(&CsvRow<'_>, u64) -> T,
) -> Result<Vec<T>, StorageError> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| csv_error(path, &e))?;
    let headers = reader.headers().map_err(|e| csv_error(path, &e))?.clone();

    let mut out = Vec::new();
    for (line, result) in reader.records().enumerate() {
        let record = result.map_err(|e| csv_error(path, &e))?;
        let row = CsvRow {
            headers: &headers,
            record: &record,
        };
        out.push(map(&row, line as u64 + 2));
    }
    Ok(out)
}

/// Reads companies from a CSV file with a header row.
///
/// # Errors
///
/// Returns [`StorageError::Csv`] if the file cannot be read or parsed.
pub fn read_companies(path: &Path) -> Result<Vec<NewCompany>, StorageError> {
    read_rows(path, |row, _| NewCompany {
        company_name: row.field(&["company_name"]).unwrap_or_default(),
        cae_primary_label: row.field(&["cae_primary_label"]),
        trade_description_native: row.field(&["trade_description_native"]),
        website: row.field(&["website"]),
    })
}

/// Reads incentives from a CSV file with a header row.
///
/// Date columns accept both `publication_date` and `date_publication`
/// spellings (likewise for start and end). Unparseable timestamps and
/// budgets are logged and stored as missing.
///
/// # Errors
///
/// Returns [`StorageError::Csv`] if the file cannot be read or parsed.
pub fn read_incentives(path: &Path) -> Result<Vec<NewIncentive>, StorageError> {
    read_rows(path, |row, line| {
        let date = |names: &[&str]| row.field(names).and_then(|raw| normalize_timestamp(&raw));
        NewIncentive {
            title: row.field(&["title"]),
            description: row.field(&["description"]),
            ai_description: row.field(&["ai_description"]),
            document_urls: row.field(&["document_urls"]),
            publication_date: date(&["publication_date", "date_publication"]),
            start_date: date(&["start_date", "date_start"]),
            end_date: date(&["end_date", "date_end"]),
            total_budget: row
                .field(&["total_budget"])
                .and_then(|raw| parse_budget(&raw, line)),
            source_link: row.field(&["source_link"]),
        }
    })
}

fn parse_budget(raw: &str, line: u64) -> Option<f64> {
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => Some(value),
        _ => {
            warn!(line, value = raw, "invalid total_budget, storing as missing");
            None
        }
    }
}

/// Normalizes an ISO-8601 timestamp for storage.
///
/// A space date/time separator is accepted. Values with an offset (`Z`,
/// `+01:00`, or the hour-only `+00` that Postgres exports) are converted
/// to UTC and written as `YYYY-MM-DDTHH:MM:SS[.fff]Z`; values without
/// one keep their wall-clock time, and bare dates stay dates. Returns
/// `None` for anything that is not a real calendar date or time.
#[must_use]
pub fn normalize_timestamp(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let candidate = trimmed.replacen(' ', "T", 1);

    let aware = DateTime::parse_from_rfc3339(&candidate)
        .or_else(|_| DateTime::parse_from_str(&candidate, "%Y-%m-%dT%H:%M:%S%.f%#z"))
        .or_else(|_| DateTime::parse_from_str(&candidate, "%Y-%m-%dT%H:%M%#z"));
    if let Ok(ts) = aware {
        return Some(ts.with_timezone(&Utc).format(UTC_FORMAT).to_string());
    }

    let naive = NaiveDateTime::parse_from_str(&candidate, NAIVE_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(&candidate, "%Y-%m-%dT%H:%M"));
    if let Ok(ts) = naive {
        return Some(ts.format(NAIVE_FORMAT).to_string());
    }

    if let Ok(date) = NaiveDate::parse_from_str(&candidate, DATE_FORMAT) {
        return Some(date.format(DATE_FORMAT).to_string());
    }

    warn!(value = raw, "could not parse timestamp, storing as missing");
    None
}
