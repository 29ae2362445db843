use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use log::debug;

use crate::error::{IngestError, IngestResult};
use crate::models::{AuditRow, DisbursementRow, PLACEHOLDER};

pub mod columns {
    pub const BENEFICIARY_ID: &str = "beneficiary_id";
    pub const STATE: &str = "state";
    pub const DEPARTMENT: &str = "department";
    pub const SCHEME: &str = "scheme";
    pub const VENDOR: &str = "vendor";
    pub const AMOUNT: &str = "amount";
    pub const HISTORICAL_AVG: &str = "historical_avg";
    pub const TXN_COUNT: &str = "txn_count";
    pub const BENEFICIARY_COUNT: &str = "beneficiary_count";

    pub const AUDIT_ID: &str = "ID";
    pub const AUDIT_STATE: &str = "State";
    pub const AUDIT_DEPARTMENT: &str = "Department";
    pub const AUDIT_SCHEME: &str = "Scheme";
    pub const AUDIT_VENDOR: &str = "Vendor";
    pub const AUDIT_AMOUNT: &str = "Amount";
    pub const AUDIT_DATE: &str = "Date";
    pub const AUDIT_ISSUE: &str = "Issue";
}

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d-%m-%Y", "%d/%m/%Y"];

/// A parsed table row keyed by header name. Cells are stored trimmed.
#[derive(Debug, Clone, Default)]
pub struct RawRow {
    cells: HashMap<String, String>,
}

impl RawRow {
    /// Returns the cell for `column`, or `None` when the column is absent or
    /// the cell is blank.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells
            .get(column)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    fn text(&self, column: &str) -> String {
        self.get(column).unwrap_or(PLACEHOLDER).to_string()
    }

    fn optional(&self, column: &str) -> Option<String> {
        self.get(column).map(str::to_string)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RawRow {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        RawRow {
            cells: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

pub fn read_table<R: std::io::Read>(reader: R) -> IngestResult<Vec<RawRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader.headers()?.clone();
    if headers.iter().all(|header| header.is_empty()) {
        return Err(IngestError::MissingHeader);
    }

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        rows.push(headers.iter().zip(record.iter()).collect::<RawRow>());
    }

    Ok(rows)
}

/// Decodes an uploaded file body and parses it into raw rows.
pub fn parse_upload(bytes: &[u8]) -> IngestResult<Vec<RawRow>> {
    let text = std::str::from_utf8(bytes)?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    read_table(text.as_bytes())
}

pub fn normalize_disbursement(raw: &RawRow) -> DisbursementRow {
    DisbursementRow {
        beneficiary_id: raw.optional(columns::BENEFICIARY_ID),
        state: raw.text(columns::STATE),
        department: raw.text(columns::DEPARTMENT),
        scheme: raw.text(columns::SCHEME),
        vendor: raw.optional(columns::VENDOR),
        amount: parse_amount(raw.get(columns::AMOUNT)),
        historical_avg: parse_amount(raw.get(columns::HISTORICAL_AVG)),
        txn_count: parse_count(raw.get(columns::TXN_COUNT)),
        beneficiary_count: parse_count(raw.get(columns::BENEFICIARY_COUNT)),
    }
}

pub fn normalize_audit(raw: &RawRow) -> AuditRow {
    AuditRow {
        id: raw.optional(columns::AUDIT_ID),
        state: raw.text(columns::AUDIT_STATE),
        department: raw.text(columns::AUDIT_DEPARTMENT),
        scheme: raw.text(columns::AUDIT_SCHEME),
        vendor: raw.optional(columns::AUDIT_VENDOR),
        amount: parse_amount(raw.get(columns::AUDIT_AMOUNT)),
        date: raw.get(columns::AUDIT_DATE).and_then(parse_timestamp),
        issue: raw.optional(columns::AUDIT_ISSUE),
    }
}

pub fn normalize_disbursements(raw: &[RawRow]) -> Vec<DisbursementRow> {
    raw.iter().map(normalize_disbursement).collect()
}

pub fn normalize_audits(raw: &[RawRow]) -> Vec<AuditRow> {
    let rows: Vec<AuditRow> = raw.iter().map(normalize_audit).collect();
    let unparsed = raw
        .iter()
        .zip(&rows)
        .filter(|(raw, row)| lost_date(raw, row))
        .count();
    if unparsed > 0 {
        debug!("{unparsed} audit rows have an unparseable date");
    }
    rows
}

fn lost_date(raw: &RawRow, row: &AuditRow) -> bool {
    row.date.is_none() && raw.get(columns::AUDIT_DATE).is_some()
}

fn strip_currency(value: &str) -> String {
    value.trim_start_matches(['₹', '$']).replace(',', "")
}

/// Parses a monetary cell. Digit-grouping commas and a leading currency sign
/// are accepted; anything unparseable is 0.
pub fn parse_amount(value: Option<&str>) -> f64 {
    value
        .map(strip_currency)
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// Parses a count cell. Decimals are truncated toward zero.
pub fn parse_count(value: Option<&str>) -> i64 {
    let Some(value) = value else {
        return 0;
    };
    let value = value.replace(',', "");
    if let Ok(count) = value.parse::<i64>() {
        return count;
    }
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(|v| v.trunc() as i64)
        .unwrap_or(0)
}

pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.naive_utc());
    }
    for format in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
            return Some(parsed);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(value, format) {
            return parsed.and_hms_opt(0, 0, 0);
        }
    }
    None
}
