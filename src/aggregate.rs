use std::collections::{HashMap, HashSet};

use chrono::{Duration, NaiveDateTime};

use crate::models::{AuditRow, DisbursementRow};

/// The per-row fields the aggregate pass groups on.
pub trait BatchRow {
    fn identity(&self) -> Option<&str>;
    fn state(&self) -> &str;
    fn department(&self) -> &str;
    fn vendor(&self) -> Option<&str>;
    fn timestamp(&self) -> Option<NaiveDateTime>;
}

impl BatchRow for DisbursementRow {
    fn identity(&self) -> Option<&str> {
        self.beneficiary_id.as_deref()
    }

    fn state(&self) -> &str {
        &self.state
    }

    fn department(&self) -> &str {
        &self.department
    }

    fn vendor(&self) -> Option<&str> {
        self.vendor.as_deref()
    }

    fn timestamp(&self) -> Option<NaiveDateTime> {
        None
    }
}

impl BatchRow for AuditRow {
    fn identity(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn state(&self) -> &str {
        &self.state
    }

    fn department(&self) -> &str {
        &self.department
    }

    fn vendor(&self) -> Option<&str> {
        self.vendor.as_deref()
    }

    fn timestamp(&self) -> Option<NaiveDateTime> {
        self.date
    }
}

/// Dataset-wide lookups built once per batch and read by every row's rules.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregates {
    pub identity_group_keys: HashMap<String, HashSet<(String, String)>>,
    pub vendor_count: HashMap<String, usize>,
    /// Sorted ascending once the build finishes.
    pub identity_dates: HashMap<String, Vec<NaiveDateTime>>,
}

impl Aggregates {
    pub fn build<R: BatchRow>(rows: &[R]) -> Self {
        let mut aggregates = Aggregates::default();

        for row in rows {
            if let Some(vendor) = row.vendor() {
                *aggregates.vendor_count.entry(vendor.into()).or_insert(0) += 1;
            }

            let Some(identity) = row.identity().filter(|id| !id.trim().is_empty()) else {
                continue;
            };

            aggregates
                .identity_group_keys
                .entry(identity.to_string())
                .or_default()
                .insert((row.state().to_string(), row.department().to_string()));

            if let Some(timestamp) = row.timestamp() {
                aggregates
                    .identity_dates
                    .entry(identity.to_string())
                    .or_default()
                    .push(timestamp);
            }
        }

        for dates in aggregates.identity_dates.values_mut() {
            dates.sort();
        }

        aggregates
    }

    /// Number of distinct (state, department) pairs seen for `identity`.
    pub fn group_key_count(&self, identity: &str) -> usize {
        self.identity_group_keys.get(identity).map_or(0, HashSet::len)
    }

    pub fn distinct_states(&self, identity: &str) -> usize {
        let Some(keys) = self.identity_group_keys.get(identity) else {
            return 0;
        };
        let states: HashSet<&str> = keys.iter().map(|(state, _)| state.as_str()).collect();
        states.len()
    }

    pub fn distinct_departments(&self, identity: &str) -> usize {
        let Some(keys) = self.identity_group_keys.get(identity) else {
            return 0;
        };
        let departments: HashSet<&str> = keys.iter().map(|(_, dept)| dept.as_str()).collect();
        departments.len()
    }

    pub fn vendor_transactions(&self, vendor: &str) -> usize {
        self.vendor_count.get(vendor).copied().unwrap_or(0)
    }

    /// True when any two chronologically adjacent timestamps for `identity`
    /// are at most `window` apart.
    pub fn has_dates_within(&self, identity: &str, window: Duration) -> bool {
        let Some(dates) = self.identity_dates.get(identity) else {
            return false;
        };
        dates.windows(2).any(|pair| pair[1] - pair[0] <= window)
    }
}
