use chrono::Duration;
use log::info;
use uuid::Uuid;

use crate::aggregate::Aggregates;
use crate::error::IngestResult;
use crate::ingest::{self, RawRow};
use crate::models::{
    AuditDetails, AuditRow, AuditStatus, DisbursementDetails, DisbursementRow, RecordDetails,
    ScoredRecord, PLACEHOLDER,
};
use crate::rules::{Assessment, Hit, Rule, RulePolicy, TierCutoffs};

/// An identity seen with more than this many (state, department) pairs is a
/// duplicate beneficiary.
pub const DUPLICATE_GROUP_KEY_LIMIT: usize = 2;
pub const HIGH_PER_BENEFICIARY_PAYOUT: f64 = 5_000.0;

/// Fifty lakh.
pub const HIGH_TRANSACTION_AMOUNT: f64 = 5_000_000.0;
pub const REPEATED_VENDOR_LIMIT: usize = 3;
pub const CLUSTER_WINDOW_DAYS: i64 = 5;
pub const COMPOSITE_MIN_INDICATORS: usize = 2;

/// Per-row facts the disbursement rules read beyond the row's own fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DisbursementFacts {
    pub duplicate_identity: bool,
}

fn amount_vs_history(row: &DisbursementRow, _: &DisbursementFacts, _: &[String]) -> Option<Hit> {
    if row.historical_avg <= 0.0 {
        return None;
    }
    let ratio = row.amount / row.historical_avg;
    let weight = if ratio >= 3.0 {
        40
    } else if ratio >= 2.5 {
        30
    } else if ratio >= 2.0 {
        20
    } else {
        return None;
    };
    let reason = format!("Amount is {ratio:.1}x historical average");
    Some(Hit::new(weight, reason))
}

fn transaction_frequency(
    row: &DisbursementRow,
    _: &DisbursementFacts,
    _: &[String],
) -> Option<Hit> {
    match row.txn_count {
        n if n >= 20 => Some(Hit::new(20, "Very high transaction frequency")),
        n if n >= 15 => Some(Hit::new(10, "Elevated transaction frequency")),
        _ => None,
    }
}

fn per_beneficiary_payout(
    row: &DisbursementRow,
    _: &DisbursementFacts,
    _: &[String],
) -> Option<Hit> {
    if row.beneficiary_count <= 0 {
        return None;
    }
    let payout = row.amount / row.beneficiary_count as f64;
    if payout < HIGH_PER_BENEFICIARY_PAYOUT {
        return None;
    }
    Some(Hit::new(15, "High per-beneficiary payout"))
}

fn duplicate_beneficiary(
    _: &DisbursementRow,
    facts: &DisbursementFacts,
    _: &[String],
) -> Option<Hit> {
    if !facts.duplicate_identity {
        return None;
    }
    let reason = "Same beneficiary ID across multiple states or departments";
    Some(Hit::new(30, reason))
}

pub const DISBURSEMENT_POLICY: RulePolicy<DisbursementRow, DisbursementFacts> = RulePolicy {
    name: "disbursement",
    rules: &[
        Rule {
            name: "amount_vs_history",
            check: amount_vs_history,
        },
        Rule {
            name: "transaction_frequency",
            check: transaction_frequency,
        },
        Rule {
            name: "per_beneficiary_payout",
            check: per_beneficiary_payout,
        },
        Rule {
            name: "duplicate_beneficiary",
            check: duplicate_beneficiary,
        },
    ],
    cutoffs: TierCutoffs {
        high_above: 75,
        medium_above: 50,
    },
    fallback_reason: "Standard operational parameters",
};

fn identity(row: &AuditRow) -> Option<&str> {
    row.id.as_deref().filter(|id| !id.trim().is_empty())
}

fn high_amount(row: &AuditRow, _: &Aggregates, _: &[String]) -> Option<Hit> {
    if row.amount < HIGH_TRANSACTION_AMOUNT {
        return None;
    }
    Some(Hit::new(30, "Unusually high transaction amount"))
}

fn spans_states(row: &AuditRow, aggregates: &Aggregates, _: &[String]) -> Option<Hit> {
    let id = identity(row)?;
    if aggregates.distinct_states(id) <= 1 {
        return None;
    }
    Some(Hit::new(20, "Same ID appears across multiple states"))
}

fn spans_departments(row: &AuditRow, aggregates: &Aggregates, _: &[String]) -> Option<Hit> {
    let id = identity(row)?;
    if aggregates.distinct_departments(id) <= 1 {
        return None;
    }
    let reason = "Same ID appears across multiple departments";
    Some(Hit::new(15, reason))
}

fn repeated_vendor(row: &AuditRow, aggregates: &Aggregates, _: &[String]) -> Option<Hit> {
    let vendor = row.vendor.as_deref()?;
    if aggregates.vendor_transactions(vendor) <= REPEATED_VENDOR_LIMIT {
        return None;
    }
    let reason = "Same vendor involved in multiple transactions";
    Some(Hit::new(20, reason))
}

fn reported_issue(row: &AuditRow, _: &Aggregates, _: &[String]) -> Option<Hit> {
    let issue = row.issue.as_deref()?;
    if issue.trim().is_empty() {
        return None;
    }
    Some(Hit::new(15, "Audit issue already reported in records"))
}

fn clustered_dates(row: &AuditRow, aggregates: &Aggregates, _: &[String]) -> Option<Hit> {
    let id = identity(row)?;
    let window = Duration::days(CLUSTER_WINDOW_DAYS);
    if !aggregates.has_dates_within(id, window) {
        return None;
    }
    let reason = "Multiple transactions within short time window";
    Some(Hit::new(15, reason))
}

fn multiple_indicators(_: &AuditRow, _: &Aggregates, reasons: &[String]) -> Option<Hit> {
    if reasons.len() < COMPOSITE_MIN_INDICATORS {
        return None;
    }
    Some(Hit::new(10, "Multiple anomaly indicators detected"))
}

pub const AUDIT_POLICY: RulePolicy<AuditRow, Aggregates> = RulePolicy {
    name: "audit",
    rules: &[
        Rule {
            name: "high_amount",
            check: high_amount,
        },
        Rule {
            name: "spans_states",
            check: spans_states,
        },
        Rule {
            name: "spans_departments",
            check: spans_departments,
        },
        Rule {
            name: "repeated_vendor",
            check: repeated_vendor,
        },
        Rule {
            name: "reported_issue",
            check: reported_issue,
        },
        Rule {
            name: "clustered_dates",
            check: clustered_dates,
        },
        // Must stay last: reads the reasons collected above.
        Rule {
            name: "multiple_indicators",
            check: multiple_indicators,
        },
    ],
    cutoffs: TierCutoffs {
        high_above: 75,
        medium_above: 45,
    },
    fallback_reason: "No significant anomaly detected",
};

/// Identity-grouping check for the disbursement pipeline.
pub fn is_duplicate_identity(row: &DisbursementRow, aggregates: &Aggregates) -> bool {
    let Some(id) = row.beneficiary_id.as_deref() else {
        return false;
    };
    !id.trim().is_empty() && aggregates.group_key_count(id) > DUPLICATE_GROUP_KEY_LIMIT
}

fn scored(details: RecordDetails, assessment: Assessment) -> ScoredRecord {
    ScoredRecord {
        id: Uuid::new_v4(),
        details,
        risk_score: assessment.score,
        risk_level: assessment.level,
        risk_reasons: assessment.reasons,
        audit_status: AuditStatus::Pending,
    }
}

fn vendor_name(vendor: &Option<String>) -> String {
    vendor.clone().unwrap_or_else(|| PLACEHOLDER.to_string())
}

pub fn score_disbursements(rows: &[DisbursementRow]) -> Vec<ScoredRecord> {
    let aggregates = Aggregates::build(rows);

    rows.iter()
        .map(|row| {
            let facts = DisbursementFacts {
                duplicate_identity: is_duplicate_identity(row, &aggregates),
            };
            let assessment = DISBURSEMENT_POLICY.assess(row, &facts);
            let details = DisbursementDetails {
                scheme: row.scheme.clone(),
                department: row.department.clone(),
                state: row.state.clone(),
                vendor_name: vendor_name(&row.vendor),
                amount_disbursed: row.amount,
                avg_historical_amount: row.historical_avg,
                transaction_frequency: row.txn_count,
                beneficiary_count: row.beneficiary_count,
                duplicate_identity: facts.duplicate_identity,
            };
            scored(RecordDetails::Disbursement(details), assessment)
        })
        .collect()
}

pub fn score_audits(rows: &[AuditRow]) -> Vec<ScoredRecord> {
    let aggregates = Aggregates::build(rows);

    rows.iter()
        .map(|row| {
            let assessment = AUDIT_POLICY.assess(row, &aggregates);
            let details = AuditDetails {
                scheme: row.scheme.clone(),
                department: row.department.clone(),
                state: row.state.clone(),
                vendor_name: vendor_name(&row.vendor),
                amount_disbursed: row.amount,
                date: row.date,
                issue: row.issue.clone(),
            };
            scored(RecordDetails::Audit(details), assessment)
        })
        .collect()
}

/// Which scoring policy a batch is run through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pipeline {
    #[default]
    Disbursement,
    Audit,
}

impl Pipeline {
    pub fn as_str(&self) -> &'static str {
        match self {
            Pipeline::Disbursement => DISBURSEMENT_POLICY.name,
            Pipeline::Audit => AUDIT_POLICY.name,
        }
    }

    pub fn score_rows(self, raw: &[RawRow]) -> Vec<ScoredRecord> {
        let records = match self {
            Pipeline::Disbursement => score_disbursements(&ingest::normalize_disbursements(raw)),
            Pipeline::Audit => score_audits(&ingest::normalize_audits(raw)),
        };
        let policy = self.as_str();
        info!("scored {} rows with the {policy} policy", records.len());
        records
    }

    /// Scores an uploaded file body.
    pub fn score_upload(self, bytes: &[u8]) -> IngestResult<Vec<ScoredRecord>> {
        let raw = ingest::parse_upload(bytes)?;
        Ok(self.score_rows(&raw))
    }
}

/// Records ordered by descending score; ties keep input order.
pub fn ranked(records: &[ScoredRecord]) -> Vec<&ScoredRecord> {
    let mut ranked: Vec<&ScoredRecord> = records.iter().collect();
    ranked.sort_by(|a, b| b.risk_score.cmp(&a.risk_score));
    ranked
}
