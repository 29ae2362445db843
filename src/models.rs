use chrono::NaiveDateTime;
use serde::Serialize;
use uuid::Uuid;

/// Display value for descriptive text fields that were missing in the upload.
pub const PLACEHOLDER: &str = "N/A";

/// One beneficiary-disbursement row after normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct DisbursementRow {
    pub beneficiary_id: Option<String>,
    pub state: String,
    pub department: String,
    pub scheme: String,
    pub vendor: Option<String>,
    pub amount: f64,
    pub historical_avg: f64,
    pub txn_count: i64,
    pub beneficiary_count: i64,
}

/// One audit-transaction row after normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditRow {
    pub id: Option<String>,
    pub state: String,
    pub department: String,
    pub scheme: String,
    pub vendor: Option<String>,
    pub amount: f64,
    pub date: Option<NaiveDateTime>,
    pub issue: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, clap::ValueEnum)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
        }
    }
}

/// Review state handed to the downstream audit workflow. Scoring only ever
/// produces the initial state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AuditStatus {
    Pending,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Pending => "Pending",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisbursementDetails {
    pub scheme: String,
    pub department: String,
    pub state: String,
    pub vendor_name: String,
    pub amount_disbursed: f64,
    pub avg_historical_amount: f64,
    pub transaction_frequency: i64,
    pub beneficiary_count: i64,
    pub duplicate_identity: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditDetails {
    pub scheme: String,
    pub department: String,
    pub state: String,
    pub vendor_name: String,
    pub amount_disbursed: f64,
    pub date: Option<NaiveDateTime>,
    pub issue: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RecordDetails {
    Disbursement(DisbursementDetails),
    Audit(AuditDetails),
}

impl RecordDetails {
    pub fn scheme(&self) -> &str {
        match self {
            RecordDetails::Disbursement(d) => &d.scheme,
            RecordDetails::Audit(a) => &a.scheme,
        }
    }

    pub fn department(&self) -> &str {
        match self {
            RecordDetails::Disbursement(d) => &d.department,
            RecordDetails::Audit(a) => &a.department,
        }
    }

    pub fn state(&self) -> &str {
        match self {
            RecordDetails::Disbursement(d) => &d.state,
            RecordDetails::Audit(a) => &a.state,
        }
    }

    pub fn vendor_name(&self) -> &str {
        match self {
            RecordDetails::Disbursement(d) => &d.vendor_name,
            RecordDetails::Audit(a) => &a.vendor_name,
        }
    }

    pub fn amount_disbursed(&self) -> f64 {
        match self {
            RecordDetails::Disbursement(d) => d.amount_disbursed,
            RecordDetails::Audit(a) => a.amount_disbursed,
        }
    }
}

/// Terminal output of the scoring pass, one per input row.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredRecord {
    pub id: Uuid,
    #[serde(flatten)]
    pub details: RecordDetails,
    pub risk_score: u32,
    pub risk_level: RiskLevel,
    pub risk_reasons: Vec<String>,
    pub audit_status: AuditStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TriageSummary {
    pub total: usize,
    pub low: usize,
    pub medium: usize,
    pub high: usize,
    pub high_risk_count: usize,
    pub funds_under_risk: f64,
    pub mean_score: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReasonFrequency {
    pub reason: String,
    pub count: usize,
}
