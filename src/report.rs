use std::collections::HashMap;
use std::fmt::Write;

use log::debug;

use crate::models::{ReasonFrequency, RecordDetails, RiskLevel, ScoredRecord, TriageSummary};
use crate::risk::{self, Pipeline};

/// Score above which a record counts toward the high-risk totals.
pub const HIGH_RISK_SCORE: u32 = 75;

const LAKH: f64 = 100_000.0;

/// Narrows a scored batch before it is printed, reported or exported.
/// Unset criteria match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub level: Option<RiskLevel>,
    pub state: Option<String>,
    pub department: Option<String>,
    pub scheme: Option<String>,
    /// Case-insensitive substring over vendor, department, scheme, state and reasons.
    pub search: Option<String>,
}

impl RecordFilter {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn matches(&self, record: &ScoredRecord) -> bool {
        let details = &record.details;
        let fields_match = same_text(self.state.as_deref(), details.state())
            && same_text(self.department.as_deref(), details.department())
            && same_text(self.scheme.as_deref(), details.scheme());
        if !fields_match || self.level.is_some_and(|level| level != record.risk_level) {
            return false;
        }
        match self.search.as_deref() {
            Some(term) => mentions(record, term),
            None => true,
        }
    }
}

fn same_text(wanted: Option<&str>, actual: &str) -> bool {
    match wanted {
        Some(wanted) => wanted.trim().to_lowercase() == actual.trim().to_lowercase(),
        None => true,
    }
}

fn mentions(record: &ScoredRecord, term: &str) -> bool {
    let term = term.trim().to_lowercase();
    let details = &record.details;
    let fields = [
        details.vendor_name(),
        details.department(),
        details.scheme(),
        details.state(),
    ];
    fields
        .into_iter()
        .chain(record.risk_reasons.iter().map(String::as_str))
        .any(|text| text.to_lowercase().contains(term.as_str()))
}

/// Keeps the records matching every criterion, in input order.
pub fn filter(records: Vec<ScoredRecord>, criteria: &RecordFilter) -> Vec<ScoredRecord> {
    if criteria.is_empty() {
        return records;
    }
    let before = records.len();
    let kept: Vec<ScoredRecord> = records
        .into_iter()
        .filter(|record| criteria.matches(record))
        .collect();
    debug!("filter kept {} of {before} records", kept.len());
    kept
}

pub fn summarize(records: &[ScoredRecord]) -> TriageSummary {
    let mut summary = TriageSummary {
        total: records.len(),
        low: 0,
        medium: 0,
        high: 0,
        high_risk_count: 0,
        funds_under_risk: 0.0,
        mean_score: 0.0,
    };
    let mut score_total = 0u64;

    for record in records {
        match record.risk_level {
            RiskLevel::Low => summary.low += 1,
            RiskLevel::Medium => summary.medium += 1,
            RiskLevel::High => summary.high += 1,
        }
        if record.risk_score > HIGH_RISK_SCORE {
            summary.high_risk_count += 1;
            summary.funds_under_risk += record.details.amount_disbursed();
        }
        score_total += u64::from(record.risk_score);
    }

    if !records.is_empty() {
        summary.mean_score = score_total as f64 / records.len() as f64;
    }
    summary
}

pub fn reason_frequencies(records: &[ScoredRecord]) -> Vec<ReasonFrequency> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for record in records {
        for reason in &record.risk_reasons {
            *counts.entry(reason.as_str()).or_insert(0) += 1;
        }
    }

    let mut frequencies: Vec<ReasonFrequency> = counts
        .into_iter()
        .map(|(reason, count)| ReasonFrequency {
            reason: reason.to_string(),
            count,
        })
        .collect();
    frequencies.sort_by(|a, b| (b.count, &a.reason).cmp(&(a.count, &b.reason)));
    frequencies
}

fn review_guidance(level: RiskLevel) -> &'static str {
    match level {
        RiskLevel::High => "This is classified as HIGH RISK and requires immediate audit review.",
        RiskLevel::Medium => {
            "This is classified as MEDIUM RISK and should be reviewed when resources permit."
        }
        RiskLevel::Low => "This is classified as LOW RISK but has been included for completeness.",
    }
}

/// Plain-text explanation of one scored record for a reviewer.
pub fn explain(record: &ScoredRecord) -> String {
    let mut output = String::new();

    let _ = writeln!(
        output,
        "This transaction has been flagged with a risk score of {}/100. {}",
        record.risk_score,
        review_guidance(record.risk_level)
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "Key Indicators:");
    for (idx, reason) in record.risk_reasons.iter().enumerate() {
        let _ = writeln!(output, "{}. {}", idx + 1, reason);
    }

    let details = &record.details;
    let _ = writeln!(output);
    let _ = writeln!(output, "Transaction Details:");
    let _ = writeln!(output, "- Scheme: {}", details.scheme());
    let _ = writeln!(output, "- Department: {}", details.department());
    let _ = writeln!(output, "- State: {}", details.state());
    let _ = writeln!(
        output,
        "- Amount Disbursed: ₹{:.2} Lakhs",
        details.amount_disbursed() / LAKH
    );

    match details {
        RecordDetails::Disbursement(d) => {
            let _ = writeln!(
                output,
                "- Historical Average: ₹{:.2} Lakhs",
                d.avg_historical_amount / LAKH
            );
            let _ = writeln!(output, "- Vendor: {}", d.vendor_name);
            if d.beneficiary_count > 0 {
                let _ = writeln!(output, "- Beneficiaries: {}", d.beneficiary_count);
            }
        }
        RecordDetails::Audit(a) => {
            let _ = writeln!(output, "- Vendor: {}", a.vendor_name);
            if let Some(date) = a.date {
                let _ = writeln!(output, "- Date: {}", date.date());
            }
            if let Some(issue) = &a.issue {
                let _ = writeln!(output, "- Reported Issue: {}", issue);
            }
        }
    }

    output
}

pub fn build_report(
    pipeline: Pipeline,
    source: &str,
    min_score: u32,
    records: &[ScoredRecord],
) -> String {
    let summary = summarize(records);
    let frequencies = reason_frequencies(records);

    let mut output = String::new();

    let _ = writeln!(output, "# Spending Risk Triage Report");
    let _ = writeln!(
        output,
        "Generated for {} using the {} policy",
        source,
        pipeline.as_str()
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Summary");
    let _ = writeln!(output, "- Records scored: {}", summary.total);
    let high_risk = summary.high_risk_count;
    let _ = writeln!(
        output,
        "- High-risk records (score above {HIGH_RISK_SCORE}): {high_risk}"
    );
    let _ = writeln!(
        output,
        "- Funds under risk: ₹{:.2} Lakhs",
        summary.funds_under_risk / LAKH
    );
    let _ = writeln!(output, "- Mean score: {:.1}", summary.mean_score);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Tier Mix");
    let _ = writeln!(output, "- High: {}", summary.high);
    let _ = writeln!(output, "- Medium: {}", summary.medium);
    let _ = writeln!(output, "- Low: {}", summary.low);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Most Common Reasons");

    if frequencies.is_empty() {
        let _ = writeln!(output, "No records in this batch.");
    } else {
        for frequency in frequencies.iter().take(10) {
            let (reason, count) = (&frequency.reason, frequency.count);
            let _ = writeln!(output, "- {reason}: {count} records");
        }
    }

    let flagged: Vec<&ScoredRecord> = risk::ranked(records)
        .into_iter()
        .filter(|record| record.risk_score >= min_score)
        .collect();

    let _ = writeln!(output);
    let _ = writeln!(output, "## Flagged Records (score {min_score} and above)");

    if flagged.is_empty() {
        let _ = writeln!(output, "No records at or above this score.");
    } else {
        for record in flagged {
            let _ = writeln!(output);
            let _ = writeln!(
                output,
                "### {} / {} ({}, {})",
                record.details.scheme(),
                record.details.vendor_name(),
                record.risk_level.as_str(),
                record.id
            );
            let _ = writeln!(output, "```");
            let _ = write!(output, "{}", explain(record));
            let _ = writeln!(output, "```");
        }
    }

    output
}

#[derive(serde::Serialize)]
struct ExportRow<'a> {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Scheme")]
    scheme: &'a str,
    #[serde(rename = "Department")]
    department: &'a str,
    #[serde(rename = "Vendor")]
    vendor: &'a str,
    #[serde(rename = "Amount Disbursed")]
    amount_disbursed: f64,
    #[serde(rename = "Risk Score")]
    risk_score: u32,
    #[serde(rename = "Risk Level")]
    risk_level: &'static str,
    #[serde(rename = "Risk Reasons")]
    risk_reasons: String,
    #[serde(rename = "Audit Status")]
    audit_status: &'static str,
}

/// Writes scored records as CSV. With `high_only`, keeps records scoring
/// above [`HIGH_RISK_SCORE`]. Returns the number of rows written.
pub fn write_csv<W: std::io::Write>(
    records: &[ScoredRecord],
    high_only: bool,
    writer: W,
) -> csv::Result<usize> {
    let mut writer = csv::Writer::from_writer(writer);
    let mut written = 0usize;

    for record in records
        .iter()
        .filter(|record| !high_only || record.risk_score > HIGH_RISK_SCORE)
    {
        writer.serialize(ExportRow {
            id: record.id.to_string(),
            scheme: record.details.scheme(),
            department: record.details.department(),
            vendor: record.details.vendor_name(),
            amount_disbursed: record.details.amount_disbursed(),
            risk_score: record.risk_score,
            risk_level: record.risk_level.as_str(),
            risk_reasons: record.risk_reasons.join("; "),
            audit_status: record.audit_status.as_str(),
        })?;
        written += 1;
    }

    writer.flush()?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuditDetails, AuditStatus, DisbursementDetails};
    use uuid::Uuid;

    const SPIKE: &str = "Amount is 5.0x historical average";
    const BUSY: &str = "Very high transaction frequency";
    const TRIPLED: &str = "Amount is 3.0x historical average";
    const QUIET: &str = "Standard operational parameters";

    fn record(score: u32, level: RiskLevel, amount: f64, reasons: &[&str]) -> ScoredRecord {
        ScoredRecord {
            id: Uuid::new_v4(),
            details: RecordDetails::Disbursement(DisbursementDetails {
                scheme: "MGNREGA".to_string(),
                department: "Rural Development".to_string(),
                state: "Bihar".to_string(),
                vendor_name: "Shree Infra".to_string(),
                amount_disbursed: amount,
                avg_historical_amount: 100_000.0,
                transaction_frequency: 4,
                beneficiary_count: 120,
                duplicate_identity: false,
            }),
            risk_score: score,
            risk_level: level,
            risk_reasons: reasons.iter().map(|r| r.to_string()).collect(),
            audit_status: AuditStatus::Pending,
        }
    }

    fn audit_record(state: &str, department: &str, scheme: &str, vendor: &str) -> ScoredRecord {
        let mut audit = record(0, RiskLevel::Low, 25_000.0, &[QUIET]);
        audit.details = RecordDetails::Audit(AuditDetails {
            scheme: scheme.to_string(),
            department: department.to_string(),
            state: state.to_string(),
            vendor_name: vendor.to_string(),
            amount_disbursed: 25_000.0,
            date: None,
            issue: None,
        });
        audit
    }

    fn sample() -> Vec<ScoredRecord> {
        vec![
            record(90, RiskLevel::High, 500_000.0, &[SPIKE, BUSY]),
            record(60, RiskLevel::Medium, 200_000.0, &[TRIPLED]),
            record(76, RiskLevel::High, 300_000.0, &[BUSY]),
            record(0, RiskLevel::Low, 50_000.0, &[QUIET]),
        ]
    }

    #[test]
    fn summary_counts_tiers_and_funds() {
        let summary = summarize(&sample());
        assert_eq!(summary.total, 4);
        assert_eq!(summary.high, 2);
        assert_eq!(summary.medium, 1);
        assert_eq!(summary.low, 1);
        assert_eq!(summary.high_risk_count, 2);
        assert!((summary.funds_under_risk - 800_000.0).abs() < 0.001);
        assert!((summary.mean_score - 56.5).abs() < 0.001);
    }

    #[test]
    fn empty_summary_is_zeroed() {
        let summary = summarize(&[]);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.mean_score, 0.0);
    }

    #[test]
    fn reasons_ranked_by_frequency_then_text() {
        let frequencies = reason_frequencies(&sample());
        assert_eq!(frequencies[0].reason, BUSY);
        assert_eq!(frequencies[0].count, 2);
        assert_eq!(frequencies[1].reason, TRIPLED);
        assert_eq!(frequencies.len(), 4);
    }

    #[test]
    fn explanation_lists_reasons_and_details() {
        let text = explain(&sample()[0]);
        assert!(text.contains("risk score of 90/100"));
        assert!(text.contains("requires immediate audit review"));
        assert!(text.contains("1. Amount is 5.0x historical average"));
        assert!(text.contains("2. Very high transaction frequency"));
        assert!(text.contains("State: Bihar"));
        assert!(text.contains("Amount Disbursed: ₹5.00 Lakhs"));
        assert!(text.contains("Historical Average: ₹1.00 Lakhs"));
        assert!(text.contains("Beneficiaries: 120"));
    }

    #[test]
    fn audit_explanation_includes_state_and_issue() {
        let mut audit = audit_record("Bihar", "PWD", "PMGSY", "Acme");
        audit.risk_score = 55;
        audit.risk_level = RiskLevel::Medium;
        if let RecordDetails::Audit(details) = &mut audit.details {
            details.issue = Some("Inflated estimate".to_string());
        }
        let text = explain(&audit);
        assert!(text.contains("should be reviewed when resources permit"));
        assert!(text.contains("State: Bihar"));
        assert!(text.contains("Reported Issue: Inflated estimate"));
        assert!(!text.contains("Historical Average"));
    }

    #[test]
    fn report_flags_records_at_min_score() {
        let report = build_report(Pipeline::Disbursement, "batch.csv", 75, &sample());
        assert!(report.contains("# Spending Risk Triage Report"));
        let heading = "Generated for batch.csv using the disbursement policy";
        assert!(report.contains(heading));
        assert!(report.contains("- High-risk records (score above 75): 2"));
        assert!(report.contains("- High: 2"));
        assert!(report.contains(&format!("- {BUSY}: 2 records")));
        assert!(report.contains("## Flagged Records (score 75 and above)"));
        assert!(report.contains("risk score of 90/100"));
        assert!(report.contains("risk score of 76/100"));
        assert!(!report.contains("risk score of 60/100"));
        let first = report.find("risk score of 90/100").unwrap();
        let second = report.find("risk score of 76/100").unwrap();
        assert!(first < second);
    }

    #[test]
    fn report_handles_empty_batch() {
        let report = build_report(Pipeline::Audit, "empty.csv", 75, &[]);
        assert!(report.contains("No records in this batch."));
        assert!(report.contains("No records at or above this score."));
    }

    #[test]
    fn csv_export_joins_reasons() {
        let mut buffer = Vec::new();
        let written = write_csv(&sample(), false, &mut buffer).unwrap();
        assert_eq!(written, 4);
        let text = String::from_utf8(buffer).unwrap();
        let header = concat!(
            "ID,Scheme,Department,Vendor,Amount Disbursed,",
            "Risk Score,Risk Level,Risk Reasons,Audit Status"
        );
        assert_eq!(text.lines().next(), Some(header));
        assert!(text.contains(&format!("{SPIKE}; {BUSY}")));
        assert!(text.contains(",Pending"));
    }

    #[test]
    fn csv_export_high_only() {
        let mut buffer = Vec::new();
        let written = write_csv(&sample(), true, &mut buffer).unwrap();
        assert_eq!(written, 2);
        let text = String::from_utf8(buffer).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(!text.contains(QUIET));
    }

    fn filter_sample() -> Vec<ScoredRecord> {
        let mut kerala = record(60, RiskLevel::Medium, 200_000.0, &[TRIPLED]);
        if let RecordDetails::Disbursement(details) = &mut kerala.details {
            details.state = "Kerala".to_string();
            details.department = "Health".to_string();
        }

        let mut builders = audit_record("Kerala", "PWD", "PMGSY", "Acme Builders");
        builders.risk_score = 80;
        builders.risk_level = RiskLevel::High;
        builders.risk_reasons = vec!["Same vendor involved in multiple transactions".to_string()];

        let mut clinic = audit_record("Goa", "Health", "NHM", "Medico");
        clinic.risk_score = 10;

        vec![
            record(90, RiskLevel::High, 500_000.0, &[SPIKE, BUSY]),
            kerala,
            builders,
            clinic,
        ]
    }

    fn kept_scores(criteria: &RecordFilter) -> Vec<u32> {
        filter(filter_sample(), criteria)
            .iter()
            .map(|record| record.risk_score)
            .collect()
    }

    fn search(term: &str) -> RecordFilter {
        RecordFilter {
            search: Some(term.to_string()),
            ..RecordFilter::default()
        }
    }

    #[test]
    fn empty_filter_keeps_everything() {
        assert!(RecordFilter::default().is_empty());
        assert_eq!(kept_scores(&RecordFilter::default()), [90, 60, 80, 10]);
    }

    #[test]
    fn filter_by_level() {
        let criteria = RecordFilter {
            level: Some(RiskLevel::High),
            ..RecordFilter::default()
        };
        assert_eq!(kept_scores(&criteria), [90, 80]);
    }

    #[test]
    fn filter_by_state_ignores_case() {
        let criteria = RecordFilter {
            state: Some("kerala".to_string()),
            ..RecordFilter::default()
        };
        assert_eq!(kept_scores(&criteria), [60, 80]);
    }

    #[test]
    fn filter_by_department() {
        let criteria = RecordFilter {
            department: Some("Health".to_string()),
            ..RecordFilter::default()
        };
        assert_eq!(kept_scores(&criteria), [60, 10]);
    }

    #[test]
    fn filter_by_scheme() {
        let criteria = RecordFilter {
            scheme: Some(" pmgsy ".to_string()),
            ..RecordFilter::default()
        };
        assert_eq!(kept_scores(&criteria), [80]);

        let criteria = RecordFilter {
            scheme: Some("MGNREGA".to_string()),
            ..RecordFilter::default()
        };
        assert_eq!(kept_scores(&criteria), [90, 60]);
    }

    #[test]
    fn search_is_case_insensitive_across_fields() {
        assert_eq!(kept_scores(&search("ACME")), [80]);
        assert_eq!(kept_scores(&search("rural dev")), [90]);
        assert_eq!(kept_scores(&search("nhm")), [10]);
        assert_eq!(kept_scores(&search("GOA")), [10]);
    }

    #[test]
    fn search_matches_reasons() {
        assert_eq!(kept_scores(&search("vendor INVOLVED")), [80]);
        assert_eq!(kept_scores(&search("transaction frequency")), [90]);
    }

    #[test]
    fn criteria_combine() {
        let criteria = RecordFilter {
            level: Some(RiskLevel::High),
            state: Some("Kerala".to_string()),
            ..RecordFilter::default()
        };
        assert_eq!(kept_scores(&criteria), [80]);

        let criteria = RecordFilter {
            department: Some("Health".to_string()),
            search: Some("shree".to_string()),
            ..RecordFilter::default()
        };
        assert_eq!(kept_scores(&criteria), [60]);
        assert!(kept_scores(&search("no such vendor")).is_empty());
    }
}
