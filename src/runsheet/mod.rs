// 🚚 Runsheet Extractor - Daily job manifests into normalized job records
// Three interchangeable strategies share one output schema; the driver
// tries them in order until one produces confident output.

pub mod anchor;
pub mod field_state;
pub mod table;

use crate::document::{runsheet_date, Document};
use crate::quality;
use crate::report::ExtractionReport;
use anyhow::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info, warn};

pub use anchor::AnchorScan;
pub use field_state::FieldStateParser;
pub use table::TableRows;

// ============================================================================
// CLOSED VOCABULARIES
// ============================================================================

/// Activity keywords (closed vocabulary, matched case-insensitively).
pub const ACTIVITY_VOCAB: [&str; 7] = [
    "Collection",
    "Delivery",
    "Installation",
    "Removal",
    "Exchange",
    "Survey",
    "Clearance",
];

/// Priority codes (closed vocabulary).
pub const PRIORITY_VOCAB: [&str; 5] = ["AM", "PM", "ANY", "TIMED", "URGENT"];

/// Corporate-suffix words that end a customer name.
pub const CORPORATE_SUFFIXES: [&str; 8] = [
    "ltd", "limited", "plc", "llp", "group", "stores", "services", "retail",
];

/// Internal-process markers: a customer mentioning "audit" together with
/// one of these is an internal audit record, not billable work.
const INTERNAL_MARKERS: [&str; 3] = ["internal", "compliance", "stock"];

// ============================================================================
// SCHEMA
// ============================================================================

/// One extracted job before it is dated and persisted. The quality score
/// is transient, for review triage only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobCandidate {
    pub job_number: String,
    pub customer: Option<String>,
    pub activity: Option<String>,
    pub priority: Option<String>,
    pub job_address: Option<String>,
    pub postcode: Option<String>,
    pub quality: u8,
}

/// One job on one calendar date; unique per (run_date, job_number).
///
/// The pay_* fields start null and are populated only by the
/// reconciliation engine, never by extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunsheetJob {
    pub run_date: NaiveDate,
    pub job_number: String,
    pub customer: Option<String>,
    pub activity: Option<String>,
    pub priority: Option<String>,
    pub job_address: Option<String>,
    pub postcode: Option<String>,
    pub status: String,
    pub source_file: String,
    pub pay_amount: Option<f64>,
    pub pay_rate: Option<f64>,
    pub pay_quantity: Option<f64>,
    pub pay_week: Option<u32>,
    pub pay_year: Option<i32>,
}

// ============================================================================
// STRATEGY TRAIT
// ============================================================================

/// One extraction strategy. All strategies emit the same candidate
/// schema; the driver handles scoring, exclusion and dedup.
pub trait RunsheetStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn extract(&self, doc: &Document) -> Vec<JobCandidate>;
}

// ============================================================================
// EXTRACTOR DRIVER
// ============================================================================

pub struct RunsheetExtractor {
    /// Party whose pages we extract (runsheets interleave several).
    pub party: String,
    /// Minimum quality for a strategy's output to be accepted.
    pub min_quality: u8,
}

impl RunsheetExtractor {
    pub fn new(party: &str) -> Self {
        RunsheetExtractor {
            party: party.to_string(),
            min_quality: quality::REVIEW_THRESHOLD,
        }
    }

    /// Ordered strategy list for a document. Table segments, when the
    /// provider recovered any, are the most structured input and go
    /// first; otherwise fall back to line-based strategies.
    fn strategies(&self, doc: &Document) -> Vec<Box<dyn RunsheetStrategy>> {
        let mut list: Vec<Box<dyn RunsheetStrategy>> = Vec::new();
        if doc.has_tables() {
            list.push(Box::new(TableRows::new()));
        }
        list.push(Box::new(AnchorScan::new(&self.party)));
        list.push(Box::new(FieldStateParser::new()));
        list
    }

    /// Extract jobs from one runsheet document.
    ///
    /// A filename without a DD-MM-YYYY token is a structural failure.
    /// Strategies are tried in order until one yields at least one job at
    /// or above the quality floor; that strategy's whole output is kept
    /// (low scorers included - the score is triage, not a filter).
    pub fn extract(
        &self,
        doc: &Document,
        report: &mut ExtractionReport,
    ) -> Result<Vec<RunsheetJob>> {
        report.documents_seen += 1;
        let date = runsheet_date(&doc.source_file)?;

        for strategy in self.strategies(doc) {
            let candidates = self.finish_candidates(strategy.extract(doc), report);
            if candidates.is_empty() {
                debug!(strategy = strategy.name(), file = %doc.source_file, "no candidates");
                continue;
            }

            if candidates.iter().any(|c| c.quality >= self.min_quality) {
                info!(
                    strategy = strategy.name(),
                    file = %doc.source_file,
                    jobs = candidates.len(),
                    "runsheet extracted"
                );
                report.items_extracted += candidates.len();
                return Ok(candidates
                    .into_iter()
                    .map(|c| self.into_job(c, date, &doc.source_file))
                    .collect());
            }

            debug!(
                strategy = strategy.name(),
                file = %doc.source_file,
                "all candidates below quality floor, trying next strategy"
            );
        }

        warn!(file = %doc.source_file, "no strategy produced confident output");
        report.record_failure(&doc.source_file, "no strategy produced confident output");
        Ok(Vec::new())
    }

    /// Strategy-independent post-processing: drop internal audit noise,
    /// keep only the first occurrence per job number, attach scores.
    fn finish_candidates(
        &self,
        candidates: Vec<JobCandidate>,
        report: &mut ExtractionReport,
    ) -> Vec<JobCandidate> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut out = Vec::new();

        for mut candidate in candidates {
            if candidate
                .customer
                .as_deref()
                .map(is_internal_audit)
                .unwrap_or(false)
            {
                debug!(job = %candidate.job_number, "internal audit record discarded");
                continue;
            }

            if !seen.insert(candidate.job_number.clone()) {
                report.items_skipped_as_duplicate += 1;
                continue;
            }

            candidate.quality = quality::score_job(&candidate);
            out.push(candidate);
        }

        out
    }

    fn into_job(&self, c: JobCandidate, date: NaiveDate, source_file: &str) -> RunsheetJob {
        RunsheetJob {
            run_date: date,
            job_number: c.job_number,
            customer: c.customer,
            activity: c.activity,
            priority: c.priority,
            job_address: c.job_address,
            postcode: c.postcode,
            status: "pending".to_string(),
            source_file: source_file.to_string(),
            pay_amount: None,
            pay_rate: None,
            pay_quantity: None,
            pay_week: None,
            pay_year: None,
        }
    }
}

/// Internal audit records are non-billable noise regardless of strategy.
fn is_internal_audit(customer: &str) -> bool {
    let lower = customer.to_lowercase();
    lower.contains("audit") && INTERNAL_MARKERS.iter().any(|m| lower.contains(m))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Document, Page, Table};

    fn candidate(job: &str, customer: Option<&str>) -> JobCandidate {
        JobCandidate {
            job_number: job.to_string(),
            customer: customer.map(|c| c.to_string()),
            activity: Some("Delivery".to_string()),
            priority: None,
            job_address: Some("14 Mill Lane Leeds".to_string()),
            postcode: Some("LS1 1AB".to_string()),
            quality: 0,
        }
    }

    #[test]
    fn test_internal_audit_exclusion() {
        assert!(is_internal_audit("Internal Audit - Stock"));
        assert!(is_internal_audit("COMPLIANCE AUDIT TEAM"));
        assert!(!is_internal_audit("Audit Supplies Ltd"));
        assert!(!is_internal_audit("TESCO Stores Limited"));
    }

    #[test]
    fn test_finish_candidates_dedup_and_exclusion() {
        let extractor = RunsheetExtractor::new("Northern Carriers");
        let mut report = ExtractionReport::new();
        let out = extractor.finish_candidates(
            vec![
                candidate("1000001", Some("TESCO Stores Limited")),
                candidate("1000001", Some("TESCO Stores Limited")),
                candidate("1000002", Some("Internal Audit Compliance")),
                candidate("1000003", Some("ASDA Stores Limited")),
            ],
            &mut report,
        );
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].job_number, "1000001");
        assert_eq!(out[1].job_number, "1000003");
        assert_eq!(report.items_skipped_as_duplicate, 1);
        assert!(out.iter().all(|c| c.quality > 0));
    }

    #[test]
    fn test_extract_requires_date_in_filename() {
        let extractor = RunsheetExtractor::new("Northern Carriers");
        let doc = Document::from_text("Runsheet March.pdf", "whatever");
        let mut report = ExtractionReport::new();
        assert!(extractor.extract(&doc, &mut report).is_err());
    }

    #[test]
    fn test_table_strategy_preferred_when_tables_present() {
        let doc = Document {
            source_file: "Runsheet 16-03-2024.pdf".to_string(),
            pages: vec![Page {
                lines: vec!["DELIVERED FOR NORTHERN CARRIERS".to_string()],
                tables: vec![Table {
                    headers: vec![
                        "JOB #".to_string(),
                        "CUSTOMER".to_string(),
                        "ADDRESS".to_string(),
                    ],
                    rows: vec![vec![
                        "4209480".to_string(),
                        "TESCO Stores Limited".to_string(),
                        "Oxford Street\nMANCHESTER M1 6EQ".to_string(),
                    ]],
                }],
            }],
        };

        let extractor = RunsheetExtractor::new("Northern Carriers");
        let mut report = ExtractionReport::new();
        let jobs = extractor.extract(&doc, &mut report).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].job_number, "4209480");
        assert_eq!(jobs[0].postcode.as_deref(), Some("M1 6EQ"));
        assert_eq!(jobs[0].status, "pending");
        assert_eq!(jobs[0].pay_amount, None);
    }
}
