// 📊 Extraction Report - Caller-facing accounting for a processing run

use serde::{Deserialize, Serialize};

/// One locally-recovered parse failure: the offending line (or filename)
/// plus the reason it was skipped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseFailure {
    pub line_context: String,
    pub reason: String,
}

/// Accumulated result of processing one or more documents.
///
/// Parse failures here are the recovered kind (unit skipped, document
/// continued); rejected documents surface as errors, not report entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionReport {
    pub documents_seen: usize,
    pub items_extracted: usize,
    pub items_skipped_as_duplicate: usize,
    /// Items kept with null money fields because the quantity/rate
    /// lookahead was exhausted. Counted separately for operator review.
    pub items_missing_money: usize,
    pub parse_failures: Vec<ParseFailure>,
    /// Source files that yielded zero line items and need manual review.
    pub needs_review: Vec<String>,
}

impl ExtractionReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_failure(&mut self, line_context: &str, reason: &str) {
        self.parse_failures.push(ParseFailure {
            line_context: line_context.to_string(),
            reason: reason.to_string(),
        });
    }

    /// Fold another report into this one (multi-document runs).
    pub fn merge(&mut self, other: ExtractionReport) {
        self.documents_seen += other.documents_seen;
        self.items_extracted += other.items_extracted;
        self.items_skipped_as_duplicate += other.items_skipped_as_duplicate;
        self.items_missing_money += other.items_missing_money;
        self.parse_failures.extend(other.parse_failures);
        self.needs_review.extend(other.needs_review);
    }

    pub fn summary(&self) -> String {
        format!(
            "{} documents, {} items extracted, {} duplicates skipped, {} missing money fields, {} parse failures, {} flagged for review",
            self.documents_seen,
            self.items_extracted,
            self.items_skipped_as_duplicate,
            self.items_missing_money,
            self.parse_failures.len(),
            self.needs_review.len()
        )
    }
}
