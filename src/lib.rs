// Payrun Reconcile - Core Library
// Pay statements and runsheets in, one reconciled SQLite job ledger out.
// Exposes all modules for use in the CLI and tests.

pub mod db;
pub mod document;
pub mod normalize;
pub mod quality;
pub mod reconcile;
pub mod report;
pub mod runsheet;
pub mod statement;

// Re-export commonly used types
pub use db::{
    count_line_items, count_runsheet_jobs, get_line_items, get_runsheet_jobs, get_statement,
    insert_runsheet_jobs, replace_statement, setup_database,
};
pub use document::{runsheet_date, statement_period, Document, Page, StatementPeriod, Table};
pub use quality::{needs_review, score_job, REVIEW_THRESHOLD};
pub use reconcile::{
    NeverPaidJob, PaidWithoutRunsheet, ReconcileOutcome, ReconcileStats, ReconciliationEngine,
};
pub use report::{ExtractionReport, ParseFailure};
pub use runsheet::{
    AnchorScan, FieldStateParser, JobCandidate, RunsheetExtractor, RunsheetJob, RunsheetStrategy,
    TableRows,
};
pub use statement::{LineItem, ParsedStatement, PayStatement, StatementParser};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
