// 📄 Document Model - Text/table segments supplied by the upstream provider
// Extraction never touches PDFs directly; it consumes per-page line lists
// and, where the provider can produce them, row/column table segments.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

// ============================================================================
// SEGMENT TYPES
// ============================================================================

/// One table segment: header cells plus data rows, all as raw strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// One page of a document. Tables are optional - an empty list means the
/// provider could not recover table structure for this page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub lines: Vec<String>,
    #[serde(default)]
    pub tables: Vec<Table>,
}

/// One document as delivered by the segment provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub source_file: String,
    pub pages: Vec<Page>,
}

impl Document {
    /// Build a document from plain text. Pages split on form-feed; no
    /// table segments are available in this form.
    pub fn from_text(source_file: &str, text: &str) -> Self {
        let pages = text
            .split('\u{0c}')
            .map(|page_text| Page {
                lines: page_text.lines().map(|l| l.to_string()).collect(),
                tables: Vec::new(),
            })
            .collect();

        Document {
            source_file: source_file.to_string(),
            pages,
        }
    }

    /// Load a plain-text dump; the filename becomes the provenance tag.
    pub fn from_text_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read document: {}", path.display()))?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown.txt");
        Ok(Document::from_text(name, &text))
    }

    /// Load a JSON segment-provider dump (lines + optional tables per page).
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read document: {}", path.display()))?;
        let doc: Document = serde_json::from_str(&raw)
            .with_context(|| format!("Malformed segment dump: {}", path.display()))?;
        Ok(doc)
    }

    /// All lines across all pages, in order.
    pub fn all_lines(&self) -> Vec<&str> {
        self.pages
            .iter()
            .flat_map(|p| p.lines.iter().map(|l| l.as_str()))
            .collect()
    }

    /// True when at least one page carries table segments.
    pub fn has_tables(&self) -> bool {
        self.pages.iter().any(|p| !p.tables.is_empty())
    }
}

// ============================================================================
// FILENAME PERIOD RECOVERY
// ============================================================================

static WEEK_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Week\s*(\d{1,2})\s+(\d{4})").unwrap());

static RUNSHEET_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{2})-(\d{2})-(\d{4})").unwrap());

/// Settlement period of a pay statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementPeriod {
    pub week: u32,
    pub year: i32,
}

/// Recover (week, tax year) from a pay-statement filename.
///
/// The convention is "Week<N> <YYYY>" anywhere in the name. A filename
/// without it is a structural failure: the whole document is rejected.
pub fn statement_period(filename: &str) -> Result<StatementPeriod> {
    let caps = match WEEK_YEAR.captures(filename) {
        Some(c) => c,
        None => bail!("No 'Week<N> <YYYY>' pattern in filename: {}", filename),
    };

    // Both groups are digit-only by construction
    let week: u32 = caps[1].parse().unwrap();
    let year: i32 = caps[2].parse().unwrap();

    if week == 0 || week > 53 {
        bail!("Week number {} out of range in filename: {}", week, filename);
    }

    Ok(StatementPeriod { week, year })
}

/// Recover the run date from a runsheet filename (DD-MM-YYYY token).
pub fn runsheet_date(filename: &str) -> Result<NaiveDate> {
    let caps = match RUNSHEET_DATE.captures(filename) {
        Some(c) => c,
        None => bail!("No DD-MM-YYYY token in filename: {}", filename),
    };

    let day: u32 = caps[1].parse().unwrap();
    let month: u32 = caps[2].parse().unwrap();
    let year: i32 = caps[3].parse().unwrap();

    NaiveDate::from_ymd_opt(year, month, day)
        .with_context(|| format!("Invalid date {}-{}-{} in filename: {}", day, month, year, filename))
}

// ============================================================================
// TESTS
// ============================================================================
