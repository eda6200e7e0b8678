// 💷 Pay-Statement Extractor - Era-aware line/financial parser
// One document -> one summary record + zero or more line items.
//
// Statement layouts changed at least twice over the covered years. Every
// era-sensitive step (header values, item lines, quantity/rate) is an
// ordered list of candidate rules; the first rule that matches wins, so a
// new layout era is an additive list entry, not a parallel code path.

use crate::document::{statement_period, Document};
use crate::report::ExtractionReport;
use anyhow::{bail, Result};
use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::{debug, info, warn};

// ============================================================================
// RECORD TYPES
// ============================================================================

/// Summary record for one (tax_year, week_number) statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayStatement {
    pub tax_year: i32,
    pub week_number: u32,
    pub verification_number: Option<String>,
    pub tax_reference: Option<String>,
    pub vat_number: Option<String>,
    pub pay_date: Option<NaiveDate>,
    pub period_end: Option<NaiveDate>,
    pub total_company_income: Option<f64>,
    pub materials: Option<f64>,
    pub gross_payment: Option<f64>,
    pub gross_payment_ytd: Option<f64>,
    pub net_payment: Option<f64>,
    pub total_paid_to_bank: Option<f64>,
    pub source_file: String,
}

/// One billable (or deductible) unit of work within a statement.
///
/// Job number is absent in the oldest layout era - that is expected, not
/// an error. Money fields are null when the quantity/rate lookahead was
/// exhausted; the description alone has audit value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    pub job_number: Option<String>,
    pub client: Option<String>,
    pub location: Option<String>,
    pub job_type: Option<String>,
    pub description: String,
    pub quantity: Option<f64>,
    pub rate: Option<f64>,
    pub amount: Option<f64>,
    pub work_date: Option<String>,
    pub work_time: Option<String>,
    pub agency: Option<String>,
    pub settlement_week: Option<u32>,
    pub settlement_year: Option<i32>,
    /// Adjustment sub-kind: client is "Deduction" or "Company Margin",
    /// no job number, negative amount.
    pub is_adjustment: bool,
}

impl LineItem {
    /// Composite dedup key, hashed. Source PDFs sometimes repeat a block
    /// verbatim across a page break; the key collapses those repeats.
    pub fn dedup_key(&self) -> String {
        let raw = if self.is_adjustment {
            format!(
                "adjustment|{}|{:?}",
                self.client.as_deref().unwrap_or(""),
                self.amount
            )
        } else {
            format!(
                "{}|{}|{}|{}|{}|{:?}",
                self.job_number.as_deref().unwrap_or(""),
                self.client.as_deref().unwrap_or(""),
                self.location.as_deref().unwrap_or(""),
                self.work_date.as_deref().unwrap_or(""),
                self.work_time.as_deref().unwrap_or(""),
                self.amount
            )
        };

        let mut hasher = Sha256::new();
        hasher.update(raw);
        format!("{:x}", hasher.finalize())
    }
}

/// Output of one statement parse: summary plus its line items.
#[derive(Debug, Clone)]
pub struct ParsedStatement {
    pub statement: PayStatement,
    pub items: Vec<LineItem>,
}

// ============================================================================
// PATTERNS
// ============================================================================

/// Header value line: 10-digit verification number, pay date, period end,
/// in fixed left-to-right order on the successor of the label line.
static HEADER_VALUES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{10})\s+(\d{2}/\d{2}/\d{4})\s+(\d{2}/\d{2}/\d{4})").unwrap());

static TAX_REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)tax\s+reference\s*:?\s*([A-Z0-9][A-Z0-9/]{3,14})").unwrap());

static VAT_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)vat\s+(?:reg(?:istration)?\s+)?(?:no|number)\.?\s*:?\s*((?:GB\s*)?\d[\d ]{7,11}\d)")
        .unwrap()
});

/// Currency amount: optional symbol, thousands separators, parens negate.
static CURRENCY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"£?\s*(\()?\s*(-?[\d,]+(?:\.\d{1,2})?)\s*(?:\))?").unwrap());

/// Job entry line: "<name>: <rest>" where the rest carries a pipe.
static ITEM_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^|:]+):\s*(.+)$").unwrap());

/// Job number prefix inside the rest - present from the middle era on.
static JOB_NUMBER_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{5,8})\s*\|\s*(.*)$").unwrap());

/// Deduction adjustment: "<name>: Deduction", no pipe on the line.
static DEDUCTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^[A-Za-z][A-Za-z .'-]*:\s*Deduction\b").unwrap());

/// Company margin adjustment: "Company Margin £ (11.00)".
static COMPANY_MARGIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)company\s+margin\s*£?\s*\(\s*([\d,]+(?:\.\d{1,2})?)\s*\)").unwrap()
});

/// Transaction date/time pair inside a description: DD/MM/YY(YY) HH:MM.
static WORK_DATE_TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{2}/\d{2}/(?:\d{4}|\d{2}))\s+(\d{2}:\d{2})").unwrap());

/// Description terminators: a record's trailing money/agency/date lines.
static BARE_DECIMAL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+(?:\.\d+)?$").unwrap());
static BARE_AGENCY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Z]{2,6}$").unwrap());
static BARE_DATE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{2}/\d{2}/\d{4}$").unwrap());

/// Quantity/rate, newer era: "1.00 £22.50" alone on a line.
static QTY_RATE_PLAIN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+(?:\.\d+)?)\s*£\s*([\d,]+(?:\.\d{1,2})?)$").unwrap());

/// Quantity/rate, older era: trailing agency token on the same line.
static QTY_RATE_AGENCY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+(?:\.\d+)?)\s*£\s*([\d,]+(?:\.\d{1,2})?)\s+([A-Z]{2,6})$").unwrap()
});

/// A line (or line tail) that is nothing but one currency amount.
static CURRENCY_ONLY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^£?\s*\(?\s*[\d,]+(?:\.\d{1,2})?\s*\)?$").unwrap());

fn parse_currency(text: &str) -> Option<f64> {
    let caps = CURRENCY.captures(text)?;
    let negated = caps.get(1).is_some();
    let raw = caps.get(2)?.as_str().replace(',', "");
    let value: f64 = raw.parse().ok()?;
    Some(if negated { -value } else { value })
}

/// Strict variant: the whole text must be one currency amount. Used
/// where scanning arbitrary text would pick up unrelated digits.
fn currency_only(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if CURRENCY_ONLY.is_match(trimmed) {
        parse_currency(trimmed)
    } else {
        None
    }
}

// ============================================================================
// QUANTITY / RATE RULES
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
struct QtyRate {
    quantity: f64,
    rate: f64,
    agency: Option<String>,
}

/// Ordered era rules for the money line. First match wins.
const QTY_RATE_RULES: &[(&str, fn(&str) -> Option<QtyRate>)] = &[
    ("plain", qty_rate_plain),
    ("with_agency", qty_rate_with_agency),
];

fn qty_rate_plain(line: &str) -> Option<QtyRate> {
    let caps = QTY_RATE_PLAIN.captures(line.trim())?;
    Some(QtyRate {
        quantity: caps[1].parse().ok()?,
        rate: caps[2].replace(',', "").parse().ok()?,
        agency: None,
    })
}

fn qty_rate_with_agency(line: &str) -> Option<QtyRate> {
    let caps = QTY_RATE_AGENCY.captures(line.trim())?;
    Some(QtyRate {
        quantity: caps[1].parse().ok()?,
        rate: caps[2].replace(',', "").parse().ok()?,
        agency: Some(caps[3].to_string()),
    })
}

// ============================================================================
// STATEMENT PARSER
// ============================================================================

pub struct StatementParser {
    /// Hard ceiling on the quantity/rate lookahead window. Guarantees
    /// termination on malformed input.
    pub lookahead_limit: usize,
}

impl StatementParser {
    pub fn new() -> Self {
        StatementParser { lookahead_limit: 6 }
    }

    /// Parse one statement document.
    ///
    /// Structural failures (missing filename period, missing header)
    /// reject the whole document. Everything else is recovered locally
    /// and accounted for in the report.
    pub fn parse(&self, doc: &Document, report: &mut ExtractionReport) -> Result<ParsedStatement> {
        report.documents_seen += 1;

        let period = statement_period(&doc.source_file)?;
        let lines = doc.all_lines();

        let mut statement = self.parse_header(&lines, &doc.source_file)?;
        statement.tax_year = period.year;
        statement.week_number = period.week;

        self.parse_financials(&lines, &mut statement);

        let items = self.parse_items(&lines, report);

        if items.is_empty() {
            warn!(file = %doc.source_file, "statement yielded zero line items");
            report.needs_review.push(doc.source_file.clone());
        }

        info!(
            file = %doc.source_file,
            week = period.week,
            year = period.year,
            items = items.len(),
            "parsed pay statement"
        );

        Ok(ParsedStatement { statement, items })
    }

    // ------------------------------------------------------------------
    // Step 1: header
    // ------------------------------------------------------------------

    fn parse_header(&self, lines: &[&str], source_file: &str) -> Result<PayStatement> {
        let label_idx = lines.iter().position(|l| {
            l.contains("Verification Number") && l.contains("Pay Date") && l.contains("Period End")
        });

        let label_idx = match label_idx {
            Some(i) => i,
            None => bail!("No header label line in {}", source_file),
        };

        let value_line = match lines.get(label_idx + 1) {
            Some(l) => l,
            None => bail!("Header label line has no successor in {}", source_file),
        };

        let caps = match HEADER_VALUES.captures(value_line) {
            Some(c) => c,
            None => bail!(
                "Header value line does not match expected layout in {}: {:?}",
                source_file,
                value_line
            ),
        };

        let pay_date = NaiveDate::parse_from_str(&caps[2], "%d/%m/%Y").ok();
        let period_end = NaiveDate::parse_from_str(&caps[3], "%d/%m/%Y").ok();

        // Labelled lookups are position-independent and optional
        let joined = lines.join("\n");
        let tax_reference = TAX_REFERENCE
            .captures(&joined)
            .map(|c| c[1].trim().to_string());
        let vat_number = VAT_NUMBER
            .captures(&joined)
            .map(|c| c[1].split_whitespace().collect::<String>());

        Ok(PayStatement {
            tax_year: 0,
            week_number: 0,
            verification_number: Some(caps[1].to_string()),
            tax_reference,
            vat_number,
            pay_date,
            period_end,
            total_company_income: None,
            materials: None,
            gross_payment: None,
            gross_payment_ytd: None,
            net_payment: None,
            total_paid_to_bank: None,
            source_file: source_file.to_string(),
        })
    }

    // ------------------------------------------------------------------
    // Step 2: financial summary
    // ------------------------------------------------------------------

    fn parse_financials(&self, lines: &[&str], statement: &mut PayStatement) {
        statement.total_company_income = labelled_amount(lines, "Total Company Income", None);
        statement.materials = labelled_amount(lines, "Materials", None);
        // The plain label is a prefix of the YTD label; the exclusion
        // keeps the first-occurrence rule honest.
        statement.gross_payment =
            labelled_amount(lines, "Gross Subcontractor Payment", Some("YTD"));
        statement.gross_payment_ytd =
            labelled_amount(lines, "Gross Subcontractor Payment YTD", None);
        statement.net_payment = labelled_amount(lines, "Net Payment", None);
        statement.total_paid_to_bank = labelled_amount(lines, "Total Paid To Bank", None);
    }

    // ------------------------------------------------------------------
    // Step 3: line items
    // ------------------------------------------------------------------

    fn parse_items(&self, lines: &[&str], report: &mut ExtractionReport) -> Vec<LineItem> {
        let mut items = Vec::new();
        // Scoped to this parse call: two documents must never suppress
        // each other's duplicates.
        let mut seen_keys: HashSet<String> = HashSet::new();

        let mut i = 0;
        while i < lines.len() {
            let line = lines[i].trim();

            if let Some(item) = self.parse_adjustment(line, lines.get(i + 1).copied(), report) {
                push_unique(item, &mut seen_keys, &mut items, report);
                i += 1;
                continue;
            }

            if let Some((item, consumed)) = self.parse_job_entry(lines, i, report) {
                push_unique(item, &mut seen_keys, &mut items, report);
                i += consumed;
                continue;
            }

            i += 1;
        }

        items
    }

    /// Adjustment lines: "<name>: Deduction" (no pipe) or
    /// "Company Margin £ (amount)". Amount is a direct negative value.
    ///
    /// A deduction's amount sits on the same line after the keyword or
    /// alone on the immediate successor. Both spots are matched with the
    /// strict whole-text currency form: the successor may just as well
    /// be the next job entry, whose job number must not be mistaken for
    /// money. No amount found keeps the item with null money fields.
    fn parse_adjustment(
        &self,
        line: &str,
        next_line: Option<&str>,
        report: &mut ExtractionReport,
    ) -> Option<LineItem> {
        if let Some(caps) = COMPANY_MARGIN.captures(line) {
            let amount = -caps[1].replace(',', "").parse::<f64>().ok()?;
            return Some(adjustment_item("Company Margin", line, Some(amount)));
        }

        if !line.contains('|') {
            if let Some(m) = DEDUCTION.find(line) {
                let amount = currency_only(&line[m.end()..])
                    .or_else(|| next_line.and_then(currency_only))
                    .map(|a| -a.abs());
                if amount.is_none() {
                    report.items_missing_money += 1;
                    report.record_failure(line, "deduction amount not found");
                }
                return Some(adjustment_item("Deduction", line, amount));
            }
        }

        None
    }

    /// Job entry: "<name>: [<job-number> |]<rest>", rest carries pipes.
    /// The logical record may span additional physical lines; consume
    /// until a terminator, then discover quantity/rate in a bounded
    /// lookahead window. Returns (item, physical lines consumed).
    fn parse_job_entry(
        &self,
        lines: &[&str],
        start: usize,
        report: &mut ExtractionReport,
    ) -> Option<(LineItem, usize)> {
        let line = lines[start].trim();
        let caps = ITEM_START.captures(line)?;
        let after_colon = caps[2].trim().to_string();
        if !after_colon.contains('|') {
            return None;
        }

        // Job number prefix exists from the middle era onward
        let (job_number, rest) = match JOB_NUMBER_PREFIX.captures(&after_colon) {
            Some(jc) => (Some(jc[1].to_string()), jc[2].trim().to_string()),
            None => (None, after_colon),
        };

        // Assemble the logical record across physical lines
        let mut description_parts = vec![rest];
        let mut cursor = start + 1;
        let ceiling = (start + 1 + self.lookahead_limit).min(lines.len());
        while cursor < ceiling {
            let candidate = lines[cursor].trim();
            if candidate.is_empty() || is_record_terminator(candidate) {
                break;
            }
            description_parts.push(candidate.to_string());
            cursor += 1;
        }
        let description = description_parts.join(" ");

        // Transaction date/time: first DD/MM/YY HH:MM pair found
        let (work_date, work_time) = match WORK_DATE_TIME.captures(&description) {
            Some(dt) => (Some(dt[1].to_string()), Some(dt[2].to_string())),
            None => (None, None),
        };

        let (client, location, job_type) = split_description_segments(&description);

        // Quantity/rate discovery within the bounded window
        let mut qty_rate = None;
        let mut scan = cursor;
        while scan < ceiling {
            let candidate = lines[scan].trim();
            if is_item_boundary(candidate) {
                break; // next item: stop here, leave money fields null
            }
            if let Some((rule_name, found)) = QTY_RATE_RULES
                .iter()
                .find_map(|(name, rule)| rule(candidate).map(|qr| (*name, qr)))
            {
                debug!(rule = rule_name, line = candidate, "quantity/rate matched");
                let mut found = found;
                // Older era variant: agency token on the adjacent line
                if found.agency.is_none() {
                    if let Some(next) = lines.get(scan + 1) {
                        if BARE_AGENCY.is_match(next.trim()) {
                            found.agency = Some(next.trim().to_string());
                            scan += 1;
                        }
                    }
                }
                qty_rate = Some(found);
                scan += 1;
                break;
            }
            scan += 1;
        }

        let (quantity, rate, amount, agency) = match qty_rate {
            Some(qr) => (
                Some(qr.quantity),
                Some(qr.rate),
                Some(qr.quantity * qr.rate),
                qr.agency,
            ),
            None => {
                // Item kept anyway: the description alone has audit value
                report.items_missing_money += 1;
                report.record_failure(line, "quantity/rate lookahead exhausted");
                (None, None, None, None)
            }
        };

        let item = LineItem {
            job_number,
            client,
            location,
            job_type,
            description,
            quantity,
            rate,
            amount,
            work_date,
            work_time,
            agency,
            settlement_week: None,
            settlement_year: None,
            is_adjustment: false,
        };

        Some((item, (scan.max(cursor) - start).max(1)))
    }
}

impl Default for StatementParser {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn adjustment_item(client: &str, line: &str, amount: Option<f64>) -> LineItem {
    LineItem {
        job_number: None,
        client: Some(client.to_string()),
        location: None,
        job_type: None,
        description: line.trim().to_string(),
        quantity: Some(1.0),
        rate: amount,
        amount,
        work_date: None,
        work_time: None,
        agency: None,
        settlement_week: None,
        settlement_year: None,
        is_adjustment: true,
    }
}

fn is_record_terminator(line: &str) -> bool {
    BARE_DECIMAL.is_match(line)
        || BARE_AGENCY.is_match(line)
        || BARE_DATE.is_match(line)
        || QTY_RATE_PLAIN.is_match(line)
        || QTY_RATE_AGENCY.is_match(line)
        || is_item_boundary(line)
}

/// Start of the next logical item: a job entry, or either adjustment kind.
fn is_item_boundary(line: &str) -> bool {
    (ITEM_START.is_match(line) && line.contains('|'))
        || COMPANY_MARGIN.is_match(line)
        || DEDUCTION.is_match(line)
}

/// Client/location/job-type from the pipe-delimited description.
///
/// Three or more segments map positionally; two segments fall back to a
/// client + location reading; a single segment is client only. The
/// job-type segment has the transaction date/time pair stripped out.
fn split_description_segments(
    description: &str,
) -> (Option<String>, Option<String>, Option<String>) {
    let segments: Vec<String> = description
        .split('|')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    let clean = |s: &str| {
        let stripped = WORK_DATE_TIME.replace_all(s, "");
        let out = crate::normalize::collapse_whitespace(&stripped);
        if out.is_empty() {
            None
        } else {
            Some(out)
        }
    };

    match segments.len() {
        0 => (None, None, None),
        1 => (clean(&segments[0]), None, None),
        2 => (clean(&segments[0]), clean(&segments[1]), None),
        _ => (
            clean(&segments[0]),
            clean(&segments[1]),
            clean(&segments[2]),
        ),
    }
}

fn labelled_amount(lines: &[&str], label: &str, exclude: Option<&str>) -> Option<f64> {
    for line in lines {
        if let Some(pos) = line.find(label) {
            if let Some(excl) = exclude {
                if line.contains(excl) {
                    continue;
                }
            }
            let tail = &line[pos + label.len()..];
            if let Some(value) = parse_currency(tail) {
                // First occurrence only
                return Some(value);
            }
        }
    }
    None
}

fn push_unique(
    item: LineItem,
    seen: &mut HashSet<String>,
    items: &mut Vec<LineItem>,
    report: &mut ExtractionReport,
) {
    if seen.insert(item.dedup_key()) {
        report.items_extracted += 1;
        items.push(item);
    } else {
        debug!(description = %item.description, "duplicate line item dropped");
        report.items_skipped_as_duplicate += 1;
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;

    fn parse_doc(filename: &str, body: &str) -> (Result<ParsedStatement>, ExtractionReport) {
        let doc = Document::from_text(filename, body);
        let parser = StatementParser::new();
        let mut report = ExtractionReport::new();
        let parsed = parser.parse(&doc, &mut report);
        (parsed, report)
    }

    const HEADER: &str = "Verification Number    Pay Date    Period End\n\
                          1234567890 22/03/2024 16/03/2024\n\
                          Tax Reference: 123/AB456\n\
                          VAT No: GB 987 6543 21\n";

    #[test]
    fn test_header_parse() {
        let (parsed, _) = parse_doc("Statement Week42 2023.pdf", HEADER);
        let parsed = parsed.unwrap();
        let s = &parsed.statement;
        assert_eq!(s.tax_year, 2023);
        assert_eq!(s.week_number, 42);
        assert_eq!(s.verification_number.as_deref(), Some("1234567890"));
        assert_eq!(s.tax_reference.as_deref(), Some("123/AB456"));
        assert_eq!(s.vat_number.as_deref(), Some("GB987654321"));
        assert_eq!(s.pay_date, NaiveDate::from_ymd_opt(2024, 3, 22));
        assert_eq!(s.period_end, NaiveDate::from_ymd_opt(2024, 3, 16));
    }

    #[test]
    fn test_missing_filename_period_rejects_document() {
        let (parsed, _) = parse_doc("Statement March.pdf", HEADER);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_missing_header_rejects_document() {
        let (parsed, _) = parse_doc("Statement Week1 2023.pdf", "just some text\nno header here\n");
        assert!(parsed.is_err());
    }

    #[test]
    fn test_financial_summary() {
        let body = format!(
            "{}\
             Total Company Income £1,250.00\n\
             Materials £0.00\n\
             Gross Subcontractor Payment £1,100.00\n\
             Gross Subcontractor Payment YTD £14,300.00\n\
             Net Payment £890.50\n\
             Total Paid To Bank £890.50\n",
            HEADER
        );
        let (parsed, _) = parse_doc("Statement Week5 2024.pdf", &body);
        let s = parsed.unwrap().statement;
        assert_eq!(s.total_company_income, Some(1250.0));
        assert_eq!(s.materials, Some(0.0));
        assert_eq!(s.gross_payment, Some(1100.0));
        assert_eq!(s.gross_payment_ytd, Some(14300.0));
        assert_eq!(s.net_payment, Some(890.5));
        assert_eq!(s.total_paid_to_bank, Some(890.5));
    }

    #[test]
    fn test_missing_financial_label_stays_null() {
        let (parsed, _) = parse_doc("Statement Week5 2024.pdf", HEADER);
        let s = parsed.unwrap().statement;
        assert_eq!(s.net_payment, None);
        assert_eq!(s.gross_payment, None);
    }

    #[test]
    fn test_job_entry_newer_era() {
        let body = format!(
            "{}\
             Daniel Hanson: 4209480 | Acme Corp | High Street Leeds | Collection 16/03/24 09:00\n\
             \n\
             1.00 £22.50\n",
            HEADER
        );
        let (parsed, report) = parse_doc("Statement Week12 2024.pdf", &body);
        let items = parsed.unwrap().items;
        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.job_number.as_deref(), Some("4209480"));
        assert_eq!(item.client.as_deref(), Some("Acme Corp"));
        assert_eq!(item.location.as_deref(), Some("High Street Leeds"));
        assert_eq!(item.job_type.as_deref(), Some("Collection"));
        assert_eq!(item.work_date.as_deref(), Some("16/03/24"));
        assert_eq!(item.work_time.as_deref(), Some("09:00"));
        assert_eq!(item.quantity, Some(1.0));
        assert_eq!(item.rate, Some(22.50));
        assert_eq!(item.amount, Some(22.50));
        assert!(!item.is_adjustment);
        assert_eq!(report.items_extracted, 1);
        assert_eq!(report.items_missing_money, 0);
    }

    #[test]
    fn test_job_entry_older_era_agency_and_no_job_number() {
        let body = format!(
            "{}\
             John Smith: Beta Logistics | Canal Road Bradford | Delivery 02/05/21 07:30\n\
             2.00 £18.00 MSL\n",
            HEADER
        );
        let (parsed, _) = parse_doc("Statement Week18 2021.pdf", &body);
        let items = parsed.unwrap().items;
        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.job_number, None);
        assert_eq!(item.client.as_deref(), Some("Beta Logistics"));
        assert_eq!(item.agency.as_deref(), Some("MSL"));
        assert_eq!(item.quantity, Some(2.0));
        assert_eq!(item.rate, Some(18.0));
        assert_eq!(item.amount, Some(36.0));
    }

    #[test]
    fn test_multi_line_description_assembly() {
        let body = format!(
            "{}\
             Daniel Hanson: 4209480 | Acme Corp | High Street\n\
             Leeds | Collection 16/03/24 09:00\n\
             1.00 £22.50\n",
            HEADER
        );
        let (parsed, _) = parse_doc("Statement Week12 2024.pdf", &body);
        let items = parsed.unwrap().items;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].location.as_deref(), Some("High Street Leeds"));
        assert_eq!(items[0].job_type.as_deref(), Some("Collection"));
        assert_eq!(items[0].amount, Some(22.50));
    }

    #[test]
    fn test_lookahead_exhausted_keeps_item_with_null_money() {
        let body = format!(
            "{}\
             Daniel Hanson: 4209480 | Acme Corp | High Street Leeds | Collection\n",
            HEADER
        );
        let (parsed, report) = parse_doc("Statement Week12 2024.pdf", &body);
        let items = parsed.unwrap().items;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].quantity, None);
        assert_eq!(items[0].rate, None);
        assert_eq!(items[0].amount, None);
        assert_eq!(report.items_missing_money, 1);
        assert_eq!(report.parse_failures.len(), 1);
    }

    #[test]
    fn test_company_margin_adjustment() {
        let body = format!("{}Company Margin £ (11.00)\n", HEADER);
        let (parsed, _) = parse_doc("Statement Week12 2024.pdf", &body);
        let items = parsed.unwrap().items;
        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert!(item.is_adjustment);
        assert_eq!(item.client.as_deref(), Some("Company Margin"));
        assert_eq!(item.job_number, None);
        assert_eq!(item.quantity, Some(1.0));
        assert_eq!(item.rate, Some(-11.0));
        assert_eq!(item.amount, Some(-11.0));
    }

    #[test]
    fn test_deduction_adjustment() {
        let body = format!("{}Tool Hire: Deduction £25.00\n", HEADER);
        let (parsed, _) = parse_doc("Statement Week12 2024.pdf", &body);
        let items = parsed.unwrap().items;
        assert_eq!(items.len(), 1);
        assert!(items[0].is_adjustment);
        assert_eq!(items[0].client.as_deref(), Some("Deduction"));
        assert_eq!(items[0].amount, Some(-25.0));
    }

    #[test]
    fn test_deduction_amount_on_next_line() {
        let body = format!("{}Tool Hire: Deduction\n£25.00\n", HEADER);
        let (parsed, _) = parse_doc("Statement Week12 2024.pdf", &body);
        let items = parsed.unwrap().items;
        assert_eq!(items.len(), 1);
        assert!(items[0].is_adjustment);
        assert_eq!(items[0].amount, Some(-25.0));
    }

    #[test]
    fn test_deduction_never_borrows_amount_from_next_entry() {
        let body = format!(
            "{}\
             Tool Hire: Deduction\n\
             Daniel Hanson: 4209480 | Acme Corp | High Street Leeds | Collection 16/03/24 09:00\n\
             1.00 £22.50\n",
            HEADER
        );
        let (parsed, report) = parse_doc("Statement Week12 2024.pdf", &body);
        let items = parsed.unwrap().items;
        assert_eq!(items.len(), 2);

        let deduction = &items[0];
        assert!(deduction.is_adjustment);
        // The successor line's job number is not money
        assert_eq!(deduction.amount, None);
        assert_eq!(deduction.rate, None);

        let job = &items[1];
        assert_eq!(job.job_number.as_deref(), Some("4209480"));
        assert_eq!(job.amount, Some(22.50));

        assert_eq!(report.items_missing_money, 1);
        assert_eq!(report.parse_failures.len(), 1);
    }

    #[test]
    fn test_money_line_beyond_lookahead_window_ignored() {
        // Six non-terminator lines exhaust the window before the money
        // line; the item must come out with null money, not hang or
        // mis-attribute
        let body = format!(
            "{}\
             Daniel Hanson: 4209480 | Acme Corp | High Street Leeds | Collection 16/03/24 09:00\n\
             overflow a\noverflow b\noverflow c\noverflow d\noverflow e\noverflow f\n\
             overflow g\noverflow h\n\
             1.00 £22.50\n",
            HEADER
        );
        let (parsed, report) = parse_doc("Statement Week12 2024.pdf", &body);
        let items = parsed.unwrap().items;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].quantity, None);
        assert_eq!(items[0].amount, None);
        assert_eq!(report.items_missing_money, 1);
    }

    #[test]
    fn test_duplicate_block_across_page_break_dropped() {
        let entry = "Daniel Hanson: 4209480 | Acme Corp | High Street Leeds | Collection 16/03/24 09:00\n\
                     1.00 £22.50\n";
        let body = format!("{}{}\u{0c}{}", HEADER, entry, entry);
        let (parsed, report) = parse_doc("Statement Week12 2024.pdf", &body);
        let items = parsed.unwrap().items;
        assert_eq!(items.len(), 1);
        assert_eq!(report.items_skipped_as_duplicate, 1);
    }

    #[test]
    fn test_zero_items_flagged_for_review() {
        let (parsed, report) = parse_doc("Statement Week12 2024.pdf", HEADER);
        assert!(parsed.is_ok());
        assert_eq!(report.needs_review.len(), 1);
    }

    #[test]
    fn test_amount_equals_quantity_times_rate() {
        let body = format!(
            "{}\
             A: 1000001 | C1 | L1 | Delivery 01/02/24 08:00\n\
             3.00 £10.50\n\
             B: 1000002 | C2 | L2 | Collection 01/02/24 09:00\n\
             2.00 £7.25\n",
            HEADER
        );
        let (parsed, _) = parse_doc("Statement Week12 2024.pdf", &body);
        for item in parsed.unwrap().items {
            let (q, r, a) = (
                item.quantity.unwrap(),
                item.rate.unwrap(),
                item.amount.unwrap(),
            );
            assert!((a - q * r).abs() < 1e-9);
        }
    }

    #[test]
    fn test_dedup_key_scoped_per_document() {
        // The same entry in two separate documents must survive in both
        let entry = format!(
            "{}\
             Daniel Hanson: 4209480 | Acme Corp | High Street Leeds | Collection 16/03/24 09:00\n\
             1.00 £22.50\n",
            HEADER
        );
        let (first, _) = parse_doc("Statement Week12 2024.pdf", &entry);
        let (second, _) = parse_doc("Statement Week13 2024.pdf", &entry);
        assert_eq!(first.unwrap().items.len(), 1);
        assert_eq!(second.unwrap().items.len(), 1);
    }
}
