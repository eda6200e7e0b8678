// Strategy C - Table rows
// Used when the segment provider recovered row/column structure. Header
// cells map to fields by substring keywords; data cells go through the
// shared normalizer.

use super::{JobCandidate, RunsheetStrategy};
use crate::document::{Document, Table};
use crate::normalize::{clean_cell, extract_postcode};

/// Column roles recognized in table headers.
#[derive(Debug, Default)]
struct ColumnMap {
    job: Option<usize>,
    customer: Option<usize>,
    activity: Option<usize>,
    priority: Option<usize>,
    address: Option<usize>,
    postcode: Option<usize>,
}

impl ColumnMap {
    /// Map header cells to field names by substring match against a
    /// closed keyword set; e.g. a header with "JOB" and "#" is the
    /// job-number column.
    fn from_headers(headers: &[String]) -> Self {
        let mut map = ColumnMap::default();
        for (i, header) in headers.iter().enumerate() {
            let h = header.to_uppercase();
            if map.job.is_none()
                && h.contains("JOB")
                && (h.contains('#') || h.contains("NO") || h.contains("NUMBER"))
            {
                map.job = Some(i);
            } else if map.postcode.is_none() && (h.contains("POSTCODE") || h.contains("POST CODE"))
            {
                map.postcode = Some(i);
            } else if map.customer.is_none()
                && (h.contains("CUSTOMER") || h.contains("ACCOUNT") || h.contains("CLIENT"))
            {
                map.customer = Some(i);
            } else if map.activity.is_none() && (h.contains("ACTIVITY") || h.contains("TYPE")) {
                map.activity = Some(i);
            } else if map.priority.is_none() && h.contains("PRIORITY") {
                map.priority = Some(i);
            } else if map.address.is_none()
                && (h.contains("ADDRESS") || h.contains("SITE") || h.contains("LOCATION"))
            {
                map.address = Some(i);
            }
        }
        map
    }

    fn usable(&self) -> bool {
        self.job.is_some()
    }
}

pub struct TableRows;

impl TableRows {
    pub fn new() -> Self {
        TableRows
    }

    fn extract_table(&self, table: &Table, out: &mut Vec<JobCandidate>) {
        let map = ColumnMap::from_headers(&table.headers);
        if !map.usable() {
            return;
        }

        for row in &table.rows {
            let cell = |idx: Option<usize>| -> Option<String> {
                idx.and_then(|i| row.get(i)).map(|c| clean_cell(c))
            };

            // Job number is digits only; rows without one are not jobs
            let digits: String = cell(map.job)
                .unwrap_or_default()
                .chars()
                .filter(|c| c.is_ascii_digit())
                .collect();
            if digits.len() < 5 || digits.len() > 8 {
                continue;
            }

            let customer = cell(map.customer).filter(|c| !c.is_empty());
            let activity = cell(map.activity).filter(|c| !c.is_empty());
            let priority = cell(map.priority)
                .filter(|c| !c.is_empty())
                .map(|c| c.to_uppercase());

            let (mut job_address, mut postcode) = match cell(map.address) {
                Some(raw) if !raw.is_empty() => {
                    let (remainder, pc) = extract_postcode(&raw);
                    let addr = if remainder.is_empty() {
                        None
                    } else {
                        Some(remainder)
                    };
                    (addr, pc)
                }
                _ => (None, None),
            };

            // A dedicated postcode column wins over one found in-address
            if let Some(pc_cell) = cell(map.postcode).filter(|c| !c.is_empty()) {
                let (_, pc) = extract_postcode(&pc_cell);
                if pc.is_some() {
                    postcode = pc;
                }
            }

            if job_address.as_deref() == Some("") {
                job_address = None;
            }

            out.push(JobCandidate {
                job_number: digits,
                customer,
                activity,
                priority,
                job_address,
                postcode,
                quality: 0,
            });
        }
    }
}

impl Default for TableRows {
    fn default() -> Self {
        Self::new()
    }
}

impl RunsheetStrategy for TableRows {
    fn name(&self) -> &'static str {
        "table_rows"
    }

    fn extract(&self, doc: &Document) -> Vec<JobCandidate> {
        let mut out = Vec::new();
        for page in &doc.pages {
            for table in &page.tables {
                self.extract_table(table, &mut out);
            }
        }
        out
    }
}

// ============================================================================
// TESTS
// ============================================================================
