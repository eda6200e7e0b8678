// Strategy A - Anchor scan
// Job-number anchor lines open a bounded forward window; fields are
// picked out of the window by vocabulary and shape.

use super::{JobCandidate, RunsheetStrategy, ACTIVITY_VOCAB, CORPORATE_SUFFIXES, PRIORITY_VOCAB};
use crate::document::{Document, Page};
use crate::normalize::{extract_postcode, strip_contact_line, strip_leading_phone};
use regex::Regex;
use std::sync::LazyLock;

/// Anchor token: a 6-8 digit job number starting the line.
static ANCHOR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{6,8})\b\s*(.*)$").unwrap());

pub struct AnchorScan {
    pub party: String,
    /// Hard ceiling on the forward window; the window also stops at the
    /// next anchor or the page boundary.
    pub window: usize,
}

impl AnchorScan {
    pub fn new(party: &str) -> Self {
        AnchorScan {
            party: party.to_string(),
            window: 12,
        }
    }

    /// The party name appears in the first few lines of pages that
    /// belong to the target party; other parties' pages are skipped.
    fn page_is_ours(&self, page: &Page) -> bool {
        let party_lower = self.party.to_lowercase();
        page.lines
            .iter()
            .take(5)
            .any(|l| l.to_lowercase().contains(&party_lower))
    }

    fn scan_page(&self, page: &Page, out: &mut Vec<JobCandidate>) {
        let anchors: Vec<usize> = page
            .lines
            .iter()
            .enumerate()
            .filter(|(_, l)| ANCHOR.is_match(l.trim()))
            .map(|(i, _)| i)
            .collect();

        for (n, &start) in anchors.iter().enumerate() {
            let caps = ANCHOR.captures(page.lines[start].trim()).unwrap();
            let job_number = caps[1].to_string();

            let hard_end = (start + 1 + self.window).min(page.lines.len());
            let end = anchors
                .get(n + 1)
                .copied()
                .unwrap_or(page.lines.len())
                .min(hard_end);

            // The anchor line's own tail participates in the window
            let mut window_lines: Vec<String> = Vec::new();
            let anchor_tail = caps[2].trim();
            if !anchor_tail.is_empty() {
                window_lines.push(anchor_tail.to_string());
            }
            window_lines.extend(page.lines[start + 1..end].iter().cloned());

            out.push(self.build_candidate(job_number, &window_lines));
        }
    }

    fn build_candidate(&self, job_number: String, window: &[String]) -> JobCandidate {
        let mut customer: Option<String> = None;
        let mut activity: Option<String> = None;
        let mut priority: Option<String> = None;
        let mut postcode: Option<String> = None;
        let mut address_lines: Vec<String> = Vec::new();

        for raw in window {
            let line = match strip_contact_line(raw) {
                Some(l) => strip_leading_phone(l),
                None => continue,
            };
            if line.is_empty() {
                continue;
            }

            if customer.is_none() && ends_with_corporate_suffix(&line) {
                customer = Some(line);
                continue;
            }

            if priority.is_none() && is_priority_code(&line) {
                priority = Some(line.trim().to_uppercase());
                continue;
            }

            if activity.is_none() {
                if let Some(found) = match_activity(&line) {
                    activity = Some(found);
                    continue;
                }
            }

            if postcode.is_none() {
                let (remainder, found) = extract_postcode(&line);
                if found.is_some() {
                    postcode = found;
                    if !remainder.is_empty() {
                        address_lines.push(remainder);
                    }
                    continue;
                }
            }

            address_lines.push(line);
        }

        let job_address = if address_lines.is_empty() {
            None
        } else {
            Some(address_lines.join("\n"))
        };

        JobCandidate {
            job_number,
            customer,
            activity,
            priority,
            job_address,
            postcode,
            quality: 0,
        }
    }
}

impl RunsheetStrategy for AnchorScan {
    fn name(&self) -> &'static str {
        "anchor_scan"
    }

    fn extract(&self, doc: &Document) -> Vec<JobCandidate> {
        let mut out = Vec::new();
        for page in &doc.pages {
            if !self.page_is_ours(page) {
                continue;
            }
            self.scan_page(page, &mut out);
        }
        out
    }
}

fn ends_with_corporate_suffix(line: &str) -> bool {
    line.split_whitespace()
        .last()
        .map(|w| {
            let w = w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase();
            CORPORATE_SUFFIXES.contains(&w.as_str())
        })
        .unwrap_or(false)
}

fn match_activity(line: &str) -> Option<String> {
    let lower = line.to_lowercase();
    ACTIVITY_VOCAB
        .iter()
        .find(|a| lower.contains(&a.to_lowercase()))
        .map(|a| a.to_string())
}

fn is_priority_code(line: &str) -> bool {
    let upper = line.trim().to_uppercase();
    PRIORITY_VOCAB.contains(&upper.as_str())
}

// ============================================================================
// TESTS
// ============================================================================
