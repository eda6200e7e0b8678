// Strategy B - Field-state parser
// A small explicit state machine per job block: label lines switch the
// state, non-label lines are interpreted under the current state.

use super::{JobCandidate, RunsheetStrategy};
use crate::document::Document;
use crate::normalize::{collapse_whitespace, extract_postcode, strip_contact_line, strip_leading_phone};
use regex::Regex;
use std::sync::LazyLock;

/// Job-block anchor: a bare job number, or a labelled "Job No: <n>" line.
static JOB_ANCHOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:job\s*(?:no|number)\.?\s*:?\s*)?(\d{6,8})$").unwrap()
});

// ============================================================================
// STATES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldState {
    None,
    Customer,
    JobAddress,
    /// Content under a contact label is discarded.
    ContactName,
    Activity,
    Priority,
    /// Unrecognized labelled sections; content discarded.
    Other,
    /// Terminal: stop consuming the block.
    Instructions,
}

/// Exact-match label vocabulary. A line is a label iff its trimmed,
/// colon-stripped, lowercased form appears here.
fn label_state(line: &str) -> Option<FieldState> {
    let key = line.trim().trim_end_matches(':').trim().to_lowercase();
    match key.as_str() {
        "customer" | "customer name" | "account" => Some(FieldState::Customer),
        "job address" | "site address" | "address" => Some(FieldState::JobAddress),
        "contact name" | "contact" | "site contact" => Some(FieldState::ContactName),
        "activity" | "job type" => Some(FieldState::Activity),
        "priority" => Some(FieldState::Priority),
        "other" | "notes" => Some(FieldState::Other),
        "instructions" | "special instructions" => Some(FieldState::Instructions),
        _ => None,
    }
}

// ============================================================================
// PARSER
// ============================================================================

/// In-progress job block.
struct Block {
    job_number: String,
    customer: Option<String>,
    activity: Option<String>,
    priority: Option<String>,
    address_lines: Vec<String>,
    postcode: Option<String>,
}

impl Block {
    fn new(job_number: String) -> Self {
        Block {
            job_number,
            customer: None,
            activity: None,
            priority: None,
            address_lines: Vec::new(),
            postcode: None,
        }
    }

    fn finish(self) -> JobCandidate {
        let job_address = if self.address_lines.is_empty() {
            None
        } else {
            Some(self.address_lines.join("\n"))
        };
        JobCandidate {
            job_number: self.job_number,
            customer: self.customer,
            activity: self.activity,
            priority: self.priority,
            job_address,
            postcode: self.postcode,
            quality: 0,
        }
    }
}

pub struct FieldStateParser;

impl FieldStateParser {
    pub fn new() -> Self {
        FieldStateParser
    }

    fn consume_line(&self, block: &mut Block, state: &mut FieldState, line: &str) {
        match *state {
            FieldState::None | FieldState::ContactName | FieldState::Other => {
                // Discard
            }
            FieldState::Instructions => {
                // Terminal; never reached (caller stops feeding), kept
                // for completeness
            }
            FieldState::Customer => {
                let cleaned = collapse_whitespace(line);
                if !cleaned.is_empty() {
                    block.customer = match block.customer.take() {
                        Some(existing) => Some(format!("{} {}", existing, cleaned)),
                        None => Some(cleaned),
                    };
                }
            }
            FieldState::Activity => {
                if block.activity.is_none() {
                    let cleaned = collapse_whitespace(line);
                    if !cleaned.is_empty() {
                        block.activity = Some(cleaned);
                    }
                }
            }
            FieldState::Priority => {
                if block.priority.is_none() {
                    let cleaned = line.trim().to_uppercase();
                    if !cleaned.is_empty() {
                        block.priority = Some(cleaned);
                    }
                }
            }
            FieldState::JobAddress => {
                // Contact rows injected into address blocks are noise
                let kept = match strip_contact_line(line) {
                    Some(l) => strip_leading_phone(l),
                    None => return,
                };
                if kept.is_empty() {
                    return;
                }

                let (remainder, postcode) = extract_postcode(&kept);
                if postcode.is_some() {
                    // Address is complete the moment a postcode shows up
                    block.postcode = postcode;
                    if !remainder.is_empty() {
                        block.address_lines.push(remainder);
                    }
                    *state = FieldState::None;
                } else {
                    block.address_lines.push(kept);
                }
            }
        }
    }
}

impl Default for FieldStateParser {
    fn default() -> Self {
        Self::new()
    }
}

impl RunsheetStrategy for FieldStateParser {
    fn name(&self) -> &'static str {
        "field_state"
    }

    fn extract(&self, doc: &Document) -> Vec<JobCandidate> {
        let mut out = Vec::new();

        for page in &doc.pages {
            let mut block: Option<Block> = None;
            let mut state = FieldState::None;

            for line in &page.lines {
                let trimmed = line.trim();

                // A new anchor always closes the previous block, even
                // mid-instructions
                if let Some(caps) = JOB_ANCHOR.captures(trimmed) {
                    if let Some(done) = block.take() {
                        out.push(done.finish());
                    }
                    block = Some(Block::new(caps[1].to_string()));
                    state = FieldState::None;
                    continue;
                }

                let current = match block.as_mut() {
                    Some(b) => b,
                    None => continue,
                };

                if state == FieldState::Instructions {
                    continue;
                }

                if let Some(next_state) = label_state(trimmed) {
                    state = next_state;
                    continue;
                }

                self.consume_line(current, &mut state, trimmed);
            }

            if let Some(done) = block.take() {
                out.push(done.finish());
            }
        }

        out
    }
}

// ============================================================================
// TESTS
// ============================================================================
