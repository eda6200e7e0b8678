// 🧹 Text Normalizer - Shared cleanup for both extractors
// Pure functions, no state. Postcode/contact/phone/whitespace handling.

use regex::Regex;
use std::sync::LazyLock;

// ============================================================================
// PATTERNS
// ============================================================================

/// UK postcode, space-tolerant: outward code (1-2 letters, 1-2 digits,
/// optional letter) + inward code (1 digit, 2 letters).
static POSTCODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Za-z]{1,2}[0-9]{1,2}[A-Za-z]?)\s*([0-9][A-Za-z]{2})\b").unwrap()
});

/// Strict postcode form: single space between outward and inward code.
static POSTCODE_STRICT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Z]{1,2}[0-9]{1,2}[A-Z]? [0-9][A-Z]{2}$").unwrap()
});

/// Switchboard contact rows injected into address blocks:
/// "<digits> <place words> Manager" (case-insensitive).
static CONTACT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\d+\s+[A-Za-z][A-Za-z .'&-]*\s+manager\s*$").unwrap()
});

/// Bare digit run (with optional internal spaces) - phone/store numbers.
static DIGIT_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d[\d\s]*$").unwrap());

/// Leading phone number: +44-style prefix, or a run of >= 10 digits/spaces.
static LEADING_PHONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:\+44[\d\s]*|[\d][\d\s]{9,})").unwrap());

static MULTI_SPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

static REPEAT_COMMA: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?:\s*,){2,}").unwrap());

/// Filler tokens that carry no address/customer content in table cells.
const FILLER_TOKENS: [&str; 3] = ["NA", "TBC", "TBD"];

// ============================================================================
// POSTCODE
// ============================================================================

/// Extract a UK postcode from free text.
///
/// Returns (remainder, postcode). The postcode is normalized to
/// "OUTWARD INWARD" with a single separating space; the remainder is the
/// input with the match removed and whitespace re-collapsed.
pub fn extract_postcode(text: &str) -> (String, Option<String>) {
    match POSTCODE.captures(text) {
        Some(caps) => {
            let whole = caps.get(0).unwrap();
            let outward = caps.get(1).unwrap().as_str().to_uppercase();
            let inward = caps.get(2).unwrap().as_str().to_uppercase();

            let mut remainder = String::with_capacity(text.len());
            remainder.push_str(&text[..whole.start()]);
            remainder.push_str(&text[whole.end()..]);

            (
                collapse_whitespace(&remainder),
                Some(format!("{} {}", outward, inward)),
            )
        }
        None => (collapse_whitespace(text), None),
    }
}

/// True when the value is exactly one well-formed postcode.
pub fn is_strict_postcode(text: &str) -> bool {
    POSTCODE_STRICT.is_match(text.trim())
}

// ============================================================================
// CONTACT / PHONE STRIPPING
// ============================================================================

/// Filter out switchboard/contact rows from an address block.
///
/// Returns None (discard) for "<digits> <place words> Manager" rows and
/// bare digit runs; otherwise returns the line unchanged.
pub fn strip_contact_line(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    if CONTACT_LINE.is_match(trimmed) || DIGIT_RUN.is_match(trimmed) {
        return None;
    }
    Some(line)
}

/// Remove a leading phone number (a run of >= 10 digits/spaces, or a
/// "+44"-prefixed run) from the start of the text.
pub fn strip_leading_phone(text: &str) -> String {
    let trimmed = text.trim_start();
    match LEADING_PHONE.find(trimmed) {
        Some(m) => trimmed[m.end()..].trim_start().to_string(),
        None => trimmed.to_string(),
    }
}

// ============================================================================
// WHITESPACE / CELL CLEANUP
// ============================================================================

/// Normalize internal whitespace, squash repeated commas, trim.
pub fn collapse_whitespace(text: &str) -> String {
    let squashed = MULTI_SPACE.replace_all(text, " ");
    let decommaed = REPEAT_COMMA.replace_all(&squashed, ",");
    decommaed
        .trim()
        .trim_matches(|c| c == ',' || c == ' ')
        .to_string()
}

/// Cleanup for structured table cells: collapse embedded newlines into
/// comma-joined fragments, dropping empties and filler tokens.
pub fn clean_cell(text: &str) -> String {
    let fragments: Vec<&str> = text
        .split(['\n', '\r'])
        .map(str::trim)
        .filter(|frag| !frag.is_empty())
        .filter(|frag| !FILLER_TOKENS.iter().any(|f| frag.eq_ignore_ascii_case(f)))
        .collect();

    collapse_whitespace(&fragments.join(", "))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_postcode_with_space() {
        let (rest, pc) = extract_postcode("MANCHESTER M1 6EQ");
        assert_eq!(pc, Some("M1 6EQ".to_string()));
        assert_eq!(rest, "MANCHESTER");
    }

    #[test]
    fn test_extract_postcode_without_space() {
        let (rest, pc) = extract_postcode("14 Mill Lane LEEDS LS11AB");
        assert_eq!(pc, Some("LS1 1AB".to_string()));
        assert_eq!(rest, "14 Mill Lane LEEDS");
    }

    #[test]
    fn test_extract_postcode_two_letter_outward() {
        let (rest, pc) = extract_postcode("Oxford Street SW1A 1AA London");
        assert_eq!(pc, Some("SW1A 1AA".to_string()));
        assert_eq!(rest, "Oxford Street London");
    }

    #[test]
    fn test_extract_postcode_absent() {
        let (rest, pc) = extract_postcode("14 Mill Lane");
        assert_eq!(pc, None);
        assert_eq!(rest, "14 Mill Lane");
    }

    #[test]
    fn test_strict_postcode() {
        assert!(is_strict_postcode("M1 6EQ"));
        assert!(is_strict_postcode("SW1A 1AA"));
        assert!(!is_strict_postcode("M16EQ"));
        assert!(!is_strict_postcode("M1 6EQ extra"));
    }

    #[test]
    fn test_strip_contact_line_manager_row() {
        assert_eq!(strip_contact_line("6367 Manchester Oxford St Manager"), None);
        assert_eq!(strip_contact_line("0161 234 5678"), None);
        assert_eq!(strip_contact_line("12345"), None);
    }

    #[test]
    fn test_strip_contact_line_keeps_address() {
        assert_eq!(
            strip_contact_line("TESCO Stores Limited"),
            Some("TESCO Stores Limited")
        );
        assert_eq!(strip_contact_line("14 Mill Lane"), Some("14 Mill Lane"));
    }

    #[test]
    fn test_strip_leading_phone() {
        assert_eq!(
            strip_leading_phone("0161 234 5678 TESCO Oxford St"),
            "TESCO Oxford St"
        );
        assert_eq!(
            strip_leading_phone("+44 161 234 5678 TESCO"),
            "TESCO"
        );
        // Short house numbers are not phone numbers
        assert_eq!(strip_leading_phone("14 Mill Lane"), "14 Mill Lane");
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  a   b\t c  "), "a b c");
        assert_eq!(collapse_whitespace("a, ,, b"), "a, b");
        assert_eq!(collapse_whitespace(", leading comma"), "leading comma");
    }

    #[test]
    fn test_clean_cell_drops_fillers() {
        assert_eq!(clean_cell("TESCO\nNA\nOxford St"), "TESCO, Oxford St");
        assert_eq!(clean_cell("tbc"), "");
        assert_eq!(clean_cell("Unit 4\r\nTrafford Park"), "Unit 4, Trafford Park");
    }
}
