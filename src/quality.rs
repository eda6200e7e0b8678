// ✅ Extraction Quality - Confidence scoring for extracted runsheet jobs
// The score is transient: it triages low-confidence output for manual
// review and never filters valid jobs out.

use crate::normalize::is_strict_postcode;
use crate::runsheet::JobCandidate;

/// Road-type words that make an address look like an address.
const ROAD_WORDS: [&str; 12] = [
    "street", "road", "lane", "avenue", "close", "drive", "way", "court", "place", "crescent",
    "terrace", "park",
];

/// Candidates scoring below this are flagged for manual review. A job
/// with only a number and a customer scores exactly this.
pub const REVIEW_THRESHOLD: u8 = 40;

/// Score one extracted job, 0-100.
///
/// +20 job number, +20 customer (len > 3), +15 activity, +20 address
/// (len > 10, +5 road-word bonus), +15 postcode (+5 strict-form bonus).
pub fn score_job(candidate: &JobCandidate) -> u8 {
    let mut score: u8 = 0;

    if !candidate.job_number.is_empty() {
        score += 20;
    }

    if let Some(customer) = &candidate.customer {
        if customer.len() > 3 {
            score += 20;
        }
    }

    if candidate.activity.is_some() {
        score += 15;
    }

    if let Some(address) = &candidate.job_address {
        if address.len() > 10 {
            score += 20;
            let lower = address.to_lowercase();
            if ROAD_WORDS.iter().any(|w| lower.contains(w)) {
                score += 5;
            }
        }
    }

    if let Some(postcode) = &candidate.postcode {
        score += 15;
        if is_strict_postcode(postcode) {
            score += 5;
        }
    }

    score
}

pub fn needs_review(score: u8) -> bool {
    score < REVIEW_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate() -> JobCandidate {
        JobCandidate {
            job_number: "4209480".to_string(),
            customer: Some("TESCO Stores Limited".to_string()),
            activity: Some("Collection".to_string()),
            priority: None,
            job_address: Some("Oxford Street\nMANCHESTER".to_string()),
            postcode: Some("M1 6EQ".to_string()),
            quality: 0,
        }
    }

    #[test]
    fn test_full_candidate_scores_high() {
        let score = score_job(&candidate());
        // 20 + 20 + 15 + 20 + 5 (street) + 15 + 5 (strict) = 100
        assert_eq!(score, 100);
        assert!(!needs_review(score));
    }

    #[test]
    fn test_minimal_candidate_needs_review() {
        let c = JobCandidate {
            job_number: "4209480".to_string(),
            customer: None,
            activity: None,
            priority: None,
            job_address: None,
            postcode: None,
            quality: 0,
        };
        let score = score_job(&c);
        assert_eq!(score, 20);
        assert!(needs_review(score));
    }

    #[test]
    fn test_short_customer_not_counted() {
        let mut c = candidate();
        c.customer = Some("AB".to_string());
        assert_eq!(score_job(&c), 80);
    }

    #[test]
    fn test_adding_postcode_never_decreases_score() {
        let mut without = candidate();
        without.postcode = None;
        let base = score_job(&without);

        let mut with = without.clone();
        with.postcode = Some("M1 6EQ".to_string());
        assert!(score_job(&with) >= base);

        // Even a malformed postcode only adds
        let mut odd = without.clone();
        odd.postcode = Some("M16EQ".to_string());
        assert!(score_job(&odd) >= base);
    }
}
