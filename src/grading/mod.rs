//! Grading
//!
//! Scoring and tier classification for submitted assessments.

mod classifier;

pub use classifier::classify;

/// Percentage score over the full answer set, rounded to two decimals.
///
/// Every submitted answer stays in the denominator; an answer whose chosen
/// option could not be resolved simply counts as incorrect.
pub fn percentage_score(correct: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let raw = correct as f64 / total as f64 * 100.0;
    (raw * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_rounds_to_two_decimals() {
        assert_eq!(percentage_score(1, 3), 33.33);
        assert_eq!(percentage_score(2, 3), 66.67);
    }

    #[test]
    fn test_score_bounds() {
        assert_eq!(percentage_score(0, 10), 0.0);
        assert_eq!(percentage_score(10, 10), 100.0);
    }

    #[test]
    fn test_zero_total_scores_zero() {
        assert_eq!(percentage_score(0, 0), 0.0);
    }
}
