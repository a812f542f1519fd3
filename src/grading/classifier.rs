//! Level Classifier
//!
//! Maps a percentage score onto the cohort's performance tier ladder.
//! Tiers arrive ordered best-first; the first tier whose bounds admit the
//! score wins. The top tier has no upper bound and the bottom tier no
//! lower bound, so the ladder covers the whole score axis even when the
//! configured ranges leave gaps.

use tracing::warn;

use crate::types::{ExamError, PerformanceTier, Result};

/// Classify a score against an ordered (best-first) tier ladder.
///
/// Matching is positional, not label-based: the first tier is open at the
/// top, the last is open at the bottom, everything in between needs both
/// bounds to hold. A score that slips through every rung (malformed tier
/// data) falls back to the "E" tier if present, else the last tier.
pub fn classify<'a>(score: f64, tiers: &'a [PerformanceTier]) -> Result<&'a PerformanceTier> {
    if tiers.is_empty() {
        return Err(ExamError::NoTiers);
    }

    let last = tiers.len() - 1;
    for (index, tier) in tiers.iter().enumerate() {
        let matched = if index == 0 {
            tier.score_min.is_some_and(|min| score >= f64::from(min))
        } else if index == last {
            tier.score_max.is_some_and(|max| score <= f64::from(max))
        } else {
            tier.score_min.is_some_and(|min| score >= f64::from(min))
                && tier.score_max.is_some_and(|max| score <= f64::from(max))
        };
        if matched {
            return Ok(tier);
        }
    }

    warn!(score, "Score matched no tier, falling back to lowest");
    let fallback = tiers
        .iter()
        .find(|t| t.grade == "E")
        .unwrap_or(&tiers[last]);
    Ok(fallback)
}
