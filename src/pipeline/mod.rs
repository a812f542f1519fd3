//! Pipelines
//!
//! The three operations the crate exposes end to end: generating an
//! assessment's question pool, grading a submission, and serving narration
//! audio. Each pipeline owns nothing but handles; the dispatcher and the
//! database are shared across all of them.

mod audio;
mod generation;
mod submission;

pub use audio::AudioPipeline;
pub use generation::{GenerationPipeline, GenerationSummary};
pub use submission::SubmissionPipeline;

use tracing::warn;

use crate::storage::Database;
use crate::types::{DispatchAttempt, ProviderUsageRecord};

/// Append one usage record per dispatch attempt, failed ones included.
/// Audit writes are best-effort; a failure is logged and never propagated.
fn audit_attempts(db: &Database, assessment_id: i64, prompt: &str, attempts: &[DispatchAttempt]) {
    for attempt in attempts {
        let record = ProviderUsageRecord {
            assessment_id,
            provider: attempt.provider.clone(),
            prompt: prompt.to_string(),
            response_text: attempt.response_text.clone(),
            latency_ms: attempt.latency_ms,
            usage: attempt.usage.clone(),
        };
        if let Err(err) = db.record_provider_usage(&record) {
            warn!(error = %err, "Failed to record provider usage");
        }
    }
}
