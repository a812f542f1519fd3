//! Question Generation Pipeline
//!
//! Produces the question pool for an assessment: one batch per performance
//! tier when the cohort has a tier ladder, or a single untargeted baseline
//! batch when it does not. Previously generated cohort questions are fed
//! back as negative examples so new assessments do not repeat old material.
//!
//! Batches run one at a time, best tier first. Each one is dispatched,
//! parsed, and persisted on its own; a failed batch is recorded in the
//! summary and the remaining batches still run.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use super::audit_attempts;
use crate::llm::CompletionDispatcher;
use crate::parse::parse_mcq_batch;
use crate::prompt::{mcq_generation_prompt, previous_questions_context};
use crate::storage::SharedDatabase;
use crate::types::{ExamError, PerformanceTier, Result};

/// Outcome of one generation run.
#[derive(Debug, Clone, Default)]
pub struct GenerationSummary {
    pub batches_attempted: usize,
    pub batches_succeeded: usize,
    pub questions_inserted: usize,
    /// One entry per failed batch: tier label and error text
    pub failures: Vec<(String, String)>,
}

impl GenerationSummary {
    /// A run that produced no questions at all is useless to callers even
    /// though individual batch failures are tolerated.
    pub fn is_empty(&self) -> bool {
        self.questions_inserted == 0
    }
}

pub struct GenerationPipeline {
    dispatcher: Arc<CompletionDispatcher>,
    db: SharedDatabase,
}

impl GenerationPipeline {
    pub fn new(dispatcher: Arc<CompletionDispatcher>, db: SharedDatabase) -> Self {
        Self { dispatcher, db }
    }

    /// Generate and persist the question pool for an assessment.
    #[instrument(skip(self))]
    pub async fn generate_for_assessment(&self, assessment_id: i64) -> Result<GenerationSummary> {
        let assessment = self.db.get_assessment(assessment_id)?;
        let tiers = self.db.tiers_for_cohort(assessment.cohort_id)?;
        let corpus = self.db.question_corpus(assessment.cohort_id)?;
        let context = previous_questions_context(&corpus);

        let targets: Vec<Option<&PerformanceTier>> = if tiers.is_empty() {
            info!(assessment_id, "No tiers defined, generating baseline batch");
            vec![None]
        } else {
            tiers.iter().map(Some).collect()
        };

        let mut summary = GenerationSummary::default();
        for tier in targets {
            let (label, outcome) = self.run_batch(&assessment, tier, &context).await;
            summary.batches_attempted += 1;
            match outcome {
                Ok(count) => {
                    summary.batches_succeeded += 1;
                    summary.questions_inserted += count;
                }
                Err(err) => {
                    warn!(tier = %label, error = %err, "Generation batch failed");
                    summary.failures.push((label, err.to_string()));
                }
            }
        }

        info!(
            assessment_id,
            attempted = summary.batches_attempted,
            succeeded = summary.batches_succeeded,
            questions = summary.questions_inserted,
            "Generation run finished"
        );
        Ok(summary)
    }

    async fn run_batch(
        &self,
        assessment: &crate::types::Assessment,
        tier: Option<&PerformanceTier>,
        context: &str,
    ) -> (String, Result<usize>) {
        let (label, description) = match tier {
            Some(tier) => (tier.grade.clone(), tier.description()),
            None => (
                "baseline".to_string(),
                "Average difficulty for a cohort with no prior results".to_string(),
            ),
        };

        let prompt = mcq_generation_prompt(
            &label,
            &description,
            context,
            &assessment.topics,
            assessment.buffered_question_count,
        );

        let outcome = self.dispatch_and_store(assessment, tier, &prompt).await;
        (label, outcome)
    }

    async fn dispatch_and_store(
        &self,
        assessment: &crate::types::Assessment,
        tier: Option<&PerformanceTier>,
        prompt: &str,
    ) -> Result<usize> {
        let result = match self.dispatcher.generate_text(prompt).await {
            Ok(result) => {
                audit_attempts(&self.db, assessment.id, prompt, &result.attempts);
                result
            }
            Err(err) => {
                if let ExamError::AllProvidersUnavailable { attempts, .. } = &err {
                    audit_attempts(&self.db, assessment.id, prompt, attempts);
                }
                return Err(err);
            }
        };

        let batch = parse_mcq_batch(&result.text)?;
        let ids =
            self.db
                .insert_question_batch(assessment.id, tier.map(|t| t.id), &batch.questions)?;
        Ok(ids.len())
    }
}
