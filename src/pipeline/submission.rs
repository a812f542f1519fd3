//! Submission Pipeline
//!
//! Grades a learner's answer set, assigns the resulting performance tier,
//! and persists the whole outcome in one transaction. The narrative
//! evaluation that follows is best-effort: a provider failure or an
//! unparseable response degrades the outcome but never undoes grading.

use std::sync::Arc;

use serde_json::json;
use tracing::{info, instrument, warn};

use super::audit_attempts;
use crate::grading::{classify, percentage_score};
use crate::llm::CompletionDispatcher;
use crate::parse::parse_evaluation;
use crate::prompt::evaluation_prompt;
use crate::storage::SharedDatabase;
use crate::types::{
    AnswerInput, ExamError, QuestionWithOptions, Result, SubmissionOutcome,
};

pub struct SubmissionPipeline {
    dispatcher: Arc<CompletionDispatcher>,
    db: SharedDatabase,
}

impl SubmissionPipeline {
    pub fn new(dispatcher: Arc<CompletionDispatcher>, db: SharedDatabase) -> Self {
        Self { dispatcher, db }
    }

    /// Grade and persist a submission.
    ///
    /// Every submitted answer stays in the denominator; an answer whose
    /// question or option cannot be resolved counts as incorrect.
    #[instrument(skip(self, answers), fields(answer_count = answers.len()))]
    pub async fn submit(
        &self,
        learner_id: i64,
        assessment_id: i64,
        answers: &[AnswerInput],
    ) -> Result<SubmissionOutcome> {
        if answers.is_empty() {
            return Err(ExamError::EmptySubmission);
        }

        let assessment = self.db.get_assessment(assessment_id)?;
        let ids: Vec<i64> = answers.iter().map(|a| a.question_id).collect();
        let questions = self.db.questions_by_ids(&ids)?;

        let correct = answers
            .iter()
            .filter(|answer| {
                questions
                    .get(&answer.question_id)
                    .and_then(|q| q.correct_option.as_ref())
                    .is_some_and(|opt| opt.id == answer.chosen_option_id)
            })
            .count();
        let percentage = percentage_score(correct, answers.len());

        let tiers = self.db.tiers_for_cohort(assessment.cohort_id)?;
        let tier = classify(percentage, &tiers)?.clone();

        self.db
            .record_submission(learner_id, assessment_id, tier.id, answers)?;
        info!(
            learner_id,
            assessment_id,
            correct,
            percentage,
            tier = %tier.grade,
            "Submission graded"
        );

        let mut outcome = SubmissionOutcome {
            total_questions: answers.len(),
            score: round2(correct as f64),
            tier_grade: tier.grade.clone(),
            tier_meaning: tier.meaning.clone(),
            hardship: tier.hardship.clone(),
            evaluation: None,
            raw_evaluation_text: None,
            parse_error: None,
        };

        self.evaluate(learner_id, assessment_id, answers, &questions, &mut outcome)
            .await;
        Ok(outcome)
    }

    /// Request the narrative evaluation and attach whatever came back.
    async fn evaluate(
        &self,
        learner_id: i64,
        assessment_id: i64,
        answers: &[AnswerInput],
        questions: &std::collections::HashMap<i64, QuestionWithOptions>,
        outcome: &mut SubmissionOutcome,
    ) {
        let answers_json = serialize_answers(answers, questions);
        let prompt = evaluation_prompt(&answers_json);

        let result = match self.dispatcher.generate_text(&prompt).await {
            Ok(result) => {
                audit_attempts(&self.db, assessment_id, &prompt, &result.attempts);
                result
            }
            Err(err) => {
                if let ExamError::AllProvidersUnavailable { attempts, .. } = &err {
                    audit_attempts(&self.db, assessment_id, &prompt, attempts);
                }
                warn!(error = %err, "Evaluation dispatch failed, outcome stays graded-only");
                return;
            }
        };

        match parse_evaluation(&result.text) {
            Ok(report) => {
                if let Err(err) =
                    self.db
                        .insert_evaluation_report(learner_id, assessment_id, &report)
                {
                    warn!(error = %err, "Failed to persist evaluation report");
                }
                outcome.evaluation = Some(report);
            }
            Err(err) => {
                warn!(error = %err, "Evaluation response unparseable, returning raw text");
                outcome.raw_evaluation_text = Some(result.text);
                outcome.parse_error = Some(err.to_string());
            }
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Serialize the answered questions for the evaluation prompt: question
/// text, the option map, the learner's pick, and whether it was correct.
fn serialize_answers(
    answers: &[AnswerInput],
    questions: &std::collections::HashMap<i64, QuestionWithOptions>,
) -> String {
    let entries: Vec<serde_json::Value> = answers
        .iter()
        .filter_map(|answer| {
            let question = questions.get(&answer.question_id)?;
            let options: serde_json::Map<String, serde_json::Value> = question
                .options
                .iter()
                .map(|o| (o.option_number.to_string(), json!(o.option_text)))
                .collect();
            let correct = question
                .correct_option
                .as_ref()
                .is_some_and(|opt| opt.id == answer.chosen_option_id);

            Some(json!({
                "id": question.question.id,
                "question": question.question.question,
                "topic": question.question.topic,
                "difficulty": question.question.difficulty,
                "language": question.question.language,
                "options": options,
                "selectedAnswerByStudent": {"id": answer.chosen_option_id},
                "isCorrect": correct,
            }))
        })
        .collect();

    serde_json::to_string(&entries).unwrap_or_else(|_| "[]".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{Completion, CompletionDispatcher, CompletionProvider};
    use crate::storage::Database;
    use crate::types::{NewAssessment, PerformanceTier, ProviderError};
    use async_trait::async_trait;

    struct CannedProvider {
        body: String,
    }

    #[async_trait]
    impl CompletionProvider for CannedProvider {
        async fn completion(&self, _: &str) -> std::result::Result<Completion, ProviderError> {
            Ok(Completion {
                text: self.body.clone(),
                usage: None,
                latency_ms: 2,
            })
        }

        fn name(&self) -> &str {
            "openai"
        }
    }

    struct DownProvider;

    #[async_trait]
    impl CompletionProvider for DownProvider {
        async fn completion(&self, _: &str) -> std::result::Result<Completion, ProviderError> {
            Err(ProviderError::with_status("openai", 401, "unauthorized"))
        }

        fn name(&self) -> &str {
            "openai"
        }
    }

    const EVAL_BODY: &str = r#"{
        "evaluations": [
            {
                "id": 1,
                "question": "Q?",
                "options": {"1": "a", "2": "b"},
                "selectedAnswerByStudent": {"id": 1},
                "explanation": "Right choice."
            }
        ],
        "summary": "Solid work.",
        "recommendations": "Keep practicing."
    }"#;

    struct Fixture {
        pipeline: SubmissionPipeline,
        db: SharedDatabase,
        assessment_id: i64,
        answers: Vec<AnswerInput>,
    }

    /// Two questions; the learner answers the first correctly and the
    /// second incorrectly.
    fn fixture(body: &str) -> Fixture {
        let db: SharedDatabase = Arc::new(Database::open_in_memory().unwrap());
        db.initialize().unwrap();

        for (grade, min, max) in [
            ("A+", Some(90), None),
            ("B", Some(50), Some(89)),
            ("E", None, Some(49)),
        ] {
            db.insert_tier(
                1,
                &PerformanceTier {
                    id: 0,
                    grade: grade.to_string(),
                    score_range: "test".to_string(),
                    score_min: min,
                    score_max: max,
                    hardship: None,
                    meaning: None,
                },
            )
            .unwrap();
        }

        let assessment = db
            .create_assessment(&NewAssessment {
                cohort_id: 1,
                title: "Unit 1".to_string(),
                description: None,
                topics: vec!["resilience".to_string()],
                requested_question_count: 2,
            })
            .unwrap();

        let mut options = std::collections::BTreeMap::new();
        options.insert(1, "right".to_string());
        options.insert(2, "wrong".to_string());
        let parsed = |text: &str| crate::parse::ParsedQuestion {
            question: text.to_string(),
            options: options.clone(),
            correct_option: 1,
            difficulty: None,
            topic: None,
            language: None,
        };
        let ids = db
            .insert_question_batch(assessment.id, None, &[parsed("Q1?"), parsed("Q2?")])
            .unwrap();
        let questions = db.questions_by_ids(&ids).unwrap();

        let pick = |id: i64, number: u32| AnswerInput {
            question_id: id,
            chosen_option_id: questions[&id]
                .options
                .iter()
                .find(|o| o.option_number == number)
                .unwrap()
                .id,
        };
        let answers = vec![pick(ids[0], 1), pick(ids[1], 2)];

        let dispatcher = Arc::new(CompletionDispatcher::new(
            Arc::new(CannedProvider {
                body: body.to_string(),
            }),
            Arc::new(DownProvider),
        ));

        Fixture {
            pipeline: SubmissionPipeline::new(dispatcher, db.clone()),
            db,
            assessment_id: assessment.id,
            answers,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_submission_rejected() {
        let f = fixture(EVAL_BODY);
        let err = f.pipeline.submit(7, f.assessment_id, &[]).await.unwrap_err();
        assert!(matches!(err, ExamError::EmptySubmission));
    }

    #[tokio::test(start_paused = true)]
    async fn test_grading_and_tier_assignment() {
        let f = fixture(EVAL_BODY);
        let outcome = f
            .pipeline
            .submit(7, f.assessment_id, &f.answers)
            .await
            .unwrap();

        assert_eq!(outcome.total_questions, 2);
        assert_eq!(outcome.score, 1.0);
        assert_eq!(outcome.tier_grade, "B");
        assert!(outcome.evaluation.is_some());
        assert!(outcome.parse_error.is_none());

        assert!(f.db.is_assessment_completed(7, f.assessment_id).unwrap());
        assert_eq!(f.db.latest_tier_assignment(7, 1).unwrap().unwrap().grade, "B");
        assert_eq!(f.db.evaluation_count(7, f.assessment_id).unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unparseable_evaluation_degrades_not_fails() {
        let f = fixture("Overall the student did fine.");
        let outcome = f
            .pipeline
            .submit(7, f.assessment_id, &f.answers)
            .await
            .unwrap();

        // Grading is intact and both answer rows committed
        assert_eq!(outcome.score, 1.0);
        assert_eq!(outcome.tier_grade, "B");
        assert!(f.db.is_assessment_completed(7, f.assessment_id).unwrap());
        assert_eq!(f.db.answer_count(7, f.assessment_id).unwrap(), 2);

        // Evaluation degraded to raw text
        assert!(outcome.evaluation.is_none());
        assert_eq!(
            outcome.raw_evaluation_text.as_deref(),
            Some("Overall the student did fine.")
        );
        assert!(outcome.parse_error.is_some());
        assert_eq!(f.db.evaluation_count(7, f.assessment_id).unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unresolvable_answer_counts_incorrect() {
        let f = fixture(EVAL_BODY);
        let mut answers = f.answers.clone();
        // Point the first answer at a question that does not exist
        answers[0].question_id = 9999;

        let outcome = f
            .pipeline
            .submit(7, f.assessment_id, &answers)
            .await
            .unwrap();
        assert_eq!(outcome.total_questions, 2);
        assert_eq!(outcome.score, 0.0);
        assert_eq!(outcome.tier_grade, "E");

        // The unresolvable answer is persisted along with the rest
        assert_eq!(f.db.answer_count(7, f.assessment_id).unwrap(), 2);
        assert!(f.db.is_assessment_completed(7, f.assessment_id).unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_evaluation_attempts_are_audited() {
        let f = fixture(EVAL_BODY);
        let dispatcher = Arc::new(CompletionDispatcher::new(
            Arc::new(DownProvider),
            Arc::new(DownProvider),
        ));
        let pipeline = SubmissionPipeline::new(dispatcher, f.db.clone());

        let outcome = pipeline.submit(7, f.assessment_id, &f.answers).await.unwrap();
        assert_eq!(outcome.tier_grade, "B");
        assert!(outcome.evaluation.is_none());

        // One non-retryable attempt per provider, both audited
        assert_eq!(f.db.usage_count(f.assessment_id).unwrap(), 2);
    }
}
