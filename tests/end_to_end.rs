//! Full journey through the public API: seed a cohort, generate the
//! question pool, serve questions to a learner, grade the submission, and
//! check the resulting tier assignment.

use std::sync::Arc;

use async_trait::async_trait;
use examloom::{
    AnswerInput, Completion, CompletionDispatcher, CompletionProvider, Database,
    GenerationPipeline, NewAssessment, PerformanceTier, ProviderError, SharedDatabase,
    SubmissionPipeline,
};

/// Answers generation prompts with a fixed MCQ batch and evaluation
/// prompts with a fixed report.
struct ScriptedProvider;

const MCQ_BODY: &str = r#"{
    "questions": [
        {
            "question": "Which state blocks all calls?",
            "options": {"1": "CLOSED", "2": "OPEN", "3": "HALF_OPEN"},
            "correctOption": 2,
            "difficulty": "easy",
            "topic": "resilience",
            "language": "en"
        },
        {
            "question": "What does backoff jitter avoid?",
            "options": {"1": "Thundering herds", "2": "Timeouts", "3": "Retries"},
            "correctOption": 1,
            "difficulty": "medium",
            "topic": "resilience",
            "language": "en"
        }
    ]
}"#;

const EVAL_BODY: &str = r#"{
    "evaluations": [
        {
            "id": 1,
            "question": "Which state blocks all calls?",
            "options": {"1": "CLOSED", "2": "OPEN", "3": "HALF_OPEN"},
            "selectedAnswerByStudent": {"id": 2},
            "explanation": "OPEN rejects every call until the reset timeout."
        }
    ],
    "summary": "Good understanding of breaker states.",
    "recommendations": "Review retry budgets next."
}"#;

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    async fn completion(&self, prompt: &str) -> Result<Completion, ProviderError> {
        let body = if prompt.contains("Evaluate a learner's answers") {
            EVAL_BODY
        } else {
            MCQ_BODY
        };
        Ok(Completion {
            text: body.to_string(),
            usage: Some(serde_json::json!({"total_tokens": 99})),
            latency_ms: 4,
        })
    }

    fn name(&self) -> &str {
        "openai"
    }
}

fn tier(grade: &str, min: Option<i32>, max: Option<i32>) -> PerformanceTier {
    PerformanceTier {
        id: 0,
        grade: grade.to_string(),
        score_range: "test".to_string(),
        score_min: min,
        score_max: max,
        hardship: None,
        meaning: None,
    }
}

fn setup() -> (SharedDatabase, Arc<CompletionDispatcher>) {
    examloom::logging::init("warn");
    let db: SharedDatabase = Arc::new(Database::open_in_memory().expect("open db"));
    db.initialize().expect("initialize schema");
    let dispatcher = Arc::new(CompletionDispatcher::new(
        Arc::new(ScriptedProvider),
        Arc::new(ScriptedProvider),
    ));
    (db, dispatcher)
}

#[tokio::test]
async fn generate_serve_submit_and_assign_tier() {
    let (db, dispatcher) = setup();
    let cohort_id = 1;

    db.insert_tier(cohort_id, &tier("A+", Some(90), None)).unwrap();
    db.insert_tier(cohort_id, &tier("B", Some(50), Some(89))).unwrap();
    db.insert_tier(cohort_id, &tier("E", None, Some(49))).unwrap();

    let assessment = db
        .create_assessment(&NewAssessment {
            cohort_id,
            title: "Resilience basics".to_string(),
            description: Some("Breakers and retries".to_string()),
            topics: vec!["resilience".to_string()],
            requested_question_count: 2,
        })
        .unwrap();
    assert_eq!(assessment.buffered_question_count, 4);

    // One batch per tier
    let generation = GenerationPipeline::new(dispatcher.clone(), db.clone());
    let summary = generation
        .generate_for_assessment(assessment.id)
        .await
        .unwrap();
    assert_eq!(summary.batches_attempted, 3);
    assert_eq!(summary.batches_succeeded, 3);
    assert_eq!(summary.questions_inserted, 6);

    // Serve the top-tier batch to a learner
    let tiers = db.tiers_for_cohort(cohort_id).unwrap();
    let top_tier = &tiers[0];
    let served = db
        .questions_for_learner(assessment.id, Some(top_tier.id), 2)
        .unwrap();
    assert_eq!(served.len(), 2);
    assert!(served.iter().all(|q| q.correct_option.is_some()));

    // Answer everything correctly
    let answers: Vec<AnswerInput> = served
        .iter()
        .map(|q| AnswerInput {
            question_id: q.question.id,
            chosen_option_id: q.correct_option.as_ref().unwrap().id,
        })
        .collect();

    let submission = SubmissionPipeline::new(dispatcher, db.clone());
    let outcome = submission.submit(42, assessment.id, &answers).await.unwrap();

    assert_eq!(outcome.total_questions, 2);
    assert_eq!(outcome.score, 2.0);
    assert_eq!(outcome.tier_grade, "A+");
    assert!(outcome.evaluation.is_some());
    assert!(outcome.parse_error.is_none());

    // The submission completed the assessment for this learner only
    assert!(db.is_assessment_completed(42, assessment.id).unwrap());
    assert!(!db.is_assessment_completed(99, assessment.id).unwrap());
    let assigned = db.latest_tier_assignment(42, cohort_id).unwrap().unwrap();
    assert_eq!(assigned.grade, "A+");

    // A second assessment in the same cohort now sees a non-empty corpus
    let corpus = db.question_corpus(cohort_id).unwrap();
    assert_eq!(corpus.len(), 6);
}

#[tokio::test]
async fn generation_without_tiers_produces_single_baseline_batch() {
    let (db, dispatcher) = setup();

    let assessment = db
        .create_assessment(&NewAssessment {
            cohort_id: 9,
            title: "First contact".to_string(),
            description: None,
            topics: vec!["resilience".to_string()],
            requested_question_count: 2,
        })
        .unwrap();

    let generation = GenerationPipeline::new(dispatcher, db.clone());
    let summary = generation
        .generate_for_assessment(assessment.id)
        .await
        .unwrap();
    assert_eq!(summary.batches_attempted, 1);
    assert_eq!(summary.questions_inserted, 2);

    let baseline = db.questions_for_learner(assessment.id, None, 10).unwrap();
    assert_eq!(baseline.len(), 2);
}
