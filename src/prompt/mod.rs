//! Prompt Construction
//!
//! Builds the two prompts the pipelines send out: tier-calibrated MCQ
//! generation and free-text answer evaluation. Only the data contract is
//! fixed here; wording is deliberately plain so it can evolve without
//! touching the pipelines.

use crate::types::QuestionWithOptions;

/// Section-based prompt assembly shared by both prompt kinds.
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    parts: Vec<String>,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Role definition line
    pub fn role(mut self, task: &str) -> Self {
        self.parts
            .push(format!("You are an expert assessment author. {}", task));
        self
    }

    /// Titled section
    pub fn section(mut self, header: &str, content: &str) -> Self {
        self.parts.push(format!("## {}\n{}", header, content));
        self
    }

    /// Expected output schema, fenced as JSON
    pub fn output_schema(mut self, schema: &str) -> Self {
        self.parts.push(format!(
            "## Output\nRespond ONLY with valid JSON matching this shape, no explanation:\n```json\n{}\n```",
            schema
        ));
        self
    }

    pub fn build(self) -> String {
        self.parts.join("\n\n")
    }
}

/// Negative-example context from the cross-assessment corpus.
///
/// On a cohort's first assessment the corpus is empty and the model is told
/// to produce average-difficulty baseline questions instead.
pub fn previous_questions_context(corpus: &[QuestionWithOptions]) -> String {
    if corpus.is_empty() {
        "There is no previous assessment for your reference. This is a base line \
         assessment. Hence produce average level questions on the selected topics."
            .to_string()
    } else {
        serde_json::to_string(corpus).unwrap_or_else(|_| "[]".to_string())
    }
}

/// Build the MCQ-generation prompt for one tier (or the baseline batch).
pub fn mcq_generation_prompt(
    tier_label: &str,
    tier_description: &str,
    previous_questions: &str,
    topics: &[String],
    question_count: u32,
) -> String {
    PromptBuilder::new()
        .role("Generate multiple-choice questions for an adaptive assessment.")
        .section(
            "Difficulty calibration",
            &format!(
                "Target performance tier: {}\nTier description: {}",
                tier_label, tier_description
            ),
        )
        .section("Topics", &topics.join(", "))
        .section(
            "Question count",
            &format!("Produce exactly {} questions.", question_count),
        )
        .section(
            "Previously generated questions (do NOT repeat or rephrase these)",
            previous_questions,
        )
        .output_schema(
            r#"{
  "questions": [
    {
      "question": "...",
      "options": {"1": "...", "2": "...", "3": "...", "4": "..."},
      "correctOption": 1,
      "difficulty": "easy|medium|hard",
      "topic": "...",
      "language": "en"
    }
  ]
}"#,
        )
        .build()
}

/// Build the answer-evaluation prompt from the learner's full answer set,
/// serialized with question text, chosen option, and correctness.
pub fn evaluation_prompt(answers_json: &str) -> String {
    PromptBuilder::new()
        .role("Evaluate a learner's answers to a multiple-choice assessment.")
        .section(
            "Answered questions",
            answers_json,
        )
        .section(
            "Instructions",
            "For every question, explain why the chosen option was right or wrong. \
             Then write an overall summary of the learner's performance and concrete \
             recommendations for what to study next. Echo each question's id and the \
             learner's selected option unchanged.",
        )
        .output_schema(
            r#"{
  "evaluations": [
    {
      "id": 1,
      "question": "...",
      "topic": "...",
      "difficulty": "...",
      "options": {"1": "...", "2": "..."},
      "selectedAnswerByStudent": {"id": 1},
      "language": "en",
      "explanation": "..."
    }
  ],
  "summary": "...",
  "recommendations": "..."
}"#,
        )
        .build()
}
