//! Database Layer with Connection Pooling and Safe Transactions
//!
//! SQLite persistence for assessments, questions, submissions, and the
//! provider-usage audit trail:
//! - Connection pooling via r2d2 for concurrent access
//! - Panic-safe transactions with automatic rollback
//! - WAL mode for optimal read/write performance
//!
//! Every multi-row write the pipelines depend on (a question batch, a
//! submission) goes through a single transaction here; partial batches are
//! never visible.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rand::seq::SliceRandom;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, warn};

use crate::constants::generation::QUESTION_BUFFER_FACTOR;
use crate::parse::{EvaluationReport, ParsedQuestion};
use crate::types::{
    AnswerInput, Assessment, ExamError, GeneratedQuestion, NewAssessment, PerformanceTier,
    ProviderUsageRecord, QuestionOption, QuestionWithOptions, Result, ResultExt,
};

/// Shared database handle for async contexts.
pub type SharedDatabase = Arc<Database>;

const SCHEMA: &str = include_str!("schema.sql");

/// Thread-safe database with connection pooling.
pub struct Database {
    pool: Pool<SqliteConnectionManager>,
}

impl Database {
    /// Open database with connection pooling at the specified path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_pool_size(path, 8)
    }

    /// Open database with an explicit pool size.
    pub fn open_with_pool_size<P: AsRef<Path>>(path: P, pool_size: u32) -> Result<Self> {
        let manager =
            SqliteConnectionManager::file(path.as_ref()).with_init(Self::configure_connection);

        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(|e| ExamError::Storage(format!("Failed to create connection pool: {}", e)))?;

        Ok(Self { pool })
    }

    /// Open an in-memory database for testing or temporary use.
    pub fn open_in_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory().with_init(|conn| {
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            Ok(())
        });

        // A single connection so every handle sees the same memory database
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| ExamError::Storage(format!("Failed to create in-memory pool: {}", e)))?;

        Ok(Self { pool })
    }

    fn configure_connection(conn: &mut Connection) -> std::result::Result<(), rusqlite::Error> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA busy_timeout = 5000;
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        self.pool.get().map_err(|e| {
            ExamError::Storage(format!("Failed to acquire database connection: {}", e))
        })
    }

    /// Initialize database schema.
    pub fn initialize(&self) -> Result<()> {
        self.conn()?
            .execute_batch(SCHEMA)
            .with_context("Failed to initialize database schema")?;
        Ok(())
    }

    /// Execute a function within a panic-safe database transaction.
    ///
    /// All operations within the closure are atomic. If the closure panics,
    /// the transaction is rolled back and an error is returned instead of
    /// poisoning the connection pool.
    pub fn transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .with_context("Failed to start transaction")?;

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| f(&tx)));

        match result {
            Ok(Ok(value)) => {
                tx.commit().with_context("Failed to commit transaction")?;
                Ok(value)
            }
            // Rolled back on drop
            Ok(Err(e)) => Err(e),
            Err(panic_payload) => {
                let panic_msg = panic_payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic_payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "Unknown panic".to_string());

                tracing::error!("Transaction panicked: {}", panic_msg);
                Err(ExamError::Storage(format!(
                    "Transaction panicked: {}",
                    panic_msg
                )))
            }
        }
    }

    // =========================================================================
    // Performance Tiers
    // =========================================================================

    /// Insert a tier definition for a cohort. The `id` on the input is
    /// ignored; the generated row id is returned.
    pub fn insert_tier(&self, cohort_id: i64, tier: &PerformanceTier) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO performance_tiers
             (cohort_id, grade, score_range, score_min, score_max, hardship, meaning)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                cohort_id,
                tier.grade,
                tier.score_range,
                tier.score_min,
                tier.score_max,
                tier.hardship,
                tier.meaning,
            ],
        )
        .with_context("Failed to insert performance tier")?;
        Ok(conn.last_insert_rowid())
    }

    /// Load a cohort's tier ladder ordered best-first: highest lower bound
    /// first, the bottom (unbounded-below) tier last.
    pub fn tiers_for_cohort(&self, cohort_id: i64) -> Result<Vec<PerformanceTier>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, grade, score_range, score_min, score_max, hardship, meaning
             FROM performance_tiers
             WHERE cohort_id = ?1
             ORDER BY score_min IS NULL, score_min DESC",
        )?;

        let tiers = stmt
            .query_map(params![cohort_id], |row| {
                Ok(PerformanceTier {
                    id: row.get(0)?,
                    grade: row.get(1)?,
                    score_range: row.get(2)?,
                    score_min: row.get(3)?,
                    score_max: row.get(4)?,
                    hardship: row.get(5)?,
                    meaning: row.get(6)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()
            .with_context("Failed to load performance tiers")?;

        Ok(tiers)
    }

    // =========================================================================
    // Assessments
    // =========================================================================

    /// Create an assessment. The buffered question count is derived here
    /// and nowhere else: floor(requested * 2.25).
    pub fn create_assessment(&self, new: &NewAssessment) -> Result<Assessment> {
        let buffered =
            (f64::from(new.requested_question_count) * QUESTION_BUFFER_FACTOR).floor() as u32;
        let topics_json =
            serde_json::to_string(&new.topics).with_context("Failed to serialize topics")?;
        let now = chrono::Utc::now().to_rfc3339();

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO assessments
             (cohort_id, title, description, topics, requested_question_count,
              buffered_question_count, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                new.cohort_id,
                new.title,
                new.description,
                topics_json,
                new.requested_question_count,
                buffered,
                now,
            ],
        )
        .with_context("Failed to create assessment")?;

        Ok(Assessment {
            id: conn.last_insert_rowid(),
            cohort_id: new.cohort_id,
            title: new.title.clone(),
            description: new.description.clone(),
            topics: new.topics.clone(),
            requested_question_count: new.requested_question_count,
            buffered_question_count: buffered,
        })
    }

    /// Load an assessment by id.
    pub fn get_assessment(&self, assessment_id: i64) -> Result<Assessment> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT id, cohort_id, title, description, topics,
                        requested_question_count, buffered_question_count
                 FROM assessments WHERE id = ?1",
                params![assessment_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, u32>(5)?,
                        row.get::<_, u32>(6)?,
                    ))
                },
            )
            .optional()
            .with_context("Failed to load assessment")?
            .ok_or_else(|| ExamError::NotFound(format!("assessment {}", assessment_id)))?;

        let topics: Vec<String> = serde_json::from_str(&row.4)
            .with_context_fn(|| format!("Corrupted topics JSON for assessment {}", row.0))?;

        Ok(Assessment {
            id: row.0,
            cohort_id: row.1,
            title: row.2,
            description: row.3,
            topics,
            requested_question_count: row.5,
            buffered_question_count: row.6,
        })
    }

    /// Whether this learner has completed the assessment. A learner with no
    /// participation row has not completed it.
    pub fn is_assessment_completed(&self, learner_id: i64, assessment_id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let completed: Option<i64> = conn
            .query_row(
                "SELECT is_completed FROM learner_assessments
                 WHERE learner_id = ?1 AND assessment_id = ?2",
                params![learner_id, assessment_id],
                |row| row.get(0),
            )
            .optional()
            .with_context("Failed to check assessment completion")?;
        Ok(completed.is_some_and(|c| c != 0))
    }

    // =========================================================================
    // Questions
    // =========================================================================

    /// Insert one generated batch atomically.
    ///
    /// A question whose declared correct option has no matching option entry
    /// is logged and skipped; the rest of the batch still commits. Returns
    /// the inserted question ids.
    pub fn insert_question_batch(
        &self,
        assessment_id: i64,
        tier_id: Option<i64>,
        questions: &[ParsedQuestion],
    ) -> Result<Vec<i64>> {
        let now = chrono::Utc::now().to_rfc3339();

        self.transaction(|conn| {
            let mut inserted = Vec::with_capacity(questions.len());

            for parsed in questions {
                if !parsed.options.contains_key(&parsed.correct_option) {
                    warn!(
                        question = %parsed.question,
                        correct_option = parsed.correct_option,
                        "Correct option missing from options map, skipping question"
                    );
                    continue;
                }

                conn.execute(
                    "INSERT INTO questions
                     (assessment_id, tier_id, question, topic, difficulty, language, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        assessment_id,
                        tier_id,
                        parsed.question,
                        parsed.topic,
                        parsed.difficulty,
                        parsed.language,
                        now,
                    ],
                )
                .with_context("Failed to insert question")?;
                let question_id = conn.last_insert_rowid();

                let mut option_stmt = conn
                    .prepare_cached(
                        "INSERT INTO question_options (question_id, option_number, option_text)
                         VALUES (?1, ?2, ?3)",
                    )
                    .with_context("Failed to prepare option statement")?;

                let mut correct_option_id = None;
                for (number, text) in &parsed.options {
                    option_stmt
                        .execute(params![question_id, number, text])
                        .with_context("Failed to insert question option")?;
                    if *number == parsed.correct_option {
                        correct_option_id = Some(conn.last_insert_rowid());
                    }
                }

                conn.execute(
                    "UPDATE questions SET correct_option_id = ?1 WHERE id = ?2",
                    params![correct_option_id, question_id],
                )
                .with_context("Failed to set correct option")?;

                inserted.push(question_id);
            }

            debug!(
                assessment_id,
                ?tier_id,
                count = inserted.len(),
                "Inserted question batch"
            );
            Ok(inserted)
        })
    }

    /// Every question (with options) previously generated for a cohort,
    /// across all of its assessments. Used as negative examples during
    /// generation.
    pub fn question_corpus(&self, cohort_id: i64) -> Result<Vec<QuestionWithOptions>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT q.id, q.assessment_id, q.question, q.topic, q.difficulty,
                    q.language, q.correct_option_id
             FROM questions q
             JOIN assessments a ON a.id = q.assessment_id
             WHERE a.cohort_id = ?1
             ORDER BY q.id",
        )?;
        let rows = Self::collect_question_rows(&mut stmt, params![cohort_id])?;
        Self::attach_options(&conn, rows)
    }

    /// Fetch the question set served to a learner: the assessment's batch
    /// for the given tier (or the baseline batch when `tier_id` is `None`),
    /// shuffled and truncated to `count`.
    pub fn questions_for_learner(
        &self,
        assessment_id: i64,
        tier_id: Option<i64>,
        count: usize,
    ) -> Result<Vec<QuestionWithOptions>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, assessment_id, question, topic, difficulty, language, correct_option_id
             FROM questions
             WHERE assessment_id = ?1
               AND ((?2 IS NULL AND tier_id IS NULL) OR tier_id = ?2)
             ORDER BY id",
        )?;
        let rows = Self::collect_question_rows(&mut stmt, params![assessment_id, tier_id])?;
        let mut questions = Self::attach_options(&conn, rows)?;

        questions.shuffle(&mut rand::rng());
        questions.truncate(count);
        Ok(questions)
    }

    /// Load specific questions with their options, keyed by question id.
    pub fn questions_by_ids(&self, ids: &[i64]) -> Result<HashMap<i64, QuestionWithOptions>> {
        let conn = self.conn()?;
        let mut out = HashMap::with_capacity(ids.len());
        let mut stmt = conn.prepare_cached(
            "SELECT id, assessment_id, question, topic, difficulty, language, correct_option_id
             FROM questions WHERE id = ?1",
        )?;

        for id in ids {
            let row = stmt
                .query_row(params![id], Self::map_question_row)
                .optional()
                .with_context("Failed to load question")?;
            if let Some(row) = row {
                let mut loaded = Self::attach_options(&conn, vec![row])?;
                if let Some(question) = loaded.pop() {
                    out.insert(*id, question);
                }
            }
        }
        Ok(out)
    }

    fn map_question_row(
        row: &rusqlite::Row<'_>,
    ) -> rusqlite::Result<(GeneratedQuestion, Option<i64>)> {
        Ok((
            GeneratedQuestion {
                id: row.get(0)?,
                assessment_id: row.get(1)?,
                question: row.get(2)?,
                topic: row.get(3)?,
                difficulty: row.get(4)?,
                language: row.get(5)?,
            },
            row.get(6)?,
        ))
    }

    fn collect_question_rows(
        stmt: &mut rusqlite::Statement<'_>,
        params: impl rusqlite::Params,
    ) -> Result<Vec<(GeneratedQuestion, Option<i64>)>> {
        stmt.query_map(params, Self::map_question_row)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .with_context("Failed to load questions")
    }

    fn attach_options(
        conn: &Connection,
        rows: Vec<(GeneratedQuestion, Option<i64>)>,
    ) -> Result<Vec<QuestionWithOptions>> {
        let mut option_stmt = conn
            .prepare_cached(
                "SELECT id, question_id, option_number, option_text
                 FROM question_options WHERE question_id = ?1
                 ORDER BY option_number",
            )
            .with_context("Failed to prepare options query")?;

        let mut out = Vec::with_capacity(rows.len());
        for (question, correct_option_id) in rows {
            let options: Vec<QuestionOption> = option_stmt
                .query_map(params![question.id], |row| {
                    Ok(QuestionOption {
                        id: row.get(0)?,
                        question_id: row.get(1)?,
                        option_number: row.get(2)?,
                        option_text: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()
                .with_context("Failed to load question options")?;

            let correct_option = correct_option_id
                .and_then(|id| options.iter().find(|o| o.id == id).cloned());

            out.push(QuestionWithOptions {
                question,
                options,
                correct_option,
            });
        }
        Ok(out)
    }

    // =========================================================================
    // Submissions
    // =========================================================================

    /// Persist a graded submission atomically: every answer row, the tier
    /// assignment, and the learner's completion flag commit together.
    ///
    /// Answers are stored as submitted; ids that resolve to nothing are
    /// persisted anyway since scoring already counted them as incorrect.
    pub fn record_submission(
        &self,
        learner_id: i64,
        assessment_id: i64,
        tier_id: i64,
        answers: &[AnswerInput],
    ) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();

        self.transaction(|conn| {
            let mut answer_stmt = conn
                .prepare_cached(
                    "INSERT INTO submission_answers
                     (learner_id, assessment_id, question_id, chosen_option_id, answered_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )
                .with_context("Failed to prepare answer statement")?;

            for answer in answers {
                answer_stmt
                    .execute(params![
                        learner_id,
                        assessment_id,
                        answer.question_id,
                        answer.chosen_option_id,
                        now,
                    ])
                    .with_context("Failed to insert submission answer")?;
            }

            conn.execute(
                "INSERT INTO tier_assignments (learner_id, assessment_id, tier_id, assigned_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![learner_id, assessment_id, tier_id, now],
            )
            .with_context("Failed to insert tier assignment")?;

            conn.execute(
                "INSERT INTO learner_assessments
                 (learner_id, assessment_id, is_completed, completed_at)
                 VALUES (?1, ?2, 1, ?3)
                 ON CONFLICT(learner_id, assessment_id)
                 DO UPDATE SET is_completed = 1, completed_at = excluded.completed_at",
                params![learner_id, assessment_id, now],
            )
            .with_context("Failed to mark assessment completed for learner")?;

            Ok(())
        })
    }

    /// Count of answer rows stored for a learner's assessment.
    pub fn answer_count(&self, learner_id: i64, assessment_id: i64) -> Result<usize> {
        let count: i64 = self
            .conn()?
            .query_row(
                "SELECT COUNT(*) FROM submission_answers
                 WHERE learner_id = ?1 AND assessment_id = ?2",
                params![learner_id, assessment_id],
                |row| row.get(0),
            )
            .with_context("Failed to count submission answers")?;
        Ok(count as usize)
    }

    /// The learner's most recent tier assignment within a cohort, if any.
    pub fn latest_tier_assignment(
        &self,
        learner_id: i64,
        cohort_id: i64,
    ) -> Result<Option<PerformanceTier>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT t.id, t.grade, t.score_range, t.score_min, t.score_max,
                    t.hardship, t.meaning
             FROM tier_assignments ta
             JOIN performance_tiers t ON t.id = ta.tier_id
             JOIN assessments a ON a.id = ta.assessment_id
             WHERE ta.learner_id = ?1 AND a.cohort_id = ?2
             ORDER BY ta.assigned_at DESC, ta.id DESC
             LIMIT 1",
            params![learner_id, cohort_id],
            |row| {
                Ok(PerformanceTier {
                    id: row.get(0)?,
                    grade: row.get(1)?,
                    score_range: row.get(2)?,
                    score_min: row.get(3)?,
                    score_max: row.get(4)?,
                    hardship: row.get(5)?,
                    meaning: row.get(6)?,
                })
            },
        )
        .optional()
        .with_context("Failed to load tier assignment")
    }

    // =========================================================================
    // Audit and Evaluation
    // =========================================================================

    /// Append a provider usage record. Best-effort audit data; callers log
    /// and continue when this fails.
    pub fn record_provider_usage(&self, record: &ProviderUsageRecord) -> Result<()> {
        let usage_json = record
            .usage
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .with_context("Failed to serialize usage JSON")?;
        let now = chrono::Utc::now().to_rfc3339();

        self.conn()?
            .execute(
                "INSERT INTO provider_usage
                 (assessment_id, provider, prompt, response_text, latency_ms, usage_json, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.assessment_id,
                    record.provider,
                    record.prompt,
                    record.response_text,
                    record.latency_ms as i64,
                    usage_json,
                    now,
                ],
            )
            .with_context("Failed to record provider usage")?;
        Ok(())
    }

    /// Count of usage records for an assessment.
    pub fn usage_count(&self, assessment_id: i64) -> Result<usize> {
        let count: i64 = self
            .conn()?
            .query_row(
                "SELECT COUNT(*) FROM provider_usage WHERE assessment_id = ?1",
                params![assessment_id],
                |row| row.get(0),
            )
            .with_context("Failed to count usage records")?;
        Ok(count as usize)
    }

    /// Persist a parsed evaluation report: one row per evaluated question,
    /// summary and recommendations denormalized onto each.
    pub fn insert_evaluation_report(
        &self,
        learner_id: i64,
        assessment_id: i64,
        report: &EvaluationReport,
    ) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();

        self.transaction(|conn| {
            let mut stmt = conn
                .prepare_cached(
                    "INSERT INTO evaluation_reports
                     (learner_id, assessment_id, question_id, evaluation_json,
                      summary, recommendations, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                )
                .with_context("Failed to prepare evaluation statement")?;

            for evaluation in &report.evaluations {
                let evaluation_json = serde_json::to_string(evaluation)
                    .with_context("Failed to serialize evaluation")?;
                stmt.execute(params![
                    learner_id,
                    assessment_id,
                    evaluation.id,
                    evaluation_json,
                    report.summary,
                    report.recommendations,
                    now,
                ])
                .with_context("Failed to insert evaluation row")?;
            }
            Ok(())
        })
    }

    /// Count of evaluation rows stored for a learner's assessment.
    pub fn evaluation_count(&self, learner_id: i64, assessment_id: i64) -> Result<usize> {
        let count: i64 = self
            .conn()?
            .query_row(
                "SELECT COUNT(*) FROM evaluation_reports
                 WHERE learner_id = ?1 AND assessment_id = ?2",
                params![learner_id, assessment_id],
                |row| row.get(0),
            )
            .with_context("Failed to count evaluation rows")?;
        Ok(count as usize)
    }
}
