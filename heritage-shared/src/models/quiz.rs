/// Quizzes, their questions and propositions, and graded results
///
/// A quiz is created with all of its questions and propositions in a single
/// transaction. Grading is all-or-nothing per question: a question scores
/// when the selected proposition set is exactly the set of correct ones.
///
/// # Example
///
/// ```
/// use heritage_shared::models::quiz::{NewProposition, NewQuestion};
///
/// let question = NewQuestion {
///     prompt: "Who planted the old banyan?".into(),
///     propositions: vec![
///         NewProposition { label: "Great-grandfather".into(), is_correct: true },
///         NewProposition { label: "The village chief".into(), is_correct: false },
///     ],
/// };
/// assert!(question.check().is_ok());
/// ```

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Minimum number of propositions per question
pub const MIN_PROPOSITIONS: usize = 2;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Quiz {
    pub id: Uuid,
    pub family_id: Uuid,
    pub content_id: Option<Uuid>,
    pub author_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Quiz listing entry
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct QuizSummary {
    pub id: Uuid,
    pub content_id: Option<Uuid>,
    pub author_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub question_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct QuestionRow {
    id: Uuid,
    prompt: String,
    position: i32,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct PropositionRow {
    id: Uuid,
    question_id: Uuid,
    label: String,
    is_correct: bool,
    position: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct PropositionView {
    pub id: Uuid,
    pub label: String,
    pub position: i32,

    /// Omitted for readers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_correct: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuestionView {
    pub id: Uuid,
    pub prompt: String,
    pub position: i32,
    pub propositions: Vec<PropositionView>,
}

/// A quiz with its full question tree
#[derive(Debug, Clone, Serialize)]
pub struct QuizDetail {
    #[serde(flatten)]
    pub quiz: Quiz,
    pub questions: Vec<QuestionView>,
}

impl QuizDetail {
    /// Strips correctness flags before showing the quiz to a reader
    pub fn hide_answers(&mut self) {
        for question in &mut self.questions {
            for proposition in &mut question.propositions {
                proposition.is_correct = None;
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProposition {
    pub label: String,
    #[serde(default)]
    pub is_correct: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewQuestion {
    pub prompt: String,
    pub propositions: Vec<NewProposition>,
}

impl NewQuestion {
    /// Structural checks: enough propositions and at least one correct
    pub fn check(&self) -> Result<(), String> {
        if self.prompt.trim().is_empty() {
            return Err("Question prompt must not be empty".to_string());
        }
        if self.propositions.len() < MIN_PROPOSITIONS {
            return Err(format!(
                "Question '{}' needs at least {} propositions",
                self.prompt.trim(),
                MIN_PROPOSITIONS
            ));
        }
        if self.propositions.iter().any(|p| p.label.trim().is_empty()) {
            return Err(format!("Question '{}' has an empty proposition", self.prompt.trim()));
        }
        if !self.propositions.iter().any(|p| p.is_correct) {
            return Err(format!(
                "Question '{}' needs at least one correct proposition",
                self.prompt.trim()
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct NewQuiz {
    pub family_id: Uuid,
    pub author_id: Uuid,
    pub content_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub questions: Vec<NewQuestion>,
}

impl NewQuiz {
    pub fn check(&self) -> Result<(), String> {
        if self.questions.is_empty() {
            return Err("A quiz needs at least one question".to_string());
        }
        self.questions.iter().try_for_each(NewQuestion::check)
    }
}

/// Selected propositions for one question
#[derive(Debug, Clone, Deserialize)]
pub struct Answer {
    pub question_id: Uuid,
    #[serde(default)]
    pub proposition_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GradeError {
    #[error("Question {0} does not belong to this quiz")]
    UnknownQuestion(Uuid),

    #[error("Question {0} is answered more than once")]
    DuplicateAnswer(Uuid),

    #[error("Proposition {proposition_id} does not belong to question {question_id}")]
    ForeignProposition { question_id: Uuid, proposition_id: Uuid },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuestionOutcome {
    pub question_id: Uuid,
    pub correct: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Grade {
    pub score: i32,
    pub total: i32,
    pub questions: Vec<QuestionOutcome>,
}

/// Grades `answers` against the quiz's questions
///
/// `questions` must carry correctness flags. Unanswered questions score 0.
pub fn grade(questions: &[QuestionView], answers: &[Answer]) -> Result<Grade, GradeError> {
    let by_id: HashMap<Uuid, &QuestionView> = questions.iter().map(|q| (q.id, q)).collect();
    let mut selected: HashMap<Uuid, HashSet<Uuid>> = HashMap::new();

    for answer in answers {
        let question = by_id
            .get(&answer.question_id)
            .ok_or(GradeError::UnknownQuestion(answer.question_id))?;

        let known: HashSet<Uuid> = question.propositions.iter().map(|p| p.id).collect();
        if let Some(foreign) = answer.proposition_ids.iter().find(|id| !known.contains(id)) {
            return Err(GradeError::ForeignProposition {
                question_id: answer.question_id,
                proposition_id: *foreign,
            });
        }

        if selected
            .insert(answer.question_id, answer.proposition_ids.iter().copied().collect())
            .is_some()
        {
            return Err(GradeError::DuplicateAnswer(answer.question_id));
        }
    }

    let outcomes: Vec<QuestionOutcome> = questions
        .iter()
        .map(|question| {
            let correct: HashSet<Uuid> = question
                .propositions
                .iter()
                .filter(|p| p.is_correct == Some(true))
                .map(|p| p.id)
                .collect();

            QuestionOutcome {
                question_id: question.id,
                correct: selected.get(&question.id).map_or(false, |chosen| *chosen == correct),
            }
        })
        .collect();

    Ok(Grade {
        score: outcomes.iter().filter(|o| o.correct).count() as i32,
        total: outcomes.len() as i32,
        questions: outcomes,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct QuizResult {
    pub id: Uuid,
    pub quiz_id: Uuid,
    pub user_id: Uuid,
    pub score: i32,
    pub total: i32,
    pub submitted_at: DateTime<Utc>,
}

/// Result row with who took it, for quiz authors
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct QuizResultEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub display_name: String,
    pub score: i32,
    pub total: i32,
    pub submitted_at: DateTime<Utc>,
}

/// Result row with the quiz it belongs to, for the taker
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct UserQuizResult {
    pub id: Uuid,
    pub quiz_id: Uuid,
    pub quiz_title: String,
    pub family_id: Uuid,
    pub score: i32,
    pub total: i32,
    pub submitted_at: DateTime<Utc>,
}

impl Quiz {
    /// Inserts the quiz with every question and proposition atomically
    pub async fn create(pool: &PgPool, data: NewQuiz) -> Result<QuizDetail, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let quiz = sqlx::query_as::<_, Quiz>(
            r#"
            INSERT INTO quizzes (family_id, content_id, author_id, title, description)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, family_id, content_id, author_id, title, description, created_at
            "#,
        )
        .bind(data.family_id)
        .bind(data.content_id)
        .bind(data.author_id)
        .bind(data.title.trim())
        .bind(data.description)
        .fetch_one(&mut *tx)
        .await?;

        let mut questions = Vec::with_capacity(data.questions.len());
        for (q_pos, question) in data.questions.into_iter().enumerate() {
            let question_id: Uuid = sqlx::query_scalar(
                "INSERT INTO questions (quiz_id, prompt, position) VALUES ($1, $2, $3) RETURNING id",
            )
            .bind(quiz.id)
            .bind(question.prompt.trim())
            .bind(q_pos as i32)
            .fetch_one(&mut *tx)
            .await?;

            let mut propositions = Vec::with_capacity(question.propositions.len());
            for (p_pos, proposition) in question.propositions.into_iter().enumerate() {
                let proposition_id: Uuid = sqlx::query_scalar(
                    r#"
                    INSERT INTO propositions (question_id, label, is_correct, position)
                    VALUES ($1, $2, $3, $4)
                    RETURNING id
                    "#,
                )
                .bind(question_id)
                .bind(proposition.label.trim())
                .bind(proposition.is_correct)
                .bind(p_pos as i32)
                .fetch_one(&mut *tx)
                .await?;

                propositions.push(PropositionView {
                    id: proposition_id,
                    label: proposition.label.trim().to_string(),
                    position: p_pos as i32,
                    is_correct: Some(proposition.is_correct),
                });
            }

            questions.push(QuestionView {
                id: question_id,
                prompt: question.prompt.trim().to_string(),
                position: q_pos as i32,
                propositions,
            });
        }

        tx.commit().await?;

        tracing::info!(quiz_id = %quiz.id, questions = questions.len(), "Quiz created");

        Ok(QuizDetail { quiz, questions })
    }

    pub async fn find_in_family(
        pool: &PgPool,
        family_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Quiz>(
            r#"
            SELECT id, family_id, content_id, author_id, title, description, created_at
            FROM quizzes
            WHERE id = $1 AND family_id = $2
            "#,
        )
        .bind(id)
        .bind(family_id)
        .fetch_optional(pool)
        .await
    }

    /// Loads the quiz with questions and propositions in position order
    pub async fn load_detail(
        pool: &PgPool,
        family_id: Uuid,
        id: Uuid,
    ) -> Result<Option<QuizDetail>, sqlx::Error> {
        let Some(quiz) = Self::find_in_family(pool, family_id, id).await? else {
            return Ok(None);
        };

        let question_rows = sqlx::query_as::<_, QuestionRow>(
            "SELECT id, prompt, position FROM questions WHERE quiz_id = $1 ORDER BY position ASC",
        )
        .bind(quiz.id)
        .fetch_all(pool)
        .await?;

        let proposition_rows = sqlx::query_as::<_, PropositionRow>(
            r#"
            SELECT p.id, p.question_id, p.label, p.is_correct, p.position
            FROM propositions p
            JOIN questions q ON q.id = p.question_id
            WHERE q.quiz_id = $1
            ORDER BY p.position ASC
            "#,
        )
        .bind(quiz.id)
        .fetch_all(pool)
        .await?;

        let mut grouped: HashMap<Uuid, Vec<PropositionView>> = HashMap::new();
        for row in proposition_rows {
            grouped.entry(row.question_id).or_default().push(PropositionView {
                id: row.id,
                label: row.label,
                position: row.position,
                is_correct: Some(row.is_correct),
            });
        }

        let questions = question_rows
            .into_iter()
            .map(|row| QuestionView {
                propositions: grouped.remove(&row.id).unwrap_or_default(),
                id: row.id,
                prompt: row.prompt,
                position: row.position,
            })
            .collect();

        Ok(Some(QuizDetail { quiz, questions }))
    }

    pub async fn list_by_family(
        pool: &PgPool,
        family_id: Uuid,
    ) -> Result<Vec<QuizSummary>, sqlx::Error> {
        sqlx::query_as::<_, QuizSummary>(
            r#"
            SELECT z.id, z.content_id, z.author_id, z.title, z.description, z.created_at,
                   (SELECT COUNT(*) FROM questions q WHERE q.quiz_id = z.id) AS question_count
            FROM quizzes z
            WHERE z.family_id = $1
            ORDER BY z.created_at DESC
            "#,
        )
        .bind(family_id)
        .fetch_all(pool)
        .await
    }

    pub async fn delete(pool: &PgPool, family_id: Uuid, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM quizzes WHERE id = $1 AND family_id = $2")
            .bind(id)
            .bind(family_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

impl QuizResult {
    pub async fn record(
        pool: &PgPool,
        quiz_id: Uuid,
        user_id: Uuid,
        grade: &Grade,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, QuizResult>(
            r#"
            INSERT INTO quiz_results (quiz_id, user_id, score, total)
            VALUES ($1, $2, $3, $4)
            RETURNING id, quiz_id, user_id, score, total, submitted_at
            "#,
        )
        .bind(quiz_id)
        .bind(user_id)
        .bind(grade.score)
        .bind(grade.total)
        .fetch_one(pool)
        .await
    }

    pub async fn list_for_quiz(
        pool: &PgPool,
        quiz_id: Uuid,
    ) -> Result<Vec<QuizResultEntry>, sqlx::Error> {
        sqlx::query_as::<_, QuizResultEntry>(
            r#"
            SELECT r.id, r.user_id, u.display_name, r.score, r.total, r.submitted_at
            FROM quiz_results r
            JOIN users u ON u.id = r.user_id
            WHERE r.quiz_id = $1
            ORDER BY r.submitted_at DESC
            "#,
        )
        .bind(quiz_id)
        .fetch_all(pool)
        .await
    }

    pub async fn list_for_user(
        pool: &PgPool,
        user_id: Uuid,
    ) -> Result<Vec<UserQuizResult>, sqlx::Error> {
        sqlx::query_as::<_, UserQuizResult>(
            r#"
            SELECT r.id, r.quiz_id, z.title AS quiz_title, z.family_id, r.score, r.total, r.submitted_at
            FROM quiz_results r
            JOIN quizzes z ON z.id = r.quiz_id
            WHERE r.user_id = $1
            ORDER BY r.submitted_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }
}
