/// Quiz endpoints
///
/// - `POST /v1/families/:family_id/quizzes` - editor+, with nested questions
/// - `GET /v1/families/:family_id/quizzes`
/// - `GET|DELETE /v1/families/:family_id/quizzes/:quiz_id`
/// - `POST /v1/families/:family_id/quizzes/:quiz_id/submit`
/// - `GET /v1/families/:family_id/quizzes/:quiz_id/results` - editor+
/// - `GET /v1/users/me/quiz-results`
///
/// Readers never see which propositions are correct.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{ApiPath, ValidJson},
    routes::contents::load_visible,
};
use axum::{extract::State, http::StatusCode, Extension, Json};
use heritage_shared::{
    auth::{
        authorization::{check_author_or_role, require_permission, FamilyPermission},
        middleware::AuthContext,
    },
    models::{
        membership::FamilyRole,
        quiz::{
            grade, Answer, NewQuestion, NewQuiz, QuestionOutcome, Quiz, QuizDetail, QuizResult,
            QuizResultEntry, QuizSummary, UserQuizResult,
        },
    },
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuizRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    pub title: String,

    #[validate(length(max = 2000, message = "Description must be at most 2000 characters"))]
    pub description: Option<String>,

    /// Content item the quiz is about
    pub content_id: Option<Uuid>,

    #[validate(length(min = 1, max = 100, message = "A quiz needs 1-100 questions"))]
    pub questions: Vec<NewQuestion>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SubmitRequest {
    #[serde(default)]
    pub answers: Vec<Answer>,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub result: QuizResult,
    pub questions: Vec<QuestionOutcome>,
}

async fn load_quiz(state: &AppState, family_id: Uuid, quiz_id: Uuid) -> ApiResult<QuizDetail> {
    Quiz::load_detail(&state.db, family_id, quiz_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Quiz"))
}

pub async fn create_quiz(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(family_id): ApiPath<Uuid>,
    ValidJson(req): ValidJson<CreateQuizRequest>,
) -> ApiResult<(StatusCode, Json<QuizDetail>)> {
    require_permission(&state.db, family_id, auth.user_id, FamilyPermission::Write).await?;

    if let Some(content_id) = req.content_id {
        // Also rejects content from another family
        load_visible(&state, family_id, content_id, auth.user_id)
            .await
            .map_err(|e| match e {
                ApiError::NotFound(_) => {
                    ApiError::BadRequest("Linked content not found in this family".to_string())
                }
                other => other,
            })?;
    }

    let new_quiz = NewQuiz {
        family_id,
        author_id: auth.user_id,
        content_id: req.content_id,
        title: req.title.trim().to_string(),
        description: req.description,
        questions: req.questions,
    };
    new_quiz.check().map_err(|e| ApiError::validation("questions", e))?;

    let quiz = Quiz::create(&state.db, new_quiz).await?;

    tracing::info!(
        family_id = %family_id,
        quiz_id = %quiz.quiz.id,
        questions = quiz.questions.len(),
        "Quiz created"
    );

    Ok((StatusCode::CREATED, Json(quiz)))
}

pub async fn list_quizzes(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(family_id): ApiPath<Uuid>,
) -> ApiResult<Json<Vec<QuizSummary>>> {
    require_permission(&state.db, family_id, auth.user_id, FamilyPermission::Read).await?;

    Ok(Json(Quiz::list_by_family(&state.db, family_id).await?))
}

pub async fn get_quiz(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath((family_id, quiz_id)): ApiPath<(Uuid, Uuid)>,
) -> ApiResult<Json<QuizDetail>> {
    let role = require_permission(&state.db, family_id, auth.user_id, FamilyPermission::Read).await?;

    let mut quiz = load_quiz(&state, family_id, quiz_id).await?;
    if role == FamilyRole::Reader {
        quiz.hide_answers();
    }

    Ok(Json(quiz))
}

pub async fn delete_quiz(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath((family_id, quiz_id)): ApiPath<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    let role = require_permission(&state.db, family_id, auth.user_id, FamilyPermission::Read).await?;

    let quiz = Quiz::find_in_family(&state.db, family_id, quiz_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Quiz"))?;

    let author = quiz.author_id.unwrap_or_else(Uuid::nil);
    check_author_or_role(role, auth.user_id, author, FamilyRole::Admin)?;

    Quiz::delete(&state.db, family_id, quiz.id).await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn submit_quiz(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath((family_id, quiz_id)): ApiPath<(Uuid, Uuid)>,
    ValidJson(req): ValidJson<SubmitRequest>,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    require_permission(&state.db, family_id, auth.user_id, FamilyPermission::Read).await?;

    let quiz = load_quiz(&state, family_id, quiz_id).await?;
    let graded = grade(&quiz.questions, &req.answers)?;

    let result = QuizResult::record(&state.db, quiz.quiz.id, auth.user_id, &graded).await?;

    tracing::debug!(
        quiz_id = %quiz.quiz.id,
        user_id = %auth.user_id,
        score = graded.score,
        total = graded.total,
        "Quiz submitted"
    );

    Ok((
        StatusCode::CREATED,
        Json(SubmitResponse {
            result,
            questions: graded.questions,
        }),
    ))
}

pub async fn list_results(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath((family_id, quiz_id)): ApiPath<(Uuid, Uuid)>,
) -> ApiResult<Json<Vec<QuizResultEntry>>> {
    require_permission(&state.db, family_id, auth.user_id, FamilyPermission::Write).await?;

    let quiz = Quiz::find_in_family(&state.db, family_id, quiz_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Quiz"))?;

    Ok(Json(QuizResult::list_for_quiz(&state.db, quiz.id).await?))
}

pub async fn my_results(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Vec<UserQuizResult>>> {
    Ok(Json(QuizResult::list_for_user(&state.db, auth.user_id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_question_count_bounds() {
        let req: CreateQuizRequest = serde_json::from_value(serde_json::json!({
            "title": "Who planted the walnut tree?",
            "questions": [{
                "prompt": "Which year?",
                "propositions": [
                    { "label": "1952", "is_correct": true },
                    { "label": "1961" },
                ],
            }],
        }))
        .unwrap();
        assert!(req.validate().is_ok());

        let req: CreateQuizRequest =
            serde_json::from_value(serde_json::json!({ "title": "Empty", "questions": [] }))
                .unwrap();
        let errors = req.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("questions"));
    }
}
