//! HTTP adapters over the progression engine. Handlers marshal ids and
//! payloads and delegate; no completion rule lives here. Authorization has
//! already established the caller upstream, so learner ids arrive in the
//! request.

use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use super::error::ProgressionError;
use super::types::{AnswerSet, GradeVerdict};
use crate::shared::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LearnerBody {
    pub learner_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct LearnerQuery {
    pub learner_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct SubmitQuizBody {
    pub learner_id: Uuid,
    pub answers: AnswerSet,
}

#[derive(Debug, Deserialize)]
pub struct SessionAttendedBody {
    pub learner_id: Uuid,
    pub session_id: Uuid,
}

/// POST /api/track/lessons/:lesson_id/video-complete
pub async fn video_complete(
    State(state): State<Arc<AppState>>,
    Path(lesson_id): Path<Uuid>,
    Json(body): Json<LearnerBody>,
) -> Result<Json<serde_json::Value>, ProgressionError> {
    let outcome = state
        .engine
        .evaluate_video_completion(body.learner_id, lesson_id)
        .await?;
    Ok(Json(serde_json::json!({ "success": true, "data": outcome })))
}

/// GET /api/track/lessons/:lesson_id/quiz?learner_id=
pub async fn lesson_quiz(
    State(state): State<Arc<AppState>>,
    Path(lesson_id): Path<Uuid>,
    Query(query): Query<LearnerQuery>,
) -> Result<Json<serde_json::Value>, ProgressionError> {
    let questions = state
        .engine
        .lesson_quiz(query.learner_id, lesson_id)
        .await?;
    Ok(Json(
        serde_json::json!({ "success": true, "data": { "questions": questions } }),
    ))
}

/// POST /api/track/lessons/:lesson_id/quiz
pub async fn submit_lesson_quiz(
    State(state): State<Arc<AppState>>,
    Path(lesson_id): Path<Uuid>,
    Json(body): Json<SubmitQuizBody>,
) -> Result<Json<serde_json::Value>, ProgressionError> {
    let outcome = state
        .engine
        .submit_lesson_quiz(body.learner_id, lesson_id, body.answers)
        .await?;
    Ok(Json(serde_json::json!({ "success": true, "data": outcome })))
}

/// GET /api/track/assessments/:module_id/quiz?learner_id=
pub async fn assessment_quiz(
    State(state): State<Arc<AppState>>,
    Path(module_id): Path<Uuid>,
    Query(query): Query<LearnerQuery>,
) -> Result<Json<serde_json::Value>, ProgressionError> {
    let questions = state
        .engine
        .assessment_quiz(query.learner_id, module_id)
        .await?;
    Ok(Json(
        serde_json::json!({ "success": true, "data": { "questions": questions } }),
    ))
}

/// POST /api/track/assessments/:module_id/submit
pub async fn submit_assessment(
    State(state): State<Arc<AppState>>,
    Path(module_id): Path<Uuid>,
    Json(body): Json<SubmitQuizBody>,
) -> Result<Json<serde_json::Value>, ProgressionError> {
    let outcome = state
        .engine
        .submit_assessment(body.learner_id, module_id, body.answers)
        .await?;
    Ok(Json(serde_json::json!({ "success": true, "data": outcome })))
}

/// POST /api/track/sessions/:module_id/attended
pub async fn session_attended(
    State(state): State<Arc<AppState>>,
    Path(module_id): Path<Uuid>,
    Json(body): Json<SessionAttendedBody>,
) -> Result<Json<serde_json::Value>, ProgressionError> {
    let outcome = state
        .engine
        .record_expert_session(body.learner_id, module_id, body.session_id)
        .await?;
    Ok(Json(serde_json::json!({ "success": true, "data": outcome })))
}

/// GET /api/track/products/:product_id/modules?learner_id=
pub async fn product_modules(
    State(state): State<Arc<AppState>>,
    Path(product_id): Path<Uuid>,
    Query(query): Query<LearnerQuery>,
) -> Result<Json<serde_json::Value>, ProgressionError> {
    let modules = state
        .engine
        .unlocked_modules(query.learner_id, product_id)
        .await?;
    Ok(Json(
        serde_json::json!({ "success": true, "data": { "modules": modules } }),
    ))
}

/// POST /api/track/projects/graded
pub async fn project_graded(
    State(state): State<Arc<AppState>>,
    Json(verdict): Json<GradeVerdict>,
) -> Result<Json<serde_json::Value>, ProgressionError> {
    let outcome = state.engine.on_project_graded(verdict).await?;
    Ok(Json(serde_json::json!({ "success": true, "data": outcome })))
}

/// POST /api/track/interviews/analyzed
pub async fn interview_analyzed(
    State(state): State<Arc<AppState>>,
    Json(verdict): Json<GradeVerdict>,
) -> Result<Json<serde_json::Value>, ProgressionError> {
    let outcome = state.engine.on_interview_analyzed(verdict).await?;
    Ok(Json(serde_json::json!({ "success": true, "data": outcome })))
}

/// GET /api/track/learners/:learner_id
pub async fn learner_overview(
    State(state): State<Arc<AppState>>,
    Path(learner_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ProgressionError> {
    let overview = state.engine.learner_overview(learner_id).await?;
    Ok(Json(serde_json::json!({ "success": true, "data": overview })))
}
