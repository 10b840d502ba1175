//! # Progression module - the mastery engine
//!
//! Single canonical home for the rules that decide, from stored progress
//! state, whether a lesson or course is complete, whether a quiz answer is
//! correct, whether a module is unlocked, and whether the learner's star
//! level advances. Request handlers are thin adapters over
//! [`ProgressionEngine`]; none of them re-derive completion on their own and
//! none of them trust a client-reported percentage.

pub mod course;
pub mod error;
pub mod grader;
pub mod handlers;
pub mod promotion;
pub mod types;
pub mod unlock;

use axum::{
    routing::{get, post},
    Router,
};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::questions::{quiz_seed, QuestionError, QuestionService};
use crate::shared::state::AppState;
use crate::store::{ProgressAdapter, TrackStore};

pub use error::ProgressionError;

use course::aggregate_course;
use promotion::PromotionEngine;
use types::{
    AnswerSet, CompletionOutcome, GradeVerdict, Learner, LearnerOverview, Lesson, Module,
    ModuleOverview, ModuleProgress, ModuleType, ProgressPatch, ProgressStatus, PromotionOutcome,
    QuestionView, QuizAttempt, QuizSubmissionOutcome, Submission, SubmissionKind, Tier,
};

impl From<QuestionError> for ProgressionError {
    fn from(err: QuestionError) -> Self {
        ProgressionError::UpstreamUnavailable(err.to_string())
    }
}

pub fn configure_track_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/track/lessons/:lesson_id/video-complete",
            post(handlers::video_complete),
        )
        .route(
            "/api/track/lessons/:lesson_id/quiz",
            get(handlers::lesson_quiz).post(handlers::submit_lesson_quiz),
        )
        .route(
            "/api/track/assessments/:module_id/quiz",
            get(handlers::assessment_quiz),
        )
        .route(
            "/api/track/assessments/:module_id/submit",
            post(handlers::submit_assessment),
        )
        .route(
            "/api/track/sessions/:module_id/attended",
            post(handlers::session_attended),
        )
        .route(
            "/api/track/products/:product_id/modules",
            get(handlers::product_modules),
        )
        .route("/api/track/projects/graded", post(handlers::project_graded))
        .route(
            "/api/track/interviews/analyzed",
            post(handlers::interview_analyzed),
        )
        .route(
            "/api/track/learners/:learner_id",
            get(handlers::learner_overview),
        )
}

/// The progression engine. Holds the persistence seam, the question supply
/// and the promotion machine; every completion event funnels through here.
pub struct ProgressionEngine {
    store: Arc<dyn TrackStore>,
    adapter: ProgressAdapter,
    questions: Arc<QuestionService>,
    promotion: PromotionEngine,
    config: EngineConfig,
}

impl ProgressionEngine {
    pub fn new(
        store: Arc<dyn TrackStore>,
        questions: Arc<QuestionService>,
        config: EngineConfig,
    ) -> Self {
        let adapter = ProgressAdapter::new(store.clone(), config.merge_retry_limit);
        let promotion = PromotionEngine::new(store.clone(), config.clone());
        Self {
            store,
            adapter,
            questions,
            promotion,
            config,
        }
    }

    // ----- Lookups -----

    async fn require_learner(&self, learner_id: Uuid) -> Result<Learner, ProgressionError> {
        self.store
            .learner(learner_id)
            .await?
            .ok_or_else(|| ProgressionError::NotFound(format!("learner {learner_id} not found")))
    }

    async fn require_lesson(&self, lesson_id: Uuid) -> Result<Lesson, ProgressionError> {
        self.store
            .lesson(lesson_id)
            .await?
            .ok_or_else(|| ProgressionError::NotFound(format!("lesson {lesson_id} not found")))
    }

    async fn require_module(&self, module_id: Uuid) -> Result<Module, ProgressionError> {
        self.store
            .module(module_id)
            .await?
            .ok_or_else(|| ProgressionError::NotFound(format!("module {module_id} not found")))
    }

    fn require_unlocked(&self, module: &Module, learner: &Learner) -> Result<(), ProgressionError> {
        if unlock::is_unlocked(module.module_type, learner.star_level) {
            Ok(())
        } else {
            Err(ProgressionError::PreconditionNotMet(format!(
                "module '{}' is locked at star level {}",
                module.title, learner.star_level
            )))
        }
    }

    // ----- Video completion -----

    /// Record an explicit video-ended event for a lesson. Idempotent: the
    /// watched flag is a set insert, and re-firing returns the same document.
    pub async fn evaluate_video_completion(
        &self,
        learner_id: Uuid,
        lesson_id: Uuid,
    ) -> Result<CompletionOutcome, ProgressionError> {
        let learner = self.require_learner(learner_id).await?;
        let lesson = self.require_lesson(lesson_id).await?;
        let module = self.require_module(lesson.module_id).await?;
        self.require_unlocked(&module, &learner)?;

        let lessons = self.store.lessons_for_module(module.id).await?;
        let patch = ProgressPatch {
            video_watched: Some(lesson.id),
            ..Default::default()
        };
        let progress = self
            .adapter
            .merge(learner_id, module.id, patch, move |doc| {
                let rollup = aggregate_course(&lessons, &doc.details);
                doc.settle(rollup.status, rollup.percentage);
            })
            .await?;

        let promoted_to = self
            .promotion
            .after_course_event(learner_id, module.product_id)
            .await?;
        Ok(CompletionOutcome {
            progress,
            promoted_to,
        })
    }

    // ----- Lesson quizzes -----

    /// The generated quiz for a lesson, answer keys stripped. Requires the
    /// module unlocked and the lesson video watched.
    pub async fn lesson_quiz(
        &self,
        learner_id: Uuid,
        lesson_id: Uuid,
    ) -> Result<Vec<QuestionView>, ProgressionError> {
        let (learner, lesson, _) = self.quiz_preconditions(learner_id, lesson_id).await?;
        let spec = lesson.quiz.as_ref().ok_or_else(|| {
            ProgressionError::NotFound(format!("lesson {lesson_id} has no quiz"))
        })?;

        let tier = learner.tier.unwrap_or(Tier::Bronze);
        let seed = quiz_seed(learner_id, lesson_id);
        let questions = self
            .questions
            .questions_for(lesson_id, spec, tier, seed)
            .await?;
        Ok(questions.iter().map(QuestionView::from).collect())
    }

    /// Grade a lesson quiz submission, persist the attempt and fold the
    /// outcome into the course rollup.
    pub async fn submit_lesson_quiz(
        &self,
        learner_id: Uuid,
        lesson_id: Uuid,
        answers: AnswerSet,
    ) -> Result<QuizSubmissionOutcome, ProgressionError> {
        let (learner, lesson, module) = self.quiz_preconditions(learner_id, lesson_id).await?;
        let spec = lesson.quiz.as_ref().ok_or_else(|| {
            ProgressionError::NotFound(format!("lesson {lesson_id} has no quiz"))
        })?;

        // Regenerate the same question set the learner was served; the
        // answer key never round-trips through the client.
        let tier = learner.tier.unwrap_or(Tier::Bronze);
        let seed = quiz_seed(learner_id, lesson_id);
        let questions = self
            .questions
            .questions_for(lesson_id, spec, tier, seed)
            .await?;

        let graded = grader::grade(&questions, &answers, self.config.lesson_pass_ratio)?;
        let attempt = self
            .record_attempt(learner_id, lesson_id, answers, &graded)
            .await?;

        let lessons = self.store.lessons_for_module(module.id).await?;
        let patch = ProgressPatch {
            quiz_result: Some((lesson.id, graded.passed)),
            ..Default::default()
        };
        let progress = self
            .adapter
            .merge(learner_id, module.id, patch, move |doc| {
                let rollup = aggregate_course(&lessons, &doc.details);
                doc.settle(rollup.status, rollup.percentage);
            })
            .await?;

        let promoted_to = self
            .promotion
            .after_course_event(learner_id, module.product_id)
            .await?;
        Ok(QuizSubmissionOutcome {
            attempt,
            progress,
            promoted_to,
        })
    }

    async fn quiz_preconditions(
        &self,
        learner_id: Uuid,
        lesson_id: Uuid,
    ) -> Result<(Learner, Lesson, Module), ProgressionError> {
        let learner = self.require_learner(learner_id).await?;
        let lesson = self.require_lesson(lesson_id).await?;
        let module = self.require_module(lesson.module_id).await?;
        self.require_unlocked(&module, &learner)?;

        let watched = self
            .store
            .progress(learner_id, module.id)
            .await?
            .map(|v| v.doc.details.videos_watched.contains(&lesson.id))
            .unwrap_or(false);
        if !watched {
            return Err(ProgressionError::PreconditionNotMet(format!(
                "lesson {lesson_id} video not watched yet"
            )));
        }
        Ok((learner, lesson, module))
    }

    // ----- Assessments -----

    async fn require_assessment(&self, module_id: Uuid) -> Result<Module, ProgressionError> {
        let module = self.require_module(module_id).await?;
        if module.module_type != ModuleType::Assessment {
            return Err(ProgressionError::NotFound(format!(
                "module {module_id} is not an assessment"
            )));
        }
        Ok(module)
    }

    /// The generated assessment quiz, answer keys stripped. Assessments are
    /// accessible at every star level, so only existence and type gate it.
    pub async fn assessment_quiz(
        &self,
        learner_id: Uuid,
        module_id: Uuid,
    ) -> Result<Vec<QuestionView>, ProgressionError> {
        let learner = self.require_learner(learner_id).await?;
        let module = self.require_assessment(module_id).await?;
        let spec = module.quiz.as_ref().ok_or_else(|| {
            ProgressionError::Internal(format!("assessment {module_id} has no quiz spec"))
        })?;

        let tier = learner.tier.unwrap_or(Tier::Bronze);
        let seed = quiz_seed(learner_id, module_id);
        let questions = self
            .questions
            .questions_for(module_id, spec, tier, seed)
            .await?;
        Ok(questions.iter().map(QuestionView::from).collect())
    }

    /// Grade an assessment submission. A pass completes the module, assigns
    /// the tier from the score bands and can fire the None→One transition.
    pub async fn submit_assessment(
        &self,
        learner_id: Uuid,
        module_id: Uuid,
        answers: AnswerSet,
    ) -> Result<QuizSubmissionOutcome, ProgressionError> {
        let learner = self.require_learner(learner_id).await?;
        let module = self.require_assessment(module_id).await?;
        let spec = module.quiz.as_ref().ok_or_else(|| {
            ProgressionError::Internal(format!("assessment {module_id} has no quiz spec"))
        })?;

        let tier = learner.tier.unwrap_or(Tier::Bronze);
        let seed = quiz_seed(learner_id, module_id);
        let questions = self
            .questions
            .questions_for(module_id, spec, tier, seed)
            .await?;

        let graded = grader::grade(&questions, &answers, self.config.assessment_pass_ratio)?;
        let score_pct = ((100.0 * f64::from(graded.score) / f64::from(graded.total)).round()) as u8;
        let attempt = self
            .record_attempt(learner_id, module_id, answers, &graded)
            .await?;

        let passed = graded.passed;
        let patch = ProgressPatch {
            quiz_result: Some((module_id, passed)),
            ..Default::default()
        };
        let progress = self
            .adapter
            .merge(learner_id, module_id, patch, move |doc| {
                // Completion is sticky; a later failed retake never demotes.
                if doc.status == ProgressStatus::Completed {
                    return;
                }
                if passed {
                    doc.settle(ProgressStatus::Completed, 100);
                } else {
                    let best = doc.percentage.max(score_pct);
                    doc.settle(ProgressStatus::InProgress, best.min(99));
                }
            })
            .await?;

        let promoted_to = if passed {
            self.promotion.after_assessment(learner_id, score_pct).await?
        } else {
            None
        };
        Ok(QuizSubmissionOutcome {
            attempt,
            progress,
            promoted_to,
        })
    }

    async fn record_attempt(
        &self,
        learner_id: Uuid,
        target_id: Uuid,
        answers: AnswerSet,
        graded: &grader::GradedQuiz,
    ) -> Result<QuizAttempt, ProgressionError> {
        let attempt = QuizAttempt {
            id: Uuid::new_v4(),
            learner_id,
            target_id,
            answers,
            score: graded.score,
            total: graded.total,
            passed: graded.passed,
            // Assigned by the store, atomically with the append.
            ordinal: 0,
            submitted_at: Utc::now(),
            per_question: graded.per_question.clone(),
        };
        Ok(self.store.append_attempt(attempt).await?)
    }

    // ----- Expert sessions -----

    /// Record attendance of one expert session; attendance is a set insert,
    /// so replays are no-ops. Meeting the quota can fire Two→Three.
    pub async fn record_expert_session(
        &self,
        learner_id: Uuid,
        module_id: Uuid,
        session_id: Uuid,
    ) -> Result<CompletionOutcome, ProgressionError> {
        let learner = self.require_learner(learner_id).await?;
        let module = self.require_module(module_id).await?;
        if module.module_type != ModuleType::ExpertSession {
            return Err(ProgressionError::NotFound(format!(
                "module {module_id} is not an expert-session module"
            )));
        }
        self.require_unlocked(&module, &learner)?;

        let quota = self.config.expert_session_quota.max(1) as usize;
        let patch = ProgressPatch {
            session_attended: Some(session_id),
            ..Default::default()
        };
        let progress = self
            .adapter
            .merge(learner_id, module_id, patch, move |doc| {
                let attended = doc.details.sessions_attended.len();
                let status = if attended >= quota {
                    ProgressStatus::Completed
                } else if attended > 0 {
                    ProgressStatus::InProgress
                } else {
                    ProgressStatus::NotStarted
                };
                let percentage = (100 * attended / quota).min(100) as u8;
                doc.settle(status, percentage);
            })
            .await?;

        let promoted_to = self
            .promotion
            .after_expert_session(learner_id, module.product_id)
            .await?;
        Ok(CompletionOutcome {
            progress,
            promoted_to,
        })
    }

    // ----- External grader callbacks -----

    /// Callback from the external project grader. A failed verdict only
    /// records; it never blocks a later retry and never implies a pass.
    pub async fn on_project_graded(
        &self,
        verdict: GradeVerdict,
    ) -> Result<PromotionOutcome, ProgressionError> {
        self.on_submission_verdict(verdict, SubmissionKind::Project)
            .await
    }

    /// Callback from the external interview analyzer.
    pub async fn on_interview_analyzed(
        &self,
        verdict: GradeVerdict,
    ) -> Result<PromotionOutcome, ProgressionError> {
        self.on_submission_verdict(verdict, SubmissionKind::Interview)
            .await
    }

    async fn on_submission_verdict(
        &self,
        verdict: GradeVerdict,
        kind: SubmissionKind,
    ) -> Result<PromotionOutcome, ProgressionError> {
        self.require_learner(verdict.learner_id).await?;

        let now = Utc::now();
        let submission = Submission {
            id: Uuid::new_v4(),
            learner_id: verdict.learner_id,
            kind,
            score: Some(verdict.score),
            passed: Some(verdict.passed),
            submitted_at: now,
            analyzed_at: Some(now),
        };
        self.store.upsert_submission(submission).await?;

        let promoted_to = if verdict.passed {
            match kind {
                SubmissionKind::Project => {
                    self.promotion.after_project_verdict(verdict.learner_id).await?
                }
                SubmissionKind::Interview => {
                    self.promotion
                        .after_interview_verdict(verdict.learner_id)
                        .await?
                }
            }
        } else {
            None
        };

        let learner = self.require_learner(verdict.learner_id).await?;
        Ok(PromotionOutcome {
            star_level: learner.star_level,
            promoted_to,
        })
    }

    // ----- Overviews -----

    /// Every module of a product annotated with accessibility (computed
    /// fresh from the unlock table) and the learner's progress.
    pub async fn unlocked_modules(
        &self,
        learner_id: Uuid,
        product_id: Uuid,
    ) -> Result<Vec<ModuleOverview>, ProgressionError> {
        let learner = self.require_learner(learner_id).await?;
        let modules = self.store.modules_for_product(product_id).await?;

        let mut overview = Vec::with_capacity(modules.len());
        for module in modules {
            let unlocked = unlock::is_unlocked(module.module_type, learner.star_level);
            let progress = match module.module_type {
                ModuleType::Project => {
                    self.submission_progress(&learner, &module, SubmissionKind::Project)
                        .await?
                }
                ModuleType::Interview => {
                    self.submission_progress(&learner, &module, SubmissionKind::Interview)
                        .await?
                }
                _ => self
                    .store
                    .progress(learner_id, module.id)
                    .await?
                    .map(|v| v.doc),
            };
            overview.push(ModuleOverview {
                module,
                unlocked,
                progress,
            });
        }
        Ok(overview)
    }

    /// Project/interview progress is derived from the active submission, not
    /// stored redundantly.
    async fn submission_progress(
        &self,
        learner: &Learner,
        module: &Module,
        kind: SubmissionKind,
    ) -> Result<Option<ModuleProgress>, ProgressionError> {
        let Some(submission) = self.store.active_submission(learner.id, kind).await? else {
            return Ok(None);
        };
        let mut progress = ModuleProgress::new(learner.id, module.id);
        if submission.passed == Some(true) {
            progress.settle(ProgressStatus::Completed, 100);
        } else {
            progress.settle(ProgressStatus::InProgress, 0);
        }
        Ok(Some(progress))
    }

    pub async fn learner_overview(
        &self,
        learner_id: Uuid,
    ) -> Result<LearnerOverview, ProgressionError> {
        let learner = self.require_learner(learner_id).await?;
        let mut progress = self.store.progress_for_learner(learner_id).await?;
        progress.sort_by_key(|p| p.module_id);
        let mut attempts = self.store.attempts_for_learner(learner_id).await?;
        attempts.sort_by_key(|a| a.submitted_at);
        Ok(LearnerOverview {
            learner,
            progress,
            attempts,
        })
    }
}
