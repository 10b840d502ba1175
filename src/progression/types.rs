//! Types for the Progression module (mastery engine)
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

// ============================================================================
// LEARNER MODELS
// ============================================================================

/// Ordinal mastery stage gating which module types are accessible.
/// Monotonically non-decreasing for a given learner.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum StarLevel {
    #[default]
    None,
    One,
    Two,
    Three,
    Four,
    Five,
}

impl StarLevel {
    /// The single legal successor, or `None` at the top of the ladder.
    pub fn next(self) -> Option<StarLevel> {
        match self {
            Self::None => Some(Self::One),
            Self::One => Some(Self::Two),
            Self::Two => Some(Self::Three),
            Self::Three => Some(Self::Four),
            Self::Four => Some(Self::Five),
            Self::Five => None,
        }
    }

    pub fn rank(self) -> u8 {
        match self {
            Self::None => 0,
            Self::One => 1,
            Self::Two => 2,
            Self::Three => 3,
            Self::Four => 4,
            Self::Five => 5,
        }
    }
}

impl std::fmt::Display for StarLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.rank())
    }
}

/// Difficulty band assigned from the first assessment's score; selects the
/// difficulty of generated quiz content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Bronze,
    Silver,
    Gold,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bronze => write!(f, "bronze"),
            Self::Silver => write!(f, "silver"),
            Self::Gold => write!(f, "gold"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Learner {
    pub id: Uuid,
    pub display_name: String,
    pub star_level: StarLevel,
    /// Unset until the first assessment assigns it.
    pub tier: Option<Tier>,
    pub background: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Learner {
    pub fn new(display_name: impl Into<String>, background: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            display_name: display_name.into(),
            star_level: StarLevel::None,
            tier: None,
            background: background.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

// ============================================================================
// CATALOG MODELS (read-only to the engine)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleType {
    Assessment,
    Course,
    ExpertSession,
    Project,
    Interview,
}

/// What the question generator should produce for a lesson or assessment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizSpec {
    pub topic: String,
    pub question_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    pub id: Uuid,
    pub product_id: Uuid,
    pub title: String,
    pub module_type: ModuleType,
    pub sequence: i32,
    /// Present on Assessment modules: the module-level quiz to generate.
    pub quiz: Option<QuizSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lesson {
    pub id: Uuid,
    pub module_id: Uuid,
    pub title: String,
    pub lesson_order: i32,
    pub video_url: Option<String>,
    /// Present when the lesson carries an embedded quiz.
    pub quiz: Option<QuizSpec>,
}

// ============================================================================
// QUIZ MODELS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    Mcq,
    Msq,
    TrueFalse,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizOption {
    pub id: Uuid,
    pub text: String,
}

/// A question together with its answer key. Never serialized to callers;
/// handlers expose [`QuestionView`] instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub id: Uuid,
    pub prompt: String,
    pub kind: QuestionKind,
    pub options: Vec<QuizOption>,
    pub correct: BTreeSet<Uuid>,
}

/// Caller-facing question with the answer key stripped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionView {
    pub id: Uuid,
    pub prompt: String,
    pub kind: QuestionKind,
    pub options: Vec<QuizOption>,
}

impl From<&QuizQuestion> for QuestionView {
    fn from(q: &QuizQuestion) -> Self {
        Self {
            id: q.id,
            prompt: q.prompt.clone(),
            kind: q.kind,
            options: q.options.clone(),
        }
    }
}

/// One submitted answer: a single option id for MCQ/TF, a set for MSQ.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Answer {
    One(Uuid),
    Many(BTreeSet<Uuid>),
}

pub type AnswerSet = BTreeMap<Uuid, Answer>;

/// Immutable record of one grading event. Append-only; "best" and "latest"
/// are derived, never stored redundantly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizAttempt {
    pub id: Uuid,
    pub learner_id: Uuid,
    /// Lesson id for lesson quizzes, module id for assessments.
    pub target_id: Uuid,
    pub answers: AnswerSet,
    pub score: u32,
    pub total: u32,
    pub passed: bool,
    pub ordinal: u32,
    pub submitted_at: DateTime<Utc>,
    pub per_question: Vec<QuestionVerdict>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionVerdict {
    pub question_id: Uuid,
    pub correct: bool,
}

// ============================================================================
// PROGRESS MODELS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
}

impl std::fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not_started"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// Nested collections inside a progress document. Merged key-by-key, never
/// overwritten wholesale: sets union, and a recorded pass is sticky.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressDetails {
    pub videos_watched: BTreeSet<Uuid>,
    /// Per-lesson quiz outcome; `true` once any attempt passed.
    pub quizzes_passed: BTreeMap<Uuid, bool>,
    pub sessions_attended: BTreeSet<Uuid>,
}

impl ProgressDetails {
    /// Structural merge of a patch into this document: sets union, and a
    /// recorded pass stays recorded.
    pub fn apply(&mut self, patch: &ProgressPatch) {
        if let Some(lesson_id) = patch.video_watched {
            self.videos_watched.insert(lesson_id);
        }
        if let Some((lesson_id, passed)) = patch.quiz_result {
            let entry = self.quizzes_passed.entry(lesson_id).or_insert(false);
            *entry = *entry || passed;
        }
        if let Some(session_id) = patch.session_attended {
            self.sessions_attended.insert(session_id);
        }
    }
}

/// One completion event's contribution to a progress document. Collections
/// union into the stored details; derived fields are always recomputed.
#[derive(Debug, Clone, Default)]
pub struct ProgressPatch {
    pub video_watched: Option<Uuid>,
    pub quiz_result: Option<(Uuid, bool)>,
    pub session_attended: Option<Uuid>,
}

/// The persisted, mergeable record of a learner's interaction with one
/// module. Created on first interaction, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleProgress {
    pub learner_id: Uuid,
    pub module_id: Uuid,
    pub status: ProgressStatus,
    pub percentage: u8,
    pub details: ProgressDetails,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ModuleProgress {
    pub fn new(learner_id: Uuid, module_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            learner_id,
            module_id,
            status: ProgressStatus::NotStarted,
            percentage: 0,
            details: ProgressDetails::default(),
            started_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Settle status/percentage and keep the `Completed implies percentage = 100`
    /// invariant; completion timestamps are set once.
    pub fn settle(&mut self, status: ProgressStatus, percentage: u8) {
        self.status = status;
        self.percentage = percentage.min(100);
        self.updated_at = Utc::now();
        if status == ProgressStatus::Completed {
            self.percentage = 100;
            if self.completed_at.is_none() {
                self.completed_at = Some(self.updated_at);
            }
        }
    }
}

// ============================================================================
// SUBMISSION MODELS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionKind {
    Project,
    Interview,
}

/// One active project/interview submission per learner; immutable once
/// analyzed except for a retry creating a new submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: Uuid,
    pub learner_id: Uuid,
    pub kind: SubmissionKind,
    pub score: Option<u32>,
    pub passed: Option<bool>,
    pub submitted_at: DateTime<Utc>,
    pub analyzed_at: Option<DateTime<Utc>>,
}

/// Verdict reported by the external grading/analysis collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeVerdict {
    pub learner_id: Uuid,
    pub score: u32,
    pub passed: bool,
}

// ============================================================================
// RESPONSE MODELS
// ============================================================================

/// A module annotated with accessibility and the learner's progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleOverview {
    pub module: Module,
    pub unlocked: bool,
    pub progress: Option<ModuleProgress>,
}

/// Result of a completion event: the updated progress document plus any
/// star-level change the event triggered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionOutcome {
    pub progress: ModuleProgress,
    pub promoted_to: Option<StarLevel>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizSubmissionOutcome {
    pub attempt: QuizAttempt,
    pub progress: ModuleProgress,
    pub promoted_to: Option<StarLevel>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromotionOutcome {
    pub star_level: StarLevel,
    pub promoted_to: Option<StarLevel>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnerOverview {
    pub learner: Learner,
    pub progress: Vec<ModuleProgress>,
    pub attempts: Vec<QuizAttempt>,
}
