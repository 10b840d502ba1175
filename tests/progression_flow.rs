//! End-to-end progression scenarios against the in-memory store and a
//! deterministic question source.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use trackserver::config::EngineConfig;
use trackserver::progression::types::{
    Answer, AnswerSet, Learner, Lesson, Module, ModuleType, ProgressStatus, QuestionKind,
    QuizOption, QuizQuestion, QuizSpec, StarLevel, Tier, GradeVerdict,
};
use trackserver::progression::{ProgressionEngine, ProgressionError};
use trackserver::questions::{
    quiz_seed, FallbackBank, QuestionCache, QuestionCacheConfig, QuestionError, QuestionService,
    QuestionSource,
};
use trackserver::store::{MemoryStore, TrackStore};

/// Deterministic stand-in for the AI generator: same seed, same questions.
struct StubSource;

fn stub_questions(spec: &QuizSpec, seed: u64) -> Vec<QuizQuestion> {
    let namespace = Uuid::from_u64_pair(seed, 0);
    (0..spec.question_count)
        .map(|i| {
            let id = Uuid::new_v5(&namespace, format!("q{i}").as_bytes());
            let right = Uuid::new_v5(&id, b"right");
            let wrong = Uuid::new_v5(&id, b"wrong");
            QuizQuestion {
                id,
                prompt: format!("question {i}"),
                kind: QuestionKind::Mcq,
                options: vec![
                    QuizOption {
                        id: right,
                        text: "right".to_string(),
                    },
                    QuizOption {
                        id: wrong,
                        text: "wrong".to_string(),
                    },
                ],
                correct: BTreeSet::from([right]),
            }
        })
        .collect()
}

#[async_trait]
impl QuestionSource for StubSource {
    async fn generate(
        &self,
        spec: &QuizSpec,
        _tier: Tier,
        seed: u64,
    ) -> Result<Vec<QuizQuestion>, QuestionError> {
        Ok(stub_questions(spec, seed))
    }
}

fn quiz_spec(topic: &str, count: u32) -> QuizSpec {
    QuizSpec {
        topic: topic.to_string(),
        question_count: count,
    }
}

/// Answer the first `correct` questions right and the rest wrong.
fn answers_for(spec: &QuizSpec, learner_id: Uuid, target_id: Uuid, correct: usize) -> AnswerSet {
    let questions = stub_questions(spec, quiz_seed(learner_id, target_id));
    let mut answers = BTreeMap::new();
    for (i, q) in questions.iter().enumerate() {
        let right = *q.correct.iter().next().unwrap();
        let wrong = q.options.iter().find(|o| o.id != right).unwrap().id;
        let picked = if i < correct { right } else { wrong };
        answers.insert(q.id, Answer::One(picked));
    }
    answers
}

struct Track {
    store: Arc<MemoryStore>,
    engine: ProgressionEngine,
    product_id: Uuid,
    assessment: Module,
    lessons: Vec<Lesson>,
    sessions: Module,
    interview: Module,
}

fn module(product_id: Uuid, ty: ModuleType, seq: i32, quiz: Option<QuizSpec>) -> Module {
    Module {
        id: Uuid::new_v4(),
        product_id,
        title: format!("{ty:?} {seq}"),
        module_type: ty,
        sequence: seq,
        quiz,
    }
}

fn lesson(module_id: Uuid, order: i32, quiz: Option<QuizSpec>) -> Lesson {
    Lesson {
        id: Uuid::new_v4(),
        module_id,
        title: format!("lesson {order}"),
        lesson_order: order,
        video_url: Some("https://videos.example/v".to_string()),
        quiz,
    }
}

/// Seed one product: an assessment, three courses (five lessons, two with
/// quizzes), an expert-session module, a project and an interview.
async fn seed_track() -> Track {
    let store = Arc::new(MemoryStore::new());
    let source = Arc::new(StubSource);
    let cache = QuestionCache::new(QuestionCacheConfig {
        ttl: Duration::from_secs(60),
    });
    let questions = Arc::new(QuestionService::new(source, FallbackBank::new(), cache, 1));
    let engine = ProgressionEngine::new(store.clone(), questions, EngineConfig::default());

    let product_id = Uuid::new_v4();
    let assessment = module(
        product_id,
        ModuleType::Assessment,
        1,
        Some(quiz_spec("placement", 5)),
    );
    let courses = vec![
        module(product_id, ModuleType::Course, 2, None),
        module(product_id, ModuleType::Course, 3, None),
        module(product_id, ModuleType::Course, 4, None),
    ];
    let lessons = vec![
        lesson(courses[0].id, 1, None),
        lesson(courses[0].id, 2, None),
        lesson(courses[1].id, 1, Some(quiz_spec("borrowing", 5))),
        lesson(courses[2].id, 1, None),
        lesson(courses[2].id, 2, Some(quiz_spec("lifetimes", 5))),
    ];
    let sessions = module(product_id, ModuleType::ExpertSession, 5, None);
    let project = module(product_id, ModuleType::Project, 6, None);
    let interview = module(product_id, ModuleType::Interview, 7, None);

    store.insert_module(assessment.clone()).await.unwrap();
    for m in &courses {
        store.insert_module(m.clone()).await.unwrap();
    }
    for l in &lessons {
        store.insert_lesson(l.clone()).await.unwrap();
    }
    store.insert_module(sessions.clone()).await.unwrap();
    store.insert_module(project.clone()).await.unwrap();
    store.insert_module(interview.clone()).await.unwrap();

    Track {
        store,
        engine,
        product_id,
        assessment,
        lessons,
        sessions,
        interview,
    }
}

async fn new_learner(track: &Track, star: StarLevel) -> Uuid {
    let mut learner = Learner::new("Test Learner", "career-switcher");
    learner.star_level = star;
    if star != StarLevel::None {
        learner.tier = Some(Tier::Silver);
    }
    let id = learner.id;
    track.store.upsert_learner(learner).await.unwrap();
    id
}

async fn star_of(track: &Track, learner_id: Uuid) -> StarLevel {
    track
        .store
        .learner(learner_id)
        .await
        .unwrap()
        .unwrap()
        .star_level
}

/// Complete one lesson end to end: video event, then the quiz if it has one.
async fn complete_lesson(track: &Track, learner_id: Uuid, lesson: &Lesson) {
    track
        .engine
        .evaluate_video_completion(learner_id, lesson.id)
        .await
        .unwrap();
    if let Some(spec) = &lesson.quiz {
        let answers = answers_for(spec, learner_id, lesson.id, spec.question_count as usize);
        track
            .engine
            .submit_lesson_quiz(learner_id, lesson.id, answers)
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn lesson_without_quiz_completes_on_video_event() {
    let track = seed_track().await;
    let learner_id = new_learner(&track, StarLevel::One).await;

    let outcome = track
        .engine
        .evaluate_video_completion(learner_id, track.lessons[0].id)
        .await
        .unwrap();
    // One of the two lessons in this course is complete.
    assert_eq!(outcome.progress.status, ProgressStatus::InProgress);
    assert_eq!(outcome.progress.percentage, 50);
}

#[tokio::test]
async fn quiz_lesson_stays_incomplete_until_a_passed_attempt() {
    let track = seed_track().await;
    let learner_id = new_learner(&track, StarLevel::One).await;
    let quiz_lesson = &track.lessons[2];

    // Quiz access before the video is a precondition failure.
    let denied = track.engine.lesson_quiz(learner_id, quiz_lesson.id).await;
    assert!(matches!(
        denied,
        Err(ProgressionError::PreconditionNotMet(_))
    ));

    let outcome = track
        .engine
        .evaluate_video_completion(learner_id, quiz_lesson.id)
        .await
        .unwrap();
    // Video watched, quiz not yet passed: the single lesson is incomplete.
    assert_eq!(outcome.progress.status, ProgressStatus::NotStarted);

    // Quiz access is now allowed and the key is stripped.
    let questions = track
        .engine
        .lesson_quiz(learner_id, quiz_lesson.id)
        .await
        .unwrap();
    assert_eq!(questions.len(), 5);

    let spec = quiz_lesson.quiz.as_ref().unwrap();
    let answers = answers_for(spec, learner_id, quiz_lesson.id, 4);
    let outcome = track
        .engine
        .submit_lesson_quiz(learner_id, quiz_lesson.id, answers)
        .await
        .unwrap();
    // 4 of 5 clears the 70% threshold.
    assert!(outcome.attempt.passed);
    assert_eq!(outcome.progress.status, ProgressStatus::Completed);
}

#[tokio::test]
async fn video_completion_event_is_idempotent() {
    let track = seed_track().await;
    let learner_id = new_learner(&track, StarLevel::One).await;
    let lesson = &track.lessons[0];

    let first = track
        .engine
        .evaluate_video_completion(learner_id, lesson.id)
        .await
        .unwrap();
    let second = track
        .engine
        .evaluate_video_completion(learner_id, lesson.id)
        .await
        .unwrap();

    assert_eq!(first.progress.status, second.progress.status);
    assert_eq!(first.progress.percentage, second.progress.percentage);
    assert_eq!(first.progress.details, second.progress.details);
    assert_eq!(second.promoted_to, None);
}

#[tokio::test]
async fn served_assessment_quiz_grades_against_the_same_ids() {
    let track = seed_track().await;
    let learner_id = new_learner(&track, StarLevel::None).await;

    let views = track
        .engine
        .assessment_quiz(learner_id, track.assessment.id)
        .await
        .unwrap();
    assert_eq!(views.len(), 5);

    // Answers built purely from the served payload must reference known
    // question and option ids when graded.
    let mut answers = AnswerSet::new();
    for view in &views {
        answers.insert(view.id, Answer::One(view.options[0].id));
    }
    let outcome = track
        .engine
        .submit_assessment(learner_id, track.assessment.id, answers)
        .await
        .unwrap();
    assert_eq!(outcome.attempt.score, 5);
    assert!(outcome.attempt.passed);
    assert_eq!(outcome.promoted_to, Some(StarLevel::One));

    // Non-assessment modules have no assessment quiz.
    let denied = track
        .engine
        .assessment_quiz(learner_id, track.sessions.id)
        .await;
    assert!(matches!(denied, Err(ProgressionError::NotFound(_))));
}

#[tokio::test]
async fn assessment_pass_assigns_tier_and_first_star() {
    let track = seed_track().await;
    let learner_id = new_learner(&track, StarLevel::None).await;
    let spec = track.assessment.quiz.as_ref().unwrap();

    let answers = answers_for(spec, learner_id, track.assessment.id, 5);
    let outcome = track
        .engine
        .submit_assessment(learner_id, track.assessment.id, answers)
        .await
        .unwrap();
    assert!(outcome.attempt.passed);
    assert_eq!(outcome.progress.status, ProgressStatus::Completed);
    assert_eq!(outcome.promoted_to, Some(StarLevel::One));

    let learner = track.store.learner(learner_id).await.unwrap().unwrap();
    assert_eq!(learner.star_level, StarLevel::One);
    // 100% lands in the gold band.
    assert_eq!(learner.tier, Some(Tier::Gold));

    // A retake is a no-op for level and tier.
    let answers = answers_for(spec, learner_id, track.assessment.id, 4);
    let retake = track
        .engine
        .submit_assessment(learner_id, track.assessment.id, answers)
        .await
        .unwrap();
    assert_eq!(retake.promoted_to, None);
    assert_eq!(retake.attempt.ordinal, 2);
    let learner = track.store.learner(learner_id).await.unwrap().unwrap();
    assert_eq!(learner.tier, Some(Tier::Gold));
}

#[tokio::test]
async fn failed_assessment_keeps_star_level_none() {
    let track = seed_track().await;
    let learner_id = new_learner(&track, StarLevel::None).await;
    let spec = track.assessment.quiz.as_ref().unwrap();

    let answers = answers_for(spec, learner_id, track.assessment.id, 2);
    let outcome = track
        .engine
        .submit_assessment(learner_id, track.assessment.id, answers)
        .await
        .unwrap();
    assert!(!outcome.attempt.passed);
    assert_eq!(outcome.promoted_to, None);
    assert_eq!(outcome.progress.status, ProgressStatus::InProgress);
    assert_eq!(star_of(&track, learner_id).await, StarLevel::None);
}

#[tokio::test]
async fn partial_track_keeps_star_level_and_gates() {
    let track = seed_track().await;
    let learner_id = new_learner(&track, StarLevel::One).await;

    // Two courses done fully, the third only partially.
    complete_lesson(&track, learner_id, &track.lessons[0]).await;
    complete_lesson(&track, learner_id, &track.lessons[1]).await;
    complete_lesson(&track, learner_id, &track.lessons[2]).await;
    complete_lesson(&track, learner_id, &track.lessons[3]).await;

    assert_eq!(star_of(&track, learner_id).await, StarLevel::One);

    let modules = track
        .engine
        .unlocked_modules(learner_id, track.product_id)
        .await
        .unwrap();
    let by_type = |ty: ModuleType| {
        modules
            .iter()
            .find(|m| m.module.module_type == ty)
            .unwrap()
    };
    assert!(by_type(ModuleType::Assessment).unlocked);
    assert!(by_type(ModuleType::Course).unlocked);
    assert!(!by_type(ModuleType::ExpertSession).unlocked);
    assert!(!by_type(ModuleType::Project).unlocked);
    assert!(!by_type(ModuleType::Interview).unlocked);
}

#[tokio::test]
async fn completing_every_course_fires_second_star() {
    let track = seed_track().await;
    let learner_id = new_learner(&track, StarLevel::One).await;

    for lesson in &track.lessons[..4] {
        complete_lesson(&track, learner_id, lesson).await;
    }
    assert_eq!(star_of(&track, learner_id).await, StarLevel::One);

    // The last lesson of the last course closes the set.
    complete_lesson(&track, learner_id, &track.lessons[4]).await;
    assert_eq!(star_of(&track, learner_id).await, StarLevel::Two);
}

#[tokio::test]
async fn expert_session_quota_fires_third_star() {
    let track = seed_track().await;
    let learner_id = new_learner(&track, StarLevel::Two).await;

    for i in 0..3 {
        let outcome = track
            .engine
            .record_expert_session(learner_id, track.sessions.id, Uuid::new_v4())
            .await
            .unwrap();
        if i < 2 {
            assert_eq!(outcome.promoted_to, None);
        } else {
            assert_eq!(outcome.promoted_to, Some(StarLevel::Three));
            assert_eq!(outcome.progress.status, ProgressStatus::Completed);
        }
    }
    assert_eq!(star_of(&track, learner_id).await, StarLevel::Three);
}

#[tokio::test]
async fn locked_module_access_is_rejected() {
    let track = seed_track().await;
    let learner_id = new_learner(&track, StarLevel::One).await;

    let denied = track
        .engine
        .record_expert_session(learner_id, track.sessions.id, Uuid::new_v4())
        .await;
    assert!(matches!(
        denied,
        Err(ProgressionError::PreconditionNotMet(_))
    ));
}

#[tokio::test]
async fn passed_project_unlocks_interview() {
    let track = seed_track().await;
    let learner_id = new_learner(&track, StarLevel::Three).await;

    let before = track
        .engine
        .unlocked_modules(learner_id, track.product_id)
        .await
        .unwrap();
    let interview_before = before
        .iter()
        .find(|m| m.module.id == track.interview.id)
        .unwrap();
    assert!(!interview_before.unlocked);

    let outcome = track
        .engine
        .on_project_graded(GradeVerdict {
            learner_id,
            score: 88,
            passed: true,
        })
        .await
        .unwrap();
    assert_eq!(outcome.promoted_to, Some(StarLevel::Four));
    assert_eq!(outcome.star_level, StarLevel::Four);

    let after = track
        .engine
        .unlocked_modules(learner_id, track.product_id)
        .await
        .unwrap();
    let interview_after = after
        .iter()
        .find(|m| m.module.id == track.interview.id)
        .unwrap();
    assert!(interview_after.unlocked);
    let project = after
        .iter()
        .find(|m| m.module.module_type == ModuleType::Project)
        .unwrap();
    assert_eq!(
        project.progress.as_ref().map(|p| p.status),
        Some(ProgressStatus::Completed)
    );
}

#[tokio::test]
async fn failed_verdicts_record_but_never_promote() {
    let track = seed_track().await;
    let learner_id = new_learner(&track, StarLevel::Three).await;

    let outcome = track
        .engine
        .on_project_graded(GradeVerdict {
            learner_id,
            score: 40,
            passed: false,
        })
        .await
        .unwrap();
    assert_eq!(outcome.promoted_to, None);
    assert_eq!(outcome.star_level, StarLevel::Three);

    // The failed verdict is visible as in-progress module state.
    let modules = track
        .engine
        .unlocked_modules(learner_id, track.product_id)
        .await
        .unwrap();
    let project = modules
        .iter()
        .find(|m| m.module.module_type == ModuleType::Project)
        .unwrap();
    assert_eq!(
        project.progress.as_ref().map(|p| p.status),
        Some(ProgressStatus::InProgress)
    );
}

#[tokio::test]
async fn passed_interview_fires_fifth_star() {
    let track = seed_track().await;
    let learner_id = new_learner(&track, StarLevel::Four).await;

    let outcome = track
        .engine
        .on_interview_analyzed(GradeVerdict {
            learner_id,
            score: 91,
            passed: true,
        })
        .await
        .unwrap();
    assert_eq!(outcome.promoted_to, Some(StarLevel::Five));

    // Replaying the callback changes nothing further.
    let replay = track
        .engine
        .on_interview_analyzed(GradeVerdict {
            learner_id,
            score: 91,
            passed: true,
        })
        .await
        .unwrap();
    assert_eq!(replay.promoted_to, None);
    assert_eq!(replay.star_level, StarLevel::Five);
}

#[tokio::test]
async fn star_level_never_decreases() {
    let track = seed_track().await;
    let learner_id = new_learner(&track, StarLevel::Two).await;

    // Events belonging to earlier transitions fire with no effect.
    for lesson in &track.lessons {
        complete_lesson(&track, learner_id, lesson).await;
    }
    let spec = track.assessment.quiz.as_ref().unwrap();
    let answers = answers_for(spec, learner_id, track.assessment.id, 1);
    track
        .engine
        .submit_assessment(learner_id, track.assessment.id, answers)
        .await
        .unwrap();

    assert_eq!(star_of(&track, learner_id).await, StarLevel::Two);
}

#[tokio::test]
async fn concurrent_video_and_quiz_events_both_persist() {
    let track = seed_track().await;
    let learner_id = new_learner(&track, StarLevel::One).await;
    let quiz_lesson = &track.lessons[4];
    let plain_lesson = &track.lessons[3];

    // Same course module, two different lessons, fired concurrently.
    let a = track
        .engine
        .evaluate_video_completion(learner_id, plain_lesson.id);
    let b = track
        .engine
        .evaluate_video_completion(learner_id, quiz_lesson.id);
    let (a, b) = tokio::join!(a, b);
    a.unwrap();
    b.unwrap();

    let stored = track
        .store
        .progress(learner_id, quiz_lesson.module_id)
        .await
        .unwrap()
        .unwrap()
        .doc;
    assert!(stored.details.videos_watched.contains(&plain_lesson.id));
    assert!(stored.details.videos_watched.contains(&quiz_lesson.id));
}
