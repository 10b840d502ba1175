//! Lesson completion and course aggregation.
//!
//! The rollup computed here is the only source of truth for course
//! completion; client-reported percentages are never authoritative.

use serde::{Deserialize, Serialize};

use super::types::{Lesson, ProgressDetails, ProgressStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseRollup {
    pub completed: usize,
    pub total: usize,
    pub percentage: u8,
    pub status: ProgressStatus,
}

/// A lesson is complete iff its video-watched flag is set and, when the
/// lesson carries a quiz, at least one attempt has passed. The watched flag
/// is set once by an explicit video-ended event; partial playback never
/// counts.
pub fn is_lesson_complete(lesson: &Lesson, details: &ProgressDetails) -> bool {
    if !details.videos_watched.contains(&lesson.id) {
        return false;
    }
    match lesson.quiz {
        None => true,
        Some(_) => details.quizzes_passed.get(&lesson.id).copied().unwrap_or(false),
    }
}

/// Fold all lessons of a course module into a module-level rollup.
pub fn aggregate_course(lessons: &[Lesson], details: &ProgressDetails) -> CourseRollup {
    let total = lessons.len();
    if total == 0 {
        return CourseRollup {
            completed: 0,
            total: 0,
            percentage: 0,
            status: ProgressStatus::NotStarted,
        };
    }

    let completed = lessons
        .iter()
        .filter(|lesson| is_lesson_complete(lesson, details))
        .count();

    let percentage = ((100.0 * completed as f64 / total as f64).round()) as u8;
    let status = if completed == total {
        ProgressStatus::Completed
    } else if completed > 0 {
        ProgressStatus::InProgress
    } else {
        ProgressStatus::NotStarted
    };

    CourseRollup {
        completed,
        total,
        percentage,
        status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progression::types::QuizSpec;
    use uuid::Uuid;

    fn lesson(module_id: Uuid, order: i32, quiz: bool) -> Lesson {
        Lesson {
            id: Uuid::new_v4(),
            module_id,
            title: format!("lesson {order}"),
            lesson_order: order,
            video_url: Some("https://videos.example/1".to_string()),
            quiz: quiz.then(|| QuizSpec {
                topic: "ownership".to_string(),
                question_count: 5,
            }),
        }
    }

    #[test]
    fn video_only_lesson_completes_on_watch() {
        let l = lesson(Uuid::new_v4(), 1, false);
        let mut details = ProgressDetails::default();
        assert!(!is_lesson_complete(&l, &details));
        details.videos_watched.insert(l.id);
        assert!(is_lesson_complete(&l, &details));
    }

    #[test]
    fn quiz_lesson_needs_a_passed_attempt() {
        let l = lesson(Uuid::new_v4(), 1, true);
        let mut details = ProgressDetails::default();
        details.videos_watched.insert(l.id);
        // Video watched, no attempt yet.
        assert!(!is_lesson_complete(&l, &details));
        details.quizzes_passed.insert(l.id, false);
        assert!(!is_lesson_complete(&l, &details));
        details.quizzes_passed.insert(l.id, true);
        assert!(is_lesson_complete(&l, &details));
    }

    #[test]
    fn empty_course_is_not_started() {
        let rollup = aggregate_course(&[], &ProgressDetails::default());
        assert_eq!(rollup.percentage, 0);
        assert_eq!(rollup.status, ProgressStatus::NotStarted);
    }

    #[test]
    fn partial_course_is_in_progress() {
        let module_id = Uuid::new_v4();
        let lessons = vec![
            lesson(module_id, 1, false),
            lesson(module_id, 2, false),
            lesson(module_id, 3, false),
        ];
        let mut details = ProgressDetails::default();
        details.videos_watched.insert(lessons[0].id);

        let rollup = aggregate_course(&lessons, &details);
        assert_eq!(rollup.completed, 1);
        assert_eq!(rollup.percentage, 33);
        assert_eq!(rollup.status, ProgressStatus::InProgress);
    }

    #[test]
    fn completion_is_order_independent() {
        let module_id = Uuid::new_v4();
        let lessons = vec![
            lesson(module_id, 1, false),
            lesson(module_id, 2, false),
            lesson(module_id, 3, false),
        ];

        let orders: Vec<Vec<usize>> = vec![
            vec![0, 1, 2],
            vec![2, 1, 0],
            vec![1, 2, 0],
        ];
        let mut rollups = Vec::new();
        for order in orders {
            let mut details = ProgressDetails::default();
            for idx in order {
                details.videos_watched.insert(lessons[idx].id);
            }
            rollups.push(aggregate_course(&lessons, &details));
        }
        assert!(rollups.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(rollups[0].status, ProgressStatus::Completed);
        assert_eq!(rollups[0].percentage, 100);
    }
}
