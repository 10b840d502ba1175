//! Quiz grading: a pure function over the answer key and the submission.
//!
//! One passing threshold per check kind comes in from configuration; the
//! grader itself never hard-codes a cutoff.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use super::error::ProgressionError;
use super::types::{Answer, AnswerSet, QuestionKind, QuestionVerdict, QuizQuestion};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradedQuiz {
    pub score: u32,
    pub total: u32,
    pub passed: bool,
    pub per_question: Vec<QuestionVerdict>,
}

/// Score a submitted answer set against the question list.
///
/// Grading is total over the question set: a missing answer counts as
/// incorrect, never as an error. An empty submission, an answer for an
/// unknown question, or an answer whose shape does not match the question
/// kind is an `InvalidSubmission`.
pub fn grade(
    questions: &[QuizQuestion],
    answers: &AnswerSet,
    pass_ratio: f64,
) -> Result<GradedQuiz, ProgressionError> {
    if questions.is_empty() {
        return Err(ProgressionError::Internal(
            "quiz has no questions".to_string(),
        ));
    }
    if answers.is_empty() {
        return Err(ProgressionError::InvalidSubmission(
            "empty answer set".to_string(),
        ));
    }

    let known: BTreeSet<Uuid> = questions.iter().map(|q| q.id).collect();
    if let Some(unknown) = answers.keys().find(|id| !known.contains(id)) {
        return Err(ProgressionError::InvalidSubmission(format!(
            "answer references unknown question {unknown}"
        )));
    }

    let mut score = 0u32;
    let mut per_question = Vec::with_capacity(questions.len());

    for question in questions {
        let correct = match answers.get(&question.id) {
            None => false,
            Some(answer) => is_correct(question, answer)?,
        };
        if correct {
            score += 1;
        }
        per_question.push(QuestionVerdict {
            question_id: question.id,
            correct,
        });
    }

    let total = questions.len() as u32;
    let passed = f64::from(score) / f64::from(total) >= pass_ratio;

    Ok(GradedQuiz {
        score,
        total,
        passed,
        per_question,
    })
}

fn is_correct(question: &QuizQuestion, answer: &Answer) -> Result<bool, ProgressionError> {
    match (question.kind, answer) {
        // Single-choice: correct iff it equals the key's single option.
        (QuestionKind::Mcq | QuestionKind::TrueFalse, Answer::One(picked)) => {
            Ok(question.correct.len() == 1 && question.correct.contains(picked))
        }
        // Multi-select: exact set equality, no partial credit.
        (QuestionKind::Msq, Answer::Many(picked)) => Ok(*picked == question.correct),
        (QuestionKind::Msq, Answer::One(_)) => Err(ProgressionError::InvalidSubmission(format!(
            "question {} expects a set of option ids",
            question.id
        ))),
        (_, Answer::Many(_)) => Err(ProgressionError::InvalidSubmission(format!(
            "question {} expects a single option id",
            question.id
        ))),
    }
}
