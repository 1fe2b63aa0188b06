//! Stateless quiz scoring.
//!
//! Answers are keyed by question position. A question inserted or removed between the
//! moment a student loads a quiz and the moment they submit shifts every later key.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use ts_rs::TS;
use utoipa::ToSchema;

use crate::models::Question;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct QuizScore {
    pub correct_count: usize,
    pub total: usize,
}

impl QuizScore {
    /// Rounded half away from zero. A quiz with no questions scores 0.
    pub fn percentage(&self) -> u32 {
        if self.total == 0 {
            return 0;
        }
        (self.correct_count as f64 / self.total as f64 * 100.0).round() as u32
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct QuestionOutcome {
    pub index: usize,
    pub selected: Option<i64>,
    pub correct_answer_index: usize,
    pub is_correct: bool,
}

/// QuizResult
///
/// Returned by the quiz submission endpoint: the score plus the per-question key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct QuizResult {
    pub correct_count: usize,
    pub total: usize,
    pub percentage: u32,
    pub outcomes: Vec<QuestionOutcome>,
}

fn is_correct(question: &Question, selected: Option<i64>) -> bool {
    selected
        .and_then(|raw| usize::try_from(raw).ok())
        .is_some_and(|idx| idx == question.correct_answer_index)
}

fn selected_for(answers: &BTreeMap<i64, i64>, index: usize) -> Option<i64> {
    i64::try_from(index)
        .ok()
        .and_then(|key| answers.get(&key).copied())
}

/// score
///
/// Counts answers equal to the question's correct index. Unanswered questions, negative
/// indices and indices past the last option are simply wrong. Keys that name no question
/// are ignored.
pub fn score(questions: &[Question], answers: &BTreeMap<i64, i64>) -> QuizScore {
    let correct_count = questions
        .iter()
        .enumerate()
        .filter(|(i, q)| is_correct(q, selected_for(answers, *i)))
        .count();

    QuizScore {
        correct_count,
        total: questions.len(),
    }
}

/// grade
///
/// `score` with a per-question breakdown.
pub fn grade(questions: &[Question], answers: &BTreeMap<i64, i64>) -> QuizResult {
    let outcomes: Vec<QuestionOutcome> = questions
        .iter()
        .enumerate()
        .map(|(index, q)| {
            let selected = selected_for(answers, index);
            QuestionOutcome {
                index,
                selected,
                correct_answer_index: q.correct_answer_index,
                is_correct: is_correct(q, selected),
            }
        })
        .collect();

    let summary = score(questions, answers);
    QuizResult {
        correct_count: summary.correct_count,
        total: summary.total,
        percentage: summary.percentage(),
        outcomes,
    }
}
