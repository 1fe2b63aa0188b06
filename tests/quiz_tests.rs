use course_portal::{models::Question, quiz};
use std::collections::BTreeMap;

fn question(options: usize, correct: usize) -> Question {
    Question {
        question_text: format!("correct is {correct}"),
        code_snippet: None,
        options: (0..options).map(|i| format!("option {i}")).collect(),
        correct_answer_index: correct,
    }
}

fn answers(pairs: &[(i64, i64)]) -> BTreeMap<i64, i64> {
    pairs.iter().copied().collect()
}

#[test]
fn test_score_counts_matching_answers() {
    let questions = vec![question(3, 1), question(4, 3)];
    let result = quiz::score(&questions, &answers(&[(0, 1), (1, 2)]));

    assert_eq!(result.correct_count, 1);
    assert_eq!(result.total, 2);
    assert_eq!(result.percentage(), 50);
}

#[test]
fn test_scoring_is_deterministic() {
    let questions = vec![question(3, 1), question(4, 3), question(2, 0)];
    let submitted = answers(&[(0, 1), (1, 3), (2, 1)]);

    assert_eq!(
        quiz::score(&questions, &submitted),
        quiz::score(&questions, &submitted)
    );
    assert_eq!(
        quiz::grade(&questions, &submitted),
        quiz::grade(&questions, &submitted)
    );
}

#[test]
fn test_unanswered_and_out_of_range_answers_are_wrong() {
    let questions = vec![question(2, 0), question(2, 1), question(2, 1)];
    let result = quiz::score(&questions, &answers(&[(1, -1), (2, 9)]));

    assert_eq!(result.correct_count, 0);
    assert_eq!(result.total, 3);
}

#[test]
fn test_unknown_question_keys_are_ignored() {
    let questions = vec![question(2, 0)];
    let result = quiz::score(&questions, &answers(&[(0, 0), (5, 0), (-1, 0)]));

    assert_eq!(result.correct_count, 1);
    assert_eq!(result.total, 1);
}

#[test]
fn test_empty_quiz_scores_zero() {
    let result = quiz::score(&[], &answers(&[(0, 0)]));
    assert_eq!(result.total, 0);
    assert_eq!(result.percentage(), 0);
}

#[test]
fn test_grade_breakdown() {
    let questions = vec![question(3, 1), question(4, 3), question(2, 0)];
    let result = quiz::grade(&questions, &answers(&[(0, 1), (1, 2)]));

    assert_eq!(result.correct_count, 1);
    assert_eq!(result.total, 3);
    assert_eq!(result.percentage, 33);

    assert!(result.outcomes[0].is_correct);
    assert_eq!(result.outcomes[1].selected, Some(2));
    assert_eq!(result.outcomes[1].correct_answer_index, 3);
    assert!(!result.outcomes[1].is_correct);
    assert_eq!(result.outcomes[2].selected, None);
}
