use std::collections::HashMap;

use thiserror::Error;

use crate::db::models::{AssessmentRow, QuestionRow, SessionAnswer};

#[derive(Debug, Error)]
pub(crate) enum GradingError {
    #[error("assessment {assessment_id} is missing from the reference data")]
    MissingAssessment { assessment_id: i64 },
    #[error("question {question_id} is not part of assessment {assessment_id}")]
    MissingReference { assessment_id: i64, question_id: i64 },
}

/// The graded outcome for one answer; consumed by the atomic commit and
/// discarded afterwards.
#[derive(Debug, Clone)]
pub(crate) struct GradedResult {
    pub(crate) answer_id: i64,
    pub(crate) student_id: i64,
    pub(crate) question_id: i64,
    pub(crate) choice_id: Option<i64>,
    pub(crate) answer_text: Option<String>,
    pub(crate) is_correct: bool,
    pub(crate) points: f64,
    pub(crate) feedback: Option<String>,
}

/// In-memory join of assessments and their questions, keyed by assessment id
/// then question id. Built once per batch, never persisted.
pub(crate) struct AssessmentBuild {
    assessments: HashMap<i64, AssessmentEntry>,
}

struct AssessmentEntry {
    assessment: AssessmentRow,
    questions: HashMap<i64, QuestionRow>,
}

impl AssessmentBuild {
    pub(crate) fn new(assessments: Vec<AssessmentRow>, questions: Vec<QuestionRow>) -> Self {
        let mut map: HashMap<i64, AssessmentEntry> = assessments
            .into_iter()
            .map(|assessment| {
                (assessment.id, AssessmentEntry { assessment, questions: HashMap::new() })
            })
            .collect();

        for question in questions {
            if let Some(entry) = map.get_mut(&question.assessment_id) {
                entry.questions.insert(question.question_id, question);
            }
        }

        Self { assessments: map }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.assessments.is_empty()
    }

    pub(crate) fn lookup(
        &self,
        assessment_id: i64,
        question_id: i64,
    ) -> Result<(&AssessmentRow, &QuestionRow), GradingError> {
        let entry = self
            .assessments
            .get(&assessment_id)
            .ok_or(GradingError::MissingAssessment { assessment_id })?;
        let question = entry
            .questions
            .get(&question_id)
            .ok_or(GradingError::MissingReference { assessment_id, question_id })?;
        Ok((&entry.assessment, question))
    }
}

/// Deterministic grading for objective question types. No partial credit: the
/// correct choice earns full points, anything else (including no choice at
/// all) earns zero.
pub(crate) fn grade_objective(question: &QuestionRow, answer: &SessionAnswer) -> GradedResult {
    let (is_correct, points) = match answer.choice_id {
        None => (false, 0.0),
        Some(choice_id) if Some(choice_id) == question.correct_choice_id => {
            (true, question.points)
        }
        Some(_) => (false, 0.0),
    };

    GradedResult {
        answer_id: answer.id,
        student_id: answer.student_id,
        question_id: question.question_id,
        choice_id: answer.choice_id,
        answer_text: None,
        is_correct,
        points,
        feedback: None,
    }
}

/// Model-assisted grading outcome for a short-answer item. Correct means
/// strictly more than half credit; exactly half is not a pass.
pub(crate) fn grade_free_text(
    question: &QuestionRow,
    answer: &SessionAnswer,
    score: f64,
    feedback: String,
) -> GradedResult {
    let threshold = question.points / 2.0;

    GradedResult {
        answer_id: answer.id,
        student_id: answer.student_id,
        question_id: question.question_id,
        choice_id: None,
        answer_text: answer.answer_text.clone(),
        is_correct: score > threshold,
        points: score,
        feedback: Some(feedback),
    }
}

/// Cumulative points per student across the whole batch.
pub(crate) fn aggregate_scores(graded: &[GradedResult]) -> HashMap<i64, f64> {
    let mut scores = HashMap::new();
    for result in graded {
        *scores.entry(result.student_id).or_insert(0.0) += result.points;
    }
    scores
}

pub(crate) fn unique_assessment_ids(answers: &[SessionAnswer]) -> Vec<i64> {
    let mut seen = Vec::new();
    for answer in answers {
        if !seen.contains(&answer.assessment_id) {
            seen.push(answer.assessment_id);
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::types::QuestionType;

    fn choice_question(points: f64, correct_choice_id: i64) -> QuestionRow {
        QuestionRow {
            assessment_id: 1,
            question_id: 10,
            question_text: "Pick one".to_string(),
            answer_text: None,
            correct_choice_id: Some(correct_choice_id),
            points,
            question_type: QuestionType::MultipleChoice,
        }
    }

    fn short_answer_question(points: f64) -> QuestionRow {
        QuestionRow {
            assessment_id: 1,
            question_id: 11,
            question_text: "Explain".to_string(),
            answer_text: Some("Reference".to_string()),
            correct_choice_id: None,
            points,
            question_type: QuestionType::ShortAnswer,
        }
    }

    fn answer(id: i64, student_id: i64, question_id: i64, choice_id: Option<i64>) -> SessionAnswer {
        SessionAnswer {
            id,
            assessment_id: 1,
            student_id,
            question_id,
            choice_id,
            answer_text: Some("free text".to_string()),
        }
    }

    #[test]
    fn objective_correct_choice_earns_full_points() {
        let question = choice_question(10.0, 7);
        let graded = grade_objective(&question, &answer(1, 100, 10, Some(7)));
        assert!(graded.is_correct);
        assert_eq!(graded.points, 10.0);
    }

    #[test]
    fn objective_wrong_choice_earns_zero() {
        let question = choice_question(10.0, 7);
        let graded = grade_objective(&question, &answer(1, 100, 10, Some(8)));
        assert!(!graded.is_correct);
        assert_eq!(graded.points, 0.0);
    }

    #[test]
    fn objective_null_choice_is_unanswered() {
        let question = choice_question(10.0, 7);
        let graded = grade_objective(&question, &answer(1, 100, 10, None));
        assert!(!graded.is_correct);
        assert_eq!(graded.points, 0.0);
    }

    #[test]
    fn free_text_threshold_is_strict() {
        let question = short_answer_question(10.0);
        let item = answer(1, 100, 11, None);

        let above = grade_free_text(&question, &item, 6.0, "good".to_string());
        assert!(above.is_correct);
        assert_eq!(above.points, 6.0);

        let at_half = grade_free_text(&question, &item, 5.0, "half".to_string());
        assert!(!at_half.is_correct);
        assert_eq!(at_half.points, 5.0);
    }

    #[test]
    fn free_text_keeps_feedback_and_answer_text() {
        let question = short_answer_question(10.0);
        let graded =
            grade_free_text(&question, &answer(1, 100, 11, None), 8.0, "well done".to_string());
        assert_eq!(graded.feedback.as_deref(), Some("well done"));
        assert_eq!(graded.answer_text.as_deref(), Some("free text"));
    }

    #[test]
    fn aggregate_sums_points_per_student() {
        let question = choice_question(10.0, 7);
        let graded = vec![
            grade_objective(&question, &answer(1, 100, 10, Some(7))),
            grade_objective(&question, &answer(2, 100, 10, Some(8))),
            grade_objective(&question, &answer(3, 200, 10, Some(7))),
        ];

        let scores = aggregate_scores(&graded);
        assert_eq!(scores.get(&100), Some(&10.0));
        assert_eq!(scores.get(&200), Some(&10.0));
    }

    #[test]
    fn lookup_reports_missing_question() {
        let build = AssessmentBuild::new(
            vec![AssessmentRow {
                id: 1,
                title: "Quiz".to_string(),
                description: None,
                max_score: 100.0,
                subject_title: None,
            }],
            vec![choice_question(10.0, 7)],
        );

        assert!(build.lookup(1, 10).is_ok());
        assert!(matches!(
            build.lookup(1, 99),
            Err(GradingError::MissingReference { assessment_id: 1, question_id: 99 })
        ));
        assert!(matches!(
            build.lookup(2, 10),
            Err(GradingError::MissingAssessment { assessment_id: 2 })
        ));
    }

    #[test]
    fn unique_assessment_ids_preserves_first_seen_order() {
        let answers = vec![
            SessionAnswer {
                id: 1,
                assessment_id: 5,
                student_id: 1,
                question_id: 1,
                choice_id: None,
                answer_text: None,
            },
            SessionAnswer {
                id: 2,
                assessment_id: 3,
                student_id: 1,
                question_id: 2,
                choice_id: None,
                answer_text: None,
            },
            SessionAnswer {
                id: 3,
                assessment_id: 5,
                student_id: 2,
                question_id: 1,
                choice_id: None,
                answer_text: None,
            },
        ];

        assert_eq!(unique_assessment_ids(&answers), vec![5, 3]);
    }
}
