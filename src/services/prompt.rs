use crate::db::models::{AssessmentRow, QuestionRow};

const IDENTITY_PROMPT: &str = r#"# Identity
You grade student responses to assessment test questions. You are given a question, a
reference answer, a maximum point value, and a student's free-text response. Judge accuracy
against the reference answer first; in its absence, judge grammar, sentence structure, and
clarity. Score on the numeric scale given by the maximum point value and provide feedback
that supports growth and higher-level learning."#;

const INSTRUCTIONS_PROMPT: &str = r#"## Instructions
Respond with a single JSON object of the shape {"score": float, "feedback": string}."#;

const RULES_PROMPT: &str = r#"## Rules
The response must be directly parseable as JSON. Do not wrap it in markdown fences and do
not add commentary outside the JSON object."#;

const EXAMPLE_PROMPT: &str = r#"## Example response
{"score": 0.9, "feedback": "You understood the question well and expressed a clear idea.
Watch verb tense and subject-verb agreement: instead of 'He go buy on TikTok because easy',
write 'He buys things on TikTok because it is easy.'"}"#;

pub(crate) fn build_grading_prompt(
    assessment: &AssessmentRow,
    question: &QuestionRow,
    student_text: &str,
) -> String {
    format!(
        "{IDENTITY_PROMPT}\n\n{INSTRUCTIONS_PROMPT}\n\n## Assessment context\n\
         Title: {}\nDescription: {}\nSubject: {}\nMax score: {}\n\n\
         {RULES_PROMPT}\n\n## Question\n\
         Question: {}\nReference answer: {}\nMax points: {}\nStudent response: {}\n\n\
         {EXAMPLE_PROMPT}\n",
        assessment.title,
        assessment.description.as_deref().unwrap_or(""),
        assessment.subject_title.as_deref().unwrap_or(""),
        assessment.max_score,
        question.question_text,
        question.answer_text.as_deref().unwrap_or(""),
        question.points,
        student_text,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::types::QuestionType;

    #[test]
    fn prompt_carries_question_and_student_response() {
        let assessment = AssessmentRow {
            id: 1,
            title: "Unit 3 quiz".to_string(),
            description: Some("Reading comprehension".to_string()),
            max_score: 100.0,
            subject_title: Some("English".to_string()),
        };
        let question = QuestionRow {
            assessment_id: 1,
            question_id: 5,
            question_text: "Why does the narrator leave?".to_string(),
            answer_text: Some("He leaves to find work.".to_string()),
            correct_choice_id: None,
            points: 10.0,
            question_type: QuestionType::ShortAnswer,
        };

        let prompt = build_grading_prompt(&assessment, &question, "Because he needed a job");

        assert!(prompt.contains("Why does the narrator leave?"));
        assert!(prompt.contains("He leaves to find work."));
        assert!(prompt.contains("Max points: 10"));
        assert!(prompt.contains("Because he needed a job"));
        assert!(prompt.contains("{\"score\": float, \"feedback\": string}"));
    }
}
