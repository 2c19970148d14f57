use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::db::models::{ModelUsageRecord, StudentTaskRow};
use crate::db::types::{QuestionType, UsageOutcome};
use crate::queue::GradeRequest;
use crate::repositories::commit::{AnswerUpsert, CommitBatch, ScoreUpsert};
use crate::repositories::store::GraderStore;
use crate::services::grading::{self, GradedResult};
use crate::services::model_grader::{GradeModel, ModelGradeError};
use crate::tasks::grading::lifecycle::{self, ItemResolution, TaskResolution};

/// The queue-level fate of one delivery. Every code path through the pipeline
/// resolves to exactly one of these; lower layers never touch the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Acknowledge,
    Retry,
    Drop,
}

impl Outcome {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Outcome::Acknowledge => "acknowledge",
            Outcome::Retry => "retry",
            Outcome::Drop => "drop",
        }
    }
}

pub(crate) struct GradingPipeline {
    store: Arc<dyn GraderStore>,
    model: Arc<dyn GradeModel>,
    provider: String,
    model_id: String,
    max_task_attempts: i32,
}

impl GradingPipeline {
    pub(crate) fn new(
        store: Arc<dyn GraderStore>,
        model: Arc<dyn GradeModel>,
        provider: &str,
        model_id: &str,
        max_task_attempts: i32,
    ) -> Self {
        Self {
            store,
            model,
            provider: provider.to_string(),
            model_id: model_id.to_string(),
            max_task_attempts,
        }
    }

    pub(crate) async fn process(&self, request: &GradeRequest) -> Outcome {
        let started = Instant::now();
        let outcome = self.run(request).await;

        metrics::counter!("grading_batches_total", "outcome" => outcome.as_str()).increment(1);
        metrics::histogram!("grading_batch_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        outcome
    }

    async fn run(&self, request: &GradeRequest) -> Outcome {
        let session_token = request.session_token.as_str();

        let task = match lifecycle::resume_or_create(
            self.store.as_ref(),
            session_token,
            &self.model_id,
            self.max_task_attempts,
        )
        .await
        {
            Ok(TaskResolution::Ready(task)) => task,
            Ok(TaskResolution::Evicted(task)) => {
                tracing::warn!(
                    session_token,
                    task_id = task.id,
                    attempts = task.attempts,
                    "attempt ceiling exceeded; evicting grader task"
                );
                return self.cleanup_and_drop(session_token).await;
            }
            Ok(TaskResolution::Absent) => {
                tracing::warn!(session_token, "task upsert yielded no row; dropping");
                return self.cleanup_and_drop(session_token).await;
            }
            Err(err) => {
                tracing::error!(session_token, error = %err, "failed to resolve grader task");
                return Outcome::Retry;
            }
        };

        tracing::info!(
            session_token,
            task_id = task.id,
            attempts = task.attempts,
            "grader task resolved"
        );

        let items = match lifecycle::pending_items(
            self.store.as_ref(),
            session_token,
            &self.model_id,
            task.id,
        )
        .await
        {
            Ok(ItemResolution::Pending(items)) => items,
            Ok(ItemResolution::Empty) => {
                tracing::info!(session_token, task_id = task.id, "no gradable items; dropping");
                return self.cleanup_and_drop(session_token).await;
            }
            Err(err) => {
                tracing::error!(session_token, error = %err, "failed to resolve task items");
                return Outcome::Retry;
            }
        };

        let item_keys: Vec<i64> = items.iter().map(|item| item.item_key).collect();
        let answers = match self.store.load_answers_by_item_keys(&item_keys).await {
            Ok(answers) if !answers.is_empty() => answers,
            Ok(_) => {
                // Items exist but their answers do not resolve yet; treat as a
                // read race with the upstream writer rather than data loss.
                tracing::warn!(session_token, task_id = task.id, "answers missing; retrying");
                return Outcome::Retry;
            }
            Err(err) => {
                tracing::error!(session_token, error = %err, "failed to load session answers");
                return Outcome::Retry;
            }
        };

        let assessment_ids = grading::unique_assessment_ids(&answers);
        let build = match self.store.load_reference_data(&assessment_ids).await {
            Ok((assessments, questions)) => grading::AssessmentBuild::new(assessments, questions),
            Err(err) => {
                tracing::error!(session_token, error = %err, "failed to load reference data");
                return Outcome::Retry;
            }
        };
        if build.is_empty() {
            tracing::warn!(session_token, task_id = task.id, "reference data missing; retrying");
            return Outcome::Retry;
        }

        if let Err(err) = self.store.upsert_student_rows(request.session_id, &answers).await {
            tracing::error!(session_token, error = %err, "failed to upsert student score rows");
            return Outcome::Retry;
        }
        let students = match self.store.load_student_task_rows(request.session_id).await {
            Ok(rows) => rows,
            Err(err) => {
                tracing::error!(session_token, error = %err, "failed to load student score rows");
                return Outcome::Retry;
            }
        };
        let students_by_id: HashMap<i64, StudentTaskRow> =
            students.into_iter().map(|row| (row.student_id, row)).collect();

        let mut graded: Vec<GradedResult> = Vec::with_capacity(answers.len());
        let mut usage: Vec<ModelUsageRecord> = Vec::new();
        let mut model_failed = false;

        for answer in &answers {
            let (assessment, question) = match build.lookup(answer.assessment_id, answer.question_id)
            {
                Ok(pair) => pair,
                Err(err) => {
                    // Grading against a missing question would silently award
                    // zero; abort the batch and let redelivery pick it up once
                    // the reference data lands.
                    tracing::error!(
                        session_token,
                        answer_id = answer.id,
                        error = %err,
                        "reference data incomplete; retrying batch"
                    );
                    return Outcome::Retry;
                }
            };

            if question.question_type == QuestionType::ShortAnswer {
                let student_text = answer.answer_text.as_deref().unwrap_or("");
                match self.model.grade(assessment, question, student_text).await {
                    Ok(grade) => {
                        usage.push(self.usage_record(
                            request.organization_id,
                            grade.input_tokens,
                            grade.output_tokens,
                            UsageOutcome::Success,
                        ));
                        graded.push(grading::grade_free_text(
                            question,
                            answer,
                            grade.score,
                            grade.feedback,
                        ));
                    }
                    Err(ModelGradeError::AttemptsExhausted {
                        attempts,
                        input_tokens,
                        last_error,
                    }) => {
                        tracing::error!(
                            session_token,
                            answer_id = answer.id,
                            attempts,
                            last_error = %last_error,
                            "model grading failed; retrying whole batch"
                        );
                        usage.push(self.usage_record(
                            request.organization_id,
                            input_tokens,
                            0,
                            UsageOutcome::Fail,
                        ));
                        // No partial grading: one failed item aborts the batch.
                        model_failed = true;
                        break;
                    }
                }
            } else {
                graded.push(grading::grade_objective(question, answer));
            }
        }

        // Usage is ledgered on both outcomes; a failed call still consumed
        // input tokens that belong on the organization's bill.
        self.append_usage(&usage).await;

        if model_failed {
            return Outcome::Retry;
        }

        let Some(batch) = build_commit(task.id, request.session_id, &graded, &students_by_id)
        else {
            tracing::warn!(session_token, task_id = task.id, "student row missing; retrying");
            return Outcome::Retry;
        };

        match self.store.commit_batch(&batch).await {
            Ok(receipt) => {
                tracing::info!(
                    session_token,
                    task_id = task.id,
                    answers = receipt.answers_upserted,
                    items = receipt.items_completed,
                    scores = receipt.scores_upserted,
                    "grading batch committed"
                );
                Outcome::Acknowledge
            }
            Err(err) => {
                tracing::error!(
                    session_token,
                    task_id = task.id,
                    error = %err,
                    "atomic commit failed; retrying"
                );
                Outcome::Retry
            }
        }
    }

    /// Poison-message guard: delete the task and the session-scoped artifacts
    /// so nothing orphaned is left behind, then drop the message for good. A
    /// failed cleanup retries the message so the deletes run again.
    async fn cleanup_and_drop(&self, session_token: &str) -> Outcome {
        match self.store.delete_task_and_session_artifacts(session_token).await {
            Ok(()) => Outcome::Drop,
            Err(err) => {
                tracing::error!(session_token, error = %err, "failed to clean up session");
                Outcome::Retry
            }
        }
    }

    fn usage_record(
        &self,
        organization_id: i64,
        input_tokens: i64,
        output_tokens: i64,
        outcome: UsageOutcome,
    ) -> ModelUsageRecord {
        ModelUsageRecord {
            organization_id,
            input_tokens,
            output_tokens,
            provider: self.provider.clone(),
            model_id: self.model_id.clone(),
            outcome,
        }
    }

    async fn append_usage(&self, records: &[ModelUsageRecord]) {
        if records.is_empty() {
            return;
        }
        match self.store.append_usage_ledger(records).await {
            Ok(count) => tracing::debug!(count, "usage ledger appended"),
            Err(err) => tracing::error!(error = %err, "failed to append usage ledger"),
        }
    }
}

fn build_commit(
    task_id: i64,
    session_id: i64,
    graded: &[GradedResult],
    students: &HashMap<i64, StudentTaskRow>,
) -> Option<CommitBatch> {
    let mut answers = Vec::with_capacity(graded.len());
    let mut item_keys = Vec::with_capacity(graded.len());
    for result in graded {
        let student = students.get(&result.student_id)?;
        answers.push(AnswerUpsert {
            assessment_student_id: student.id,
            question_id: result.question_id,
            choice_id: result.choice_id,
            answer_text: result.answer_text.clone(),
            is_correct: result.is_correct,
            feedback: result.feedback.clone(),
            points: result.points,
        });
        item_keys.push(result.answer_id);
    }

    let totals = grading::aggregate_scores(graded);
    let mut scores = Vec::with_capacity(totals.len());
    for (student_id, score) in totals {
        let student = students.get(&student_id)?;
        scores.push(ScoreUpsert {
            student_id,
            assessment_id: student.assessment_id,
            session_id,
            score,
        });
    }

    Some(CommitBatch { task_id, answers, item_keys, scores })
}
