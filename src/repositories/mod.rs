pub(crate) mod commit;
pub(crate) mod grader_tasks;
pub(crate) mod reference_data;
pub(crate) mod session_answers;
pub(crate) mod sessions;
pub(crate) mod store;
pub(crate) mod student_rows;
pub(crate) mod task_items;
pub(crate) mod usage_ledger;
