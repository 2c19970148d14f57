pub(crate) mod lifecycle;
pub(crate) mod worker;


pub(crate) use worker::{GradingPipeline, Outcome};
