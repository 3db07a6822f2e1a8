pub mod job_ctx;
pub mod job_runner;

pub use job_ctx::JobCtx;
pub use job_runner::{JobOutcome, JobRunner, JobServices};
