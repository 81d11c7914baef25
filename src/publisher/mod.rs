//! Publisher - decides which prices to write and submits them on-chain

pub mod batcher;
pub mod decision;

pub use batcher::{run_submissions, submit_with_retry, BatchConfig, SubmissionSummary};
pub use decision::{decide_update, evaluate, UpdateDecision};
