//! Shared error taxonomy and verdict model for the test-case generation and
//! invocation pipeline.

pub mod error;
pub mod outcome;

pub use error::{Result, TmtError};
pub use outcome::{
    CompilationOutcome, CompilationResult, EvaluationOutcome, EvaluationResult, ExecutionOutcome,
    GenerationResult, eval_outcome_to_grade_outcome, eval_outcome_to_run_outcome,
};
