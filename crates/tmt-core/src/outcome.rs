//! Verdict taxonomy shared by every pipeline stage.
//!
//! Three closed enums cover the three kinds of thing that can be judged:
//! a compile ([`CompilationOutcome`]), a stage's attempt to produce or
//! validate a file ([`ExecutionOutcome`]), and a solution's run against one
//! testcase ([`EvaluationOutcome`]). They are deliberately not unified into
//! one enum: a compile has no notion of "wrong answer", and a stage outcome
//! has no notion of "accepted".

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompilationOutcome {
    Success,
    Failed,
    TimedOut,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompilationResult {
    pub verdict: Option<CompilationOutcome>,
    pub log: String,
    /// Populated only for a target compile (the driver knows the exact
    /// executable it produced); wildcard compiles leave this `None`.
    pub produced_file: Option<PathBuf>,
}

impl CompilationResult {
    pub fn success(produced_file: Option<PathBuf>) -> Self {
        Self {
            verdict: Some(CompilationOutcome::Success),
            log: String::new(),
            produced_file,
        }
    }

    pub fn failed(log: impl Into<String>) -> Self {
        Self {
            verdict: Some(CompilationOutcome::Failed),
            log: log.into(),
            produced_file: None,
        }
    }

    pub fn timed_out(log: impl Into<String>) -> Self {
        Self {
            verdict: Some(CompilationOutcome::TimedOut),
            log: log.into(),
            produced_file: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.verdict == Some(CompilationOutcome::Success)
    }
}

/// Verdict for one of the four `GenerationResult` slots: did this stage
/// manage to produce or validate what was asked of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionOutcome {
    Success,
    /// Not attempted because an earlier slot already failed.
    Skipped,
    /// Not attempted, but by policy this is not a failure (forced output,
    /// or checker policy waives re-validation).
    SkippedSuccess,
    /// The attempt ran but produced a wrong result (validator rejected,
    /// nonzero/signaled exit with a readable reason).
    Failed,
    /// The attempt was killed or exited on a signal other than the ones
    /// `Failed` already explains (crash, not a validation rejection).
    Crashed,
    TimedOut,
}

impl ExecutionOutcome {
    pub fn is_ok(self) -> bool {
        matches!(self, ExecutionOutcome::Success | ExecutionOutcome::SkippedSuccess)
    }
}

impl std::fmt::Display for ExecutionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            ExecutionOutcome::Success => "OK",
            ExecutionOutcome::Skipped => "SKIP",
            ExecutionOutcome::SkippedSuccess => "SKIP(ok)",
            ExecutionOutcome::Failed => "FAIL",
            ExecutionOutcome::Crashed => "RTE",
            ExecutionOutcome::TimedOut => "TLE",
        };
        f.write_str(tag)
    }
}

/// The four-slot per-test result of the generation pipeline (§4.7 of the
/// design: `input_generation`, `input_validation`, `output_generation`,
/// `output_validation`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationResult {
    pub input_generation: Option<ExecutionOutcome>,
    pub input_validation: Option<ExecutionOutcome>,
    pub output_generation: Option<ExecutionOutcome>,
    pub output_validation: Option<ExecutionOutcome>,
    pub reason: String,
    pub is_output_forced: bool,
}

impl GenerationResult {
    /// Every *required* slot succeeded: the codename belongs in the
    /// testcase summary.
    pub fn is_success(&self) -> bool {
        [
            self.input_generation,
            self.input_validation,
            self.output_generation,
            self.output_validation,
        ]
        .into_iter()
        .all(|slot| slot.is_some_and(ExecutionOutcome::is_ok))
    }

    /// Checks the well-formedness invariant from §4.7: once a slot fails,
    /// every slot downstream of it must be `Skipped`.
    pub fn is_well_formed(&self) -> bool {
        let skipped = |o: Option<ExecutionOutcome>| matches!(o, Some(ExecutionOutcome::Skipped));

        if !matches!(self.input_generation, Some(o) if o.is_ok()) {
            return skipped(self.input_validation)
                && skipped(self.output_generation)
                && skipped(self.output_validation);
        }
        if !matches!(self.input_validation, Some(o) if o.is_ok()) {
            return skipped(self.output_generation) && skipped(self.output_validation);
        }
        if !matches!(self.output_generation, Some(o) if o.is_ok())
            || !matches!(self.input_validation, Some(o) if o.is_ok())
        {
            return skipped(self.output_validation);
        }
        true
    }
}

/// Verdict for one invocation of a solution (batch or interactive) against
/// one testcase, after an optional checker pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvaluationOutcome {
    RunSuccess,
    Accepted,
    Partial,
    Wrong,
    NoFile,
    NoOutput,
    Timeout,
    TimeoutWall,
    OutputLimit,
    RunerrorOutput,
    RunerrorSignal,
    RunerrorMemory,
    RunerrorExitcode,
    ManagerCrashed,
    ManagerTimeout,
    CheckerCrashed,
    CheckerFailed,
    CheckerTimedout,
    InternalError,
}

impl EvaluationOutcome {
    /// True for the verdict groups the original implementation calls
    /// "accepted" when mapping a solution run into a generation-stage
    /// `ExecutionOutcome` (used while baking answers during `gen`).
    fn in_accepted_group(self) -> bool {
        matches!(self, EvaluationOutcome::RunSuccess | EvaluationOutcome::Accepted)
    }

    fn in_timeout_group(self) -> bool {
        matches!(self, EvaluationOutcome::Timeout | EvaluationOutcome::TimeoutWall)
    }

    fn in_runtime_error_group(self) -> bool {
        matches!(
            self,
            EvaluationOutcome::NoFile
                | EvaluationOutcome::NoOutput
                | EvaluationOutcome::OutputLimit
                | EvaluationOutcome::RunerrorOutput
                | EvaluationOutcome::RunerrorSignal
                | EvaluationOutcome::RunerrorMemory
                | EvaluationOutcome::RunerrorExitcode
        )
    }

    fn in_judge_error_group(self) -> bool {
        matches!(
            self,
            EvaluationOutcome::ManagerCrashed
                | EvaluationOutcome::ManagerTimeout
                | EvaluationOutcome::CheckerCrashed
                | EvaluationOutcome::CheckerFailed
                | EvaluationOutcome::CheckerTimedout
                | EvaluationOutcome::InternalError
        )
    }
}

impl std::fmt::Display for EvaluationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            EvaluationOutcome::RunSuccess => "OK",
            EvaluationOutcome::Accepted => "AC",
            EvaluationOutcome::Partial => "PARTIAL",
            EvaluationOutcome::Wrong => "WA",
            EvaluationOutcome::NoFile => "NO_FILE",
            EvaluationOutcome::NoOutput => "NO_OUTPUT",
            EvaluationOutcome::Timeout => "TLE",
            EvaluationOutcome::TimeoutWall => "TLE(wall)",
            EvaluationOutcome::OutputLimit => "OLE",
            EvaluationOutcome::RunerrorOutput => "RTE(output)",
            EvaluationOutcome::RunerrorSignal => "RTE(signal)",
            EvaluationOutcome::RunerrorMemory => "MLE",
            EvaluationOutcome::RunerrorExitcode => "RTE(exit)",
            EvaluationOutcome::ManagerCrashed => "MANAGER_CRASHED",
            EvaluationOutcome::ManagerTimeout => "MANAGER_TIMEOUT",
            EvaluationOutcome::CheckerCrashed => "JE(checker)",
            EvaluationOutcome::CheckerFailed => "JE(checker)",
            EvaluationOutcome::CheckerTimedout => "JE(checker-tle)",
            EvaluationOutcome::InternalError => "INTERNAL_ERROR",
        };
        f.write_str(tag)
    }
}

/// Maps a solution run's verdict onto the generation-stage `ExecutionOutcome`
/// it should be recorded as when that solution run was used to *bake an
/// answer* (the `gen` pipeline's "produce-answer" slot).
pub fn eval_outcome_to_run_outcome(outcome: EvaluationOutcome) -> ExecutionOutcome {
    if outcome.in_accepted_group() {
        ExecutionOutcome::Success
    } else if outcome.in_timeout_group() {
        ExecutionOutcome::TimedOut
    } else if outcome.in_runtime_error_group() {
        ExecutionOutcome::Crashed
    } else {
        debug_assert!(outcome.in_judge_error_group());
        ExecutionOutcome::Failed
    }
}

/// Maps a checker's verdict on a generated/forced answer onto the
/// generation-stage `ExecutionOutcome` for the `output_validation` slot.
pub fn eval_outcome_to_grade_outcome(outcome: EvaluationOutcome) -> ExecutionOutcome {
    match outcome {
        EvaluationOutcome::Accepted => ExecutionOutcome::Success,
        EvaluationOutcome::Wrong | EvaluationOutcome::Partial => ExecutionOutcome::Failed,
        _ if outcome.in_judge_error_group() => ExecutionOutcome::Crashed,
        _ => ExecutionOutcome::Failed,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub verdict: EvaluationOutcome,
    pub cpu_time_sec: f64,
    pub wall_time_sec: f64,
    pub max_rss_kib: u64,
    pub exit_code: Option<i32>,
    pub exit_signal: Option<i32>,
    /// Owned by the caller; the checker reads it, then the caller deletes
    /// it. `None` once reclaimed or when the stage never wrote one.
    pub output_file: Option<PathBuf>,
    pub checker_reason: String,
}

impl EvaluationResult {
    pub fn internal_error(reason: impl Into<String>) -> Self {
        Self {
            verdict: EvaluationOutcome::InternalError,
            cpu_time_sec: 0.0,
            wall_time_sec: 0.0,
            max_rss_kib: 0,
            exit_code: None,
            exit_signal: None,
            output_file: None,
            checker_reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_outcome_is_ok_only_for_success_variants() {
        assert!(ExecutionOutcome::Success.is_ok());
        assert!(ExecutionOutcome::SkippedSuccess.is_ok());
        assert!(!ExecutionOutcome::Skipped.is_ok());
        assert!(!ExecutionOutcome::Failed.is_ok());
        assert!(!ExecutionOutcome::Crashed.is_ok());
        assert!(!ExecutionOutcome::TimedOut.is_ok());
    }

    #[test]
    fn generation_result_well_formed_happy_path() {
        let result = GenerationResult {
            input_generation: Some(ExecutionOutcome::Success),
            input_validation: Some(ExecutionOutcome::Success),
            output_generation: Some(ExecutionOutcome::Success),
            output_validation: Some(ExecutionOutcome::SkippedSuccess),
            ..Default::default()
        };
        assert!(result.is_well_formed());
        assert!(result.is_success());
    }

    #[test]
    fn generation_result_cascades_skip_from_input_generation() {
        let result = GenerationResult {
            input_generation: Some(ExecutionOutcome::TimedOut),
            input_validation: Some(ExecutionOutcome::Skipped),
            output_generation: Some(ExecutionOutcome::Skipped),
            output_validation: Some(ExecutionOutcome::Skipped),
            ..Default::default()
        };
        assert!(result.is_well_formed());
        assert!(!result.is_success());
    }

    #[test]
    fn generation_result_detects_missing_cascade() {
        let result = GenerationResult {
            input_generation: Some(ExecutionOutcome::Failed),
            input_validation: Some(ExecutionOutcome::Success), // should have been Skipped
            output_generation: Some(ExecutionOutcome::Skipped),
            output_validation: Some(ExecutionOutcome::Skipped),
            ..Default::default()
        };
        assert!(!result.is_well_formed());
    }

    #[test]
    fn generation_result_cascades_skip_from_input_validation() {
        let result = GenerationResult {
            input_generation: Some(ExecutionOutcome::Success),
            input_validation: Some(ExecutionOutcome::Failed),
            output_generation: Some(ExecutionOutcome::Skipped),
            output_validation: Some(ExecutionOutcome::Skipped),
            ..Default::default()
        };
        assert!(result.is_well_formed());
        assert!(!result.is_success());
    }

    #[test]
    fn eval_outcome_maps_accepted_group_to_success() {
        assert_eq!(
            eval_outcome_to_run_outcome(EvaluationOutcome::RunSuccess),
            ExecutionOutcome::Success
        );
        assert_eq!(
            eval_outcome_to_run_outcome(EvaluationOutcome::Accepted),
            ExecutionOutcome::Success
        );
    }

    #[test]
    fn eval_outcome_maps_timeout_group() {
        assert_eq!(
            eval_outcome_to_run_outcome(EvaluationOutcome::Timeout),
            ExecutionOutcome::TimedOut
        );
        assert_eq!(
            eval_outcome_to_run_outcome(EvaluationOutcome::TimeoutWall),
            ExecutionOutcome::TimedOut
        );
    }

    #[test]
    fn eval_outcome_maps_runtime_error_group_to_crashed() {
        assert_eq!(
            eval_outcome_to_run_outcome(EvaluationOutcome::RunerrorMemory),
            ExecutionOutcome::Crashed
        );
        assert_eq!(
            eval_outcome_to_run_outcome(EvaluationOutcome::NoFile),
            ExecutionOutcome::Crashed
        );
    }

    #[test]
    fn eval_outcome_maps_judge_error_group_to_failed() {
        assert_eq!(
            eval_outcome_to_run_outcome(EvaluationOutcome::CheckerCrashed),
            ExecutionOutcome::Failed
        );
    }

    #[test]
    fn grade_outcome_maps_accepted_and_wrong() {
        assert_eq!(
            eval_outcome_to_grade_outcome(EvaluationOutcome::Accepted),
            ExecutionOutcome::Success
        );
        assert_eq!(
            eval_outcome_to_grade_outcome(EvaluationOutcome::Wrong),
            ExecutionOutcome::Failed
        );
        assert_eq!(
            eval_outcome_to_grade_outcome(EvaluationOutcome::CheckerTimedout),
            ExecutionOutcome::Crashed
        );
    }

    #[test]
    fn compilation_result_success_helper_sets_verdict() {
        let result = CompilationResult::success(Some(PathBuf::from("build/checker")));
        assert!(result.is_success());
        assert_eq!(result.produced_file, Some(PathBuf::from("build/checker")));
    }
}
