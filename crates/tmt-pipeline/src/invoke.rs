//! The `invoke` pipeline (§6a `tmt invoke`): compiles a submission and
//! grades it against every successful testcase, reusing the same solution
//! stage (§4.6) the `gen` pipeline bakes model answers with.
//!
//! Grounded on `original_source::internal::commands::invoke.command_invoke`:
//! compile submission, compile checker/interactor, iterate
//! `testcases/summary` in file order, run solution then checker (batch) or
//! the paired interactor (interactive), and warn about unavailable
//! testcases and an active `apport.service` the same way.

use std::path::{Path, PathBuf};
use std::process::Command;

use tmt_config::ProblemType;
use tmt_core::outcome::{EvaluationOutcome, EvaluationResult};
use tmt_core::TmtError;

use crate::checker;
use crate::context::PipelineContext;
use crate::export;
use crate::orchestrator::ensure_interactor_binary;
use crate::solution;

const COMPILE_STACK_MIB: u64 = 64;

/// One testcase's grading result against a submission.
#[derive(Debug, Clone)]
pub struct InvokeOutcome {
    pub codename: String,
    pub verdict: EvaluationOutcome,
    pub cpu_time_sec: f64,
    pub wall_time_sec: f64,
    pub max_rss_kib: u64,
    pub reason: String,
}

pub struct InvokeReport {
    pub outcomes: Vec<InvokeOutcome>,
    /// Recipe-named tests that never made it into `testcases/summary` —
    /// skipped, not graded.
    pub unavailable_testcases: Vec<String>,
    pub apport_active: bool,
}

/// `systemctl is-active apport.service`, the crash-collector that can
/// delay signal delivery enough for a real runtime error to read as a
/// wall-clock timeout (§6a). Absence of `systemctl` is not an error.
pub fn apport_is_active() -> bool {
    Command::new("systemctl")
        .args(["is-active", "apport.service"])
        .output()
        .map(|out| String::from_utf8_lossy(&out.stdout).trim() == "active")
        .unwrap_or(false)
}

fn compile_submission(ctx: &PipelineContext, submission: &Path) -> Result<PathBuf, TmtError> {
    let stem = submission
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("submission")
        .to_string();
    let directory = ctx.paths.sandbox().join("invoke").join(&stem);
    std::fs::create_dir_all(&directory)?;

    let result = tmt_build::compile_target(
        &directory,
        &[submission.to_path_buf()],
        &stem,
        &ctx.paths.include(),
        COMPILE_STACK_MIB,
        &ctx.compiler_overrides,
        ctx.config.trusted.compile_time_limit_sec,
        ctx.config.trusted.compile_memory_limit_mib,
    )?;
    if !result.is_success() {
        return Err(TmtError::CompilationFailed {
            target: format!("submission {}", submission.display()),
            log: result.log,
        });
    }
    result
        .produced_file
        .ok_or_else(|| TmtError::Internal("submission compiled without a produced_file".into()))
}

fn unavailable_testcases(ctx: &PipelineContext, available: &[String]) -> Vec<String> {
    ctx.recipe
        .all_test_names()
        .into_iter()
        .filter(|name| !available.iter().any(|a| a.as_str() == *name))
        .map(str::to_string)
        .collect()
}

fn outcome_from_eval(codename: &str, eval: &EvaluationResult) -> InvokeOutcome {
    InvokeOutcome {
        codename: codename.to_string(),
        verdict: eval.verdict,
        cpu_time_sec: eval.cpu_time_sec,
        wall_time_sec: eval.wall_time_sec,
        max_rss_kib: eval.max_rss_kib,
        reason: eval.checker_reason.clone(),
    }
}

fn write_invocation_log(ctx: &PipelineContext, codename: &str, reason: &str) -> std::io::Result<()> {
    std::fs::create_dir_all(ctx.paths.logs_invocation())?;
    let path = ctx.paths.logs_invocation().join(format!("{codename}.sol.log"));
    std::fs::write(path, reason)
}

/// Runs one batch testcase: solution, then (if it ran cleanly) the
/// checker, deleting the solution's scratch output file afterward either
/// way (§4.6: "owned by the caller, deleted after checking").
fn run_batch_testcase(
    ctx: &PipelineContext,
    checker_program: &Path,
    codename: &str,
    input_filename: &str,
    output_filename: &str,
    solution_bin: &Path,
) -> Result<EvaluationResult, TmtError> {
    let mut eval = solution::run_batch_solution(
        &ctx.paths,
        solution_bin,
        &[],
        &ctx.paths.logs_invocation(),
        codename,
        input_filename,
        output_filename,
        ctx.solution_limits(),
        false,
    )?;

    if eval.verdict != EvaluationOutcome::RunSuccess {
        return Ok(eval);
    }

    let team_output = eval
        .output_file
        .take()
        .ok_or_else(|| TmtError::Internal("run success without an output file".into()))?;
    let checker_args = ctx
        .config
        .checker
        .as_ref()
        .map(|c| c.arguments.clone())
        .unwrap_or_default();
    let answer_path = ctx.paths.testcases().join(output_filename);

    let checker_eval = checker::run_checker(
        &ctx.paths,
        checker_program,
        &checker_args,
        codename,
        input_filename,
        output_filename,
        &team_output,
        ctx.trusted_step_limits(),
    )?;
    std::fs::remove_file(&team_output).ok();

    Ok(EvaluationResult {
        verdict: checker_eval.verdict,
        cpu_time_sec: eval.cpu_time_sec,
        wall_time_sec: eval.wall_time_sec,
        max_rss_kib: eval.max_rss_kib,
        exit_code: eval.exit_code,
        exit_signal: eval.exit_signal,
        output_file: None,
        checker_reason: checker_eval.checker_reason,
    })
}

/// Compiles `submission` and grades it against every codename in
/// `testcases/summary`, in file order.
pub fn run_invoke(ctx: &PipelineContext, submission: &Path) -> Result<InvokeReport, TmtError> {
    if !ctx.paths.testcases_summary().is_file() {
        return Err(TmtError::ConfigMissing {
            filetype: "testcase summary".into(),
            path: ctx.paths.testcases_summary(),
        });
    }

    let solution_bin = compile_submission(ctx, submission)?;

    let checker_program = match ctx.config.problem_type {
        ProblemType::Batch => Some(checker::ensure_checker_binary(
            &ctx.paths,
            ctx.config.checker.as_ref(),
            &ctx.paths.include(),
            ctx.config.trusted.compile_time_limit_sec,
            ctx.config.trusted.compile_memory_limit_mib,
        )?),
        ProblemType::Interactive => None,
    };
    let interactor_program = match ctx.config.problem_type {
        ProblemType::Interactive => Some(ensure_interactor_binary(ctx)?),
        ProblemType::Batch => None,
    };

    let available = export::read_summary(&ctx.paths)?;
    let unavailable = unavailable_testcases(ctx, &available);

    let mut outcomes = Vec::new();
    for codename in &available {
        tracing::debug!(test = %codename, "grading submission against testcase");
        let input_filename = ctx.construct_input_filename(codename);
        let output_filename = ctx.construct_output_filename(codename);

        let eval = match ctx.config.problem_type {
            ProblemType::Batch => run_batch_testcase(
                ctx,
                checker_program
                    .as_deref()
                    .expect("batch problems always compile a checker"),
                codename,
                &input_filename,
                &output_filename,
                &solution_bin,
            )?,
            ProblemType::Interactive => {
                let interactor_args = ctx
                    .config
                    .interactor
                    .as_ref()
                    .map(|i| i.arguments.clone())
                    .unwrap_or_default();
                solution::run_interactive_solution(
                    &ctx.paths,
                    &solution_bin,
                    &[],
                    interactor_program
                        .as_deref()
                        .expect("interactive problems always compile an interactor"),
                    &interactor_args,
                    codename,
                    &input_filename,
                    Some(&output_filename),
                    ctx.solution_limits(),
                    ctx.trusted_step_limits(),
                )?
            }
        };

        write_invocation_log(ctx, codename, &eval.checker_reason)?;
        tracing::debug!(test = %codename, verdict = %eval.verdict, "testcase graded");
        outcomes.push(outcome_from_eval(codename, &eval));
    }

    Ok(InvokeReport {
        outcomes,
        unavailable_testcases: unavailable,
        apport_active: apport_is_active(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tmt_config::ProblemConfig;

    const BATCH_YAML: &str = r#"
short_name: aplusb
input_extension: in
output_extension: out
judge_convention: icpc
problem_type: batch
validator:
  type: default
solution:
  type: default
  time_limit: "2s"
  memory_limit: "256MB"
  output_limit: "64MB"
answer_generation:
  type: solution
  filename: model.sh
"#;

    fn write_exec(path: &Path, script: &str) {
        std::fs::write(path, script).unwrap();
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn unavailable_testcases_lists_names_missing_from_summary() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = tmt_config::ProblemPaths::new(tmp.path());
        let config = ProblemConfig::parse(BATCH_YAML).unwrap();
        let recipe = tmt_recipe::parse_recipe("@testset main\ngen a\ngen b\n").unwrap();
        let ctx = PipelineContext {
            config,
            paths,
            recipe,
            compiler_overrides: Default::default(),
        };

        let available = vec![ctx.recipe.all_test_names()[0].to_string()];
        let missing = unavailable_testcases(&ctx, &available);
        assert_eq!(missing, vec![ctx.recipe.all_test_names()[1].to_string()]);
    }

    #[test]
    fn run_invoke_errors_without_summary_file() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = tmt_config::ProblemPaths::new(tmp.path());
        let config = ProblemConfig::parse(BATCH_YAML).unwrap();
        let recipe = tmt_recipe::parse_recipe("@testset main\ngen\n").unwrap();
        let ctx = PipelineContext {
            config,
            paths,
            recipe,
            compiler_overrides: Default::default(),
        };

        let sub = tmp.path().join("sub.sh");
        write_exec(&sub, "#!/bin/sh\ncat\n");

        let result = run_invoke(&ctx, &sub);
        assert!(result.is_err());
    }
}
