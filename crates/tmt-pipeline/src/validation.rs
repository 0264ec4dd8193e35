//! The validation stage (§4.5): runs each applicable validator (testset ∪
//! subtask ∪ global, already merged in recipe-parse order) against the
//! canonical input, fails fast on the first rejection.
//!
//! Grounded on `original_source::internal::steps::validation.ValidationStep`:
//! copy the input (+ extras) into a scratch sandbox, redirect stdin from
//! it, capture stdout/stderr to logs, and read the *last* stderr line as
//! the human-readable rejection reason.

use std::path::Path;

use tmt_config::ProblemPaths;
use tmt_core::outcome::ExecutionOutcome;
use tmt_recipe::Pipeline;
use tmt_sandbox::{ChildIo, ChildStdio, Limits, Process, SpawnOptions};

pub struct ValidationOutcome {
    pub verdict: ExecutionOutcome,
    pub reason: String,
}

impl ValidationOutcome {
    fn success() -> Self {
        Self {
            verdict: ExecutionOutcome::Success,
            reason: String::new(),
        }
    }
}

fn last_nonempty_line(text: &str) -> String {
    text.lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("")
        .trim()
        .to_string()
}

/// Runs every validator in `validators` (in order) against
/// `testcases/{input_filename}`, stopping at the first one that does not
/// accept. Returns the aggregate verdict for the test's `input_validation`
/// slot.
#[allow(clippy::too_many_arguments)]
pub fn run_validation(
    paths: &ProblemPaths,
    validators: &[Pipeline],
    accept_exit_code: i32,
    codename: &str,
    input_filename: &str,
    extra_filenames: &[String],
    limits: Limits,
) -> Result<ValidationOutcome, std::io::Error> {
    if validators.is_empty() {
        return Ok(ValidationOutcome::success());
    }

    let workdir = paths.sandbox_validation();
    std::fs::create_dir_all(&workdir)?;
    paths.empty_directory(&workdir)?;
    std::fs::create_dir_all(paths.logs_generation())?;

    let input_src = paths.testcases().join(input_filename);
    let sandbox_input = workdir.join(input_filename);
    std::fs::copy(&input_src, &sandbox_input)?;
    for extra in extra_filenames {
        let extra_src = paths.testcases().join(extra);
        if extra_src.is_file() {
            std::fs::copy(&extra_src, workdir.join(extra))?;
        }
    }

    let mut outcome = ValidationOutcome::success();

    for (idx, validator) in validators.iter().enumerate() {
        let command = validator
            .single()
            .expect("parser rejects multi-command validators at recipe-load time");
        let program = resolve_validator(paths, &command.program)?;

        let err_path = paths
            .logs_generation()
            .join(format!("{codename}.val.{}.err", idx + 1));
        let out_path = paths
            .logs_generation()
            .join(format!("{codename}.val.{}.out", idx + 1));

        let mut proc = Process::spawn(
            &program,
            &command.args,
            limits,
            ChildStdio {
                stdin: Some(ChildIo::File(sandbox_input.clone())),
                stdout: Some(ChildIo::File(out_path)),
                stderr: Some(ChildIo::File(err_path.clone())),
            },
            SpawnOptions {
                chdir: Some(workdir.clone()),
                ..Default::default()
            },
        )?;
        proc.wait_blocking()?;

        let stderr_text = std::fs::read_to_string(&err_path).unwrap_or_default();

        if proc.is_timedout() {
            outcome = ValidationOutcome {
                verdict: ExecutionOutcome::TimedOut,
                reason: format!(
                    "Validator `{}' timed-out (time consumed: {:.3}).",
                    command.program,
                    proc.result.map(|r| r.wall_time_sec).unwrap_or_default(),
                ),
            };
            break;
        }
        if proc.is_signaled_exit() {
            outcome = ValidationOutcome {
                verdict: ExecutionOutcome::Crashed,
                reason: format!(
                    "Validator `{}' crashed (killed by signal {}).",
                    command.program,
                    proc.result.and_then(|r| r.exit_signal).unwrap_or(-1),
                ),
            };
            break;
        }

        let exit_code = proc.result.and_then(|r| r.exit_code).unwrap_or(-1);
        if exit_code != accept_exit_code {
            let reason = last_nonempty_line(&stderr_text);
            outcome = ValidationOutcome {
                verdict: ExecutionOutcome::Failed,
                reason: if reason.is_empty() {
                    format!("Validator `{}' rejected the input (exit code {exit_code}).", command.program)
                } else {
                    reason
                },
            };
            break;
        }
    }

    paths.empty_directory(&workdir)?;
    Ok(outcome)
}

fn resolve_validator(paths: &ProblemPaths, program: &str) -> Result<std::path::PathBuf, std::io::Error> {
    if Path::new(program).is_absolute() {
        return Ok(std::path::PathBuf::from(program));
    }
    paths
        .replace_with_validator(program)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::NotFound, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn test_limits() -> Limits {
        Limits {
            time_limit_sec: 5.0,
            memory_limit_mib: Some(256),
            output_limit_mib: None,
        }
    }

    fn write_validator(paths: &ProblemPaths, name: &str, script: &str) {
        std::fs::create_dir_all(paths.validator_build()).unwrap();
        let path = paths.validator_build().join(name);
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn accepting_validator_yields_success() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = ProblemPaths::new(tmp.path());
        std::fs::create_dir_all(paths.testcases()).unwrap();
        std::fs::write(paths.testcases().join("01_t_01.in"), "5\n").unwrap();
        write_validator(&paths, "check", "#!/bin/sh\nexit 42\n");

        let validators = vec![Pipeline::parse("check").unwrap()];
        let result = run_validation(&paths, &validators, 42, "01_t_01", "01_t_01.in", &[], test_limits()).unwrap();
        assert_eq!(result.verdict, ExecutionOutcome::Success);
    }

    #[test]
    fn rejecting_validator_reads_last_stderr_line() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = ProblemPaths::new(tmp.path());
        std::fs::create_dir_all(paths.testcases()).unwrap();
        std::fs::write(paths.testcases().join("01_t_01.in"), "5\n").unwrap();
        write_validator(
            &paths,
            "check",
            "#!/bin/sh\necho 'first line' 1>&2\necho 'N out of range' 1>&2\nexit 1\n",
        );

        let validators = vec![Pipeline::parse("check").unwrap()];
        let result = run_validation(&paths, &validators, 42, "01_t_01", "01_t_01.in", &[], test_limits()).unwrap();
        assert_eq!(result.verdict, ExecutionOutcome::Failed);
        assert_eq!(result.reason, "N out of range");
    }

    #[test]
    fn second_validator_not_run_after_first_rejects() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = ProblemPaths::new(tmp.path());
        std::fs::create_dir_all(paths.testcases()).unwrap();
        std::fs::write(paths.testcases().join("01_t_01.in"), "5\n").unwrap();
        write_validator(&paths, "check_a", "#!/bin/sh\nexit 1\n");
        write_validator(&paths, "check_b", "#!/bin/sh\ntouch ran_b\nexit 42\n");

        let validators = vec![Pipeline::parse("check_a").unwrap(), Pipeline::parse("check_b").unwrap()];
        let result = run_validation(&paths, &validators, 42, "01_t_01", "01_t_01.in", &[], test_limits()).unwrap();
        assert_eq!(result.verdict, ExecutionOutcome::Failed);
        assert!(!paths.sandbox_validation().join("ran_b").exists());
    }

    #[test]
    fn no_validators_is_success() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = ProblemPaths::new(tmp.path());
        let result = run_validation(&paths, &[], 42, "01_t_01", "01_t_01.in", &[], test_limits()).unwrap();
        assert_eq!(result.verdict, ExecutionOutcome::Success);
    }
}
