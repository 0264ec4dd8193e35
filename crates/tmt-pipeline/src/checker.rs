//! The checker stage (§4.7): compiles either a user checker or the
//! built-in default, runs it against one solution's output, and reads
//! `judgemessage.txt` as the human-readable reason.
//!
//! Grounded on `original_source::internal::steps::checker.CheckerStep`: the
//! `<checker> input answer feedback-dir [extra-args] < output` invocation
//! convention, the `run_checker` skip gate (§4.7's "A checker run is
//! skipped entirely…"), and the feedback directory holding only
//! `judgemessage.txt` of the fields the original reads.

use std::path::{Path, PathBuf};

use tmt_config::{Checker, CheckerType, ProblemPaths, ProblemType};
use tmt_core::outcome::{EvaluationOutcome, EvaluationResult};
use tmt_core::TmtError;
use tmt_sandbox::{ChildIo, ChildStdio, Limits, Process, SpawnOptions};

const DEFAULT_CHECKER_SOURCE: &str = include_str!("../default_checker.cpp");
const DEFAULT_CHECKER_TARGET: &str = "default_checker";
const ACCEPT_EXIT_CODE: i32 = 42;

/// Whether the checker stage should run at all for a given generation
/// substage (`for_forced`/`for_generated` pick the right policy flag).
/// Interactive problems never invoke a checker (the interactor already
/// produced the verdict); a batch problem with no configured checker and
/// `answer_generation.type = solution` is also skipped unless the checker
/// policy explicitly demands re-validation.
pub fn checker_is_applicable(
    problem_type: ProblemType,
    checker: Option<&Checker>,
    is_forced_output: bool,
) -> bool {
    if problem_type != ProblemType::Batch {
        return false;
    }
    match checker {
        None => false,
        Some(checker) => {
            if is_forced_output {
                checker.check_forced_output
            } else {
                checker.check_generated_output
            }
        }
    }
}

/// Resolves the checker binary to run: the configured custom checker if
/// present, otherwise the built-in default compiled into a scratch build
/// directory under `sandbox/checker/`.
pub fn ensure_checker_binary(
    paths: &ProblemPaths,
    checker: Option<&Checker>,
    include_path: &Path,
    compile_time_limit_sec: f64,
    compile_memory_limit_mib: Option<u64>,
) -> Result<PathBuf, TmtError> {
    match checker {
        Some(Checker {
            kind: CheckerType::Custom,
            filename: Some(filename),
            ..
        }) => {
            let stem = Path::new(filename)
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or(filename);
            let path = paths.checker_build().join(stem);
            if path.is_file() {
                Ok(path)
            } else {
                Err(TmtError::ConfigMissing {
                    filetype: "checker".into(),
                    path,
                })
            }
        }
        _ => ensure_default_checker(paths, include_path, compile_time_limit_sec, compile_memory_limit_mib),
    }
}

fn ensure_default_checker(
    paths: &ProblemPaths,
    include_path: &Path,
    compile_time_limit_sec: f64,
    compile_memory_limit_mib: Option<u64>,
) -> Result<PathBuf, TmtError> {
    let scratch_dir = paths.sandbox_checker().join("default");
    std::fs::create_dir_all(&scratch_dir)?;
    let source_path = scratch_dir.join("default_checker.cpp");
    let built_path = scratch_dir.join("build").join(DEFAULT_CHECKER_TARGET);
    if built_path.is_file() {
        return Ok(built_path);
    }
    std::fs::write(&source_path, DEFAULT_CHECKER_SOURCE)?;

    let result = tmt_build::compile_target(
        &scratch_dir,
        &[source_path],
        DEFAULT_CHECKER_TARGET,
        include_path,
        64,
        &std::collections::HashMap::new(),
        compile_time_limit_sec,
        compile_memory_limit_mib,
    )?;
    if !result.is_success() {
        return Err(TmtError::CompilationFailed {
            target: "default_checker".into(),
            log: result.log,
        });
    }
    result
        .produced_file
        .ok_or_else(|| TmtError::Internal("default checker compiled without a produced_file".into()))
}

fn read_judgemessage(feedback_dir: &Path) -> String {
    std::fs::read_to_string(feedback_dir.join("judgemessage.txt"))
        .ok()
        .and_then(|text| text.lines().next().map(|line| line.trim().to_string()))
        .unwrap_or_default()
}

/// Runs `checker_program` against one solution's output. `team_output` is
/// the file the solution stage produced (its contents are streamed in via
/// stdin, matching the ICPC invocation convention); the caller still owns
/// and must delete it afterward.
#[allow(clippy::too_many_arguments)]
pub fn run_checker(
    paths: &ProblemPaths,
    checker_program: &Path,
    extra_args: &[String],
    codename: &str,
    input_filename: &str,
    answer_filename: &str,
    team_output: &Path,
    limits: Limits,
) -> Result<EvaluationResult, std::io::Error> {
    let workdir = paths.sandbox_checker();
    std::fs::create_dir_all(&workdir)?;
    let feedback_dir = workdir.join("feedback");
    std::fs::create_dir_all(&feedback_dir)?;
    for entry in std::fs::read_dir(&feedback_dir)? {
        std::fs::remove_file(entry?.path()).ok();
    }

    let input_path = paths.testcases().join(input_filename);
    let answer_path = paths.testcases().join(answer_filename);

    let mut args = vec![
        input_path.to_string_lossy().into_owned(),
        answer_path.to_string_lossy().into_owned(),
        feedback_dir.to_string_lossy().into_owned(),
    ];
    args.extend(extra_args.iter().cloned());

    let err_path = paths.logs_generation().join(format!("{codename}.chk.err"));

    let mut proc = Process::spawn(
        checker_program,
        &args,
        limits,
        ChildStdio {
            stdin: Some(ChildIo::File(team_output.to_path_buf())),
            stdout: Some(ChildIo::Null),
            stderr: Some(ChildIo::File(err_path)),
        },
        SpawnOptions {
            chdir: Some(workdir.clone()),
            ..Default::default()
        },
    )?;
    proc.wait_blocking()?;

    let result = proc.result.unwrap_or_default();
    let (verdict, reason) = if proc.is_timedout() {
        (EvaluationOutcome::CheckerTimedout, "checker timed out".to_string())
    } else if proc.is_signaled_exit() {
        (
            EvaluationOutcome::CheckerCrashed,
            format!("checker crashed (signal {})", result.exit_signal.unwrap_or(-1)),
        )
    } else if result.exit_code == Some(ACCEPT_EXIT_CODE) {
        (EvaluationOutcome::Accepted, String::new())
    } else {
        (EvaluationOutcome::Wrong, read_judgemessage(&feedback_dir))
    };

    Ok(EvaluationResult {
        verdict,
        cpu_time_sec: result.cpu_time_sec,
        wall_time_sec: result.wall_time_sec,
        max_rss_kib: result.max_rss_kib,
        exit_code: result.exit_code,
        exit_signal: result.exit_signal,
        output_file: None,
        checker_reason: reason,
    })
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

    fn write_checker(path: &Path, script: &str) {
        std::fs::write(path, script).unwrap();
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn checker_is_applicable_skips_interactive_problems() {
        let checker = Checker {
            kind: CheckerType::Default,
            filename: None,
            arguments: vec![],
            check_forced_output: true,
            check_generated_output: true,
        };
        assert!(!checker_is_applicable(ProblemType::Interactive, Some(&checker), false));
        assert!(checker_is_applicable(ProblemType::Batch, Some(&checker), false));
    }

    #[test]
    fn checker_is_applicable_skips_when_absent() {
        assert!(!checker_is_applicable(ProblemType::Batch, None, false));
    }

    #[test]
    fn checker_is_applicable_honors_forced_policy() {
        let checker = Checker {
            kind: CheckerType::Default,
            filename: None,
            arguments: vec![],
            check_forced_output: false,
            check_generated_output: true,
        };
        assert!(!checker_is_applicable(ProblemType::Batch, Some(&checker), true));
        assert!(checker_is_applicable(ProblemType::Batch, Some(&checker), false));
    }

    #[test]
    fn custom_checker_accepts_on_exit_42() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = ProblemPaths::new(tmp.path());
        std::fs::create_dir_all(paths.testcases()).unwrap();
        std::fs::write(paths.testcases().join("01_t_01.in"), "1 2\n").unwrap();
        std::fs::write(paths.testcases().join("01_t_01.out"), "3\n").unwrap();
        let team_output = tmp.path().join("team.out");
        std::fs::write(&team_output, "3\n").unwrap();

        let checker_bin = tmp.path().join("chk.sh");
        write_checker(&checker_bin, "#!/bin/sh\ncat > /dev/null\nexit 42\n");

        let result = run_checker(
            &paths,
            &checker_bin,
            &[],
            "01_t_01",
            "01_t_01.in",
            "01_t_01.out",
            &team_output,
            test_limits(),
        )
        .unwrap();

        assert_eq!(result.verdict, EvaluationOutcome::Accepted);
    }

    #[test]
    fn custom_checker_reads_judgemessage_on_wrong() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = ProblemPaths::new(tmp.path());
        std::fs::create_dir_all(paths.testcases()).unwrap();
        std::fs::write(paths.testcases().join("01_t_01.in"), "1 2\n").unwrap();
        std::fs::write(paths.testcases().join("01_t_01.out"), "3\n").unwrap();
        let team_output = tmp.path().join("team.out");
        std::fs::write(&team_output, "4\n").unwrap();

        let checker_bin = tmp.path().join("chk.sh");
        write_checker(
            &checker_bin,
            "#!/bin/sh\ncat > /dev/null\necho 'wrong sum' > \"$3/judgemessage.txt\"\nexit 1\n",
        );

        let result = run_checker(
            &paths,
            &checker_bin,
            &[],
            "01_t_01",
            "01_t_01.in",
            "01_t_01.out",
            &team_output,
            test_limits(),
        )
        .unwrap();

        assert_eq!(result.verdict, EvaluationOutcome::Wrong);
        assert_eq!(result.checker_reason, "wrong sum");
    }
}
