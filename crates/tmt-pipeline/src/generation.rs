//! The generation stage (§4.4): turns one testcase's pipe-chained generator
//! command into the canonical input (and, for `manual INPUT OUTPUT`, the
//! canonical output) under `testcases/`.
//!
//! Grounded on `original_source::internal::steps::generation.GenerationStep`:
//! the `manual` rewrite rules, the sandbox-directory chdir, and the
//! per-command stderr log all mirror `run_generator` one-for-one.

use std::path::{Path, PathBuf};

use tmt_config::ProblemPaths;
use tmt_core::outcome::{ExecutionOutcome, GenerationResult};
use tmt_core::TmtError;
use tmt_recipe::{Command, Pipeline};
use tmt_sandbox::{ChildIo, ChildStdio, Limits, Process, SpawnOptions};

/// One resolved, ready-to-spawn step of a (possibly multi-command)
/// generation pipeline.
struct ResolvedCommand {
    program: PathBuf,
    args: Vec<String>,
}

/// Rewrites `manual FILE` / `manual INPUT OUTPUT` into the `cat`/`cp`
/// command sequence `original_source` expands them into, and resolves
/// every other program name against `generator/build/`.
///
/// Returns the rewritten pipeline plus whether the output file was forced
/// (the `manual INPUT OUTPUT` form supplies the answer directly, so the
/// output-generation slot is skipped rather than failed).
fn resolve_commands(
    pipeline: &Pipeline,
    paths: &ProblemPaths,
    sandbox_output: &Path,
) -> Result<(Vec<ResolvedCommand>, bool), TmtError> {
    let mut commands = pipeline.commands.clone();
    let mut is_output_forced = false;

    let mut prelude: Vec<Command> = Vec::new();
    let mut start = 0;

    if let Some(first) = commands.first() {
        if first.is_manual() {
            match first.args.len() {
                1 => {
                    let manual = paths.replace_with_manual(&first.args[0])?;
                    prelude.push(Command {
                        program: "cat".into(),
                        args: vec![manual.to_string_lossy().into_owned()],
                    });
                    start = 1;
                }
                2 => {
                    let manual_input = paths.replace_with_manual(&first.args[0])?;
                    let manual_output = paths.replace_with_manual(&first.args[1])?;
                    prelude.push(Command {
                        program: "cp".into(),
                        args: vec![
                            manual_output.to_string_lossy().into_owned(),
                            sandbox_output.to_string_lossy().into_owned(),
                        ],
                    });
                    prelude.push(Command {
                        program: "cat".into(),
                        args: vec![manual_input.to_string_lossy().into_owned()],
                    });
                    start = 1;
                    is_output_forced = true;
                }
                _ => {
                    return Err(TmtError::RecipeSyntax {
                        line: 0,
                        message: "`manual` takes either one or two arguments".into(),
                    });
                }
            }
        }
    }

    let rest = commands.split_off(start);
    let mut resolved = Vec::new();
    for command in prelude.into_iter().chain(rest) {
        let program = if command.program.starts_with(std::path::MAIN_SEPARATOR) {
            PathBuf::from(&command.program)
        } else if command.program == "cat" || command.program == "cp" {
            which::which(&command.program).map_err(|_| {
                TmtError::Internal(format!("`{}` was not found on PATH", command.program))
            })?
        } else {
            paths.replace_with_generator(&command.program)?
        };
        resolved.push(ResolvedCommand {
            program,
            args: command.args,
        });
    }
    Ok((resolved, is_output_forced))
}

/// Runs one testcase's full generation pipeline: the resolved command
/// chain (crossed over OS pipes when there is more than one command),
/// then relocates the canonical input/output/extra files from the
/// generation sandbox into `testcases/`.
pub fn run_generator(
    paths: &ProblemPaths,
    pipeline: &Pipeline,
    code_name: &str,
    input_filename: &str,
    output_filename: &str,
    extra_filenames: &[String],
    limits: Limits,
) -> Result<GenerationResult, std::io::Error> {
    let workdir = paths.sandbox_generation();
    std::fs::create_dir_all(&workdir)?;
    std::fs::create_dir_all(paths.logs_generation())?;
    std::fs::create_dir_all(paths.testcases())?;

    let sandbox_input = workdir.join(input_filename);
    let sandbox_output = workdir.join(output_filename);

    let mut result = GenerationResult::default();

    let (resolved, is_output_forced) = match resolve_commands(pipeline, paths, &sandbox_output) {
        Ok(r) => r,
        Err(err) => {
            result.input_generation = Some(ExecutionOutcome::Failed);
            result.reason = err.to_string();
            return Ok(result);
        }
    };
    result.is_output_forced = is_output_forced;

    let command_count = resolved.len();
    let mut processes: Vec<Process> = Vec::new();
    let mut sandbox_logs: Vec<PathBuf> = Vec::new();
    let mut prev_stdout: Option<std::process::ChildStdout> = None;

    for (i, command) in resolved.iter().enumerate() {
        let is_last = i + 1 == command_count;

        let err_file = workdir.join(if command_count > 1 {
            format!("{code_name}.gen.{}.err", i + 1)
        } else {
            format!("{code_name}.gen.err")
        });
        sandbox_logs.push(err_file.clone());

        let stdin = match prev_stdout.take() {
            Some(stdout) => ChildIo::from(stdout),
            None => ChildIo::Null,
        };
        let stdout = if is_last {
            ChildIo::File(sandbox_input.clone())
        } else {
            ChildIo::Piped
        };

        let spawned = Process::spawn(
            &command.program,
            &command.args,
            limits,
            ChildStdio {
                stdin: Some(stdin),
                stdout: Some(stdout),
                stderr: Some(ChildIo::File(err_file)),
            },
            SpawnOptions {
                chdir: Some(workdir.clone()),
                ..Default::default()
            },
        );

        let mut proc = match spawned {
            Ok(proc) => proc,
            Err(err) => {
                for proc in &processes {
                    proc.kill();
                }
                return Err(err);
            }
        };

        prev_stdout = proc.stdout();
        processes.push(proc);
    }

    for proc in &mut processes {
        proc.wait_blocking()?;
    }

    std::fs::rename(&sandbox_input, paths.testcases().join(input_filename))?;

    let mut generates_output = false;
    if sandbox_output.is_file() {
        std::fs::rename(&sandbox_output, paths.testcases().join(output_filename))?;
        generates_output = true;
    }

    for extra in extra_filenames {
        let sandbox_extra = workdir.join(extra);
        if sandbox_extra == sandbox_output && generates_output {
            continue;
        }
        if sandbox_extra.is_file() {
            std::fs::rename(&sandbox_extra, paths.testcases().join(extra))?;
        }
    }

    for log in &sandbox_logs {
        if log.is_file() {
            let dest = paths.logs_generation().join(log.file_name().unwrap());
            std::fs::rename(log, dest)?;
        }
    }

    result.input_generation = Some(ExecutionOutcome::Success);
    for (i, proc) in processes.iter().enumerate() {
        let Some(run) = proc.result else { continue };
        if proc.is_timedout() {
            result.input_generation = Some(ExecutionOutcome::TimedOut);
            result.reason = format!(
                "Generator command `{}' timed-out (time consumed: {:.3}). \
                 If this is expected, consider raising trusted step time limit.",
                display_command(&resolved, i),
                run.wall_time_sec,
            );
            break;
        }
        if run.exit_code != Some(0) {
            result.input_generation = Some(ExecutionOutcome::Crashed);
            result.reason = if let Some(signal) = run.exit_signal {
                format!(
                    "Generator command `{}' crashed (killed by signal {signal}). \
                     This could be out-of-memory crash, see trusted step memory limit \
                     for more information.",
                    display_command(&resolved, i),
                )
            } else {
                format!(
                    "Generator command `{}' crashed (exit status {}). \
                     This could be out-of-memory crash, see trusted step memory limit \
                     for more information.",
                    display_command(&resolved, i),
                    run.exit_code.unwrap_or(-1),
                )
            };
            break;
        }
    }

    if generates_output {
        result.output_generation = Some(ExecutionOutcome::SkippedSuccess);
    }

    Ok(result)
}

fn display_command(resolved: &[ResolvedCommand], index: usize) -> String {
    let command = &resolved[index];
    let program = command
        .program
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| command.program.to_string_lossy().into_owned());
    std::iter::once(program)
        .chain(command.args.iter().cloned())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_limits() -> Limits {
        Limits {
            time_limit_sec: 5.0,
            memory_limit_mib: Some(256),
            output_limit_mib: None,
        }
    }

    #[test]
    fn single_command_generator_writes_canonical_input() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = ProblemPaths::new(tmp.path());
        std::fs::create_dir_all(paths.generator_build()).unwrap();
        std::fs::write(
            paths.generator_build().join("gen"),
            "#!/bin/sh\necho hello\n",
        )
        .unwrap();
        std::fs::set_permissions(
            paths.generator_build().join("gen"),
            std::os::unix::fs::PermissionsExt::from_mode(0o755),
        )
        .unwrap();

        let pipeline = Pipeline::parse("gen").unwrap();
        let result = run_generator(
            &paths,
            &pipeline,
            "01_t_01",
            "01_t_01.in",
            "01_t_01.out",
            &[],
            test_limits(),
        )
        .unwrap();

        assert_eq!(result.input_generation, Some(ExecutionOutcome::Success));
        assert_eq!(
            std::fs::read_to_string(paths.testcases().join("01_t_01.in")).unwrap(),
            "hello\n"
        );
    }

    #[test]
    fn manual_single_file_is_rewritten_to_cat() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = ProblemPaths::new(tmp.path());
        std::fs::create_dir_all(paths.generator_manuals()).unwrap();
        std::fs::write(paths.generator_manuals().join("case.in"), "42\n").unwrap();

        let pipeline = Pipeline::parse("manual case.in").unwrap();
        let result = run_generator(
            &paths,
            &pipeline,
            "01_t_01",
            "01_t_01.in",
            "01_t_01.out",
            &[],
            test_limits(),
        )
        .unwrap();

        assert_eq!(result.input_generation, Some(ExecutionOutcome::Success));
        assert!(!result.is_output_forced);
        assert_eq!(
            std::fs::read_to_string(paths.testcases().join("01_t_01.in")).unwrap(),
            "42\n"
        );
    }

    #[test]
    fn manual_two_files_forces_output() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = ProblemPaths::new(tmp.path());
        std::fs::create_dir_all(paths.generator_manuals()).unwrap();
        std::fs::write(paths.generator_manuals().join("case.in"), "1 2\n").unwrap();
        std::fs::write(paths.generator_manuals().join("case.out"), "3\n").unwrap();

        let pipeline = Pipeline::parse("manual case.in case.out").unwrap();
        let result = run_generator(
            &paths,
            &pipeline,
            "01_t_01",
            "01_t_01.in",
            "01_t_01.out",
            &[],
            test_limits(),
        )
        .unwrap();

        assert!(result.is_output_forced);
        assert_eq!(result.output_generation, Some(ExecutionOutcome::SkippedSuccess));
        assert_eq!(
            std::fs::read_to_string(paths.testcases().join("01_t_01.out")).unwrap(),
            "3\n"
        );
    }

    #[test]
    fn nonzero_exit_is_reported_as_crashed() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = ProblemPaths::new(tmp.path());
        std::fs::create_dir_all(paths.generator_build()).unwrap();
        std::fs::write(paths.generator_build().join("gen"), "#!/bin/sh\nexit 3\n").unwrap();
        std::fs::set_permissions(
            paths.generator_build().join("gen"),
            std::os::unix::fs::PermissionsExt::from_mode(0o755),
        )
        .unwrap();

        let pipeline = Pipeline::parse("gen").unwrap();
        let result = run_generator(
            &paths,
            &pipeline,
            "01_t_01",
            "01_t_01.in",
            "01_t_01.out",
            &[],
            test_limits(),
        )
        .unwrap();

        assert_eq!(result.input_generation, Some(ExecutionOutcome::Crashed));
        assert!(result.reason.contains("exit status 3"));
    }
}
