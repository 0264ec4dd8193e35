//! The solution stage (§4.6): batch (stdio redirection) and interactive
//! (paired, crossed pipes with an interactor) variants of "run one
//! compiled program against one testcase", sharing a single verdict ladder.
//!
//! Grounded on `original_source::internal::steps::solution`: a batch
//! `BatchSolutionStep` redirecting stdin/stdout to files, and an
//! `InteractiveSolutionStep` wiring `Popen(stdin=PIPE, stdout=PIPE)` pairs
//! together. The crossed pipes themselves are built the same way
//! `generation::run_generator` chains a multi-command pipeline — handing a
//! pipe endpoint directly to the next child rather than relaying bytes in
//! the parent — except here the graph is cyclic (solution's stdout feeds
//! the interactor, whose stdout feeds back to the solution), so both ends
//! are allocated up front with `pipe2` before either child is spawned.

use std::fs::File;
use std::os::unix::io::FromRawFd;
use std::path::Path;

use tmt_config::ProblemPaths;
use tmt_core::TmtError;
use tmt_core::outcome::{EvaluationOutcome, EvaluationResult};
use tmt_sandbox::{ChildIo, ChildStdio, Limits, Process, SigChldGuard, SpawnOptions, wait_procs};

fn make_pipe() -> std::io::Result<(File, File)> {
    let mut fds = [0i32; 2];
    // SAFETY: `fds` is a valid 2-element buffer for `pipe2` to fill.
    let ret = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) };
    if ret != 0 {
        return Err(std::io::Error::last_os_error());
    }
    // SAFETY: pipe2 just handed us two freshly-opened, uniquely-owned fds.
    let read = unsafe { File::from_raw_fd(fds[0]) };
    let write = unsafe { File::from_raw_fd(fds[1]) };
    Ok((read, write))
}

fn signal_name(sig: i32) -> String {
    // SAFETY: strsignal's returned pointer is a static string table entry;
    // never null for a valid signal number, but guarded anyway.
    let ptr = unsafe { libc::strsignal(sig) };
    if ptr.is_null() {
        return format!("signal {sig}");
    }
    unsafe { std::ffi::CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

/// The common verdict ladder (§4.6 step 1-8): a single chained
/// if/else-if, each arm exclusive of the ones before it.
fn ladder_verdict(proc: &Process, limits: &Limits) -> (EvaluationOutcome, String) {
    let result = proc.result.expect("caller only inspects a reaped process");

    if let Some(mem_limit_mib) = limits.memory_limit_mib {
        if result.max_rss_kib > mem_limit_mib * 1024 {
            return (
                EvaluationOutcome::RunerrorMemory,
                format!(
                    "memory limit exceeded ({} KiB > {} MiB)",
                    result.max_rss_kib, mem_limit_mib
                ),
            );
        }
    }
    if proc.is_cpu_timedout() {
        return (
            EvaluationOutcome::Timeout,
            format!("cpu time limit exceeded ({:.3}s)", result.cpu_time_sec),
        );
    }
    if proc.is_wall_timedout() {
        return (
            EvaluationOutcome::TimeoutWall,
            format!("wall time limit exceeded ({:.3}s)", result.wall_time_sec),
        );
    }
    if let Some(signal) = result.exit_signal {
        if signal == libc::SIGXFSZ {
            return (EvaluationOutcome::OutputLimit, "output limit exceeded".to_string());
        }
        if signal == libc::SIGXCPU {
            return (
                EvaluationOutcome::Timeout,
                format!("cpu time limit exceeded ({:.3}s)", result.cpu_time_sec),
            );
        }
        return (
            EvaluationOutcome::RunerrorSignal,
            format!("killed by signal {signal} ({})", signal_name(signal)),
        );
    }
    if result.exit_code != Some(0) {
        return (
            EvaluationOutcome::RunerrorExitcode,
            format!("exited with code {}", result.exit_code.unwrap_or(-1)),
        );
    }
    (EvaluationOutcome::RunSuccess, String::new())
}

fn eval_result_from(proc: &Process, verdict: EvaluationOutcome, reason: String) -> EvaluationResult {
    let result = proc.result.unwrap_or_default();
    EvaluationResult {
        verdict,
        cpu_time_sec: result.cpu_time_sec,
        wall_time_sec: result.wall_time_sec,
        max_rss_kib: result.max_rss_kib,
        exit_code: result.exit_code,
        exit_signal: result.exit_signal,
        output_file: None,
        checker_reason: reason,
    }
}

/// Runs a compiled solution in batch mode: stdin from the canonical input,
/// stdout to the expected output filename. When `is_generation`, a
/// successful run's output is relocated into `testcases/`; otherwise it is
/// left in the sandbox and handed back via `output_file` for the checker
/// to read (the caller owns, and must delete, that file).
#[allow(clippy::too_many_arguments)]
pub fn run_batch_solution(
    paths: &ProblemPaths,
    program: &Path,
    args: &[String],
    log_dir: &Path,
    codename: &str,
    input_filename: &str,
    output_filename: &str,
    limits: Limits,
    is_generation: bool,
) -> Result<EvaluationResult, std::io::Error> {
    let workdir = paths.sandbox_solution();
    std::fs::create_dir_all(&workdir)?;
    paths.empty_directory(&workdir)?;
    std::fs::create_dir_all(log_dir)?;

    let sandbox_input = workdir.join(input_filename);
    std::fs::copy(paths.testcases().join(input_filename), &sandbox_input)?;
    let sandbox_output = workdir.join(output_filename);
    let err_path = log_dir.join(format!("{codename}.sol.err"));

    let mut proc = Process::spawn(
        program,
        args,
        limits,
        ChildStdio {
            stdin: Some(ChildIo::File(sandbox_input)),
            stdout: Some(ChildIo::File(sandbox_output.clone())),
            stderr: Some(ChildIo::File(err_path)),
        },
        SpawnOptions {
            chdir: Some(workdir.clone()),
            ..Default::default()
        },
    )?;
    proc.wait_blocking()?;

    let (mut verdict, mut reason) = ladder_verdict(&proc, &limits);
    let file_exists = sandbox_output.is_file();

    if verdict == EvaluationOutcome::RunSuccess && !file_exists {
        verdict = EvaluationOutcome::NoFile;
        reason = format!("solution did not produce `{output_filename}'");
    }

    let mut output_file = None;
    if verdict == EvaluationOutcome::RunSuccess && is_generation {
        std::fs::rename(&sandbox_output, paths.testcases().join(output_filename))?;
    } else if !is_generation && file_exists {
        output_file = Some(sandbox_output.clone());
    }

    let mut result = eval_result_from(&proc, verdict, reason);
    result.output_file = output_file;
    Ok(result)
}

/// Runs a compiled solution in interactive (ICPC) mode, paired with an
/// interactor over crossed pipes. Both children are waited together
/// before either verdict is inspected (§4.2).
#[allow(clippy::too_many_arguments)]
pub fn run_interactive_solution(
    paths: &ProblemPaths,
    solution_program: &Path,
    solution_args: &[String],
    interactor_program: &Path,
    interactor_extra_args: &[String],
    codename: &str,
    input_filename: &str,
    answer_filename: Option<&str>,
    solution_limits: Limits,
    interactor_limits: Limits,
) -> Result<EvaluationResult, TmtError> {
    let sol_workdir = paths.sandbox_solution();
    let int_workdir = paths.sandbox_interactor();
    std::fs::create_dir_all(&sol_workdir)?;
    std::fs::create_dir_all(&int_workdir)?;
    paths.empty_directory(&sol_workdir)?;
    paths.empty_directory(&int_workdir)?;

    let feedback_dir = int_workdir.join("feedback");
    std::fs::create_dir_all(&feedback_dir)?;

    let input_path = paths.testcases().join(input_filename);
    let answer_path = match answer_filename {
        Some(name) => paths.testcases().join(name),
        None => {
            let placeholder = int_workdir.join("no_answer");
            std::fs::write(&placeholder, b"")?;
            placeholder
        }
    };

    let (sol_to_int_read, sol_to_int_write) = make_pipe()?;
    let (int_to_sol_read, int_to_sol_write) = make_pipe()?;

    let _guard = SigChldGuard::block()?;

    let mut proc_sol = Process::spawn(
        solution_program,
        solution_args,
        solution_limits,
        ChildStdio {
            stdin: Some(ChildIo::from(int_to_sol_read)),
            stdout: Some(ChildIo::from(sol_to_int_write)),
            stderr: Some(ChildIo::File(paths.logs_generation().join(format!("{codename}.sol.err")))),
        },
        SpawnOptions {
            chdir: Some(sol_workdir.clone()),
            ignore_sigpipe: true,
            ..Default::default()
        },
    )?;

    let mut interactor_args = vec![
        input_path.to_string_lossy().into_owned(),
        answer_path.to_string_lossy().into_owned(),
        feedback_dir.to_string_lossy().into_owned(),
    ];
    interactor_args.extend(interactor_extra_args.iter().cloned());

    let mut proc_int = Process::spawn(
        interactor_program,
        &interactor_args,
        interactor_limits,
        ChildStdio {
            stdin: Some(ChildIo::from(sol_to_int_read)),
            stdout: Some(ChildIo::from(int_to_sol_write)),
            stderr: Some(ChildIo::File(paths.logs_generation().join(format!("{codename}.int.err")))),
        },
        SpawnOptions {
            chdir: Some(int_workdir.clone()),
            ignore_sigpipe: true,
            ..Default::default()
        },
    )?;

    wait_procs(&mut [&mut proc_sol, &mut proc_int])?;

    if proc_int.is_timedout() {
        return Ok(eval_result_from(
            &proc_sol,
            EvaluationOutcome::CheckerTimedout,
            "interactor timed out".to_string(),
        ));
    }
    if proc_int.is_signaled_exit() {
        let signal = proc_int.result.and_then(|r| r.exit_signal).unwrap_or(-1);
        return Ok(eval_result_from(
            &proc_sol,
            EvaluationOutcome::CheckerCrashed,
            format!("interactor crashed (signal {signal})"),
        ));
    }

    let (mut verdict, mut reason) = ladder_verdict(&proc_sol, &solution_limits);

    if verdict == EvaluationOutcome::RunSuccess {
        let interactor_exit = proc_int.result.and_then(|r| r.exit_code).unwrap_or(-1);
        if interactor_exit == 42 {
            verdict = EvaluationOutcome::Accepted;
            reason = String::new();
        } else {
            verdict = EvaluationOutcome::Wrong;
            reason = read_judgemessage(&feedback_dir);
        }
    }

    Ok(eval_result_from(&proc_sol, verdict, reason))
}

fn read_judgemessage(feedback_dir: &Path) -> String {
    std::fs::read_to_string(feedback_dir.join("judgemessage.txt"))
        .ok()
        .and_then(|text| text.lines().next().map(|line| line.trim().to_string()))
        .unwrap_or_default()
}
