//! A single sandboxed child: CPU/RSS/FSIZE/CORE limits applied atomically
//! before `exec`, a wall-clock watchdog thread as a backstop, and rusage
//! captured on reap.
//!
//! Grounded on the POSIX primitives `csa-resource::rlimit` already uses
//! (`libc::setrlimit`/`getrlimit`, a background deadline thread) combined
//! with the exact limit set and verdict bookkeeping of a classic
//! `subprocess.Popen` sandbox wrapper: `RLIMIT_CPU`, `RLIMIT_FSIZE`,
//! `RLIMIT_STACK`, `RLIMIT_CORE`, `wait4` with rusage, and
//! `waitstatus`-derived exit code/signal.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio as StdStdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use crate::limits::Limits;

/// How one of a child's three standard streams should be wired.
pub enum ChildIo {
    Null,
    File(PathBuf),
    Piped,
    /// An already-built `Stdio`, used to cross one child's piped stdout
    /// into the next child's stdin in a generator/validator/interactor
    /// pipeline without the parent process copying bytes itself.
    Raw(StdStdio),
}

impl std::fmt::Debug for ChildIo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChildIo::Null => f.write_str("Null"),
            ChildIo::File(path) => write!(f, "File({})", path.display()),
            ChildIo::Piped => f.write_str("Piped"),
            ChildIo::Raw(_) => f.write_str("Raw(..)"),
        }
    }
}

impl From<std::process::ChildStdout> for ChildIo {
    fn from(stdout: std::process::ChildStdout) -> Self {
        ChildIo::Raw(StdStdio::from(stdout))
    }
}

impl From<std::fs::File> for ChildIo {
    /// Hands a raw file (typically one end of a `pipe2`-created OS pipe)
    /// directly to the child as one of its standard streams — used to
    /// cross an interactor's and a solution's stdio without the parent
    /// process relaying bytes itself (§4.6 "Interactive (ICPC)").
    fn from(file: std::fs::File) -> Self {
        ChildIo::Raw(StdStdio::from(file))
    }
}

impl ChildIo {
    fn into_stdio(self, read_only: bool) -> io::Result<StdStdio> {
        Ok(match self {
            ChildIo::Null => StdStdio::null(),
            ChildIo::Piped => StdStdio::piped(),
            ChildIo::Raw(stdio) => stdio,
            ChildIo::File(path) => {
                let file = if read_only {
                    std::fs::File::open(path)?
                } else {
                    std::fs::OpenOptions::new()
                        .write(true)
                        .create(true)
                        .truncate(true)
                        .open(path)?
                };
                StdStdio::from(file)
            }
        })
    }
}

#[derive(Debug, Default)]
pub struct ChildStdio {
    pub stdin: Option<ChildIo>,
    pub stdout: Option<ChildIo>,
    pub stderr: Option<ChildIo>,
}

/// Extra pre-exec setup beyond the rlimits every sandboxed child gets.
#[derive(Debug, Clone, Default)]
pub struct SpawnOptions {
    pub chdir: Option<PathBuf>,
    /// `signal(SIGPIPE, SIG_IGN)` — used by interactive solutions/interactors
    /// so a closed crossed pipe surfaces as an I/O error, not a kill.
    pub ignore_sigpipe: bool,
    /// Extra variables layered on top of the parent's environment, e.g. the
    /// build driver's `CXXFLAGS`/`SRCS`/`TARGET_NAME` for a `make` invocation.
    pub envs: Vec<(String, String)>,
}

/// rusage + waitstatus captured on reap.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessResult {
    pub cpu_time_sec: f64,
    pub wall_time_sec: f64,
    pub max_rss_kib: u64,
    pub exit_code: Option<i32>,
    pub exit_signal: Option<i32>,
}

pub struct Process {
    pid: i32,
    child: std::process::Child,
    popen_time: Instant,
    limits: Limits,
    reaped: Arc<AtomicBool>,
    watchdog: Option<std::thread::JoinHandle<()>>,
    pub result: Option<ProcessResult>,
}

fn mib_to_bytes(mib: u64) -> u64 {
    mib.saturating_mul(1024 * 1024)
}

/// # Safety
/// Only called from the child between `fork` and `exec`; must only touch
/// async-signal-safe APIs.
unsafe fn apply_sandbox_preexec(limits: &Limits, opts: &SpawnOptions) -> io::Result<()> {
    unsafe {
        // RLIMIT_CPU: a hard backstop distinct from the wall-clock watchdog;
        // catches CPU-bound children even if the parent thread is stalled.
        let cpu_secs = limits.time_limit_sec.ceil() as libc::rlim_t + 1;
        let cpu_rlim = libc::rlimit {
            rlim_cur: cpu_secs,
            rlim_max: cpu_secs,
        };
        if libc::setrlimit(libc::RLIMIT_CPU, &cpu_rlim) != 0 {
            return Err(io::Error::last_os_error());
        }

        let fsize_rlim = match limits.output_limit_mib {
            Some(mib) => {
                let bytes = mib_to_bytes(mib) as libc::rlim_t;
                libc::rlimit {
                    rlim_cur: bytes,
                    rlim_max: bytes,
                }
            }
            None => libc::rlimit {
                rlim_cur: libc::RLIM_INFINITY,
                rlim_max: libc::RLIM_INFINITY,
            },
        };
        if libc::setrlimit(libc::RLIMIT_FSIZE, &fsize_rlim) != 0 {
            return Err(io::Error::last_os_error());
        }

        // Disable core dumps: a large core can take seconds to write, which
        // this sandbox would otherwise misread as wall-clock exhaustion.
        let core_rlim = libc::rlimit {
            rlim_cur: 0,
            rlim_max: 0,
        };
        if libc::setrlimit(libc::RLIMIT_CORE, &core_rlim) != 0 {
            return Err(io::Error::last_os_error());
        }

        #[cfg(not(target_os = "macos"))]
        {
            let mut stack_rlim = libc::rlimit {
                rlim_cur: 0,
                rlim_max: 0,
            };
            if libc::getrlimit(libc::RLIMIT_STACK, &mut stack_rlim) != 0 {
                return Err(io::Error::last_os_error());
            }
            let stack_cur = match limits.memory_limit_mib {
                Some(mib) => {
                    let bytes = mib_to_bytes(mib) as libc::rlim_t;
                    if stack_rlim.rlim_max == libc::RLIM_INFINITY {
                        bytes
                    } else {
                        bytes.min(stack_rlim.rlim_max)
                    }
                }
                None => stack_rlim.rlim_max,
            };
            let new_stack = libc::rlimit {
                rlim_cur: stack_cur,
                rlim_max: stack_rlim.rlim_max,
            };
            if libc::setrlimit(libc::RLIMIT_STACK, &new_stack) != 0 {
                return Err(io::Error::last_os_error());
            }
        }

        if opts.ignore_sigpipe {
            if libc::signal(libc::SIGPIPE, libc::SIG_IGN) == libc::SIG_ERR {
                return Err(io::Error::last_os_error());
            }
        }

        if let Some(dir) = &opts.chdir {
            std::env::set_current_dir(dir)?;
        }

        Ok(())
    }
}

impl Process {
    pub fn spawn(
        program: &Path,
        args: &[String],
        limits: Limits,
        stdio: ChildStdio,
        opts: SpawnOptions,
    ) -> io::Result<Self> {
        let mut command = Command::new(program);
        command.args(args);
        command.envs(opts.envs.iter().map(|(k, v)| (k.clone(), v.clone())));

        if let Some(io) = stdio.stdin {
            command.stdin(io.into_stdio(true)?);
        }
        if let Some(io) = stdio.stdout {
            command.stdout(io.into_stdio(false)?);
        }
        if let Some(io) = stdio.stderr {
            command.stderr(io.into_stdio(false)?);
        }

        // SAFETY: the closure below only calls async-signal-safe libc
        // functions and runs strictly between fork and exec.
        unsafe {
            command.pre_exec(move || apply_sandbox_preexec(&limits, &opts));
        }

        let child = command.spawn()?;
        let pid = child.id() as i32;
        let popen_time = Instant::now();
        let reaped = Arc::new(AtomicBool::new(false));
        tracing::debug!(pid, program = %program.display(), "spawned sandboxed child");

        let watchdog = {
            let reaped = Arc::clone(&reaped);
            let deadline = limits.wall_clock_deadline_sec();
            Some(std::thread::spawn(move || {
                std::thread::sleep(std::time::Duration::from_secs_f64(deadline));
                if !reaped.load(Ordering::SeqCst) {
                    tracing::warn!(pid, deadline, "wall-clock watchdog killed child");
                    // SAFETY: kill is async-signal-safe and idempotent
                    // against an already-exited pid (ESRCH is ignored).
                    unsafe {
                        libc::kill(pid, libc::SIGKILL);
                    }
                }
            }))
        };

        Ok(Self {
            pid,
            child,
            popen_time,
            limits,
            reaped,
            watchdog,
            result: None,
        })
    }

    pub fn pid(&self) -> i32 {
        self.pid
    }

    pub fn stdin(&mut self) -> Option<std::process::ChildStdin> {
        self.child.stdin.take()
    }

    pub fn stdout(&mut self) -> Option<std::process::ChildStdout> {
        self.child.stdout.take()
    }

    pub fn stderr(&mut self) -> Option<std::process::ChildStderr> {
        self.child.stderr.take()
    }

    pub fn is_reaped(&self) -> bool {
        self.reaped.load(Ordering::SeqCst)
    }

    /// Non-blocking reap attempt (`wait4(pid, WNOHANG)`); a specific pid is
    /// targeted rather than `-1` so that concurrent test threads spawning
    /// unrelated children in the same process can never be reaped by a
    /// batch they aren't part of.
    pub fn try_reap(&mut self) -> io::Result<bool> {
        if self.reaped.load(Ordering::SeqCst) {
            return Ok(true);
        }
        let mut status: libc::c_int = 0;
        let mut rusage: libc::rusage = unsafe { std::mem::zeroed() };
        // SAFETY: pid is a valid child of this process that has not yet
        // been reaped through any other path.
        let waited = unsafe { libc::wait4(self.pid, &mut status, libc::WNOHANG, &mut rusage) };
        if waited == 0 {
            return Ok(false);
        }
        if waited < 0 {
            return Err(io::Error::last_os_error());
        }
        self.finish(status, rusage);
        Ok(true)
    }

    /// Blocking reap, used when the caller already knows no other work can
    /// proceed until this one child exits (e.g. waiting out the sandbox's
    /// own watchdog kill).
    pub fn wait_blocking(&mut self) -> io::Result<()> {
        if self.reaped.load(Ordering::SeqCst) {
            return Ok(());
        }
        let mut status: libc::c_int = 0;
        let mut rusage: libc::rusage = unsafe { std::mem::zeroed() };
        let waited = unsafe { libc::wait4(self.pid, &mut status, 0, &mut rusage) };
        if waited < 0 {
            return Err(io::Error::last_os_error());
        }
        self.finish(status, rusage);
        Ok(())
    }

    fn finish(&mut self, status: libc::c_int, rusage: libc::rusage) {
        let wall_time_sec = self.popen_time.elapsed().as_secs_f64();
        let cpu_time_sec = rusage_to_secs(rusage.ru_utime) + rusage_to_secs(rusage.ru_stime);
        let max_rss_kib = normalize_maxrss(rusage.ru_maxrss as u64);

        let (exit_code, exit_signal) = if libc::WIFSIGNALED(status) {
            (None, Some(libc::WTERMSIG(status)))
        } else if libc::WIFEXITED(status) {
            (Some(libc::WEXITSTATUS(status)), None)
        } else {
            (None, None)
        };

        self.reaped.store(true, Ordering::SeqCst);
        self.result = Some(ProcessResult {
            cpu_time_sec,
            wall_time_sec,
            max_rss_kib,
            exit_code,
            exit_signal,
        });
    }

    /// Best-effort SIGKILL; swallows `ESRCH` (already exited) to keep reap
    /// races idempotent.
    pub fn kill(&self) {
        tracing::debug!(pid = self.pid, "killing sandboxed child");
        unsafe {
            libc::kill(self.pid, libc::SIGKILL);
        }
    }

    pub fn is_cpu_timedout(&self) -> bool {
        self.result
            .is_some_and(|r| r.cpu_time_sec > self.limits.time_limit_sec)
    }

    pub fn is_wall_timedout(&self) -> bool {
        self.result
            .is_some_and(|r| r.wall_time_sec > self.limits.time_limit_sec)
    }

    pub fn is_timedout(&self) -> bool {
        self.is_cpu_timedout() || self.is_wall_timedout()
    }

    pub fn is_signaled_exit(&self) -> bool {
        self.result.is_some_and(|r| r.exit_signal.is_some())
    }
}

/// Output captured from a process whose stdout/stderr were piped.
#[derive(Debug, Clone, Default)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Spawns `program` with piped stdout/stderr, drains both streams on reader
/// threads so neither fills its pipe buffer and stalls the child, then waits
/// for exit. Grounded on `original_source::internal::runner.wait_for_outputs`,
/// which does the equivalent with `select()`; threads are the idiomatic
/// stand-in here.
pub fn run_and_capture(
    program: &Path,
    args: &[String],
    limits: Limits,
    opts: SpawnOptions,
) -> io::Result<(Process, CapturedOutput)> {
    let mut proc = Process::spawn(
        program,
        args,
        limits,
        ChildStdio {
            stdin: Some(ChildIo::Null),
            stdout: Some(ChildIo::Piped),
            stderr: Some(ChildIo::Piped),
        },
        opts,
    )?;

    let stdout_handle = proc.stdout().map(|mut s| {
        std::thread::spawn(move || {
            let mut buf = String::new();
            let _ = std::io::Read::read_to_string(&mut s, &mut buf);
            buf
        })
    });
    let stderr_handle = proc.stderr().map(|mut s| {
        std::thread::spawn(move || {
            let mut buf = String::new();
            let _ = std::io::Read::read_to_string(&mut s, &mut buf);
            buf
        })
    });

    proc.wait_blocking()?;

    let stdout = stdout_handle.map(|h| h.join().unwrap_or_default()).unwrap_or_default();
    let stderr = stderr_handle.map(|h| h.join().unwrap_or_default()).unwrap_or_default();

    Ok((proc, CapturedOutput { stdout, stderr }))
}

impl Drop for Process {
    fn drop(&mut self) {
        if let Some(handle) = self.watchdog.take() {
            // The watchdog checks `reaped` before acting; once this process
            // is reaped, letting the thread run to its deadline and exit on
            // its own is simpler and cheaper than a cancellation channel.
            drop(handle);
        }
    }
}

#[cfg(target_os = "macos")]
fn normalize_maxrss(raw: u64) -> u64 {
    raw / 1024
}

#[cfg(not(target_os = "macos"))]
fn normalize_maxrss(raw: u64) -> u64 {
    raw
}

fn rusage_to_secs(tv: libc::timeval) -> f64 {
    tv.tv_sec as f64 + (tv.tv_usec as f64) / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(time_limit_sec: f64) -> Limits {
        Limits {
            time_limit_sec,
            memory_limit_mib: Some(256),
            output_limit_mib: Some(64),
        }
    }

    #[test]
    fn spawn_and_reap_success() {
        let mut proc = Process::spawn(
            Path::new("/bin/true"),
            &[],
            limits(5.0),
            ChildStdio::default(),
            SpawnOptions::default(),
        )
        .expect("spawn /bin/true");
        proc.wait_blocking().expect("wait");
        let result = proc.result.expect("result recorded");
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(result.exit_signal, None);
        assert!(!proc.is_timedout());
    }

    #[test]
    fn nonzero_exit_is_captured() {
        let mut proc = Process::spawn(
            Path::new("/bin/sh"),
            &["-c".into(), "exit 7".into()],
            limits(5.0),
            ChildStdio::default(),
            SpawnOptions::default(),
        )
        .expect("spawn");
        proc.wait_blocking().expect("wait");
        assert_eq!(proc.result.unwrap().exit_code, Some(7));
    }

    #[test]
    fn signaled_exit_is_captured() {
        let mut proc = Process::spawn(
            Path::new("/bin/sh"),
            &["-c".into(), "kill -TERM $$".into()],
            limits(5.0),
            ChildStdio::default(),
            SpawnOptions::default(),
        )
        .expect("spawn");
        proc.wait_blocking().expect("wait");
        assert!(proc.is_signaled_exit());
        assert_eq!(proc.result.unwrap().exit_signal, Some(libc::SIGTERM));
    }

    #[test]
    fn try_reap_is_nonblocking_before_exit() {
        let mut proc = Process::spawn(
            Path::new("/bin/sh"),
            &["-c".into(), "sleep 0.3".into()],
            limits(5.0),
            ChildStdio::default(),
            SpawnOptions::default(),
        )
        .expect("spawn");
        assert!(!proc.try_reap().expect("nonblocking reap"));
        proc.wait_blocking().expect("wait");
        assert!(proc.is_reaped());
    }

    #[test]
    fn cpu_timeout_detected_via_rlimit_cpu() {
        // Busy-loop past a 1-second CPU limit; RLIMIT_CPU delivers SIGXCPU.
        let mut proc = Process::spawn(
            Path::new("/bin/sh"),
            &["-c".into(), "while true; do :; done".into()],
            limits(1.0),
            ChildStdio::default(),
            SpawnOptions::default(),
        )
        .expect("spawn");
        proc.wait_blocking().expect("wait");
        assert!(proc.is_timedout());
    }
}
