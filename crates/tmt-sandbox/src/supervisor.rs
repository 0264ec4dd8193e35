//! Waits on a *set* of [`Process`]es together, with SIGCHLD blocked for the
//! duration so reaping never races a lost wakeup, and guarantees that an
//! interrupt kills every still-alive child before propagating.
//!
//! Grounded on `original_source::internal::runner`'s
//! `pre_wait_procs`/`wait_procs`: block SIGCHLD, drain pending wakeups with
//! `sigwaitinfo`, reap with `wait4(..., WNOHANG)`, restore the prior mask on
//! every exit path (including interrupt).

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tmt_core::TmtError;

use crate::process::Process;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Installs a `SIGINT` handler that only flips a flag; `wait_procs` polls it
/// between reap attempts. Idempotent — safe to call more than once.
pub fn install_interrupt_handler() {
    extern "C" fn handler(_: libc::c_int) {
        INTERRUPTED.store(true, Ordering::SeqCst);
    }
    unsafe {
        libc::signal(libc::SIGINT, handler as libc::sighandler_t);
    }
}

#[cfg(test)]
pub fn reset_interrupted_for_test() {
    INTERRUPTED.store(false, Ordering::SeqCst);
}

#[cfg(test)]
pub fn simulate_interrupt_for_test() {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// RAII scope: blocks `SIGCHLD` on construction, restores the previous
/// process-wide mask on drop. Acquire one before spawning the first child
/// of a batch.
pub struct SigChldGuard {
    old_mask: libc::sigset_t,
}

impl SigChldGuard {
    pub fn block() -> std::io::Result<Self> {
        unsafe {
            let mut chld_set: libc::sigset_t = std::mem::zeroed();
            libc::sigemptyset(&mut chld_set);
            libc::sigaddset(&mut chld_set, libc::SIGCHLD);

            let mut old_mask: libc::sigset_t = std::mem::zeroed();
            if libc::pthread_sigmask(libc::SIG_BLOCK, &chld_set, &mut old_mask) != 0 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(Self { old_mask })
        }
    }
}

impl Drop for SigChldGuard {
    fn drop(&mut self) {
        unsafe {
            libc::pthread_sigmask(libc::SIG_SETMASK, &self.old_mask, std::ptr::null_mut());
        }
    }
}

/// Waits for every process in `procs` to exit. SIGCHLD must already be
/// blocked by the caller (see [`SigChldGuard`]) so that a child exiting
/// between a failed reap attempt and the next `sigtimedwait` is never
/// missed.
///
/// On interrupt, every still-alive process is sent SIGKILL, one best-effort
/// reap pass is attempted, and `Err(TmtError::Interrupted)` is returned. No
/// process is ever left unreaped *and* unkilled.
pub fn wait_procs(procs: &mut [&mut Process]) -> Result<(), TmtError> {
    let chld_set = unsafe {
        let mut set: libc::sigset_t = std::mem::zeroed();
        libc::sigemptyset(&mut set);
        libc::sigaddset(&mut set, libc::SIGCHLD);
        set
    };

    loop {
        let mut all_reaped = true;
        for proc in procs.iter_mut() {
            if !proc.try_reap().map_err(|e| TmtError::StageExecutionFailure {
                stage: "supervisor".into(),
                message: e.to_string(),
            })? {
                all_reaped = false;
            }
        }
        if all_reaped {
            return Ok(());
        }

        if INTERRUPTED.load(Ordering::SeqCst) {
            tracing::warn!(count = procs.len(), "interrupted, killing still-alive children");
            for proc in procs.iter() {
                if !proc.is_reaped() {
                    proc.kill();
                }
            }
            // Best-effort reap: a few short polls give the kernel time to
            // deliver SIGKILL before we give up and let Drop clean up later.
            for _ in 0..20 {
                if procs.iter_mut().all(|p| p.try_reap().unwrap_or(true)) {
                    break;
                }
                std::thread::sleep(Duration::from_millis(10));
            }
            return Err(TmtError::Interrupted);
        }

        // Drain one pending SIGCHLD (or time out) before re-polling; SIGCHLD
        // is blocked, so this is the correct way to consume it.
        let timeout = libc::timespec {
            tv_sec: 0,
            tv_nsec: 100_000_000,
        };
        unsafe {
            libc::sigtimedwait(&chld_set, std::ptr::null_mut(), &timeout);
        }
        // Ignore sigtimedwait's result: either SIGCHLD arrived (loop will
        // observe the reap) or the timeout elapsed (loop re-checks anyway,
        // bounding how long a missed wakeup can delay progress).
        std::thread::sleep(Duration::from_millis(0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::Limits;
    use crate::process::{ChildStdio, SpawnOptions};
    use std::path::Path;

    fn limits(time_limit_sec: f64) -> Limits {
        Limits {
            time_limit_sec,
            memory_limit_mib: Some(256),
            output_limit_mib: Some(64),
        }
    }

    #[test]
    fn waits_for_all_processes_in_the_set() {
        let _guard = SigChldGuard::block().expect("block sigchld");
        let mut p1 = Process::spawn(
            Path::new("/bin/sh"),
            &["-c".into(), "sleep 0.1".into()],
            limits(5.0),
            ChildStdio::default(),
            SpawnOptions::default(),
        )
        .unwrap();
        let mut p2 = Process::spawn(
            Path::new("/bin/sh"),
            &["-c".into(), "sleep 0.2".into()],
            limits(5.0),
            ChildStdio::default(),
            SpawnOptions::default(),
        )
        .unwrap();

        wait_procs(&mut [&mut p1, &mut p2]).expect("wait_procs");
        assert!(p1.is_reaped());
        assert!(p2.is_reaped());
    }

    #[test]
    fn interrupt_kills_every_still_alive_child() {
        reset_interrupted_for_test();
        let _guard = SigChldGuard::block().expect("block sigchld");
        let mut p1 = Process::spawn(
            Path::new("/bin/sh"),
            &["-c".into(), "sleep 30".into()],
            limits(60.0),
            ChildStdio::default(),
            SpawnOptions::default(),
        )
        .unwrap();

        simulate_interrupt_for_test();
        let result = wait_procs(&mut [&mut p1]);
        assert!(matches!(result, Err(TmtError::Interrupted)));
        assert!(p1.is_reaped());
        reset_interrupted_for_test();
    }
}
