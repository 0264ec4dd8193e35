//! The process sandbox (§4.1) and process group supervisor (§4.2): spawn a
//! child under CPU/RSS/FSIZE/CORE limits with a wall-clock watchdog, and
//! wait on a set of such children with SIGCHLD blocked and leak-free
//! cleanup on interrupt.

pub mod limits;
pub mod process;
pub mod supervisor;

pub use limits::Limits;
pub use process::{CapturedOutput, ChildIo, ChildStdio, Process, ProcessResult, SpawnOptions, run_and_capture};
pub use supervisor::{SigChldGuard, install_interrupt_handler, wait_procs};
