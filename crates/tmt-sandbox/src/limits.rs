/// Time/memory/output caps applied to one spawned child. `None` means
/// unlimited for that dimension.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub time_limit_sec: f64,
    pub memory_limit_mib: Option<u64>,
    pub output_limit_mib: Option<u64>,
}

impl Limits {
    pub fn unlimited(time_limit_sec: f64) -> Self {
        Self {
            time_limit_sec,
            memory_limit_mib: None,
            output_limit_mib: None,
        }
    }

    /// The wall-clock deadline armed by the watchdog thread (§4.1): one
    /// second of slack beyond the CPU time limit, matching the original
    /// `wall_time_limit_sec = time_limit_sec + 1.0`.
    pub fn wall_clock_deadline_sec(&self) -> f64 {
        self.time_limit_sec + 1.0
    }
}

/// The hardcoded "first-party tooling" limits, distinct from the tight
/// limits applied to a contestant's solution (§3 "Problem configuration").
pub mod trusted {
    pub const COMPILE_TIME_LIMIT_SEC: f64 = 60.0;
    pub const COMPILE_MEMORY_LIMIT_MIB: Option<u64> = None;
    pub const STEP_TIME_LIMIT_SEC: f64 = 10.0;
    pub const STEP_MEMORY_LIMIT_MIB: Option<u64> = Some(4 * 1024);
    pub const STEP_OUTPUT_LIMIT_MIB: Option<u64> = None;
}
