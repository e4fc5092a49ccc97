use loadr_core::RunResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,

    /// One or more thresholds failed.
    ThresholdsFailed = 11,

    /// A threshold marked `abortOnFail` stopped the run early.
    AbortedByThreshold = 12,

    /// Invalid CLI/config/options (bad flags, invalid durations, invalid thresholds syntax, etc.).
    InvalidInput = 30,

    /// Internal/runtime error (IO errors, task failures, unexpected invariants).
    RuntimeError = 40,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    #[must_use]
    pub fn from_result(result: &RunResult) -> Self {
        if result.aborted_by.is_some() {
            Self::AbortedByThreshold
        } else if result.passed() {
            Self::Success
        } else {
            Self::ThresholdsFailed
        }
    }
}
