//! Process exit codes.

/// Exit codes for the hardlinker application.
///
/// - 0: Success (run completed, nothing failed)
/// - 1: General error (unexpected failure)
/// - 2: Configuration error (invalid arguments, bad root directory,
///   corrupt persistent index)
/// - 3: Partial success (run completed but some per-file operations
///   failed)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// The run completed without errors.
    Success = 0,
    /// An unexpected error occurred.
    GeneralError = 1,
    /// The run never started: configuration was invalid.
    ConfigError = 2,
    /// The run completed but some files could not be processed.
    PartialSuccess = 3,
}

impl ExitCode {
    /// Get the numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}
