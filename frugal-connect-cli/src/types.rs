//! CLI-specific type definitions.

/// Exit codes for the setup tool.
///
/// These codes follow the documented convention where:
/// - 0 indicates success, including a user-declined confirmation and runs
///   where some additional accounts were skipped (partial success)
/// - 2 indicates a validation failure or a provisioning hard failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Operation completed (fully or partially) or the user declined
    Success,

    /// Validation failure, provisioning hard failure, or IO error
    Error,
}

impl ExitCode {
    /// Convert to the integer exit code for process::exit()
    pub fn code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::Error => 2,
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(exit_code: ExitCode) -> Self {
        exit_code.code()
    }
}
