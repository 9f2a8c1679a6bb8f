//! Process exit status of the `witr` binary.
//!
//! 0 and 1 are answers, 10-19 mean the query could not be answered as
//! asked, 20 and up are failures inside witr.

use witr_common::Error;

/// Stable contract for scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Report printed (or help shown)
    Clean = 0,

    /// Several processes matched; candidates listed instead of a report
    Ambiguous = 1,

    /// Invalid arguments or target value
    ArgsError = 10,

    /// Target does not resolve to any process
    NotFound = 11,

    /// Socket found but its owner is hidden (privileges or namespaces)
    PermissionError = 12,

    /// Query not available on this platform
    Unsupported = 13,

    /// Unreadable or invalid configuration
    ConfigError = 14,

    /// A collector or tool failed in a way witr did not expect
    InternalError = 20,

    IoError = 21,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Exit code for a failed query.
    pub fn for_error(err: &Error) -> Self {
        match err {
            Error::InvalidTarget(_) => ExitCode::ArgsError,
            Error::NotFound(_) | Error::NoAncestry { .. } => ExitCode::NotFound,
            Error::OwnerNotDetected { .. } => ExitCode::PermissionError,
            Error::AmbiguousMatch { .. } => ExitCode::Ambiguous,
            Error::Unsupported(_) => ExitCode::Unsupported,
            Error::Config(_) => ExitCode::ConfigError,
            Error::Io(_) => ExitCode::IoError,
            Error::Collection(_) | Error::Tool(_) | Error::Json(_) => ExitCode::InternalError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_values() {
        assert_eq!(ExitCode::Clean.as_i32(), 0);
        assert_eq!(ExitCode::Ambiguous.as_i32(), 1);
        assert_eq!(ExitCode::ArgsError.as_i32(), 10);
        assert_eq!(ExitCode::NotFound.as_i32(), 11);
        assert_eq!(ExitCode::PermissionError.as_i32(), 12);
        assert_eq!(ExitCode::Unsupported.as_i32(), 13);
        assert_eq!(ExitCode::ConfigError.as_i32(), 14);
        assert_eq!(ExitCode::InternalError.as_i32(), 20);
        assert_eq!(ExitCode::IoError.as_i32(), 21);
    }

    #[test]
    fn test_for_error() {
        assert_eq!(
            ExitCode::for_error(&Error::OwnerNotDetected { port: 80 }),
            ExitCode::PermissionError
        );
        assert_eq!(
            ExitCode::for_error(&Error::NotFound("x".into())),
            ExitCode::NotFound
        );
        assert_eq!(
            ExitCode::for_error(&Error::InvalidTarget("x".into())),
            ExitCode::ArgsError
        );
    }
}
