//! Process exit codes
//!
//! Scripts rely on these values, keep them stable.

use mm_core::Error;

/// Exit codes returned by `mm`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Everything succeeded
    Success = 0,
    /// Failure, including a batch where some items failed
    GeneralError = 1,
    /// Bad arguments or configuration
    UsageError = 2,
    /// Remote unreachable or rejected the request
    NetworkError = 3,
    /// Credentials rejected
    AuthError = 4,
    /// Bucket, table or local directory missing
    NotFound = 5,
    /// Cancelled by Ctrl-C
    Interrupted = 130,
}

impl ExitCode {
    /// Map a core error to the exit code a caller should see
    pub fn from_error(error: &Error) -> Self {
        match error {
            Error::InvalidRetry(_) | Error::Config(_) | Error::InvalidPath(_) => {
                ExitCode::UsageError
            }
            Error::Network(_) | Error::ThroughputExceeded(_) => ExitCode::NetworkError,
            Error::Auth(_) => ExitCode::AuthError,
            Error::NotFound(_) => ExitCode::NotFound,
            Error::Cancelled => ExitCode::Interrupted,
            Error::Io(_) | Error::General(_) => ExitCode::GeneralError,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(ExitCode::Success.code(), 0);
        assert_eq!(ExitCode::GeneralError.code(), 1);
        assert_eq!(ExitCode::UsageError.code(), 2);
        assert_eq!(ExitCode::NetworkError.code(), 3);
        assert_eq!(ExitCode::AuthError.code(), 4);
        assert_eq!(ExitCode::NotFound.code(), 5);
        assert_eq!(ExitCode::Interrupted.code(), 130);
    }

    #[test]
    fn test_from_error() {
        assert_eq!(
            ExitCode::from_error(&Error::InvalidRetry(-2)),
            ExitCode::UsageError
        );
        assert_eq!(
            ExitCode::from_error(&Error::ThroughputExceeded("busy".to_string())),
            ExitCode::NetworkError
        );
        assert_eq!(
            ExitCode::from_error(&Error::NotFound("table".to_string())),
            ExitCode::NotFound
        );
        assert_eq!(ExitCode::from_error(&Error::Cancelled), ExitCode::Interrupted);
    }
}
