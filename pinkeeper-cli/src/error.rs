//! CLI-specific error types and exit code mapping

use pinkeeper_core::error::PinkeeperError;

/// CLI-specific error type.
///
/// Each variant carries enough context for a user-friendly message.
/// The `exit_code()` method maps errors to process exit codes that CI can branch on.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// Dry run found manifests that a real run would rewrite.
    #[error("dry run: {0} manifest(s) would change")]
    PendingChanges(usize),

    /// Security was requested but no provider returned data.
    #[error("security scan has no data: every provider was unavailable")]
    NoSecurityData,

    /// At least one manifest could not be reconciled.
    #[error("{0} manifest(s) failed reconciliation")]
    Reconciliation(usize),

    /// At least one manifest could not be written.
    #[error("{0} manifest(s) could not be written")]
    Write(usize),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (stdout write, prompt input, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from pinkeeper-core.
    #[error("{0}")]
    Core(#[from] PinkeeperError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                                   |
    /// |------|-------------------------------------------|
    /// | 0    | Success                                   |
    /// | 1    | General / command error                   |
    /// | 2    | Configuration error                       |
    /// | 3    | Dry run detected pending changes          |
    /// | 4    | Security scan had no data                 |
    /// | 5    | Reconciliation failed in a manifest       |
    /// | 10   | IO / write error                          |
    /// | 130  | Cancelled during confirmation             |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::PendingChanges(_) => 3,
            Self::NoSecurityData => 4,
            Self::Reconciliation(_) => 5,
            Self::Write(_) | Self::Io(_) => 10,
            Self::Core(e) => match e {
                PinkeeperError::Config(_) => 2,
                PinkeeperError::Reconciliation(_) => 5,
                PinkeeperError::Write(_) | PinkeeperError::Io(_) => 10,
                PinkeeperError::Cancelled => 130,
                PinkeeperError::Provider(_) => 1,
            },
            Self::JsonSerialize(_) | Self::Command(_) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pinkeeper_core::error::{ConfigError, ProviderError};

    #[test]
    fn test_exit_code_config_error() {
        let err = CliError::Config("test error".to_owned());
        assert_eq!(err.exit_code(), 2, "config error should return exit code 2");
    }

    #[test]
    fn test_exit_code_pending_changes() {
        let err = CliError::PendingChanges(2);
        assert_eq!(err.exit_code(), 3, "dry run with changes should return exit code 3");
        assert!(err.to_string().contains("2 manifest(s)"));
    }

    #[test]
    fn test_exit_code_no_security_data() {
        assert_eq!(CliError::NoSecurityData.exit_code(), 4);
    }

    #[test]
    fn test_exit_code_reconciliation() {
        assert_eq!(CliError::Reconciliation(1).exit_code(), 5);
    }

    #[test]
    fn test_exit_code_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = CliError::Io(io_err);
        assert_eq!(err.exit_code(), 10, "io error should return exit code 10");
        assert_eq!(CliError::Write(1).exit_code(), 10);
    }

    #[test]
    fn test_exit_code_command_error() {
        let err = CliError::Command("test error".to_owned());
        assert_eq!(err.exit_code(), 1, "command error should return exit code 1");
    }

    #[test]
    fn test_exit_code_core_errors() {
        let config = CliError::Core(PinkeeperError::Config(ConfigError::FileNotFound {
            path: "pinkeeper.toml".to_owned(),
        }));
        assert_eq!(config.exit_code(), 2);

        let cancelled = CliError::Core(PinkeeperError::Cancelled);
        assert_eq!(cancelled.exit_code(), 130);

        let provider = CliError::Core(PinkeeperError::Provider(ProviderError::MissingToken {
            provider: "github".to_owned(),
        }));
        assert_eq!(provider.exit_code(), 1);
    }
}
