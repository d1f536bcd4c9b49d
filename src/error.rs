//! Top-level error types for the release tool.
//!
//! Pipeline failures stay [`crate::bundler::Error`]; this layer adds CLI
//! failures and maps everything to a process exit.

use thiserror::Error;

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, ReleasifyError>;

/// Main error type of the binary
#[derive(Error, Debug)]
pub enum ReleasifyError {
    /// CLI argument errors
    #[error("CLI error: {0}")]
    Cli(#[from] CliError),

    /// Release pipeline errors
    #[error("Release error: {0}")]
    Release(#[from] crate::bundler::Error),
}

/// CLI-specific errors
#[derive(Error, Debug)]
pub enum CliError {
    /// Invalid command line arguments
    #[error("Invalid arguments: {reason}")]
    InvalidArguments {
        /// Reason for the error
        reason: String,
    },

    /// Missing required argument
    #[error("Missing required argument: {argument}")]
    MissingArgument {
        /// Argument name
        argument: String,
    },
}

impl ReleasifyError {
    /// Hints printed after the error message.
    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            Self::Release(e) if e.is_rejection() => vec![
                "Fix the package layout or manifest and run again".to_string(),
                "Use --allow-unaware if the package intentionally has no update-aware executables"
                    .to_string(),
            ],
            Self::Release(e) if e.is_retryable() => {
                vec!["Another process is holding the file; close it and run again".to_string()]
            }
            Self::Cli(_) => vec!["Run with --help for usage".to_string()],
            _ => vec!["Run with --verbose for details".to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggestions_follow_error_kind() {
        let rejection = ReleasifyError::from(crate::bundler::Error::validation("no lib"));
        assert!(rejection.recovery_suggestions()[0].contains("package layout"));

        let cli = ReleasifyError::from(CliError::MissingArgument {
            argument: "--package".into(),
        });
        assert!(cli.to_string().contains("--package"));
        assert!(cli.recovery_suggestions()[0].contains("--help"));
    }
}
