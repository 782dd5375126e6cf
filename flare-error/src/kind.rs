//! Error kinds for flare operations

use std::fmt;

/// The kind of error that occurred.
///
/// This enum categorizes errors to help users write clear error handling logic.
/// Users can match on ErrorKind to decide how to handle specific error cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // =========================================================================
    // General errors
    // =========================================================================
    /// An unexpected error occurred - catch-all for unhandled cases
    Unexpected,

    /// Invalid configuration or parameters
    ConfigInvalid,

    /// Invalid argument passed to function
    InvalidArgument,

    // =========================================================================
    // Relay (language model) errors
    // =========================================================================
    /// The model backend could not be reached
    RelayUnreachable,

    /// The model backend did not answer within the configured timeout
    RelayTimeout,

    /// The model backend answered with an error or an unusable payload
    RelayBadResponse,

    // =========================================================================
    // Execution errors
    // =========================================================================
    /// A command exited with a nonzero status
    ExecutionFailure,

    /// A command did not finish within the configured timeout
    ExecutionTimeout,

    /// An external program (shell, status tool, replay tool) could not be started
    ToolUnavailable,

    // =========================================================================
    // Triage errors
    // =========================================================================
    /// No crash corpus directory exists for the target
    CorpusNotFound,

    /// No target binary could be resolved
    TargetNotFound,

    /// Replaying a crash input could not be carried out
    ReplayError,

    // =========================================================================
    // IO errors
    // =========================================================================
    /// File not found
    FileNotFound,

    /// Permission denied
    PermissionDenied,

    /// IO operation failed
    IoFailed,

    // =========================================================================
    // Parse errors
    // =========================================================================
    /// Failed to parse input
    ParseFailed,
}

impl ErrorKind {
    /// Returns the error kind as a static string
    pub fn as_str(&self) -> &'static str {
        match self {
            // General
            ErrorKind::Unexpected => "Unexpected",
            ErrorKind::ConfigInvalid => "ConfigInvalid",
            ErrorKind::InvalidArgument => "InvalidArgument",

            // Relay
            ErrorKind::RelayUnreachable => "RelayUnreachable",
            ErrorKind::RelayTimeout => "RelayTimeout",
            ErrorKind::RelayBadResponse => "RelayBadResponse",

            // Execution
            ErrorKind::ExecutionFailure => "ExecutionFailure",
            ErrorKind::ExecutionTimeout => "ExecutionTimeout",
            ErrorKind::ToolUnavailable => "ToolUnavailable",

            // Triage
            ErrorKind::CorpusNotFound => "CorpusNotFound",
            ErrorKind::TargetNotFound => "TargetNotFound",
            ErrorKind::ReplayError => "ReplayError",

            // IO
            ErrorKind::FileNotFound => "FileNotFound",
            ErrorKind::PermissionDenied => "PermissionDenied",
            ErrorKind::IoFailed => "IoFailed",

            // Parse
            ErrorKind::ParseFailed => "ParseFailed",
        }
    }

    /// Whether the failure comes from a slow or absent peer rather than bad input
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorKind::RelayUnreachable | ErrorKind::RelayTimeout | ErrorKind::ExecutionTimeout
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
