//! The main Error type for flare

use crate::{ErrorKind, ErrorStatus};
use std::fmt;

/// The unified error type for all flare operations.
///
/// This error type provides:
/// - `kind`: What type of error occurred
/// - `message`: Human-readable description
/// - `status`: Whether the failure is transient, derived from the kind
/// - `operation`: What operation caused the error
/// - `context`: Key-value pairs for debugging
/// - `source`: The underlying error (if any)
///
/// # Example
///
/// ```rust
/// use flare_error::{Error, ErrorKind, ErrorStatus};
///
/// let err = Error::new(ErrorKind::RelayTimeout, "no reply within 120s")
///     .with_operation("relay::send")
///     .with_context("model", "gpt-4")
///     .with_context("turns", "3");
///
/// assert_eq!(err.kind(), ErrorKind::RelayTimeout);
/// assert_eq!(err.status(), ErrorStatus::Temporary);
/// ```
pub struct Error {
    kind: ErrorKind,
    message: String,
    status: ErrorStatus,
    operation: &'static str,
    context: Vec<(&'static str, String)>,
    source: Option<anyhow::Error>,
}

impl Error {
    /// Create a new error with the given kind and message
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let status = if kind.is_transient() {
            ErrorStatus::Temporary
        } else {
            ErrorStatus::Permanent
        };

        Self {
            kind,
            message: message.into(),
            status,
            operation: "",
            context: Vec::new(),
            source: None,
        }
    }

    // =========================================================================
    // Getters
    // =========================================================================

    /// Get the error kind
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the error status, as shown in Display and Debug output
    pub fn status(&self) -> ErrorStatus {
        self.status
    }

    /// Get the operation that caused this error
    pub fn operation(&self) -> &'static str {
        self.operation
    }

    /// Get the context key-value pairs
    pub fn context(&self) -> &[(&'static str, String)] {
        &self.context
    }

    // =========================================================================
    // Builders (chainable)
    // =========================================================================

    /// Set the operation that caused this error.
    ///
    /// If an operation was already set, the previous one is moved to context
    /// as "called" to preserve the call chain.
    pub fn with_operation(mut self, operation: &'static str) -> Self {
        if !self.operation.is_empty() {
            self.context.push(("called", self.operation.to_string()));
        }
        self.operation = operation;
        self
    }

    /// Add context to the error
    pub fn with_context(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.context.push((key, value.into()));
        self
    }

    /// Set the source error.
    ///
    /// # Panics (debug only)
    /// Panics in debug mode if source was already set.
    pub fn set_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        debug_assert!(self.source.is_none(), "source error already set");
        self.source = Some(source.into());
        self
    }
}

// =============================================================================
// Display - compact, single-line format for logs
// =============================================================================

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) at {}", self.kind, self.status, self.operation)?;

        if !self.context.is_empty() {
            write!(f, ", context {{ ")?;
            for (i, (key, value)) in self.context.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}: {}", key, value)?;
            }
            write!(f, " }}")?;
        }

        if !self.message.is_empty() {
            write!(f, " => {}", self.message)?;
        }

        Ok(())
    }
}

// =============================================================================
// Debug - verbose, multi-line format for debugging
// =============================================================================

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({}) at {}", self.kind, self.status, self.operation)?;

        if !self.message.is_empty() {
            writeln!(f)?;
            writeln!(f, "    Message: {}", self.message)?;
        }

        if !self.context.is_empty() {
            writeln!(f)?;
            writeln!(f, "    Context:")?;
            for (key, value) in &self.context {
                writeln!(f, "        {}: {}", key, value)?;
            }
        }

        if let Some(source) = &self.source {
            writeln!(f)?;
            writeln!(f, "    Source: {:?}", source)?;
        }

        Ok(())
    }
}

// =============================================================================
// std::error::Error implementation
// =============================================================================

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

// =============================================================================
// Convenient From implementations (be careful not to leak raw errors!)
// =============================================================================

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::FileNotFound,
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
            _ => ErrorKind::IoFailed,
        };
        Error::new(kind, err.to_string())
            .with_operation("io")
            .set_source(err)
    }
}


// =============================================================================
// Convenience constructors
// =============================================================================

impl Error {
    /// Create an Unexpected error
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unexpected, message)
    }

    /// Create a ConfigInvalid error
    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConfigInvalid, message)
    }

    /// Create an InvalidArgument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    /// Create a RelayUnreachable error
    pub fn relay_unreachable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RelayUnreachable, message)
    }

    /// Create a RelayTimeout error
    pub fn relay_timeout(secs: u64) -> Self {
        Self::new(ErrorKind::RelayTimeout, format!("no reply within {}s", secs))
            .with_context("timeout_secs", secs.to_string())
    }

    /// Create a RelayBadResponse error
    pub fn relay_bad_response(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RelayBadResponse, message)
    }

    /// Create an ExecutionFailure error for a command that exited nonzero
    pub fn execution_failure(command: impl Into<String>, exit_code: i32, stderr: impl Into<String>) -> Self {
        Self::new(ErrorKind::ExecutionFailure, stderr)
            .with_context("command", command)
            .with_context("exit_code", exit_code.to_string())
    }

    /// Create an ExecutionTimeout error
    pub fn execution_timeout(command: impl Into<String>, secs: u64) -> Self {
        let command = command.into();
        Self::new(ErrorKind::ExecutionTimeout, format!("'{}' did not finish within {}s", command, secs))
            .with_context("command", command)
            .with_context("timeout_secs", secs.to_string())
    }

    /// Create a ToolUnavailable error
    pub fn tool_unavailable(program: impl Into<String>) -> Self {
        let program = program.into();
        Self::new(ErrorKind::ToolUnavailable, format!("'{}' could not be started", program))
            .with_context("program", program)
    }

    /// Create a CorpusNotFound error
    pub fn corpus_not_found(target: impl Into<String>) -> Self {
        let target = target.into();
        Self::new(ErrorKind::CorpusNotFound, format!("no crash corpus found for target '{}'", target))
            .with_context("target", target)
    }

    /// Create a TargetNotFound error
    pub fn target_not_found(target: impl Into<String>) -> Self {
        let target = target.into();
        Self::new(ErrorKind::TargetNotFound, format!("no target program found for '{}'", target))
            .with_context("target", target)
    }

    /// Create a ReplayError error
    pub fn replay_error(crash: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::ReplayError, reason)
            .with_context("crash", crash)
    }

    /// Create a ParseFailed error
    pub fn parse_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ParseFailed, message)
    }
}
