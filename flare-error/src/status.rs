//! Error status: whether a failure is transient

use std::fmt;

/// Classification of an error, derived from its kind.
///
/// flare never retries on its own. The status is only shown in error output
/// so a person or script reading it can tell a flaky peer from a bad request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorStatus {
    /// The same request will fail again
    Permanent,
    /// Timeouts and unreachable backends
    Temporary,
}

impl ErrorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorStatus::Permanent => "permanent",
            ErrorStatus::Temporary => "temporary",
        }
    }
}

impl fmt::Display for ErrorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
