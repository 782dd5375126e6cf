//! Flare core error types
//!
//! Re-exports flare-error and provides core-specific conveniences.

pub use flare_error::{Error, ErrorKind, ErrorStatus, Result};

use std::path::Path;

use crate::provider::ProviderError;

/// Wrap an IO error that happened while touching `path`
pub fn io_at(path: &Path, err: std::io::Error) -> Error {
    Error::from(err).with_context("path", path.display().to_string())
}

/// Map a provider failure onto the relay taxonomy
pub fn from_provider(err: ProviderError) -> Error {
    let message = err.to_string();
    let kind = match &err {
        ProviderError::Network(_) => ErrorKind::RelayUnreachable,
        ProviderError::Timeout => ErrorKind::RelayTimeout,
        ProviderError::RateLimited { .. } => ErrorKind::RelayUnreachable,
        ProviderError::Api { .. }
        | ProviderError::Parse(_)
        | ProviderError::AuthenticationFailed
        | ProviderError::Backend(_)
        | ProviderError::Other(_) => ErrorKind::RelayBadResponse,
    };
    Error::new(kind, message).set_source(err)
}

/// Create an InvalidArgument error for a target name that escapes the fuzz root
pub fn invalid_target_name(name: impl Into<String>) -> Error {
    let name = name.into();
    Error::invalid_argument(format!("invalid target name '{}'", name)).with_context("target", name)
}
