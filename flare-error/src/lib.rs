//! # flare-error
//!
//! Unified error handling for flare, following OpenDAL's error handling practices.
//!
//! ## Design Philosophy
//!
//! - **ErrorKind**: Know what error occurred (e.g., RelayTimeout, CorpusNotFound)
//! - **ErrorStatus**: Tell transient failures from permanent ones in output
//! - **Error Context**: Assist in locating the cause with rich context
//! - **Error Source**: Wrap underlying errors without leaking raw types
//!
//! ## Usage
//!
//! ```rust
//! use flare_error::{Error, ErrorKind};
//!
//! fn example() -> Result<(), Error> {
//!     Err(Error::new(ErrorKind::CorpusNotFound, "no crash corpus for target 'png'")
//!         .with_operation("triage::resolve_corpus")
//!         .with_context("target", "png")
//!         .with_context("layouts", "campaign,flat"))
//! }
//! ```
//!
//! ## Principles
//!
//! - All functions return `Result<T, flare_error::Error>`
//! - External errors are wrapped with `set_source(err)`
//! - Same error handled once, subsequent ops only append context
//! - Don't abuse `From<OtherError>` to prevent raw error leakage

mod error;
mod kind;
mod status;

pub use error::Error;
pub use kind::ErrorKind;
pub use status::ErrorStatus;

/// Result type alias using flare Error
pub type Result<T> = std::result::Result<T, Error>;
