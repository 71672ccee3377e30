//! Error taxonomy for the harness.
//!
//! Three families, with different propagation rules:
//! - [`VersionError`] — a bad release string or an invalid cross-kind
//!   comparison. Programmer/config error, never retried.
//! - [`TransportError`] — connection-level failure surfaced by a channel
//!   after its own retry budget is spent. Hard test failure.
//! - [`HarnessError::Precondition`] — a target capability used before the
//!   required attach/associate step. Programming error in test
//!   construction, surfaced immediately.
//!
//! Expected transient failures (guest still booting, SSH not up yet) are
//! not errors at all: channels absorb them inside their retry budget and
//! only convert budget exhaustion into [`TransportError::RetriesExhausted`].

use std::time::Duration;

use thiserror::Error;

/// Errors from parsing or comparing product releases.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    /// The text matches no recognized release grammar.
    #[error("malformed release string '{0}'")]
    Malformed(String),

    /// A numeric release was compared against a codename release.
    #[error("releases '{left}' and '{right}' have no defined order")]
    Incomparable { left: String, right: String },
}

/// Connection-level failures surfaced by a command channel.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport could not reach the endpoint.
    #[error("failed to reach {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },

    /// The transport was connected but the exchange broke down.
    #[error("remote execution on {endpoint} failed: {reason}")]
    Exec { endpoint: String, reason: String },

    /// The retry budget was spent without a successful attempt.
    #[error("gave up on {endpoint} after {}s of retries", budget.as_secs())]
    RetriesExhausted { endpoint: String, budget: Duration },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Top-level harness failures.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error(transparent)]
    Version(#[from] VersionError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A capability was used before its preconditions were met.
    #[error("precondition violated: {0}")]
    Precondition(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl HarnessError {
    /// Shorthand for a precondition violation.
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition(message.into())
    }
}
