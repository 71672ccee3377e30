//! Shared plumbing for the sdncheck harness: the configuration snapshot,
//! product release comparison, the error taxonomy and the bounded-retry
//! combinator every blocking wait goes through.

pub mod config;
pub mod errors;
pub mod release;
pub mod retry;

pub use config::{AccessConfig, HarnessConfig, SutConfig};
pub use errors::{HarnessError, TransportError, VersionError};
pub use release::{EXTERNAL_ID_RELEASE, Release};
