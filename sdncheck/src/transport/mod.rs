//! Transport seam for remote guest access.
//!
//! A transport turns an endpoint plus credentials into a session that can
//! execute commands. Channels own the lifecycle and retry policy; a
//! transport only knows how to connect and exec. Keeping the seam this
//! narrow is what lets the scripted [`mock`] transport stand in for either
//! real path in tests.

pub mod mock;
pub mod ssh;
pub mod telnet;

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

use sdncheck_common::errors::TransportError;

/// Where a transport connects to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: Option<u16>,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port: Some(port),
        }
    }

    /// An endpoint on the transport's default port.
    pub fn host_only(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) => write!(f, "{}:{}", self.host, port),
            None => write!(f, "{}", self.host),
        }
    }
}

/// Login identity for a guest.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub secret: Option<String>,
    pub identity_file: Option<PathBuf>,
}

impl Credentials {
    pub fn password(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: Some(secret.into()),
            identity_file: None,
        }
    }

    pub fn key(username: impl Into<String>, identity_file: impl Into<PathBuf>) -> Self {
        Self {
            username: username.into(),
            secret: None,
            identity_file: Some(identity_file.into()),
        }
    }
}

// Secrets must not leak into logs or failure messages.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("secret", &self.secret.as_ref().map(|_| "***"))
            .field("identity_file", &self.identity_file)
            .finish()
    }
}

/// Outcome of one remote command execution.
#[derive(Debug, Clone)]
pub struct ExecResult {
    pub output: String,
    /// Whether the remote command itself succeeded. Interactive consoles
    /// carry no exit status and always report success.
    pub success: bool,
}

impl ExecResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            success: true,
        }
    }

    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            success: false,
        }
    }
}

/// Connection factory for one access mechanism.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish a session. A single attempt; retrying is the caller's
    /// policy.
    async fn open(
        &self,
        endpoint: &Endpoint,
        credentials: &Credentials,
        timeout: Duration,
    ) -> Result<Box<dyn TransportSession>, TransportError>;
}

/// An established exchange with a guest.
#[async_trait]
pub trait TransportSession: Send {
    /// Execute one command. A remote command's own non-zero exit is part
    /// of the [`ExecResult`], never an error; errors are reserved for the
    /// exchange itself breaking down.
    async fn exec(&mut self, command: &str, timeout: Duration)
    -> Result<ExecResult, TransportError>;

    /// Release the underlying connection. Safe to call more than once.
    async fn close(&mut self) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_display_includes_port_when_set() {
        assert_eq!(Endpoint::new("compute-3", 2031).to_string(), "compute-3:2031");
        assert_eq!(Endpoint::host_only("10.0.0.5").to_string(), "10.0.0.5");
    }

    #[test]
    fn credentials_debug_redacts_the_secret() {
        let credentials = Credentials::password("cirros", "cubswin:)");
        let rendered = format!("{credentials:?}");
        assert!(rendered.contains("cirros"));
        assert!(!rendered.contains("cubswin"));
    }
}
