//! Remote command channels.
//!
//! One uniform surface — send, ping, close — over the two ways a guest can
//! be reached: a persistent interactive console session, or a fresh
//! connection per command against the guest's floating IP. Which variant a
//! target gets is the target's decision, not the channel's.

use std::borrow::Cow;
use std::time::Duration;

use shell_escape::unix::escape;
use tracing::{debug, info, warn};

use sdncheck_common::errors::TransportError;
use sdncheck_common::{HarnessConfig, retry};

use crate::transport::{Credentials, Endpoint, ExecResult, Transport, TransportSession};

/// Sentinel returned where a command's failure is part of the result
/// rather than an error. Never matches a packets-received phrase.
pub const COMMAND_FAILED: &str = "remote command failed";

/// IP family for ping probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum IpFamily {
    #[default]
    V4,
    V6,
}

impl IpFamily {
    fn ping_binary(self) -> &'static str {
        match self {
            Self::V4 => "ping",
            Self::V6 => "ping6",
        }
    }
}

/// Build the ping invocation for a probe.
fn ping_command(
    destination: &str,
    count: u32,
    interface: Option<&str>,
    family: IpFamily,
) -> String {
    let mut command = format!("{} -c {}", family.ping_binary(), count);
    if let Some(interface) = interface {
        command.push_str(&format!(" -I {}", escape(Cow::from(interface))));
    }
    command.push_str(&format!(" {}", escape(Cow::from(destination))));
    command
}

/// A target's active access path.
pub enum CommandChannel {
    Interactive(InteractiveChannel),
    PerCommand(PerCommandChannel),
}

impl CommandChannel {
    pub async fn send(
        &mut self,
        command: &str,
        timeout: Duration,
    ) -> Result<String, TransportError> {
        match self {
            Self::Interactive(channel) => channel.send(command, timeout).await,
            Self::PerCommand(channel) => channel.send(command, timeout).await,
        }
    }

    pub async fn ping(
        &mut self,
        destination: &str,
        count: u32,
        interface: Option<&str>,
        family: IpFamily,
    ) -> Result<String, TransportError> {
        match self {
            Self::Interactive(channel) => channel.ping(destination, count, interface, family).await,
            Self::PerCommand(channel) => channel.ping(destination, count, interface, family).await,
        }
    }

    pub async fn close(&mut self) {
        match self {
            Self::Interactive(channel) => channel.close().await,
            Self::PerCommand(channel) => channel.close().await,
        }
    }

    pub fn is_interactive(&self) -> bool {
        matches!(self, Self::Interactive(_))
    }
}

/// Persistent prompt-driven session.
///
/// Lazily opened on first use, then reused for every send until closed.
/// Open attempts are retried on the configured interval up to the
/// console-open budget; exhausting it is a transport failure. Closing
/// returns the channel to unopened, so a later send reopens.
pub struct InteractiveChannel {
    transport: Box<dyn Transport>,
    endpoint: Endpoint,
    credentials: Credentials,
    open_timeout: Duration,
    retry_interval: Duration,
    command_timeout: Duration,
    session: Option<Box<dyn TransportSession>>,
}

impl InteractiveChannel {
    pub fn new(
        transport: Box<dyn Transport>,
        endpoint: Endpoint,
        credentials: Credentials,
        config: &HarnessConfig,
    ) -> Self {
        Self {
            transport,
            endpoint,
            credentials,
            open_timeout: config.console_open_timeout(),
            retry_interval: config.connect_retry_interval(),
            command_timeout: config.ssh_timeout(),
            session: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    async fn ensure_open(&mut self) -> Result<(), TransportError> {
        if self.session.is_some() {
            return Ok(());
        }
        let transport = &*self.transport;
        let endpoint = &self.endpoint;
        let credentials = &self.credentials;
        let attempt_timeout = self.open_timeout;
        let session = retry::until(
            "console open",
            self.retry_interval,
            self.open_timeout,
            || async move {
                match transport.open(endpoint, credentials, attempt_timeout).await {
                    Ok(session) => Some(session),
                    Err(err) => {
                        debug!("console open attempt on {endpoint} failed: {err}");
                        None
                    }
                }
            },
        )
        .await
        .ok_or_else(|| TransportError::RetriesExhausted {
            endpoint: self.endpoint.to_string(),
            budget: self.open_timeout,
        })?;
        info!("console session established on {}", self.endpoint);
        self.session = Some(session);
        Ok(())
    }

    pub async fn send(
        &mut self,
        command: &str,
        timeout: Duration,
    ) -> Result<String, TransportError> {
        self.ensure_open().await?;
        let Some(session) = self.session.as_mut() else {
            return Err(TransportError::Connect {
                endpoint: self.endpoint.to_string(),
                reason: "session not open".to_string(),
            });
        };
        let result = session.exec(command, timeout).await?;
        Ok(result.output)
    }

    pub async fn ping(
        &mut self,
        destination: &str,
        count: u32,
        interface: Option<&str>,
        family: IpFamily,
    ) -> Result<String, TransportError> {
        let command = ping_command(destination, count, interface, family);
        let timeout = self.command_timeout;
        self.send(&command, timeout).await
    }

    /// Release the session. Safe to call repeatedly; with nothing open
    /// this is a no-op.
    pub async fn close(&mut self) {
        if let Some(mut session) = self.session.take()
            && let Err(err) = session.close().await
        {
            warn!("console close on {} failed: {err}", self.endpoint);
        }
    }
}

/// Connect-per-command channel against an externally reachable address.
///
/// Stateless between sends. Each send retries the whole connect+exec cycle
/// on the configured interval until the command succeeds or the budget is
/// spent; transient failures inside the budget are absorbed, because a
/// guest that is still booting looks identical to one that is slow to
/// accept connections. Spending the budget is loud, not silent.
pub struct PerCommandChannel {
    transport: Box<dyn Transport>,
    endpoint: Endpoint,
    credentials: Credentials,
    command_timeout: Duration,
    retry_interval: Duration,
}

impl PerCommandChannel {
    pub fn new(
        transport: Box<dyn Transport>,
        endpoint: Endpoint,
        credentials: Credentials,
        config: &HarnessConfig,
    ) -> Self {
        Self {
            transport,
            endpoint,
            credentials,
            command_timeout: config.ssh_timeout(),
            retry_interval: config.connect_retry_interval(),
        }
    }

    async fn attempt(
        transport: &dyn Transport,
        endpoint: &Endpoint,
        credentials: &Credentials,
        command: &str,
        timeout: Duration,
    ) -> Result<ExecResult, TransportError> {
        let mut session = transport.open(endpoint, credentials, timeout).await?;
        let result = session.exec(command, timeout).await;
        let _ = session.close().await;
        result
    }

    pub async fn send(
        &mut self,
        command: &str,
        timeout: Duration,
    ) -> Result<String, TransportError> {
        let transport = &*self.transport;
        let endpoint = &self.endpoint;
        let credentials = &self.credentials;
        let output = retry::until("remote command", self.retry_interval, timeout, || async move {
            match Self::attempt(transport, endpoint, credentials, command, timeout).await {
                Ok(result) if result.success => Some(result.output),
                Ok(result) => {
                    warn!(
                        "remote command on {endpoint} failed, retrying: {}",
                        result.output.lines().next().unwrap_or("")
                    );
                    None
                }
                Err(err) => {
                    debug!("transport to {endpoint} not ready: {err}");
                    None
                }
            }
        })
        .await;
        output.ok_or_else(|| TransportError::RetriesExhausted {
            endpoint: self.endpoint.to_string(),
            budget: timeout,
        })
    }

    /// Run one ping probe and return its raw output.
    ///
    /// The command's own exit status is irrelevant here: an unreachable
    /// destination makes ping exit non-zero while still printing the
    /// received-packet count the caller interprets. Only connection
    /// establishment is retried; a broken exchange yields the failure
    /// sentinel instead.
    pub async fn ping(
        &mut self,
        destination: &str,
        count: u32,
        interface: Option<&str>,
        family: IpFamily,
    ) -> Result<String, TransportError> {
        let command = ping_command(destination, count, interface, family);
        let transport = &*self.transport;
        let endpoint = &self.endpoint;
        let credentials = &self.credentials;
        let budget = self.command_timeout;
        let command = command.as_str();
        let output = retry::until("ping probe", self.retry_interval, budget, || async move {
            let mut session = match transport.open(endpoint, credentials, budget).await {
                Ok(session) => session,
                Err(err) => {
                    debug!("transport to {endpoint} not ready: {err}");
                    return None;
                }
            };
            let result = session.exec(command, budget).await;
            let _ = session.close().await;
            match result {
                Ok(result) => Some(result.output),
                Err(TransportError::Connect { .. }) => None,
                Err(err) => {
                    warn!("ping exchange on {endpoint} broke: {err}");
                    Some(COMMAND_FAILED.to_string())
                }
            }
        })
        .await;
        output.ok_or_else(|| TransportError::RetriesExhausted {
            endpoint: self.endpoint.to_string(),
            budget,
        })
    }

    /// Nothing persists between commands; closing is a no-op, repeatedly.
    pub async fn close(&mut self) {}
}
