//! Per-command SSH transport over the system ssh client.
//!
//! Each exec spawns one `ssh` invocation in batch mode; nothing stays
//! connected between commands. The ssh client reserves exit status 255 for
//! its own failures, which is what separates "could not reach the guest"
//! from "the remote command exited non-zero".

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use sdncheck_common::errors::TransportError;

use super::{Credentials, Endpoint, ExecResult, Transport, TransportSession};

const SSH_CLIENT_FAILURE: i32 = 255;
const MAX_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Transport backed by the system ssh client.
pub struct SshTransport;

#[async_trait]
impl Transport for SshTransport {
    async fn open(
        &self,
        endpoint: &Endpoint,
        credentials: &Credentials,
        _timeout: Duration,
    ) -> Result<Box<dyn TransportSession>, TransportError> {
        // The ssh client connects on every exec; open only binds the
        // session parameters.
        Ok(Box::new(SshSession {
            endpoint: endpoint.clone(),
            credentials: credentials.clone(),
        }))
    }
}

struct SshSession {
    endpoint: Endpoint,
    credentials: Credentials,
}

/// Argument vector for one ssh invocation.
fn ssh_args(
    endpoint: &Endpoint,
    credentials: &Credentials,
    connect_timeout: Duration,
    command: &str,
) -> Vec<String> {
    let connect_secs = connect_timeout
        .as_secs()
        .clamp(1, MAX_CONNECT_TIMEOUT_SECS);
    let mut args = vec![
        "-o".to_string(),
        "BatchMode=yes".to_string(),
        "-o".to_string(),
        "StrictHostKeyChecking=no".to_string(),
        "-o".to_string(),
        format!("ConnectTimeout={connect_secs}"),
    ];
    if let Some(identity) = &credentials.identity_file {
        args.push("-i".to_string());
        args.push(identity.to_string_lossy().into_owned());
    }
    if let Some(port) = endpoint.port {
        args.push("-p".to_string());
        args.push(port.to_string());
    }
    args.push(format!("{}@{}", credentials.username, endpoint.host));
    args.push(command.to_string());
    args
}

#[async_trait]
impl TransportSession for SshSession {
    async fn exec(
        &mut self,
        command: &str,
        budget: Duration,
    ) -> Result<ExecResult, TransportError> {
        let args = ssh_args(&self.endpoint, &self.credentials, budget, command);
        debug!("ssh exec on {}: {}", self.endpoint, command);

        let output = timeout(budget, Command::new("ssh").args(&args).output())
            .await
            .map_err(|_| TransportError::Exec {
                endpoint: self.endpoint.to_string(),
                reason: "command timed out".to_string(),
            })?
            .map_err(|err| TransportError::Connect {
                endpoint: self.endpoint.to_string(),
                reason: format!("cannot spawn ssh: {err}"),
            })?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));

        match output.status.code() {
            Some(0) => Ok(ExecResult::ok(text)),
            Some(SSH_CLIENT_FAILURE) => Err(TransportError::Connect {
                endpoint: self.endpoint.to_string(),
                reason: text.lines().next().unwrap_or("ssh client failure").to_string(),
            }),
            Some(_) => Ok(ExecResult::failed(text)),
            None => Err(TransportError::Exec {
                endpoint: self.endpoint.to_string(),
                reason: "ssh terminated by signal".to_string(),
            }),
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        // Nothing held open between commands.
        Ok(())
    }
}
