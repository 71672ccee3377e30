//! Interactive console transport.
//!
//! Connects to a guest's serial console exposed on a hypervisor TCP port,
//! walks the login dialogue and then drives the shell by writing one
//! command line at a time and reading until the prompt pattern shows up
//! again. There is no exit status on a console; callers get the raw text
//! between echo and prompt.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{Instant, timeout};
use tracing::{debug, info};

use sdncheck_common::errors::TransportError;

use super::{Credentials, Endpoint, ExecResult, Transport, TransportSession};

const DEFAULT_CONSOLE_PORT: u16 = 23;

static LOGIN_PROMPT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)login:\s*$").expect("login prompt pattern"));
static PASSWORD_PROMPT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)password:\s*$").expect("password prompt pattern"));

/// Interactive console transport. One instance per image profile, carrying
/// the shell prompt pattern the guest presents after login.
pub struct ConsoleTransport {
    prompt: Regex,
}

impl ConsoleTransport {
    pub fn new(prompt_pattern: &str) -> Result<Self, TransportError> {
        let prompt = Regex::new(prompt_pattern).map_err(|err| TransportError::Connect {
            endpoint: "console".to_string(),
            reason: format!("invalid prompt pattern '{prompt_pattern}': {err}"),
        })?;
        Ok(Self { prompt })
    }
}

#[async_trait]
impl Transport for ConsoleTransport {
    async fn open(
        &self,
        endpoint: &Endpoint,
        credentials: &Credentials,
        budget: Duration,
    ) -> Result<Box<dyn TransportSession>, TransportError> {
        let deadline = Instant::now() + budget;
        let address = format!(
            "{}:{}",
            endpoint.host,
            endpoint.port.unwrap_or(DEFAULT_CONSOLE_PORT)
        );
        let stream = timeout(budget, TcpStream::connect(&address))
            .await
            .map_err(|_| TransportError::Connect {
                endpoint: address.clone(),
                reason: "connect timed out".to_string(),
            })?
            .map_err(|err| TransportError::Connect {
                endpoint: address.clone(),
                reason: err.to_string(),
            })?;

        let mut session = ConsoleSession {
            stream,
            prompt: self.prompt.clone(),
            endpoint: address.clone(),
        };
        session.login(credentials, deadline).await?;
        info!("console session open on {address}");
        Ok(Box::new(session))
    }
}

struct ConsoleSession {
    stream: TcpStream,
    prompt: Regex,
    endpoint: String,
}

impl ConsoleSession {
    async fn login(
        &mut self,
        credentials: &Credentials,
        deadline: Instant,
    ) -> Result<(), TransportError> {
        self.read_until(&LOGIN_PROMPT, deadline).await?;
        let username = credentials.username.clone();
        self.write_line(&username).await?;
        if let Some(secret) = credentials.secret.clone() {
            self.read_until(&PASSWORD_PROMPT, deadline).await?;
            self.write_line(&secret).await?;
        }
        let prompt = self.prompt.clone();
        self.read_until(&prompt, deadline).await?;
        Ok(())
    }

    async fn read_until(
        &mut self,
        pattern: &Regex,
        deadline: Instant,
    ) -> Result<String, TransportError> {
        let mut collected = String::new();
        let mut buf = [0u8; 4096];
        loop {
            if pattern.is_match(&collected) {
                return Ok(collected);
            }
            let remaining = deadline
                .checked_duration_since(Instant::now())
                .filter(|left| !left.is_zero())
                .ok_or_else(|| self.broken("timed out waiting for prompt"))?;
            let read = timeout(remaining, self.stream.read(&mut buf))
                .await
                .map_err(|_| self.broken("timed out waiting for prompt"))?
                .map_err(TransportError::Io)?;
            if read == 0 {
                return Err(self.broken("console closed the connection"));
            }
            collected.push_str(&String::from_utf8_lossy(&buf[..read]));
        }
    }

    async fn write_line(&mut self, line: &str) -> Result<(), TransportError> {
        self.stream.write_all(line.as_bytes()).await?;
        self.stream.write_all(b"\n").await?;
        self.stream.flush().await?;
        Ok(())
    }

    fn broken(&self, reason: &str) -> TransportError {
        TransportError::Exec {
            endpoint: self.endpoint.clone(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl TransportSession for ConsoleSession {
    async fn exec(
        &mut self,
        command: &str,
        budget: Duration,
    ) -> Result<ExecResult, TransportError> {
        let deadline = Instant::now() + budget;
        debug!("console exec on {}: {}", self.endpoint, command);
        self.write_line(command).await?;
        let prompt = self.prompt.clone();
        let raw = self.read_until(&prompt, deadline).await?;
        Ok(ExecResult::ok(extract_command_output(&raw, command, &prompt)))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.stream.shutdown().await.ok();
        Ok(())
    }
}

/// Strip the echoed command line and the trailing prompt from one raw
/// console exchange.
fn extract_command_output(raw: &str, command: &str, prompt: &Regex) -> String {
    let mut text = raw;
    if let Some(newline) = text.find('\n')
        && text[..newline].contains(command)
    {
        text = &text[newline + 1..];
    }
    if let Some(last) = prompt.find_iter(text).last() {
        text = &text[..last.start()];
    }
    text.trim_end().to_string()
}
