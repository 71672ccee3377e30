//! Scripted in-memory transport for tests.
//!
//! No sockets; behavior is driven by a script of substring-matched replies
//! plus failure injection for the first N opens or execs. Counters expose
//! how often the transport was touched so tests can assert session reuse,
//! idempotent preparation and retry budgets. Lives in the library, not
//! under `#[cfg(test)]`, so downstream suites can script guests too.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use sdncheck_common::errors::TransportError;

use super::{Credentials, Endpoint, ExecResult, Transport, TransportSession};

#[derive(Debug, Clone)]
enum Reply {
    /// Command completes successfully with this output.
    Output(String),
    /// Remote command exits non-zero with this output.
    CommandFailure(String),
    /// The exchange itself breaks down mid-command.
    BrokenExchange,
}

#[derive(Debug, Clone)]
struct Rule {
    pattern: String,
    reply: Reply,
}

#[derive(Debug, Default)]
struct MockState {
    rules: Vec<Rule>,
    fail_opens: usize,
    fail_execs: usize,
    opens: AtomicUsize,
    execs: AtomicUsize,
    closes: AtomicUsize,
    commands: Mutex<Vec<String>>,
}

/// Scripted transport; cloning shares the script and the counters.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<MockState>,
}

impl MockTransport {
    pub fn builder() -> MockTransportBuilder {
        MockTransportBuilder::default()
    }

    pub fn open_count(&self) -> usize {
        self.state.opens.load(Ordering::SeqCst)
    }

    pub fn exec_count(&self) -> usize {
        self.state.execs.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    /// Every command executed so far, in order.
    pub fn commands(&self) -> Vec<String> {
        self.state.commands.lock().expect("mock command log").clone()
    }
}

#[derive(Debug, Default)]
pub struct MockTransportBuilder {
    rules: Vec<Rule>,
    fail_opens: usize,
    fail_execs: usize,
}

impl MockTransportBuilder {
    /// Commands containing `pattern` succeed with `output`.
    pub fn respond(mut self, pattern: impl Into<String>, output: impl Into<String>) -> Self {
        self.rules.push(Rule {
            pattern: pattern.into(),
            reply: Reply::Output(output.into()),
        });
        self
    }

    /// Commands containing `pattern` exit non-zero with `output`.
    pub fn fail_command(mut self, pattern: impl Into<String>, output: impl Into<String>) -> Self {
        self.rules.push(Rule {
            pattern: pattern.into(),
            reply: Reply::CommandFailure(output.into()),
        });
        self
    }

    /// Commands containing `pattern` break the exchange itself.
    pub fn break_exchange_on(mut self, pattern: impl Into<String>) -> Self {
        self.rules.push(Rule {
            pattern: pattern.into(),
            reply: Reply::BrokenExchange,
        });
        self
    }

    /// The first `n` open attempts are refused, as a booting guest would.
    pub fn fail_first_opens(mut self, n: usize) -> Self {
        self.fail_opens = n;
        self
    }

    /// The first `n` execs fail at connection level.
    pub fn fail_first_execs(mut self, n: usize) -> Self {
        self.fail_execs = n;
        self
    }

    pub fn build(self) -> MockTransport {
        MockTransport {
            state: Arc::new(MockState {
                rules: self.rules,
                fail_opens: self.fail_opens,
                fail_execs: self.fail_execs,
                opens: AtomicUsize::new(0),
                execs: AtomicUsize::new(0),
                closes: AtomicUsize::new(0),
                commands: Mutex::new(Vec::new()),
            }),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(
        &self,
        endpoint: &Endpoint,
        _credentials: &Credentials,
        _timeout: Duration,
    ) -> Result<Box<dyn TransportSession>, TransportError> {
        let attempt = self.state.opens.fetch_add(1, Ordering::SeqCst);
        if attempt < self.state.fail_opens {
            return Err(TransportError::Connect {
                endpoint: endpoint.to_string(),
                reason: "scripted open failure".to_string(),
            });
        }
        Ok(Box::new(MockSession {
            state: Arc::clone(&self.state),
            endpoint: endpoint.to_string(),
        }))
    }
}

struct MockSession {
    state: Arc<MockState>,
    endpoint: String,
}

#[async_trait]
impl TransportSession for MockSession {
    async fn exec(
        &mut self,
        command: &str,
        _timeout: Duration,
    ) -> Result<ExecResult, TransportError> {
        let attempt = self.state.execs.fetch_add(1, Ordering::SeqCst);
        self.state
            .commands
            .lock()
            .expect("mock command log")
            .push(command.to_string());
        if attempt < self.state.fail_execs {
            return Err(TransportError::Connect {
                endpoint: self.endpoint.clone(),
                reason: "scripted exec failure".to_string(),
            });
        }
        let rule = self
            .state
            .rules
            .iter()
            .find(|rule| command.contains(&rule.pattern));
        match rule.map(|rule| &rule.reply) {
            None => Ok(ExecResult::ok("")),
            Some(Reply::Output(output)) => Ok(ExecResult::ok(output.clone())),
            Some(Reply::CommandFailure(output)) => Ok(ExecResult::failed(output.clone())),
            Some(Reply::BrokenExchange) => Err(TransportError::Exec {
                endpoint: self.endpoint.clone(),
                reason: "scripted broken exchange".to_string(),
            }),
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Provider handing the same scripted transport to both access paths.
pub struct MockTransportProvider {
    transport: MockTransport,
}

impl MockTransportProvider {
    pub fn new(transport: MockTransport) -> Self {
        Self { transport }
    }
}

impl crate::target::TransportProvider for MockTransportProvider {
    fn console(
        &self,
        _profile: &crate::target::ImageProfile,
    ) -> Result<Box<dyn Transport>, TransportError> {
        Ok(Box::new(self.transport.clone()))
    }

    fn floating_ip(&self) -> Box<dyn Transport> {
        Box::new(self.transport.clone())
    }
}
