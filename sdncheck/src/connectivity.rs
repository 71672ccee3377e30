//! Reachability verdicts from raw ping output.
//!
//! The remote ping tool's output format is an external contract this
//! harness does not control. Matching the canonical `"<N> packets
//! received"` phrase is deliberately the whole parser: it catches both
//! fewer and more packets than expected, and the matched phrase stays
//! byte-compatible with the oracles existing suites depend on. Do not
//! replace it with structured parsing.

use serde::{Deserialize, Serialize};

use sdncheck_common::HarnessError;

use crate::channel::IpFamily;
use crate::target::RemoteTarget;

const DEFAULT_PING_COUNT: u32 = 3;

/// Expected outcome of a connectivity probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Expectation {
    Reachable,
    Unreachable,
}

/// One connectivity probe: what to ping, how, and what should happen.
#[derive(Debug, Clone)]
pub struct ConnectivityExpectation {
    pub destination: String,
    pub count: u32,
    pub interface: Option<String>,
    pub family: IpFamily,
    pub expected: Expectation,
}

impl ConnectivityExpectation {
    pub fn reachable(destination: impl Into<String>) -> Self {
        Self::new(destination, Expectation::Reachable)
    }

    pub fn unreachable(destination: impl Into<String>) -> Self {
        Self::new(destination, Expectation::Unreachable)
    }

    fn new(destination: impl Into<String>, expected: Expectation) -> Self {
        Self {
            destination: destination.into(),
            count: DEFAULT_PING_COUNT,
            interface: None,
            family: IpFamily::V4,
            expected,
        }
    }

    pub fn with_count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }

    pub fn on_interface(mut self, interface: impl Into<String>) -> Self {
        self.interface = Some(interface.into());
        self
    }

    pub fn family(mut self, family: IpFamily) -> Self {
        self.family = family;
        self
    }
}

/// Whether the probe output carries the packet count the expectation
/// demands: the full requested count when reachable, zero when not.
pub fn output_matches(raw_output: &str, count: u32, expected: Expectation) -> bool {
    let expected_count = match expected {
        Expectation::Reachable => count,
        Expectation::Unreachable => 0,
    };
    raw_output.contains(&format!("{expected_count} packets received"))
}

/// Run the probe from `source` and return the verdict.
///
/// Single-shot: any retrying lives in the channel's own connection
/// establishment, never in the interpretation of the probe.
pub async fn assert_reachability(
    source: &mut RemoteTarget,
    expectation: &ConnectivityExpectation,
) -> Result<bool, HarnessError> {
    source
        .ping(
            &expectation.destination,
            expectation.count,
            expectation.interface.as_deref(),
            expectation.family,
            expectation.expected,
        )
        .await
}
