//! Release-aware remote-command harness for SDN integration tests.
//!
//! Test suites drive a tenant-facing networking API and cross-validate the
//! result against an SDN controller. This crate carries the recurring
//! machinery those suites share: deciding per-test applicability from the
//! installed release ([`topology`]), reaching guest VMs over
//! interchangeable access paths ([`channel`] over a [`transport`] seam),
//! and turning ping probes into reachability verdicts ([`connectivity`]).
//! The cloud API client, the SDN REST client and the test runner are
//! external collaborators; nothing here talks to them directly.

pub mod channel;
pub mod connectivity;
pub mod target;
pub mod topology;
pub mod transport;

pub use sdncheck_common::{
    HarnessConfig, HarnessError, Release, TransportError, VersionError, retry,
};

pub use channel::{COMMAND_FAILED, CommandChannel, InteractiveChannel, IpFamily, PerCommandChannel};
pub use connectivity::{ConnectivityExpectation, Expectation, assert_reachability};
pub use target::{
    ImageProfile, RemoteTarget, SystemTransports, TransportProvider, console_endpoint,
};
pub use topology::Topology;
