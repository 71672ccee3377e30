//! Gating predicates: the one place that decides what the installed
//! deployment supports and how it behaves at this release.
//!
//! Test bodies ask these predicates instead of embedding ad hoc version
//! checks, so a skip decision or an expected-error branch reads the same
//! everywhere. A `Topology` is built from an explicit configuration
//! snapshot and parses its version strings exactly once.

use std::sync::Arc;

use sdncheck_common::release::EXTERNAL_ID_RELEASE;
use sdncheck_common::{HarnessConfig, HarnessError, Release};

pub struct Topology {
    config: Arc<HarnessConfig>,
    release: Release,
    platform: Release,
}

impl Topology {
    pub fn new(config: Arc<HarnessConfig>) -> Result<Self, HarnessError> {
        let release = Release::parse(&config.sut.release)?;
        let platform = Release::parse(&config.sut.platform_version)?;
        Ok(Self {
            config,
            release,
            platform,
        })
    }

    /// Installed product release.
    pub fn release(&self) -> &Release {
        &self.release
    }

    /// Orchestrator platform train.
    pub fn platform(&self) -> &Release {
        &self.platform
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn console_access_enabled(&self) -> bool {
        self.config.access.console_access_enabled
    }

    pub fn is_ml2(&self) -> bool {
        self.config.sut.plugin_mode == "ml2"
    }

    pub fn is_devstack(&self) -> bool {
        self.config.sut.deployment_flavor == "devstack"
    }

    pub fn single_worker_run(&self) -> bool {
        self.config.sut.api_workers == 1
    }

    /// Data-plane checks need guest VMs; only devstack-flavor runs carry
    /// them.
    pub fn run_connectivity_tests(&self) -> bool {
        self.is_devstack()
    }

    /// Pure L2 domains are only reachable through the console path.
    pub fn access_to_l2_supported(&self) -> bool {
        self.console_access_enabled()
    }

    pub fn new_route_to_underlay_model(&self) -> bool {
        self.config.sut.pat_legacy == "disabled"
    }

    /// Whether SDN objects carry external correlation IDs at this release.
    pub fn supports_external_correlation_ids(&self) -> Result<bool, HarnessError> {
        self.at_least(EXTERNAL_ID_RELEASE)
    }

    /// Installed release is at least `text`.
    pub fn at_least(&self, text: &str) -> Result<bool, HarnessError> {
        Ok(self.release.at_least(&Release::parse(text)?)?)
    }

    /// Installed release is strictly older than `text`.
    pub fn before(&self, text: &str) -> Result<bool, HarnessError> {
        Ok(self.release.before(&Release::parse(text)?)?)
    }

    /// Installed release is a strictly newer train than `text`, not just a
    /// hotfix of the same one.
    pub fn newer_train_than(&self, text: &str) -> Result<bool, HarnessError> {
        Ok(self.release.newer_train_than(&Release::parse(text)?)?)
    }

    /// Platform train is at least `text`.
    pub fn platform_at_least(&self, text: &str) -> Result<bool, HarnessError> {
        Ok(self.platform.at_least(&Release::parse(text)?)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topology(mutate: impl FnOnce(&mut HarnessConfig)) -> Topology {
        let mut config = HarnessConfig::default();
        mutate(&mut config);
        Topology::new(Arc::new(config)).unwrap()
    }

    #[test]
    fn predicates_read_only_their_snapshot() {
        let topology = topology(|config| {
            config.sut.release = "5.2".to_string();
            config.sut.api_workers = 4;
            config.sut.deployment_flavor = "distro".to_string();
            config.access.console_access_enabled = true;
        });

        assert!(!topology.single_worker_run());
        assert!(!topology.is_devstack());
        assert!(!topology.run_connectivity_tests());
        assert!(topology.console_access_enabled());
        assert!(topology.access_to_l2_supported());
        assert!(topology.is_ml2());
        assert!(topology.new_route_to_underlay_model());
    }

    #[test]
    fn external_correlation_ids_flip_at_the_gate_release() {
        let old = topology(|config| config.sut.release = "3.2R1".to_string());
        assert!(!old.supports_external_correlation_ids().unwrap());

        let new = topology(|config| config.sut.release = "5.2".to_string());
        assert!(new.supports_external_correlation_ids().unwrap());

        let at_gate = topology(|config| config.sut.release = EXTERNAL_ID_RELEASE.to_string());
        assert!(at_gate.supports_external_correlation_ids().unwrap());
    }

    #[test]
    fn release_helpers_cover_the_branch_decisions() {
        let topology = topology(|config| {
            config.sut.release = "5.2.1".to_string();
            config.sut.platform_version = "newton".to_string();
        });

        assert!(topology.at_least("5.1").unwrap());
        assert!(topology.before("5.2").unwrap());
        assert!(topology.newer_train_than("5.1").unwrap());
        assert!(!topology.newer_train_than("5.2").unwrap());
        assert!(topology.platform_at_least("mitaka").unwrap());
        assert!(!topology.platform_at_least("ocata").unwrap());
    }

    #[test]
    fn a_codename_helper_against_a_numeric_release_is_loud() {
        let topology = topology(|config| config.sut.release = "5.2".to_string());
        assert!(topology.at_least("newton").is_err());
    }

    #[test]
    fn construction_rejects_an_unparseable_release() {
        let mut config = HarnessConfig::default();
        config.sut.release = "not-a-release".to_string();
        assert!(Topology::new(Arc::new(config)).is_err());
    }
}
