//! Harness configuration snapshot.
//!
//! Loaded once at process start from a TOML file plus `SDNCHECK_*`
//! environment overrides, validated, and then passed by reference into
//! every component constructor. Components never reach for configuration
//! through globals, so tests can hand each one a synthetic snapshot.

pub mod env;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::HarnessError;
use crate::release::Release;

/// Immutable process-wide configuration snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarnessConfig {
    #[serde(default)]
    pub sut: SutConfig,
    #[serde(default)]
    pub access: AccessConfig,
}

/// Identity of the system under test: product release, orchestrator train,
/// deployment shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SutConfig {
    /// Installed product release. Valid examples: "3.2R1", "4.0", "4.0r2".
    #[serde(default = "default_release")]
    pub release: String,
    /// Orchestrator platform train, e.g. "newton".
    #[serde(default = "default_platform_version")]
    pub platform_version: String,
    /// Plugin wiring mode ("ml2" or "monolithic").
    #[serde(default = "default_plugin_mode")]
    pub plugin_mode: String,
    /// Deployment flavor ("devstack" or "distro").
    #[serde(default = "default_deployment_flavor")]
    pub deployment_flavor: String,
    /// Number of API workers deployed.
    #[serde(default = "default_api_workers")]
    pub api_workers: u32,
    /// Legacy PAT model switch ("enabled" or "disabled").
    #[serde(default = "default_pat_legacy")]
    pub pat_legacy: String,
}

impl Default for SutConfig {
    fn default() -> Self {
        Self {
            release: default_release(),
            platform_version: default_platform_version(),
            plugin_mode: default_plugin_mode(),
            deployment_flavor: default_deployment_flavor(),
            api_workers: default_api_workers(),
            pat_legacy: default_pat_legacy(),
        }
    }
}

/// Guest access tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessConfig {
    /// Whether interactive console access to guests is available.
    #[serde(default)]
    pub console_access_enabled: bool,
    /// Budget for one per-command send, in seconds.
    #[serde(default = "default_ssh_timeout")]
    pub ssh_timeout_secs: u64,
    /// Budget for opening an interactive console session, in seconds.
    #[serde(default = "default_console_open_timeout")]
    pub console_open_timeout_secs: u64,
    /// Pause between connection attempts, in seconds.
    #[serde(default = "default_retry_interval")]
    pub connect_retry_interval_secs: u64,
    /// Identity file for the floating-IP access path, when key auth is used.
    #[serde(default)]
    pub identity_file: Option<PathBuf>,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            console_access_enabled: false,
            ssh_timeout_secs: default_ssh_timeout(),
            console_open_timeout_secs: default_console_open_timeout(),
            connect_retry_interval_secs: default_retry_interval(),
            identity_file: None,
        }
    }
}

fn default_release() -> String {
    "5.2".to_string()
}

fn default_platform_version() -> String {
    "newton".to_string()
}

fn default_plugin_mode() -> String {
    "ml2".to_string()
}

fn default_deployment_flavor() -> String {
    "devstack".to_string()
}

fn default_api_workers() -> u32 {
    1
}

fn default_pat_legacy() -> String {
    "disabled".to_string()
}

fn default_ssh_timeout() -> u64 {
    60
}

fn default_console_open_timeout() -> u64 {
    180
}

fn default_retry_interval() -> u64 {
    1
}

impl HarnessConfig {
    /// Parse a snapshot from TOML text. No environment overrides, no
    /// validation; [`HarnessConfig::load`] does the full startup sequence.
    pub fn from_toml_str(text: &str) -> Result<Self, HarnessError> {
        toml::from_str(text).map_err(|err| HarnessError::Config(err.to_string()))
    }

    /// Full startup sequence: read the file, apply `SDNCHECK_*` overrides,
    /// validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, HarnessError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|err| {
            HarnessError::Config(format!("cannot read {}: {err}", path.display()))
        })?;
        let mut config = Self::from_toml_str(&text)?;
        env::apply(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject snapshots no test run could work with.
    pub fn validate(&self) -> Result<(), HarnessError> {
        Release::parse(&self.sut.release)?;
        let platform = Release::parse(&self.sut.platform_version)?;
        if !platform.is_codename() {
            return Err(HarnessError::Config(format!(
                "platform_version '{}' is not a known train",
                self.sut.platform_version
            )));
        }
        if !matches!(self.sut.plugin_mode.as_str(), "ml2" | "monolithic") {
            return Err(HarnessError::Config(format!(
                "unknown plugin_mode '{}'",
                self.sut.plugin_mode
            )));
        }
        if !matches!(self.sut.deployment_flavor.as_str(), "devstack" | "distro") {
            return Err(HarnessError::Config(format!(
                "unknown deployment_flavor '{}'",
                self.sut.deployment_flavor
            )));
        }
        if !matches!(self.sut.pat_legacy.as_str(), "enabled" | "disabled") {
            return Err(HarnessError::Config(format!(
                "pat_legacy must be 'enabled' or 'disabled', got '{}'",
                self.sut.pat_legacy
            )));
        }
        if self.sut.api_workers == 0 {
            return Err(HarnessError::Config("api_workers must be at least 1".into()));
        }
        if self.access.connect_retry_interval_secs == 0 {
            return Err(HarnessError::Config(
                "connect_retry_interval_secs must be at least 1".into(),
            ));
        }
        if self.access.ssh_timeout_secs < self.access.connect_retry_interval_secs {
            return Err(HarnessError::Config(
                "ssh_timeout_secs must not be smaller than the retry interval".into(),
            ));
        }
        if self.access.console_open_timeout_secs < self.access.connect_retry_interval_secs {
            return Err(HarnessError::Config(
                "console_open_timeout_secs must not be smaller than the retry interval".into(),
            ));
        }
        Ok(())
    }

    pub fn ssh_timeout(&self) -> Duration {
        Duration::from_secs(self.access.ssh_timeout_secs)
    }

    pub fn console_open_timeout(&self) -> Duration {
        Duration::from_secs(self.access.console_open_timeout_secs)
    }

    pub fn connect_retry_interval(&self) -> Duration {
        Duration::from_secs(self.access.connect_retry_interval_secs)
    }
}

#[cfg(test)]
pub(crate) fn env_test_lock() -> std::sync::MutexGuard<'static, ()> {
    use std::sync::{Mutex, OnceLock};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    ENV_LOCK.get_or_init(|| Mutex::new(())).lock().unwrap()
}
