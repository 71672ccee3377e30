//! `SDNCHECK_*` environment overrides.
//!
//! Overrides win over file values. Parsing collects all problems before
//! failing so a misconfigured run reports every bad variable at once.

use std::env;

use thiserror::Error;

use super::HarnessConfig;
use crate::errors::HarnessError;

/// A single bad environment variable.
#[derive(Debug, Error)]
pub enum EnvError {
    #[error("invalid value for {var}: expected {expected}, got '{value}'")]
    InvalidValue {
        var: String,
        expected: String,
        value: String,
    },

    #[error("value out of range for {var}: {value} (valid: {min}..={max})")]
    OutOfRange {
        var: String,
        value: String,
        min: u64,
        max: u64,
    },
}

/// Apply every recognized `SDNCHECK_*` variable onto `config`.
pub fn apply(config: &mut HarnessConfig) -> Result<(), HarnessError> {
    let mut parser = EnvParser::new();

    if let Some(value) = parser.get_string("RELEASE") {
        config.sut.release = value;
    }
    if let Some(value) = parser.get_string("PLATFORM_VERSION") {
        config.sut.platform_version = value;
    }
    if let Some(value) = parser.get_string("PLUGIN_MODE") {
        config.sut.plugin_mode = value;
    }
    if let Some(value) = parser.get_string("DEPLOYMENT_FLAVOR") {
        config.sut.deployment_flavor = value;
    }
    if let Some(value) = parser.get_string("PAT_LEGACY") {
        config.sut.pat_legacy = value;
    }
    if let Some(value) = parser.get_u64("API_WORKERS", 1, 256) {
        config.sut.api_workers = value as u32;
    }
    if let Some(value) = parser.get_bool("CONSOLE_ACCESS") {
        config.access.console_access_enabled = value;
    }
    if let Some(value) = parser.get_u64("SSH_TIMEOUT_SECS", 1, 3600) {
        config.access.ssh_timeout_secs = value;
    }
    if let Some(value) = parser.get_u64("CONSOLE_OPEN_TIMEOUT_SECS", 1, 3600) {
        config.access.console_open_timeout_secs = value;
    }
    if let Some(value) = parser.get_u64("CONNECT_RETRY_INTERVAL_SECS", 1, 600) {
        config.access.connect_retry_interval_secs = value;
    }
    if let Some(value) = parser.get_string("IDENTITY_FILE") {
        config.access.identity_file = Some(value.into());
    }

    if parser.has_errors() {
        let joined = parser
            .errors
            .iter()
            .map(EnvError::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        return Err(HarnessError::Config(joined));
    }
    Ok(())
}

/// Type-safe environment variable parser. Collects errors so all issues
/// can be reported at once.
struct EnvParser {
    prefix: &'static str,
    errors: Vec<EnvError>,
}

impl EnvParser {
    fn new() -> Self {
        Self {
            prefix: "SDNCHECK_",
            errors: Vec::new(),
        }
    }

    fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    fn var_name(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    /// A set string variable; `None` when unset.
    fn get_string(&mut self, name: &str) -> Option<String> {
        env::var(self.var_name(name)).ok()
    }

    /// A set boolean variable.
    ///
    /// Accepts: 1, true, yes, on (for true)
    ///          0, false, no, off, "" (for false)
    fn get_bool(&mut self, name: &str) -> Option<bool> {
        let var_name = self.var_name(name);
        let value = env::var(&var_name).ok()?;
        match value.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" | "" => Some(false),
            _ => {
                self.errors.push(EnvError::InvalidValue {
                    var: var_name,
                    expected: "boolean (true/false/1/0/yes/no)".to_string(),
                    value,
                });
                None
            }
        }
    }

    /// A set u64 variable with range validation.
    fn get_u64(&mut self, name: &str, min: u64, max: u64) -> Option<u64> {
        let var_name = self.var_name(name);
        let value = env::var(&var_name).ok()?;
        match value.parse::<u64>() {
            Ok(n) if (min..=max).contains(&n) => Some(n),
            Ok(n) => {
                self.errors.push(EnvError::OutOfRange {
                    var: var_name,
                    value: n.to_string(),
                    min,
                    max,
                });
                None
            }
            Err(_) => {
                self.errors.push(EnvError::InvalidValue {
                    var: var_name,
                    expected: "unsigned integer".to_string(),
                    value,
                });
                None
            }
        }
    }
}

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::*;
    use crate::config::env_test_lock;

    fn set(name: &str, value: &str) {
        // set_var/remove_var are unsafe in edition 2024; the env lock
        // serializes every test that touches the process environment.
        unsafe { env::set_var(name, value) };
    }

    fn unset(name: &str) {
        unsafe { env::remove_var(name) };
    }

    const VARS: [&str; 5] = [
        "SDNCHECK_RELEASE",
        "SDNCHECK_CONSOLE_ACCESS",
        "SDNCHECK_SSH_TIMEOUT_SECS",
        "SDNCHECK_API_WORKERS",
        "SDNCHECK_PLUGIN_MODE",
    ];

    fn clear_all() {
        for var in VARS {
            unset(var);
        }
    }

    #[test]
    fn overrides_win_over_file_values() {
        let _guard = env_test_lock();
        clear_all();
        set("SDNCHECK_RELEASE", "6.0");
        set("SDNCHECK_CONSOLE_ACCESS", "yes");
        set("SDNCHECK_SSH_TIMEOUT_SECS", "25");

        let mut config = HarnessConfig::from_toml_str("[sut]\nrelease = \"5.2\"\n").unwrap();
        apply(&mut config).unwrap();

        assert_eq!(config.sut.release, "6.0");
        assert!(config.access.console_access_enabled);
        assert_eq!(config.access.ssh_timeout_secs, 25);
        clear_all();
    }

    #[test]
    fn unset_variables_leave_the_snapshot_alone() {
        let _guard = env_test_lock();
        clear_all();
        let mut config = HarnessConfig::default();
        apply(&mut config).unwrap();
        assert_eq!(config.sut.release, "5.2");
        assert_eq!(config.access.ssh_timeout_secs, 60);
    }

    #[test]
    fn all_bad_variables_are_reported_together() {
        let _guard = env_test_lock();
        clear_all();
        set("SDNCHECK_CONSOLE_ACCESS", "maybe");
        set("SDNCHECK_SSH_TIMEOUT_SECS", "a-while");
        set("SDNCHECK_API_WORKERS", "0");

        let mut config = HarnessConfig::default();
        let err = apply(&mut config).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("SDNCHECK_CONSOLE_ACCESS"));
        assert!(message.contains("SDNCHECK_SSH_TIMEOUT_SECS"));
        assert!(message.contains("SDNCHECK_API_WORKERS"));
        clear_all();
    }
}
