//! Harness Settings
//!
//! Process-wide knobs read from the environment (and a `.env` file when
//! present), as opposed to per-test options.

use std::path::PathBuf;
use std::time::Duration;

use shared::{DebugComponents, SharedError};

use crate::error::EnvResult;

pub const BIN_DIR_VAR: &str = "TESTENV_BIN_DIR";
pub const DEBUG_COMPONENTS_VAR: &str = "TESTENV_DEBUG_COMPONENTS";
pub const STARTUP_TIMEOUT_VAR: &str = "TESTENV_STARTUP_TIMEOUT_SECS";
pub const STOP_TIMEOUT_VAR: &str = "TESTENV_STOP_TIMEOUT_SECS";

#[derive(Debug, Clone, PartialEq)]
pub struct HarnessSettings {
    /// Directory holding the config manager, bootstrap, envoy and backend binaries
    pub bin_dir: PathBuf,
    pub debug_components: DebugComponents,
    /// Upper bound for a single component to become ready
    pub startup_timeout: Duration,
    /// Grace period between SIGTERM and SIGKILL
    pub stop_timeout: Duration,
}

impl Default for HarnessSettings {
    fn default() -> Self {
        Self {
            bin_dir: PathBuf::from("bin"),
            debug_components: DebugComponents::None,
            startup_timeout: Duration::from_secs(30),
            stop_timeout: Duration::from_secs(5),
        }
    }
}

impl HarnessSettings {
    /// Load settings from the process environment after reading `.env`
    pub fn from_env() -> EnvResult<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> EnvResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let bin_dir = lookup(BIN_DIR_VAR).map(PathBuf::from).unwrap_or(defaults.bin_dir);

        let debug_components = match lookup(DEBUG_COMPONENTS_VAR) {
            Some(value) => value.parse()?,
            None => defaults.debug_components,
        };

        let startup_timeout = parse_secs(&lookup, STARTUP_TIMEOUT_VAR)?.unwrap_or(defaults.startup_timeout);
        let stop_timeout = parse_secs(&lookup, STOP_TIMEOUT_VAR)?.unwrap_or(defaults.stop_timeout);

        Ok(Self {
            bin_dir,
            debug_components,
            startup_timeout,
            stop_timeout,
        })
    }

    pub fn with_debug_components(mut self, debug_components: DebugComponents) -> Self {
        self.debug_components = debug_components;
        self
    }

    pub fn binary(&self, name: &str) -> PathBuf {
        self.bin_dir.join(name)
    }
}

fn parse_secs<F>(lookup: &F, key: &str) -> EnvResult<Option<Duration>>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| {
            value
                .trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| {
                    SharedError::InvalidConfig {
                        field: key.to_string(),
                        value,
                    }
                    .into()
                })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_nothing_is_set() {
        let settings = HarnessSettings::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(settings, HarnessSettings::default());
    }

    #[test]
    fn test_values_are_read_from_lookup() {
        let settings = HarnessSettings::from_lookup(lookup_from(&[
            (BIN_DIR_VAR, "/opt/proxy/bin"),
            (DEBUG_COMPONENTS_VAR, "bootstrap"),
            (STARTUP_TIMEOUT_VAR, "12"),
        ]))
        .unwrap();

        assert_eq!(settings.binary("envoy"), PathBuf::from("/opt/proxy/bin/envoy"));
        assert_eq!(settings.debug_components, DebugComponents::Bootstrap);
        assert_eq!(settings.startup_timeout, Duration::from_secs(12));
        assert_eq!(settings.stop_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_invalid_values_are_errors() {
        assert!(HarnessSettings::from_lookup(lookup_from(&[(STOP_TIMEOUT_VAR, "soon")])).is_err());
        assert!(HarnessSettings::from_lookup(lookup_from(&[(DEBUG_COMPONENTS_VAR, "kernel")])).is_err());
    }
}
