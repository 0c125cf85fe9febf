//! Runtime configuration, loaded from TOML (or JSON/YAML, behind their
//! respective feature flags) the way `irc::client::data::Config` is
//! loaded from a file, but expressed as a plain `serde`-derived struct
//! instead of hand-rolled accessor methods over `Option` fields.

use std::time::Duration;

#[cfg(feature = "toml_config")]
use std::path::Path;

#[cfg(any(feature = "json_config", feature = "toml_config", feature = "yaml_config"))]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Configuration for a [`crate::Scpi`] instance's network-facing behavior.
#[cfg_attr(
    any(feature = "json_config", feature = "toml_config", feature = "yaml_config"),
    derive(Serialize, Deserialize)
)]
#[cfg_attr(
    any(feature = "json_config", feature = "toml_config", feature = "yaml_config"),
    serde(default)
)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScpiConfig {
    /// Bind to loopback addresses only, rather than all interfaces.
    pub bind_local: bool,
    /// TCP port to listen on.
    pub port: u16,
    /// Maximum number of concurrently served connections; also used as
    /// the listen() backlog hint.
    pub max_clients: usize,
    /// Whether to also bind an IPv6 listener.
    pub ipv6_enabled: bool,
    /// Whether a `:SYSTem:WLOCK` subtree (and its independent write
    /// `Locker`) is installed.
    pub write_lock_enabled: bool,
    /// Idle duration after which an unrefreshed lock booking expires.
    #[cfg_attr(
        any(feature = "json_config", feature = "toml_config", feature = "yaml_config"),
        serde(with = "duration_secs")
    )]
    pub lock_timeout: Duration,
}

impl Default for ScpiConfig {
    fn default() -> Self {
        ScpiConfig {
            bind_local: true,
            port: 5025,
            max_clients: 10,
            ipv6_enabled: true,
            write_lock_enabled: false,
            lock_timeout: Duration::from_secs(60),
        }
    }
}

#[cfg(any(feature = "json_config", feature = "toml_config", feature = "yaml_config"))]
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

#[cfg(feature = "toml_config")]
impl ScpiConfig {
    /// Loads a configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<ScpiConfig> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Parses a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<ScpiConfig> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }
}

#[cfg(feature = "json_config")]
impl ScpiConfig {
    /// Parses a configuration from JSON text.
    pub fn from_json_str(text: &str) -> Result<ScpiConfig> {
        serde_json::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }
}

#[cfg(feature = "yaml_config")]
impl ScpiConfig {
    /// Parses a configuration from YAML text.
    pub fn from_yaml_str(text: &str) -> Result<ScpiConfig> {
        serde_yaml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }
}

#[cfg(all(test, feature = "toml_config"))]
mod test {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let cfg = ScpiConfig::default();
        assert_eq!(cfg.port, 5025);
        assert_eq!(cfg.max_clients, 10);
        assert!(cfg.bind_local);
        assert!(cfg.ipv6_enabled);
        assert!(!cfg.write_lock_enabled);
        assert_eq!(cfg.lock_timeout, Duration::from_secs(60));
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let cfg = ScpiConfig::from_toml_str("port = 6000\n").unwrap();
        assert_eq!(cfg.port, 6000);
        assert_eq!(cfg.max_clients, 10);
    }
}
