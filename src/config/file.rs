//! YAML configuration file structures.

use std::collections::{BTreeMap, HashSet};
use std::net::{IpAddr, SocketAddr};
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use super::validation::{ConfigError, expand_env_vars};
use crate::device::{Device, SrvTemplate};
use crate::discovery::DNS_PORT;

fn default_dns_port() -> u16 {
    DNS_PORT
}

// =============================================================================
// Device Configuration
// =============================================================================

/// Custom DNS server for an SRV template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsConfig {
    /// Resolver IP address.
    pub address: IpAddr,

    /// Resolver port (default: 53).
    #[serde(default = "default_dns_port")]
    pub port: u16,
}

/// DNS SRV discovery settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SrvConfig {
    /// SRV record name, e.g. `_mikrotik._tcp.example.com`.
    pub record: String,

    /// Custom resolver; the host resolver is used when absent.
    #[serde(default)]
    pub dns: Option<DnsConfig>,
}

/// One entry of the `devices` list.
///
/// Either `address` or `srv` is set, never both.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub address: Option<String>,

    #[serde(default)]
    pub srv: Option<SrvConfig>,

    /// Login user; `${VAR}` references are expanded.
    #[serde(default)]
    pub user: String,

    /// Login password; `${VAR}` references are expanded.
    #[serde(default)]
    pub password: String,

    /// API port as a number or a string.
    #[serde(default, deserialize_with = "port_from_yaml")]
    pub port: Option<u16>,
}

impl std::fmt::Debug for DeviceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceConfig")
            .field("name", &self.name)
            .field("address", &self.address)
            .field("srv", &self.srv)
            .field("user", &self.user)
            .field("password", &"***")
            .field("port", &self.port)
            .finish()
    }
}

fn port_from_yaml<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(u16),
        Text(String),
    }

    match Option::<Port>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Port::Number(port)) => Ok(Some(port)),
        Some(Port::Text(text)) if text.trim().is_empty() => Ok(None),
        Some(Port::Text(text)) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid port '{text}'"))),
    }
}

impl DeviceConfig {
    fn validate(&self, index: usize) -> Result<(), ConfigError> {
        let what = if self.name.is_empty() {
            format!("device #{}", index + 1)
        } else {
            format!("device '{}'", self.name)
        };

        match (&self.srv, &self.address) {
            (Some(_), Some(_)) => {
                return Err(ConfigError::ValidationError(format!(
                    "{what}: address and srv are mutually exclusive"
                )));
            }
            (Some(srv), None) => {
                if srv.record.trim().is_empty() {
                    return Err(ConfigError::ValidationError(format!(
                        "{what}: srv record cannot be empty"
                    )));
                }
            }
            (None, address) => {
                if self.name.is_empty() {
                    return Err(ConfigError::ValidationError(format!(
                        "{what}: name cannot be empty"
                    )));
                }
                if address.as_deref().is_none_or(|a| a.trim().is_empty()) {
                    return Err(ConfigError::ValidationError(format!(
                        "{what}: address or srv is required"
                    )));
                }
            }
        }

        if self.port == Some(0) {
            return Err(ConfigError::ValidationError(format!(
                "{what}: port must be non-zero"
            )));
        }
        Ok(())
    }

    /// Build the device model, expanding credentials from the environment.
    pub fn to_device(&self) -> Device {
        let user = expand_env_vars(&self.user);
        let password = expand_env_vars(&self.password);

        let device = match &self.srv {
            Some(srv) => {
                let template = SrvTemplate {
                    record: srv.record.trim().to_string(),
                    resolver: srv
                        .dns
                        .as_ref()
                        .map(|dns| SocketAddr::new(dns.address, dns.port)),
                };
                let mut device = Device::from_srv(template, user, password);
                if !self.name.is_empty() {
                    device.name = self.name.clone();
                }
                device
            }
            None => Device::new(
                &self.name,
                self.address.as_deref().unwrap_or_default().trim(),
                user,
                password,
            ),
        };

        match self.port {
            Some(port) => device.with_port(port),
            None => device,
        }
    }
}

// =============================================================================
// File Configuration
// =============================================================================

/// Contents of the YAML configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Devices to scrape.
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,

    /// Feature toggles keyed by collector name.
    #[serde(default)]
    pub features: BTreeMap<String, bool>,
}

impl ConfigFile {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.devices.is_empty() {
            return Err(ConfigError::ValidationError(
                "at least one device is required".to_string(),
            ));
        }

        let mut seen_names = HashSet::new();
        for (index, device) in self.devices.iter().enumerate() {
            device.validate(index)?;

            // Template names are replaced by device identities later.
            if device.srv.is_none() && !seen_names.insert(&device.name) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate device name: '{}'",
                    device.name
                )));
            }
        }

        Ok(())
    }

    /// Device models in file order.
    pub fn to_devices(&self) -> Vec<Device> {
        self.devices.iter().map(DeviceConfig::to_device).collect()
    }

    /// Enabled features, ordered by name.
    pub fn enabled_features(&self) -> Vec<String> {
        self.features
            .iter()
            .filter(|(_, enabled)| **enabled)
            .map(|(name, _)| name.clone())
            .collect()
    }
}
