//! Configuration module for the exporter.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Device definitions (static address or DNS SRV template)
//! - Feature toggles selecting collectors
//!
//! Without a config file, a single device is built from command-line flags.

mod file;
mod validation;

pub use file::{ConfigFile, DeviceConfig, DnsConfig, SrvConfig};
pub use validation::{ConfigError, expand_env_vars};

use crate::collector::DEFAULT_FEATURES;
use crate::device::Device;

/// Single device given on the command line.
#[derive(Clone, Default)]
pub struct DeviceFlags {
    pub device: Option<String>,
    pub address: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl std::fmt::Debug for DeviceFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceFlags")
            .field("device", &self.device)
            .field("address", &self.address)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

impl DeviceFlags {
    /// Build the device.
    ///
    /// # Errors
    /// Returns `ConfigError::MissingParameter` for the first unset flag.
    pub fn to_device(&self) -> Result<Device, ConfigError> {
        fn required<'a>(
            value: &'a Option<String>,
            name: &'static str,
        ) -> Result<&'a str, ConfigError> {
            value
                .as_deref()
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::MissingParameter(name))
        }

        let device = Device::new(
            required(&self.device, "device")?,
            required(&self.address, "address")?,
            required(&self.user, "user")?,
            required(&self.password, "password")?,
        );
        Ok(match self.port {
            Some(port) => device.with_port(port),
            None => device,
        })
    }
}

/// Devices to scrape: the config file's when given, else the flag device.
pub fn load_devices(
    file: Option<&ConfigFile>,
    flags: &DeviceFlags,
) -> Result<Vec<Device>, ConfigError> {
    match file {
        Some(file) => Ok(file.to_devices()),
        None => Ok(vec![flags.to_device()?]),
    }
}

/// Paths the HTTP server already serves.
const RESERVED_PATHS: [&str; 2] = ["/", "/healthz"];

/// Check that `path` can be mounted as the metrics route.
///
/// # Errors
/// Returns `ConfigError::ValidationError` for a path without a leading `/`,
/// one that collides with a built-in route, or one containing characters
/// the router treats as captures.
pub fn validate_metrics_path(path: &str) -> Result<(), ConfigError> {
    if !path.starts_with('/') {
        return Err(ConfigError::ValidationError(format!(
            "metrics path '{path}' must start with '/'"
        )));
    }
    if RESERVED_PATHS.contains(&path) {
        return Err(ConfigError::ValidationError(format!(
            "metrics path '{path}' is reserved"
        )));
    }
    if path
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '{' | '}' | ':' | '*'))
    {
        return Err(ConfigError::ValidationError(format!(
            "metrics path '{path}' contains an invalid character"
        )));
    }
    Ok(())
}

/// Collector names to run, in order.
///
/// Explicit `--features` win, then the file's enabled features, then
/// [`DEFAULT_FEATURES`].
pub fn select_features(flags: &[String], file: Option<&ConfigFile>) -> Vec<String> {
    let explicit: Vec<String> = flags
        .iter()
        .map(|f| f.trim())
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .collect();
    if !explicit.is_empty() {
        return explicit;
    }

    let from_file = file.map(ConfigFile::enabled_features).unwrap_or_default();
    if !from_file.is_empty() {
        return from_file;
    }

    DEFAULT_FEATURES.iter().map(|f| f.to_string()).collect()
}
