//! Monitored device model.

use std::fmt;
use std::net::SocketAddr;

/// Default RouterOS API port for plain TCP.
pub const DEFAULT_API_PORT: u16 = 8728;

/// Default RouterOS API port for TLS.
pub const DEFAULT_API_TLS_PORT: u16 = 8729;

/// DNS SRV discovery template.
///
/// Expanded by [`crate::discovery::prepare`] into one concrete [`Device`] per
/// SRV target; the template itself is never scraped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrvTemplate {
    /// Record to query, e.g. `_api._tcp.routers.example.com`.
    pub record: String,
    /// Custom resolver; the host resolver is used when absent.
    pub resolver: Option<SocketAddr>,
}

/// One monitored RouterOS endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct Device {
    /// Display name, used as the `device`/`name` label.
    pub name: String,
    pub address: String,
    /// API port; the transport default applies when unset.
    pub port: Option<u16>,
    pub user: String,
    pub password: String,
    /// Discovery template. Present only before discovery resolves.
    pub srv: Option<SrvTemplate>,
}

/// Session cache key: stable across display-name changes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceKey(String);

impl fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Device {
    /// Statically addressed device.
    pub fn new(
        name: impl Into<String>,
        address: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            port: None,
            user: user.into(),
            password: password.into(),
            srv: None,
        }
    }

    /// Discovery template device.
    pub fn from_srv(
        template: SrvTemplate,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            name: template.record.clone(),
            address: String::new(),
            port: None,
            user: user.into(),
            password: password.into(),
            srv: Some(template),
        }
    }

    /// Set the API port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Whether this entry still needs SRV expansion.
    pub fn is_template(&self) -> bool {
        self.srv.is_some()
    }

    /// Configured port, or `default` when unset.
    pub fn port_or(&self, default: u16) -> u16 {
        self.port.unwrap_or(default)
    }

    /// Key identifying this endpoint in the session cache.
    pub fn key(&self) -> DeviceKey {
        match self.port {
            Some(port) => DeviceKey(format!("{}:{}", self.address, port)),
            None => DeviceKey(self.address.clone()),
        }
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("name", &self.name)
            .field("address", &self.address)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("srv", &self.srv)
            .finish()
    }
}
