//! Device discovery.
//!
//! [`prepare`] turns the configured device list into the concrete list that
//! gets scraped: static devices pass through after a connect probe, DNS SRV
//! templates are replaced by one device per SRV target. The phase is
//! fail-fast and completes before any scrape pass exists.

mod dns;

use std::net::SocketAddr;

use thiserror::Error;

use crate::device::Device;
use crate::routeros::ApiError;
use crate::session::{ConnectError, SessionManager};

pub use dns::{DNS_PORT, RESOLV_CONF, UdpSrvResolver, build_srv_query, parse_srv_response};

/// Errors that abort device discovery.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("failed to read resolver configuration: {0}")]
    ResolverConfig(#[source] std::io::Error),

    #[error("no nameserver configured in {0}")]
    NoNameserver(String),

    #[error("DNS query for {record} failed: {source}")]
    Dns {
        record: String,
        #[source]
        source: std::io::Error,
    },

    #[error("DNS query for {record} to {server} timed out")]
    DnsTimeout { record: String, server: SocketAddr },

    #[error("invalid DNS response for {record}: {reason}")]
    Response { record: String, reason: String },

    #[error("device {device} unreachable: {source}")]
    Connect {
        device: String,
        #[source]
        source: ConnectError,
    },

    #[error("failed to fetch identity of {device}: {source}")]
    Identity {
        device: String,
        #[source]
        source: ApiError,
    },
}

/// One SRV answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrvTarget {
    pub target: String,
    pub port: u16,
    pub priority: u16,
    pub weight: u16,
}

/// DNS SRV lookup capability.
#[async_trait::async_trait]
pub trait SrvResolver: Send + Sync {
    /// Resolve `record`, asking `server` when given, else the host resolver.
    async fn lookup_srv(
        &self,
        record: &str,
        server: Option<SocketAddr>,
    ) -> Result<Vec<SrvTarget>, DiscoveryError>;
}

/// Resolve `devices` into concrete, scrapeable devices.
///
/// Devices are processed sequentially in input order. Any DNS, connect or
/// identity failure aborts the whole preparation.
pub async fn prepare(
    devices: Vec<Device>,
    sessions: &SessionManager,
    resolver: &dyn SrvResolver,
) -> Result<Vec<Device>, DiscoveryError> {
    let mut resolved = Vec::with_capacity(devices.len());

    for device in devices {
        let Some(template) = device.srv.clone() else {
            sessions
                .connect(&device)
                .await
                .map_err(|source| DiscoveryError::Connect {
                    device: device.name.clone(),
                    source,
                })?;
            tracing::debug!(device = %device.name, address = %device.address, "Static device reachable");
            resolved.push(device);
            continue;
        };

        tracing::info!(record = %template.record, "SRV configuration detected");
        if let Some(server) = template.resolver {
            tracing::info!(dns_server = %server, "Custom DNS config detected");
        }

        let targets = resolver
            .lookup_srv(&template.record, template.resolver)
            .await?;
        if targets.is_empty() {
            tracing::warn!(record = %template.record, "SRV record has no targets");
        }

        for target in targets {
            let host = target.target.trim_end_matches('.').to_string();
            let mut concrete = Device {
                name: host.clone(),
                address: host,
                port: device.port,
                user: device.user.clone(),
                password: device.password.clone(),
                srv: None,
            };
            fetch_identity(&mut concrete, sessions).await?;
            tracing::info!(
                device = %concrete.name,
                address = %concrete.address,
                record = %template.record,
                "Discovered device"
            );
            resolved.push(concrete);
        }
    }

    Ok(resolved)
}

/// Connect and replace the display name with the device's own identity.
async fn fetch_identity(device: &mut Device, sessions: &SessionManager) -> Result<(), DiscoveryError> {
    let session = sessions
        .connect(device)
        .await
        .map_err(|source| DiscoveryError::Connect {
            device: device.name.clone(),
            source,
        })?;

    let reply = match session.run("/system/identity/print", &[]).await {
        Ok(reply) => reply,
        Err(source) => {
            if source.is_transport() {
                sessions.invalidate(device).await;
            }
            return Err(DiscoveryError::Identity {
                device: device.name.clone(),
                source,
            });
        }
    };

    if let Some(name) = reply.re.iter().filter_map(|r| r.get("name")).last() {
        device.name = name.clone();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::SrvTemplate;
    use crate::routeros::fake::FakeClient;
    use crate::routeros::{Reply, Session, record};
    use crate::session::Dialer;
    use crate::session::tests::CountingDialer;
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::sync::atomic::Ordering;

    /// Dialer whose sessions report `id-<address>` as identity.
    struct IdentityDialer;

    #[async_trait::async_trait]
    impl Dialer for IdentityDialer {
        async fn dial(&self, device: &Device) -> Result<Session, ConnectError> {
            let name = format!("id-{}", device.address);
            let client = FakeClient::new().reply(
                "/system/identity/print",
                Reply::from_records(vec![record([("name", name.as_str())])]),
            );
            Ok(Arc::new(client))
        }
    }

    #[derive(Default)]
    struct FakeResolver {
        targets: Vec<&'static str>,
        fail: bool,
        queries: Mutex<Vec<(String, Option<SocketAddr>)>>,
    }

    #[async_trait::async_trait]
    impl SrvResolver for FakeResolver {
        async fn lookup_srv(
            &self,
            record: &str,
            server: Option<SocketAddr>,
        ) -> Result<Vec<SrvTarget>, DiscoveryError> {
            self.queries.lock().unwrap().push((record.to_string(), server));
            if self.fail {
                return Err(DiscoveryError::Response {
                    record: record.to_string(),
                    reason: "server returned NXDOMAIN (3)".to_string(),
                });
            }
            Ok(self
                .targets
                .iter()
                .map(|t| SrvTarget {
                    target: t.to_string(),
                    port: 8728,
                    priority: 0,
                    weight: 0,
                })
                .collect())
        }
    }

    fn template(resolver: Option<SocketAddr>) -> Device {
        Device::from_srv(
            SrvTemplate {
                record: "_api._tcp.example.com".to_string(),
                resolver,
            },
            "monitor",
            "secret",
        )
    }

    #[tokio::test]
    async fn test_template_expands_to_every_target() {
        let sessions = SessionManager::new(Arc::new(IdentityDialer));
        let resolver = FakeResolver {
            targets: vec!["r1.example.com.", "r2.example.com.", "r3.example.com."],
            ..Default::default()
        };

        let devices = prepare(vec![template(None)], &sessions, &resolver).await.unwrap();

        assert_eq!(devices.len(), 3);
        for device in &devices {
            assert!(!device.is_template());
            assert_eq!(device.user, "monitor");
            assert_eq!(device.password, "secret");
            assert!(sessions.is_live(device).await);
        }
        assert_eq!(devices[0].address, "r1.example.com");
        assert_eq!(devices[0].name, "id-r1.example.com");
    }

    #[tokio::test]
    async fn test_custom_resolver_is_used() {
        let server: SocketAddr = "192.0.2.53:5353".parse().unwrap();
        let sessions = SessionManager::new(Arc::new(IdentityDialer));
        let resolver = FakeResolver {
            targets: vec!["r1.example.com"],
            ..Default::default()
        };

        prepare(vec![template(Some(server))], &sessions, &resolver)
            .await
            .unwrap();

        let queries = resolver.queries.lock().unwrap();
        assert_eq!(queries.as_slice(), &[("_api._tcp.example.com".to_string(), Some(server))]);
    }

    #[tokio::test]
    async fn test_static_devices_pass_through_in_order() {
        let dialer = Arc::new(CountingDialer::default());
        let sessions = SessionManager::new(dialer.clone());
        let resolver = FakeResolver::default();
        let input = vec![
            Device::new("a", "10.0.0.1", "admin", "pw"),
            Device::new("b", "10.0.0.2", "admin", "pw"),
        ];

        let devices = prepare(input.clone(), &sessions, &resolver).await.unwrap();

        assert_eq!(devices, input);
        assert_eq!(dialer.dials.load(Ordering::SeqCst), 2);
        assert!(resolver.queries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dns_failure_aborts() {
        let sessions = SessionManager::new(Arc::new(IdentityDialer));
        let resolver = FakeResolver {
            fail: true,
            ..Default::default()
        };
        let input = vec![Device::new("a", "10.0.0.1", "admin", "pw"), template(None)];

        let err = prepare(input, &sessions, &resolver).await.unwrap_err();
        assert!(matches!(err, DiscoveryError::Response { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_static_device_aborts() {
        let dialer = Arc::new(CountingDialer {
            refuse: vec!["10.0.0.2".to_string()],
            ..Default::default()
        });
        let sessions = SessionManager::new(dialer);
        let input = vec![
            Device::new("a", "10.0.0.1", "admin", "pw"),
            Device::new("b", "10.0.0.2", "admin", "pw"),
        ];

        let err = prepare(input, &sessions, &FakeResolver::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::Connect { ref device, .. } if device == "b"));
    }

    #[tokio::test]
    async fn test_identity_failure_aborts() {
        // CountingDialer sessions answer no commands, so identity fails.
        let sessions = SessionManager::new(Arc::new(CountingDialer::default()));
        let resolver = FakeResolver {
            targets: vec!["r1.example.com"],
            ..Default::default()
        };

        let err = prepare(vec![template(None)], &sessions, &resolver)
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::Identity { .. }));
    }
}
