//! DHCP and DHCPv6 server collectors.

use crate::collector::{CollectContext, Collector, CollectorError, field, proplist};
use crate::metrics::{MetricDescriptor, MetricKind};
use crate::parse::parse_duration;

/// Names of the servers listed by `command`.
async fn server_names(ctx: &CollectContext<'_>, command: &str) -> Result<Vec<String>, CollectorError> {
    let reply = ctx.run(command, &["=.proplist=name"]).await?;
    Ok(reply
        .re
        .iter()
        .map(|re| field(re, "name").to_string())
        .collect())
}

/// Active lease count per DHCP server.
pub struct DhcpCollector {
    leases_active: MetricDescriptor,
}

impl DhcpCollector {
    pub const NAME: &'static str = "dhcp";

    pub fn new() -> Self {
        Self {
            leases_active: MetricDescriptor::new(
                "dhcp",
                "leases_active_count",
                "number of active leases per DHCP server",
                &["name", "address", "server"],
                MetricKind::Gauge,
            ),
        }
    }
}

impl Default for DhcpCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Collector for DhcpCollector {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn describe(&self) -> Vec<&MetricDescriptor> {
        vec![&self.leases_active]
    }

    async fn collect(&self, ctx: &CollectContext<'_>) -> Result<(), CollectorError> {
        for server in server_names(ctx, "/ip/dhcp-server/print").await? {
            let query = format!("?server={server}");
            let count = ctx
                .count(
                    "/ip/dhcp-server/lease/print",
                    &[query.as_str(), "=active=", "=count-only="],
                )
                .await?;
            if let Some(count) = count {
                ctx.emit(&self.leases_active, count, &[server.as_str()]);
            }
        }
        Ok(())
    }
}

const LEASE_PROPS: &[&str] = &[
    "active-mac-address",
    "server",
    "status",
    "expires-after",
    "active-address",
    "host-name",
];

/// One series per bound lease, carrying lease details as labels.
pub struct DhcpLeaseCollector {
    lease: MetricDescriptor,
}

impl DhcpLeaseCollector {
    pub const NAME: &'static str = "dhcp_lease";

    pub fn new() -> Self {
        Self {
            lease: MetricDescriptor::new(
                "dhcp",
                "leases_metrics",
                "number of metrics",
                &[
                    "name",
                    "address",
                    "activemacaddress",
                    "server",
                    "status",
                    "expiresafter",
                    "activeaddress",
                    "hostname",
                ],
                MetricKind::Gauge,
            ),
        }
    }
}

impl Default for DhcpLeaseCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Collector for DhcpLeaseCollector {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn describe(&self) -> Vec<&MetricDescriptor> {
        vec![&self.lease]
    }

    async fn collect(&self, ctx: &CollectContext<'_>) -> Result<(), CollectorError> {
        let props = proplist(LEASE_PROPS);
        let reply = ctx
            .run("/ip/dhcp-server/lease/print", &["?status=bound", props.as_str()])
            .await?;

        for re in &reply.re {
            let expires = match parse_duration(field(re, "expires-after")) {
                Ok(seconds) => format!("{seconds:.0}"),
                Err(e) => {
                    tracing::warn!(
                        device = %ctx.device.name,
                        lease = field(re, "active-address"),
                        error = %e,
                        "Dropping lease with unparsable expiry"
                    );
                    continue;
                }
            };

            ctx.emit(
                &self.lease,
                1.0,
                &[
                    field(re, "active-mac-address"),
                    field(re, "server"),
                    field(re, "status"),
                    expires.as_str(),
                    field(re, "active-address"),
                    field(re, "host-name"),
                ],
            );
        }
        Ok(())
    }
}

/// Binding count per DHCPv6 server.
pub struct Dhcpv6Collector {
    binding_count: MetricDescriptor,
}

impl Dhcpv6Collector {
    pub const NAME: &'static str = "dhcpv6";

    pub fn new() -> Self {
        Self {
            binding_count: MetricDescriptor::new(
                "dhcpv6",
                "binding_count",
                "number of active bindings per DHCPv6 server",
                &["name", "address", "server"],
                MetricKind::Gauge,
            ),
        }
    }
}

impl Default for Dhcpv6Collector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Collector for Dhcpv6Collector {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn describe(&self) -> Vec<&MetricDescriptor> {
        vec![&self.binding_count]
    }

    async fn collect(&self, ctx: &CollectContext<'_>) -> Result<(), CollectorError> {
        for server in server_names(ctx, "/ipv6/dhcp-server/print").await? {
            let query = format!("?server={server}");
            let count = ctx
                .count(
                    "/ipv6/dhcp-server/binding/print",
                    &[query.as_str(), "=count-only="],
                )
                .await?;
            if let Some(count) = count {
                ctx.emit(&self.binding_count, count, &[server.as_str()]);
            }
        }
        Ok(())
    }
}
