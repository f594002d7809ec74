//! IP layer collectors: pools, routes, connection tracking and IPsec.

use crate::collector::{CollectContext, Collector, CollectorError, field, proplist};
use crate::metrics::{MetricDescriptor, MetricKind};
use crate::parse::{bool_value, parse_number};

/// Used address count per IPv4 pool.
pub struct PoolsCollector {
    used_count: MetricDescriptor,
}

impl PoolsCollector {
    pub const NAME: &'static str = "pools";

    pub fn new() -> Self {
        Self {
            used_count: MetricDescriptor::new(
                "ip_pool",
                "pool_used_count",
                "number of used IP/prefixes in a pool",
                &["name", "address", "ip_version", "pool"],
                MetricKind::Gauge,
            ),
        }
    }
}

impl Default for PoolsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Collector for PoolsCollector {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn describe(&self) -> Vec<&MetricDescriptor> {
        vec![&self.used_count]
    }

    async fn collect(&self, ctx: &CollectContext<'_>) -> Result<(), CollectorError> {
        let reply = ctx.run("/ip/pool/print", &["=.proplist=name"]).await?;
        let pools: Vec<String> = reply
            .re
            .iter()
            .map(|re| field(re, "name").to_string())
            .collect();

        for pool in &pools {
            let query = format!("?pool={pool}");
            let count = ctx
                .count("/ip/pool/used/print", &[query.as_str(), "=count-only="])
                .await?;
            if let Some(count) = count {
                ctx.emit(&self.used_count, count, &["4", pool.as_str()]);
            }
        }
        Ok(())
    }
}

const ROUTE_PROTOCOLS: &[&str] = &["bgp", "static", "ospf", "dynamic", "connect"];

/// Active route counts, total and per protocol, for IPv4 and IPv6.
pub struct RoutesCollector {
    total: MetricDescriptor,
    per_protocol: MetricDescriptor,
}

impl RoutesCollector {
    pub const NAME: &'static str = "routes";

    pub fn new() -> Self {
        Self {
            total: MetricDescriptor::new(
                "routes",
                "total_count",
                "number of routes in RIB",
                &["name", "address", "ip_version"],
                MetricKind::Gauge,
            ),
            per_protocol: MetricDescriptor::new(
                "routes",
                "protocol_count",
                "number of routes per protocol in RIB",
                &["name", "address", "ip_version", "protocol"],
                MetricKind::Gauge,
            ),
        }
    }

    async fn collect_for_version(
        &self,
        ctx: &CollectContext<'_>,
        version: &str,
        topic: &str,
    ) -> Result<(), CollectorError> {
        let command = format!("/{topic}/route/print");

        if let Some(count) = ctx
            .count(&command, &["?disabled=false", "=count-only="])
            .await?
        {
            ctx.emit(&self.total, count, &[version]);
        }

        for &protocol in ROUTE_PROTOCOLS {
            let query = format!("?{protocol}");
            let count = ctx
                .count(&command, &["?disabled=false", query.as_str(), "=count-only="])
                .await?;
            if let Some(count) = count {
                ctx.emit(&self.per_protocol, count, &[version, protocol]);
            }
        }
        Ok(())
    }
}

impl Default for RoutesCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Collector for RoutesCollector {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn describe(&self) -> Vec<&MetricDescriptor> {
        vec![&self.total, &self.per_protocol]
    }

    async fn collect(&self, ctx: &CollectContext<'_>) -> Result<(), CollectorError> {
        self.collect_for_version(ctx, "4", "ip").await?;
        self.collect_for_version(ctx, "6", "ipv6").await
    }
}

/// Connection tracking table usage.
pub struct ConntrackCollector {
    entries: MetricDescriptor,
    max_entries: MetricDescriptor,
}

impl ConntrackCollector {
    pub const NAME: &'static str = "conntrack";

    pub fn new() -> Self {
        let labels = ["name", "address"];
        Self {
            entries: MetricDescriptor::new(
                "conntrack",
                "entries",
                "Number of tracked connections",
                &labels,
                MetricKind::Gauge,
            ),
            max_entries: MetricDescriptor::new(
                "conntrack",
                "max_entries",
                "Conntrack table capacity",
                &labels,
                MetricKind::Gauge,
            ),
        }
    }
}

impl Default for ConntrackCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Collector for ConntrackCollector {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn describe(&self) -> Vec<&MetricDescriptor> {
        vec![&self.entries, &self.max_entries]
    }

    async fn collect(&self, ctx: &CollectContext<'_>) -> Result<(), CollectorError> {
        let props = proplist(&["total-entries", "max-entries"]);
        let reply = ctx
            .run("/ip/firewall/connection/tracking/print", &[props.as_str()])
            .await?;

        for re in &reply.re {
            for (prop, desc) in [("total-entries", &self.entries), ("max-entries", &self.max_entries)] {
                let value = field(re, prop);
                if !value.is_empty() {
                    ctx.emit_parsed(desc, parse_number(value), &[]);
                }
            }
        }
        Ok(())
    }
}

const IPSEC_PROPS: &[&str] = &[
    "src-address",
    "dst-address",
    "ph2-state",
    "invalid",
    "active",
    "comment",
];

/// State of static, enabled IPsec policies.
pub struct IpsecCollector {
    metrics: Vec<(&'static str, MetricDescriptor)>,
}

impl IpsecCollector {
    pub const NAME: &'static str = "ipsec";

    pub fn new() -> Self {
        let labels = ["name", "address", "srcdst", "comment"];
        let metrics = ["ph2-state", "invalid", "active"]
            .into_iter()
            .map(|p| (p, MetricDescriptor::for_property("ipsec", p, &labels, MetricKind::Gauge)))
            .collect();
        Self { metrics }
    }
}

impl Default for IpsecCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Collector for IpsecCollector {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn describe(&self) -> Vec<&MetricDescriptor> {
        self.metrics.iter().map(|(_, d)| d).collect()
    }

    async fn collect(&self, ctx: &CollectContext<'_>) -> Result<(), CollectorError> {
        let props = proplist(IPSEC_PROPS);
        let reply = ctx
            .run(
                "/ip/ipsec/policy/print",
                &["?disabled=false", "?dynamic=false", props.as_str()],
            )
            .await?;

        for re in &reply.re {
            let srcdst = format!("{}-{}", field(re, "src-address"), field(re, "dst-address"));
            let labels = [srcdst.as_str(), field(re, "comment")];
            for (prop, desc) in &self.metrics {
                let value = field(re, prop);
                if value.is_empty() {
                    continue;
                }
                let v = if *prop == "ph2-state" {
                    if value == "established" { 1.0 } else { 0.0 }
                } else {
                    bool_value(value)
                };
                ctx.emit(desc, v, &labels);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Device;
    use crate::metrics::MetricSink;
    use crate::routeros::fake::FakeClient;
    use crate::routeros::{ApiError, Reply, record};

    fn device() -> Device {
        Device::new("r1", "10.0.0.1", "admin", "pw")
    }

    #[tokio::test]
    async fn test_pools() {
        let session = FakeClient::new()
            .reply("/ip/pool/print", Reply::from_records(vec![record([("name", "dhcp")])]))
            .reply("/ip/pool/used/print ?pool=dhcp =count-only=", Reply::from_ret("40"));
        let sink = MetricSink::new();
        let device = device();

        PoolsCollector::new()
            .collect(&CollectContext::new(&sink, &device, &session))
            .await
            .unwrap();

        assert_eq!(
            sink.samples("mikrotik_ip_pool_pool_used_count"),
            vec![(
                vec!["r1", "10.0.0.1", "4", "dhcp"].into_iter().map(String::from).collect::<Vec<_>>(),
                40.0
            )]
        );
    }

    #[tokio::test]
    async fn test_routes_both_families() {
        let session = FakeClient::new()
            .reply("/ip/route/print ?disabled=false =count-only=", Reply::from_ret("120"))
            .reply("/ip/route/print ?disabled=false ?bgp =count-only=", Reply::from_ret("100"))
            .reply("/ip/route/print", Reply::from_ret("0"))
            .reply("/ipv6/route/print ?disabled=false =count-only=", Reply::from_ret("8"))
            .reply("/ipv6/route/print", Reply::default());
        let sink = MetricSink::new();
        let device = device();

        RoutesCollector::new()
            .collect(&CollectContext::new(&sink, &device, &session))
            .await
            .unwrap();

        let totals: Vec<f64> = sink
            .samples("mikrotik_routes_total_count")
            .into_iter()
            .map(|(_, v)| v)
            .collect();
        assert_eq!(totals, vec![120.0, 8.0]);

        let per_protocol = sink.samples("mikrotik_routes_protocol_count");
        assert_eq!(per_protocol.len(), ROUTE_PROTOCOLS.len());
        assert_eq!(per_protocol[0].0[3], "bgp");
        assert_eq!(per_protocol[0].1, 100.0);
        assert_eq!(session.calls().len(), 12);
    }

    #[tokio::test]
    async fn test_routes_stop_on_failure() {
        let session = FakeClient::new().fail("/ip/route/print", || {
            ApiError::Io(std::io::ErrorKind::BrokenPipe.into())
        });
        let sink = MetricSink::new();
        let device = device();

        let err = RoutesCollector::new()
            .collect(&CollectContext::new(&sink, &device, &session))
            .await
            .unwrap_err();
        assert!(err.is_transport());
        assert_eq!(session.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_conntrack() {
        let session = FakeClient::new().reply(
            "/ip/firewall/connection/tracking/print",
            Reply::from_records(vec![record([("total-entries", "512"), ("max-entries", "1048576")])]),
        );
        let sink = MetricSink::new();
        let device = device();

        ConntrackCollector::new()
            .collect(&CollectContext::new(&sink, &device, &session))
            .await
            .unwrap();

        assert_eq!(sink.samples("mikrotik_conntrack_entries")[0].1, 512.0);
        assert_eq!(sink.samples("mikrotik_conntrack_max_entries")[0].1, 1048576.0);
    }

    #[tokio::test]
    async fn test_ipsec() {
        let session = FakeClient::new().reply(
            "/ip/ipsec/policy/print",
            Reply::from_records(vec![record([
                ("src-address", "10.1.0.0/24"),
                ("dst-address", "10.2.0.0/24"),
                ("ph2-state", "established"),
                ("invalid", "false"),
                ("active", "true"),
                ("comment", "site-b"),
            ])]),
        );
        let sink = MetricSink::new();
        let device = device();

        IpsecCollector::new()
            .collect(&CollectContext::new(&sink, &device, &session))
            .await
            .unwrap();

        let state = sink.samples("mikrotik_ipsec_ph2_state");
        assert_eq!(state[0].0[2], "10.1.0.0/24-10.2.0.0/24");
        assert_eq!(state[0].1, 1.0);
        assert_eq!(sink.samples("mikrotik_ipsec_invalid")[0].1, 0.0);
        assert_eq!(sink.samples("mikrotik_ipsec_active")[0].1, 1.0);
    }
}
