//! Wireless station and interface collectors, plus 60 GHz links.

use crate::collector::{CollectContext, Collector, CollectorError, field, proplist};
use crate::metrics::{MetricDescriptor, MetricKind};
use crate::parse::{parse_dual_value, parse_number};

const STATION_GAUGES: &[&str] = &["signal-to-noise", "signal-strength"];
const STATION_PAIRS: &[&str] = &["packets", "bytes", "frames"];

/// Signal and traffic per registered wireless client.
pub struct WlanStationCollector {
    gauges: Vec<(&'static str, MetricDescriptor)>,
    /// Property, then its tx and rx descriptors.
    pairs: Vec<(&'static str, MetricDescriptor, MetricDescriptor)>,
}

impl WlanStationCollector {
    pub const NAME: &'static str = "wlansta";

    pub fn new() -> Self {
        let labels = ["name", "address", "interface", "mac_address"];
        let gauges = STATION_GAUGES
            .iter()
            .map(|&p| (p, MetricDescriptor::for_property("wlan_station", p, &labels, MetricKind::Gauge)))
            .collect();
        let pairs = STATION_PAIRS
            .iter()
            .map(|&p| {
                let tx = format!("tx_{p}");
                let rx = format!("rx_{p}");
                (
                    p,
                    MetricDescriptor::for_property("wlan_station", &tx, &labels, MetricKind::Counter),
                    MetricDescriptor::for_property("wlan_station", &rx, &labels, MetricKind::Counter),
                )
            })
            .collect();
        Self { gauges, pairs }
    }
}

impl Default for WlanStationCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Collector for WlanStationCollector {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn describe(&self) -> Vec<&MetricDescriptor> {
        self.gauges
            .iter()
            .map(|(_, d)| d)
            .chain(self.pairs.iter().flat_map(|(_, tx, rx)| [tx, rx]))
            .collect()
    }

    async fn collect(&self, ctx: &CollectContext<'_>) -> Result<(), CollectorError> {
        let mut props = vec!["interface", "mac-address"];
        props.extend_from_slice(STATION_GAUGES);
        props.extend_from_slice(STATION_PAIRS);
        let props = proplist(&props);
        let reply = ctx
            .run("/interface/wireless/registration-table/print", &[props.as_str()])
            .await?;

        for re in &reply.re {
            let labels = [field(re, "interface"), field(re, "mac-address")];

            for (prop, desc) in &self.gauges {
                let value = field(re, prop);
                if value.is_empty() {
                    continue;
                }
                // Strength may carry the rate: "-62@6Mbps".
                let value = value.split('@').next().unwrap_or(value);
                ctx.emit_parsed(desc, parse_number(value), &labels);
            }

            for (prop, tx, rx) in &self.pairs {
                let value = field(re, prop);
                if value.is_empty() {
                    continue;
                }
                match parse_dual_value(value) {
                    Ok((tx_value, rx_value)) => {
                        ctx.emit(tx, tx_value, &labels);
                        ctx.emit(rx, rx_value, &labels);
                    }
                    Err(e) => tracing::warn!(
                        device = %ctx.device.name,
                        property = *prop,
                        error = %e,
                        "Dropping unparsable station counters"
                    ),
                }
            }
        }
        Ok(())
    }
}

const INTERFACE_PROPS: &[&str] = &["channel", "registered-clients", "noise-floor", "overall-tx-ccq"];

/// Client count, noise floor and CCQ per enabled wireless interface.
pub struct WlanInterfaceCollector {
    metrics: Vec<(&'static str, MetricDescriptor)>,
}

impl WlanInterfaceCollector {
    pub const NAME: &'static str = "wlanif";

    pub fn new() -> Self {
        let labels = ["name", "address", "interface", "channel"];
        let metrics = INTERFACE_PROPS[1..]
            .iter()
            .map(|&p| (p, MetricDescriptor::for_property("wlan_interface", p, &labels, MetricKind::Gauge)))
            .collect();
        Self { metrics }
    }
}

impl Default for WlanInterfaceCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Collector for WlanInterfaceCollector {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn describe(&self) -> Vec<&MetricDescriptor> {
        self.metrics.iter().map(|(_, d)| d).collect()
    }

    async fn collect(&self, ctx: &CollectContext<'_>) -> Result<(), CollectorError> {
        let reply = ctx
            .run("/interface/wireless/print", &["?disabled=false", "=.proplist=name"])
            .await?;
        let names: Vec<String> = reply
            .re
            .iter()
            .map(|re| field(re, "name").to_string())
            .collect();

        let props = proplist(INTERFACE_PROPS);
        for iface in &names {
            let numbers = format!("=numbers={iface}");
            let reply = ctx
                .run(
                    "/interface/wireless/monitor",
                    &[numbers.as_str(), "=once=", props.as_str()],
                )
                .await?;

            // One interface requested, so at most one record.
            let Some(re) = reply.re.first() else {
                continue;
            };
            let labels = [iface.as_str(), field(re, "channel")];
            for (prop, desc) in &self.metrics {
                let value = field(re, prop);
                if !value.is_empty() {
                    ctx.emit_parsed(desc, parse_number(value), &labels);
                }
            }
        }
        Ok(())
    }
}

/// Monitored 60 GHz properties: property, metric name, help.
const W60G_PROPS: &[(&str, &str, &str)] = &[
    ("frequency", "frequency", "frequency of tx in MHz"),
    ("tx-mcs", "tx_mcs", "TX MCS"),
    ("tx-phy-rate", "tx_phy_rate", "PHY rate in bps"),
    ("signal", "signal", "signal quality in %"),
    ("rssi", "rssi", "signal RSSI in dB"),
    ("tx-sector", "tx_sector", "TX sector"),
    ("distance", "tx_distance", "distance to remote"),
    ("tx-packet-error-rate", "tx_packet_error_rate", "TX packet error rate"),
];

/// Link quality per 60 GHz (w60g) interface.
pub struct W60gCollector {
    metrics: Vec<(&'static str, MetricDescriptor)>,
}

impl W60gCollector {
    pub const NAME: &'static str = "w60g";

    pub fn new() -> Self {
        let labels = ["name", "address", "interface"];
        let metrics = W60G_PROPS
            .iter()
            .map(|&(prop, name, help)| {
                (
                    prop,
                    MetricDescriptor::new("w60g_interface", name, help, &labels, MetricKind::Gauge),
                )
            })
            .collect();
        Self { metrics }
    }
}

impl Default for W60gCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Collector for W60gCollector {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn describe(&self) -> Vec<&MetricDescriptor> {
        self.metrics.iter().map(|(_, d)| d).collect()
    }

    async fn collect(&self, ctx: &CollectContext<'_>) -> Result<(), CollectorError> {
        let reply = ctx
            .run("/interface/w60g/print", &["=.proplist=name"])
            .await?;
        let names: Vec<&str> = reply.re.iter().map(|re| field(re, "name")).collect();
        if names.is_empty() {
            return Ok(());
        }

        let numbers = format!("=numbers={}", names.join(","));
        let mut props = vec!["name"];
        props.extend(W60G_PROPS.iter().map(|(prop, _, _)| *prop));
        let props = proplist(&props);
        let reply = ctx
            .run(
                "/interface/w60g/monitor",
                &[numbers.as_str(), "=once=", props.as_str()],
            )
            .await?;

        for re in &reply.re {
            let iface = field(re, "name");
            if iface.is_empty() {
                continue;
            }
            for (prop, desc) in &self.metrics {
                let value = field(re, prop);
                if !value.is_empty() {
                    ctx.emit_parsed(desc, parse_number(value), &[iface]);
                }
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
    use crate::routeros::{Reply, record};

    #[tokio::test]
    async fn test_station() {
        let session = FakeClient::new().reply(
            "/interface/wireless/registration-table/print",
            Reply::from_records(vec![record([
                ("interface", "wlan1"),
                ("mac-address", "AA:BB:CC:00:11:22"),
                ("signal-strength", "-62@6Mbps"),
                ("signal-to-noise", "40"),
                ("bytes", "1000,2000"),
                ("packets", "abc,20"),
            ])]),
        );
        let sink = MetricSink::new();
        let device = Device::new("r1", "10.0.0.1", "admin", "pw");

        WlanStationCollector::new()
            .collect(&CollectContext::new(&sink, &device, &session))
            .await
            .unwrap();

        assert_eq!(sink.samples("mikrotik_wlan_station_signal_strength")[0].1, -62.0);
        assert_eq!(sink.samples("mikrotik_wlan_station_signal_to_noise")[0].1, 40.0);
        assert_eq!(sink.samples("mikrotik_wlan_station_tx_bytes")[0].1, 1000.0);
        assert_eq!(sink.samples("mikrotik_wlan_station_rx_bytes")[0].1, 2000.0);
        assert!(sink.samples("mikrotik_wlan_station_tx_packets").is_empty());
        assert!(sink.samples("mikrotik_wlan_station_rx_packets").is_empty());
    }

    #[tokio::test]
    async fn test_interface_monitor() {
        let session = FakeClient::new()
            .reply(
                "/interface/wireless/print",
                Reply::from_records(vec![record([("name", "wlan1")]), record([("name", "wlan2")])]),
            )
            .reply(
                "/interface/wireless/monitor =numbers=wlan1 =once= =.proplist=channel,registered-clients,noise-floor,overall-tx-ccq",
                Reply::from_records(vec![record([
                    ("channel", "2412/20-Ce/gn"),
                    ("registered-clients", "7"),
                    ("noise-floor", "-105"),
                ])]),
            )
            .reply("/interface/wireless/monitor", Reply::default());
        let sink = MetricSink::new();
        let device = Device::new("r1", "10.0.0.1", "admin", "pw");

        WlanInterfaceCollector::new()
            .collect(&CollectContext::new(&sink, &device, &session))
            .await
            .unwrap();

        let clients = sink.samples("mikrotik_wlan_interface_registered_clients");
        assert_eq!(clients.len(), 1);
        assert_eq!(clients[0].0[2..], ["wlan1", "2412/20-Ce/gn"]);
        assert_eq!(clients[0].1, 7.0);
        assert_eq!(sink.samples("mikrotik_wlan_interface_noise_floor")[0].1, -105.0);
        assert_eq!(session.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_w60g_monitor() {
        let session = FakeClient::new()
            .reply(
                "/interface/w60g/print",
                Reply::from_records(vec![record([("name", "wlan60-1")]), record([("name", "wlan60-2")])]),
            )
            .reply(
                "/interface/w60g/monitor =numbers=wlan60-1,wlan60-2 =once= =.proplist=name,frequency,tx-mcs,tx-phy-rate,signal,rssi,tx-sector,distance,tx-packet-error-rate",
                Reply::from_records(vec![
                    record([
                        ("name", "wlan60-1"),
                        ("frequency", "60480"),
                        ("tx-mcs", "8"),
                        ("tx-phy-rate", "2310000000"),
                        ("signal", "80"),
                        ("rssi", "-55"),
                        ("distance", "120"),
                        ("tx-packet-error-rate", "n/a"),
                    ]),
                    record([("name", "wlan60-2"), ("frequency", "58320")]),
                ]),
            );
        let sink = MetricSink::new();
        let device = Device::new("r1", "10.0.0.1", "admin", "pw");

        W60gCollector::new()
            .collect(&CollectContext::new(&sink, &device, &session))
            .await
            .unwrap();

        let freq = sink.samples("mikrotik_w60g_interface_frequency");
        assert_eq!(freq.len(), 2);
        assert!(freq.contains(&(vec!["r1".into(), "10.0.0.1".into(), "wlan60-1".into()], 60480.0)));
        assert_eq!(sink.samples("mikrotik_w60g_interface_tx_phy_rate")[0].1, 2_310_000_000.0);
        assert_eq!(sink.samples("mikrotik_w60g_interface_rssi")[0].1, -55.0);
        assert_eq!(sink.samples("mikrotik_w60g_interface_tx_distance")[0].1, 120.0);
        // Unparsable and absent fields are skipped.
        assert!(sink.samples("mikrotik_w60g_interface_tx_packet_error_rate").is_empty());
        assert!(sink.samples("mikrotik_w60g_interface_tx_sector").is_empty());
    }

    #[tokio::test]
    async fn test_w60g_without_interfaces() {
        let session = FakeClient::new().reply("/interface/w60g/print", Reply::default());
        let sink = MetricSink::new();
        let device = Device::new("r1", "10.0.0.1", "admin", "pw");

        W60gCollector::new()
            .collect(&CollectContext::new(&sink, &device, &session))
            .await
            .unwrap();

        assert_eq!(session.calls().len(), 1);
    }
}
