//! Interface counters and SFP optics collectors.

use crate::collector::{CollectContext, Collector, CollectorError, field, proplist};
use crate::metrics::{MetricDescriptor, MetricKind};
use crate::parse::{bool_value, parse_number};

const INTERFACE_PROPS: &[&str] = &[
    "name",
    "type",
    "disabled",
    "comment",
    "slave",
    "actual-mtu",
    "running",
    "rx-byte",
    "tx-byte",
    "rx-packet",
    "tx-packet",
    "rx-error",
    "tx-error",
    "rx-drop",
    "tx-drop",
];

/// Per-interface traffic counters from `/interface`.
pub struct InterfaceCollector {
    metrics: Vec<(&'static str, MetricDescriptor)>,
}

impl InterfaceCollector {
    pub const NAME: &'static str = "interface";

    pub fn new() -> Self {
        let labels = [
            "name",
            "address",
            "interface",
            "type",
            "disabled",
            "comment",
            "running",
            "slave",
        ];
        let metrics = INTERFACE_PROPS[5..]
            .iter()
            .map(|&p| {
                let kind = match p {
                    "actual-mtu" | "running" => MetricKind::Gauge,
                    _ => MetricKind::Counter,
                };
                (p, MetricDescriptor::for_property("interface", p, &labels, kind))
            })
            .collect();
        Self { metrics }
    }
}

impl Default for InterfaceCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Collector for InterfaceCollector {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn describe(&self) -> Vec<&MetricDescriptor> {
        self.metrics.iter().map(|(_, d)| d).collect()
    }

    async fn collect(&self, ctx: &CollectContext<'_>) -> Result<(), CollectorError> {
        let reply = ctx
            .run("/interface/print", &[proplist(INTERFACE_PROPS).as_str()])
            .await?;

        for re in &reply.re {
            let labels = [
                field(re, "name"),
                field(re, "type"),
                field(re, "disabled"),
                field(re, "comment"),
                field(re, "running"),
                field(re, "slave"),
            ];
            for (prop, desc) in &self.metrics {
                let value = field(re, prop);
                if value.is_empty() {
                    continue;
                }
                let parsed = if *prop == "running" {
                    Ok(bool_value(value))
                } else {
                    parse_number(value)
                };
                ctx.emit_parsed(desc, parsed, &labels);
            }
        }
        Ok(())
    }
}

const OPTICS_PROPS: &[&str] = &[
    "sfp-rx-loss",
    "sfp-tx-fault",
    "sfp-temperature",
    "sfp-supply-voltage",
    "sfp-tx-bias-current",
    "sfp-tx-power",
    "sfp-rx-power",
];

/// SFP module diagnostics from `/interface/ethernet/monitor`.
///
/// Only interfaces whose name starts with `sfp` are monitored.
pub struct OpticsCollector {
    metrics: Vec<(&'static str, MetricDescriptor)>,
}

impl OpticsCollector {
    pub const NAME: &'static str = "optics";

    pub fn new() -> Self {
        let labels = ["name", "address", "interface"];
        let desc = |name: &str, help: &str| {
            MetricDescriptor::new("optics", name, help, &labels, MetricKind::Gauge)
        };
        Self {
            metrics: vec![
                ("sfp-rx-loss", desc("rx_status", "RX status (1 = no loss)")),
                ("sfp-tx-fault", desc("tx_status", "TX status (1 = no faults)")),
                ("sfp-temperature", desc("temperature_celsius", "temperature in degree celsius")),
                ("sfp-supply-voltage", desc("voltage_volt", "voltage in volt")),
                ("sfp-tx-bias-current", desc("tx_bias_ma", "bias in milliamps")),
                ("sfp-tx-power", desc("tx_power_dbm", "TX power in dBm")),
                ("sfp-rx-power", desc("rx_power_dbm", "RX power in dBm")),
            ],
        }
    }
}

impl Default for OpticsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Collector for OpticsCollector {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn describe(&self) -> Vec<&MetricDescriptor> {
        self.metrics.iter().map(|(_, d)| d).collect()
    }

    async fn collect(&self, ctx: &CollectContext<'_>) -> Result<(), CollectorError> {
        let reply = ctx
            .run("/interface/ethernet/print", &["=.proplist=name"])
            .await?;
        let ifaces: Vec<&str> = reply
            .re
            .iter()
            .map(|re| field(re, "name"))
            .filter(|name| name.starts_with("sfp"))
            .collect();
        if ifaces.is_empty() {
            return Ok(());
        }

        let numbers = format!("=numbers={}", ifaces.join(","));
        let props = format!("=.proplist=name,{}", OPTICS_PROPS.join(","));
        let reply = ctx
            .run("/interface/ethernet/monitor", &[numbers.as_str(), "=once=", props.as_str()])
            .await?;

        for re in &reply.re {
            let Some(iface) = re.get("name") else {
                continue;
            };
            for (prop, desc) in &self.metrics {
                let Some(value) = re.get(*prop) else {
                    continue;
                };
                let parsed = match *prop {
                    // 1 means healthy: no loss, no fault.
                    "sfp-rx-loss" | "sfp-tx-fault" => Ok(1.0 - bool_value(value)),
                    _ => parse_number(value),
                };
                ctx.emit_parsed(desc, parsed, &[iface.as_str()]);
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
    async fn test_interface() {
        let session = FakeClient::new().reply(
            "/interface/print",
            Reply::from_records(vec![
                record([
                    ("name", "ether1"),
                    ("type", "ether"),
                    ("disabled", "false"),
                    ("running", "true"),
                    ("rx-byte", "1024"),
                    ("tx-byte", "bogus"),
                ]),
                record([("name", "ether2"), ("running", "false"), ("rx-byte", "5")]),
            ]),
        );
        let sink = MetricSink::new();
        let device = Device::new("r1", "10.0.0.1", "admin", "pw");

        InterfaceCollector::new()
            .collect(&CollectContext::new(&sink, &device, &session))
            .await
            .unwrap();

        let rx = sink.samples("mikrotik_interface_rx_byte");
        assert_eq!(rx.len(), 2);
        assert_eq!(rx[0].0[..4], ["r1", "10.0.0.1", "ether1", "ether"]);
        assert_eq!(rx[0].1, 1024.0);

        let running: Vec<f64> = sink
            .samples("mikrotik_interface_running")
            .into_iter()
            .map(|(_, v)| v)
            .collect();
        assert_eq!(running, vec![1.0, 0.0]);
        assert!(sink.samples("mikrotik_interface_tx_byte").is_empty());
    }

    #[tokio::test]
    async fn test_optics_monitors_sfp_ports_only() {
        let session = FakeClient::new()
            .reply(
                "/interface/ethernet/print",
                Reply::from_records(vec![
                    record([("name", "ether1")]),
                    record([("name", "sfp1")]),
                    record([("name", "sfp-sfpplus2")]),
                ]),
            )
            .reply(
                "/interface/ethernet/monitor",
                Reply::from_records(vec![record([
                    ("name", "sfp1"),
                    ("sfp-rx-loss", "false"),
                    ("sfp-tx-fault", "true"),
                    ("sfp-rx-power", "-5.2"),
                ])]),
            );
        let sink = MetricSink::new();
        let device = Device::new("r1", "10.0.0.1", "admin", "pw");

        OpticsCollector::new()
            .collect(&CollectContext::new(&sink, &device, &session))
            .await
            .unwrap();

        assert!(session.calls()[1].starts_with("/interface/ethernet/monitor =numbers=sfp1,sfp-sfpplus2 =once="));
        assert_eq!(sink.samples("mikrotik_optics_rx_status")[0].1, 1.0);
        assert_eq!(sink.samples("mikrotik_optics_tx_status")[0].1, 0.0);
        assert_eq!(sink.samples("mikrotik_optics_rx_power_dbm")[0].1, -5.2);
        assert!(sink.samples("mikrotik_optics_temperature_celsius").is_empty());
    }

    #[tokio::test]
    async fn test_optics_without_sfp_ports() {
        let session = FakeClient::new().reply(
            "/interface/ethernet/print",
            Reply::from_records(vec![record([("name", "ether1")])]),
        );
        let sink = MetricSink::new();
        let device = Device::new("r1", "10.0.0.1", "admin", "pw");

        OpticsCollector::new()
            .collect(&CollectContext::new(&sink, &device, &session))
            .await
            .unwrap();

        assert_eq!(session.calls().len(), 1);
        assert!(sink.is_empty());
    }
}
