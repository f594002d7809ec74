//! System resource, health and package collectors.

use crate::collector::{CollectContext, Collector, CollectorError, field, proplist};
use crate::metrics::{MetricDescriptor, MetricKind};
use crate::parse::{parse_duration, parse_number};

const RESOURCE_PROPS: &[&str] = &[
    "free-memory",
    "total-memory",
    "cpu-load",
    "free-hdd-space",
    "total-hdd-space",
    "uptime",
    "board-name",
    "version",
];

/// Memory, CPU, disk and uptime from `/system/resource`.
pub struct ResourceCollector {
    metrics: Vec<(&'static str, MetricDescriptor)>,
}

impl ResourceCollector {
    pub const NAME: &'static str = "resource";

    pub fn new() -> Self {
        let labels = ["name", "address", "boardname", "version"];
        let metrics = RESOURCE_PROPS[..6]
            .iter()
            .map(|&p| {
                let kind = if p == "uptime" {
                    MetricKind::Counter
                } else {
                    MetricKind::Gauge
                };
                (p, MetricDescriptor::for_property("system", p, &labels, kind))
            })
            .collect();
        Self { metrics }
    }
}

impl Default for ResourceCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Collector for ResourceCollector {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn describe(&self) -> Vec<&MetricDescriptor> {
        self.metrics.iter().map(|(_, d)| d).collect()
    }

    async fn collect(&self, ctx: &CollectContext<'_>) -> Result<(), CollectorError> {
        let reply = ctx
            .run("/system/resource/print", &[proplist(RESOURCE_PROPS).as_str()])
            .await?;

        for re in &reply.re {
            let labels = [field(re, "board-name"), field(re, "version")];
            for (prop, desc) in &self.metrics {
                let value = field(re, prop);
                if value.is_empty() {
                    continue;
                }
                let parsed = if *prop == "uptime" {
                    parse_duration(value)
                } else {
                    parse_number(value)
                };
                ctx.emit_parsed(desc, parsed, &labels);
            }
        }
        Ok(())
    }
}

const HEALTH_PROPS: &[(&str, &str)] = &[
    ("voltage", "Input voltage to the RouterOS board, in volts"),
    ("temperature", "Temperature of RouterOS board, in degrees Celsius"),
    ("cpu-temperature", "Temperature of RouterOS CPU, in degrees Celsius"),
];

/// Board voltage and temperatures from `/system/health`.
pub struct HealthCollector {
    metrics: Vec<(&'static str, MetricDescriptor)>,
}

impl HealthCollector {
    pub const NAME: &'static str = "health";

    pub fn new() -> Self {
        let metrics = HEALTH_PROPS
            .iter()
            .map(|&(p, help)| {
                let desc = MetricDescriptor::new(
                    "health",
                    &p.replace('-', "_"),
                    help,
                    &["name", "address"],
                    MetricKind::Gauge,
                );
                (p, desc)
            })
            .collect();
        Self { metrics }
    }
}

impl Default for HealthCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Collector for HealthCollector {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn describe(&self) -> Vec<&MetricDescriptor> {
        self.metrics.iter().map(|(_, d)| d).collect()
    }

    async fn collect(&self, ctx: &CollectContext<'_>) -> Result<(), CollectorError> {
        let props: Vec<&str> = HEALTH_PROPS.iter().map(|(p, _)| *p).collect();
        let reply = ctx.run("/system/health/print", &[proplist(&props).as_str()]).await?;

        for re in &reply.re {
            for (prop, desc) in &self.metrics {
                let value = field(re, prop);
                if !value.is_empty() {
                    ctx.emit_parsed(desc, parse_number(value), &[]);
                }
            }
        }
        Ok(())
    }
}

/// Installed packages from `/system/package`; 1 when enabled.
pub struct FirmwareCollector {
    package: MetricDescriptor,
}

impl FirmwareCollector {
    pub const NAME: &'static str = "firmware";

    pub fn new() -> Self {
        Self {
            package: MetricDescriptor::new(
                "system",
                "package",
                "system packages version",
                &["name", "address", "package", "disabled", "version", "build_time"],
                MetricKind::Gauge,
            ),
        }
    }
}

impl Default for FirmwareCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Collector for FirmwareCollector {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn describe(&self) -> Vec<&MetricDescriptor> {
        vec![&self.package]
    }

    async fn collect(&self, ctx: &CollectContext<'_>) -> Result<(), CollectorError> {
        let reply = ctx.run("/system/package/getall", &[]).await?;

        for pkg in &reply.re {
            let disabled = field(pkg, "disabled");
            let value = if disabled.eq_ignore_ascii_case("true") { 0.0 } else { 1.0 };
            ctx.emit(
                &self.package,
                value,
                &[field(pkg, "name"), disabled, field(pkg, "version"), field(pkg, "build-time")],
            );
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

    fn device() -> Device {
        Device::new("r1", "10.0.0.1", "admin", "pw")
    }

    #[tokio::test]
    async fn test_resource() {
        let session = FakeClient::new().reply(
            "/system/resource/print",
            Reply::from_records(vec![record([
                ("free-memory", "1000"),
                ("total-memory", "2000"),
                ("cpu-load", "7"),
                ("uptime", "1d2h"),
                ("board-name", "CCR1009"),
                ("version", "6.49.7"),
            ])]),
        );
        let sink = MetricSink::new();
        let device = device();

        ResourceCollector::new()
            .collect(&CollectContext::new(&sink, &device, &session))
            .await
            .unwrap();

        let labels = vec!["r1", "10.0.0.1", "CCR1009", "6.49.7"];
        let labels: Vec<String> = labels.into_iter().map(String::from).collect();
        assert_eq!(sink.samples("mikrotik_system_uptime"), vec![(labels.clone(), 93600.0)]);
        assert_eq!(sink.samples("mikrotik_system_cpu_load"), vec![(labels, 7.0)]);
        assert!(sink.samples("mikrotik_system_free_hdd_space").is_empty());
        assert_eq!(
            session.calls(),
            vec!["/system/resource/print =.proplist=free-memory,total-memory,cpu-load,free-hdd-space,total-hdd-space,uptime,board-name,version"]
        );
    }

    #[tokio::test]
    async fn test_health_drops_unparsable_value() {
        let session = FakeClient::new().reply(
            "/system/health/print",
            Reply::from_records(vec![record([("voltage", "24.1"), ("temperature", "hot")])]),
        );
        let sink = MetricSink::new();
        let device = device();

        HealthCollector::new()
            .collect(&CollectContext::new(&sink, &device, &session))
            .await
            .unwrap();

        assert_eq!(sink.samples("mikrotik_health_voltage").len(), 1);
        assert!(sink.samples("mikrotik_health_temperature").is_empty());
    }

    #[tokio::test]
    async fn test_firmware() {
        let session = FakeClient::new().reply(
            "/system/package/getall",
            Reply::from_records(vec![
                record([("name", "routeros"), ("disabled", "false"), ("version", "7.12")]),
                record([("name", "wireless"), ("disabled", "true"), ("version", "7.12")]),
            ]),
        );
        let sink = MetricSink::new();
        let device = device();

        FirmwareCollector::new()
            .collect(&CollectContext::new(&sink, &device, &session))
            .await
            .unwrap();

        let values: Vec<f64> = sink
            .samples("mikrotik_system_package")
            .into_iter()
            .map(|(_, v)| v)
            .collect();
        assert_eq!(values, vec![1.0, 0.0]);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_error() {
        let session = FakeClient::new();
        let sink = MetricSink::new();
        let device = device();

        let result = HealthCollector::new()
            .collect(&CollectContext::new(&sink, &device, &session))
            .await;
        assert!(result.is_err());
        assert!(sink.is_empty());
    }
}
