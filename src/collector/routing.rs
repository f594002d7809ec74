//! BGP peer collector.

use crate::collector::{CollectContext, Collector, CollectorError, field, proplist};
use crate::metrics::{MetricDescriptor, MetricKind};
use crate::parse::parse_number;

const BGP_PROPS: &[&str] = &[
    "name",
    "remote-as",
    "state",
    "prefix-count",
    "updates-sent",
    "updates-received",
    "withdrawn-sent",
    "withdrawn-received",
];

/// Session state and update counters per BGP peer.
pub struct BgpCollector {
    metrics: Vec<(&'static str, MetricDescriptor)>,
}

impl BgpCollector {
    pub const NAME: &'static str = "bgp";

    pub fn new() -> Self {
        let labels = ["name", "address", "session", "asn"];
        let mut metrics = vec![(
            "state",
            MetricDescriptor::new(
                "bgp",
                "up",
                "BGP session is established (up = 1)",
                &labels,
                MetricKind::Gauge,
            ),
        )];
        metrics.extend(BGP_PROPS[3..].iter().map(|&p| {
            let kind = if p == "prefix-count" {
                MetricKind::Gauge
            } else {
                MetricKind::Counter
            };
            (p, MetricDescriptor::for_property("bgp", p, &labels, kind))
        }));
        Self { metrics }
    }
}

impl Default for BgpCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Collector for BgpCollector {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn describe(&self) -> Vec<&MetricDescriptor> {
        self.metrics.iter().map(|(_, d)| d).collect()
    }

    async fn collect(&self, ctx: &CollectContext<'_>) -> Result<(), CollectorError> {
        let props = proplist(BGP_PROPS);
        let reply = ctx
            .run("/routing/bgp/peer/print", &[props.as_str()])
            .await?;

        for re in &reply.re {
            let labels = [field(re, "name"), field(re, "remote-as")];
            for (prop, desc) in &self.metrics {
                let value = field(re, prop);
                let parsed = match (*prop, value) {
                    ("state", "established") => Ok(1.0),
                    ("state", _) => Ok(0.0),
                    // Counters are absent while a session is down.
                    (_, "") => Ok(0.0),
                    _ => parse_number(value),
                };
                ctx.emit_parsed(desc, parsed, &labels);
            }
        }
        Ok(())
    }
}
