//! LTE modem signal collector.

use crate::collector::{CollectContext, Collector, CollectorError, field, proplist};
use crate::metrics::{MetricDescriptor, MetricKind};
use crate::parse::parse_number;

const LTE_PROPS: &[&str] = &[
    "current-cellid",
    "primary-band",
    "ca-band",
    "rssi",
    "rsrp",
    "rsrq",
    "sinr",
];

/// Radio quality per enabled LTE interface.
pub struct LteCollector {
    metrics: Vec<(&'static str, MetricDescriptor)>,
}

impl LteCollector {
    pub const NAME: &'static str = "lte";

    pub fn new() -> Self {
        let labels = [
            "name",
            "address",
            "interface",
            "cellid",
            "primaryband",
            "caband",
        ];
        let metrics = LTE_PROPS[3..]
            .iter()
            .map(|&p| (p, MetricDescriptor::for_property("lte_interface", p, &labels, MetricKind::Gauge)))
            .collect();
        Self { metrics }
    }
}

impl Default for LteCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Band name without EARFCN and cell details (`"B3@20Mhz earfcn: ..."` -> `"B3@20Mhz"`).
fn band(value: &str) -> &str {
    value.split_whitespace().next().unwrap_or_default()
}

#[async_trait::async_trait]
impl Collector for LteCollector {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn describe(&self) -> Vec<&MetricDescriptor> {
        self.metrics.iter().map(|(_, d)| d).collect()
    }

    async fn collect(&self, ctx: &CollectContext<'_>) -> Result<(), CollectorError> {
        let reply = ctx
            .run("/interface/lte/print", &["?disabled=false", "=.proplist=name"])
            .await?;
        let names: Vec<String> = reply
            .re
            .iter()
            .map(|re| field(re, "name").to_string())
            .collect();

        let props = proplist(LTE_PROPS);
        for iface in &names {
            let number = format!("=number={iface}");
            let reply = ctx
                .run(
                    "/interface/lte/info",
                    &[number.as_str(), "=once=", props.as_str()],
                )
                .await?;

            let Some(re) = reply.re.first() else {
                continue;
            };
            let labels = [
                iface.as_str(),
                field(re, "current-cellid"),
                band(field(re, "primary-band")),
                band(field(re, "ca-band")),
            ];
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
