//! Netwatch host status collector.

use crate::collector::{CollectContext, Collector, CollectorError, field, proplist};
use crate::metrics::{MetricDescriptor, MetricKind};

/// Status of each enabled netwatch entry: up = 1, unknown = 0, down = -1.
pub struct NetwatchCollector {
    status: MetricDescriptor,
}

impl NetwatchCollector {
    pub const NAME: &'static str = "netwatch";

    pub fn new() -> Self {
        Self {
            status: MetricDescriptor::for_property(
                "netwatch",
                "status",
                &["name", "address", "host", "comment"],
                MetricKind::Gauge,
            ),
        }
    }
}

impl Default for NetwatchCollector {
    fn default() -> Self {
        Self::new()
    }
}

fn status_value(status: &str) -> Option<f64> {
    match status {
        "up" => Some(1.0),
        "unknown" => Some(0.0),
        "down" => Some(-1.0),
        _ => None,
    }
}

#[async_trait::async_trait]
impl Collector for NetwatchCollector {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn describe(&self) -> Vec<&MetricDescriptor> {
        vec![&self.status]
    }

    async fn collect(&self, ctx: &CollectContext<'_>) -> Result<(), CollectorError> {
        let props = proplist(&["host", "comment", "status"]);
        let reply = ctx
            .run("/tool/netwatch/print", &["?disabled=false", props.as_str()])
            .await?;

        for re in &reply.re {
            let status = field(re, "status");
            if status.is_empty() {
                continue;
            }
            let host = field(re, "host");
            match status_value(status) {
                Some(v) => ctx.emit(&self.status, v, &[host, field(re, "comment")]),
                None => tracing::warn!(
                    device = %ctx.device.name,
                    host,
                    status,
                    "Unexpected netwatch status"
                ),
            }
        }
        Ok(())
    }
}
