//! Core collector trait and collection context.

use thiserror::Error;

use crate::device::Device;
use crate::metrics::{MetricDescriptor, MetricSink};
use crate::parse::{ParseError, parse_number};
use crate::routeros::{ApiClient, ApiError, Record, Reply};

/// Errors that abort a collector for one device in one pass.
#[derive(Debug, Error)]
pub enum CollectorError {
    /// Command failed on the device or the session broke.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// A count-only result could not be parsed.
    #[error("unparsable result of {command}: {source}")]
    Parse {
        command: String,
        #[source]
        source: ParseError,
    },
}

impl CollectorError {
    /// Whether the session that produced this error must be discarded.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Api(e) if e.is_transport())
    }
}

/// Everything a collector may touch during one `collect` call.
///
/// Samples emitted through [`emit`](Self::emit) are prefixed with the
/// device's `name` and `address` label values.
pub struct CollectContext<'a> {
    pub sink: &'a MetricSink,
    pub device: &'a Device,
    pub session: &'a dyn ApiClient,
}

impl<'a> CollectContext<'a> {
    pub fn new(sink: &'a MetricSink, device: &'a Device, session: &'a dyn ApiClient) -> Self {
        Self {
            sink,
            device,
            session,
        }
    }

    /// Run a command, logging failures with the device name.
    pub async fn run(&self, command: &str, args: &[&str]) -> Result<Reply, CollectorError> {
        self.session.run(command, args).await.map_err(|e| {
            tracing::error!(device = %self.device.name, command, error = %e, "Command failed");
            CollectorError::Api(e)
        })
    }

    /// Run a count-only query. `None` when the device returned no count.
    pub async fn count(&self, command: &str, args: &[&str]) -> Result<Option<f64>, CollectorError> {
        let reply = self.run(command, args).await?;
        let Some(ret) = reply.ret() else {
            return Ok(None);
        };

        parse_number(ret).map(Some).map_err(|source| {
            tracing::error!(device = %self.device.name, command, value = ret, "Unparsable count");
            CollectorError::Parse {
                command: command.to_string(),
                source,
            }
        })
    }

    /// Emit one sample; `labels` follow the device name and address.
    pub fn emit(&self, desc: &MetricDescriptor, value: f64, labels: &[&str]) {
        let mut values = Vec::with_capacity(labels.len() + 2);
        values.push(self.device.name.as_str());
        values.push(self.device.address.as_str());
        values.extend_from_slice(labels);
        self.sink.emit(desc, value, &values);
    }

    /// Emit a parsed value, or log and drop the point.
    pub fn emit_parsed(&self, desc: &MetricDescriptor, value: Result<f64, ParseError>, labels: &[&str]) {
        match value {
            Ok(v) => self.emit(desc, v, labels),
            Err(e) => tracing::warn!(
                device = %self.device.name,
                metric = desc.fq_name(),
                error = %e,
                "Dropping unparsable value"
            ),
        }
    }
}

/// A named metric source bound to a device session per call.
///
/// Implementations build their descriptors at construction and must not
/// contact any device until [`collect`](Self::collect). A collector must not
/// keep the session beyond one call.
#[async_trait::async_trait]
pub trait Collector: Send + Sync + 'static {
    /// Registry name (e.g. `"bgp"`).
    fn name(&self) -> &str;

    /// Every descriptor this instance may emit. Stable across calls.
    fn describe(&self) -> Vec<&MetricDescriptor>;

    /// Fetch from the device and emit samples into the context's sink.
    ///
    /// A single unparsable field drops that sample only. RPC failures and
    /// unparsable count results abort with an error.
    async fn collect(&self, ctx: &CollectContext<'_>) -> Result<(), CollectorError>;
}

/// Build a `=.proplist=` argument.
pub fn proplist(props: &[&str]) -> String {
    format!("=.proplist={}", props.join(","))
}

/// A record field, or `""` when absent.
pub fn field<'r>(record: &'r Record, key: &str) -> &'r str {
    record.get(key).map(String::as_str).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricKind;
    use crate::routeros::fake::FakeClient;
    use crate::routeros::record;

    #[test]
    fn test_proplist() {
        assert_eq!(proplist(&["name", "rx-byte"]), "=.proplist=name,rx-byte");
    }

    #[test]
    fn test_field_defaults_to_empty() {
        let re = record([("name", "ether1")]);
        assert_eq!(field(&re, "name"), "ether1");
        assert_eq!(field(&re, "comment"), "");
    }

    #[test]
    fn test_collector_error_transport() {
        let broken = CollectorError::Api(ApiError::Fatal("closed".into()));
        assert!(broken.is_transport());
        let parse = CollectorError::Parse {
            command: "/ip/pool/used/print".into(),
            source: ParseError::Number("x".into()),
        };
        assert!(!parse.is_transport());
    }

    #[tokio::test]
    async fn test_emit_prefixes_device_labels() {
        let sink = MetricSink::new();
        let device = Device::new("r1", "10.0.0.1", "admin", "pw");
        let session = FakeClient::new();
        let ctx = CollectContext::new(&sink, &device, &session);
        let desc = MetricDescriptor::new("test", "value", "help", &["name", "address", "iface"], MetricKind::Gauge);

        ctx.emit(&desc, 2.0, &["ether1"]);
        ctx.emit_parsed(&desc, Err(ParseError::Number("abc".into())), &["ether2"]);

        assert_eq!(
            sink.samples("mikrotik_test_value"),
            vec![(vec!["r1".to_string(), "10.0.0.1".to_string(), "ether1".to_string()], 2.0)]
        );
    }

    #[tokio::test]
    async fn test_count() {
        let sink = MetricSink::new();
        let device = Device::new("r1", "10.0.0.1", "admin", "pw");
        let session = FakeClient::new()
            .reply("/a", Reply::from_ret("42"))
            .reply("/b", Reply::default())
            .reply("/c", Reply::from_ret("many"));
        let ctx = CollectContext::new(&sink, &device, &session);

        assert_eq!(ctx.count("/a", &[]).await.unwrap(), Some(42.0));
        assert_eq!(ctx.count("/b", &[]).await.unwrap(), None);
        assert!(matches!(
            ctx.count("/c", &[]).await,
            Err(CollectorError::Parse { .. })
        ));
        assert!(matches!(
            ctx.count("/missing", &[]).await,
            Err(CollectorError::Api(ApiError::Trap(_)))
        ));
    }
}
