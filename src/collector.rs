//! Collector Layer
//!
//! Pluggable metric sources. Each collector runs a fixed fetch, parse and
//! emit sequence against one device session per call.
//!
//! # Architecture
//!
//! - [`Collector`]: core trait implemented by every feature
//! - [`CollectContext`]: sink, device and session handed to one call
//! - [`CollectorRegistry`]: feature name to factory table
//!
//! # Example
//!
//! ```rust
//! use mikrotik_exporter::collector::builtin;
//!
//! let collectors = builtin().resolve(&["interface", "resource"]).unwrap();
//! assert_eq!(collectors[0].name(), "interface");
//! assert!(builtin().resolve(&["bgp", "does-not-exist"]).is_err());
//! ```

mod dhcp;
mod interface;
mod ip;
mod lte;
mod netwatch;
mod registry;
mod routing;
mod system;
mod traits;
mod wireless;

pub use dhcp::{DhcpCollector, DhcpLeaseCollector, Dhcpv6Collector};
pub use interface::{InterfaceCollector, OpticsCollector};
pub use ip::{ConntrackCollector, IpsecCollector, PoolsCollector, RoutesCollector};
pub use lte::LteCollector;
pub use netwatch::NetwatchCollector;
pub use registry::{CollectorRegistry, Factory, UnknownCollectorError};
pub use routing::BgpCollector;
pub use system::{FirmwareCollector, HealthCollector, ResourceCollector};
pub use traits::{CollectContext, Collector, CollectorError, field, proplist};
pub use wireless::{W60gCollector, WlanInterfaceCollector, WlanStationCollector};

/// Features used when none are configured.
pub const DEFAULT_FEATURES: &[&str] = &["interface", "resource"];

/// Registry holding every built-in collector.
pub fn builtin() -> CollectorRegistry {
    let mut registry = CollectorRegistry::new();
    registry.register(InterfaceCollector::NAME, || Box::new(InterfaceCollector::new()));
    registry.register(ResourceCollector::NAME, || Box::new(ResourceCollector::new()));
    registry.register(HealthCollector::NAME, || Box::new(HealthCollector::new()));
    registry.register(DhcpCollector::NAME, || Box::new(DhcpCollector::new()));
    registry.register(DhcpLeaseCollector::NAME, || Box::new(DhcpLeaseCollector::new()));
    registry.register(Dhcpv6Collector::NAME, || Box::new(Dhcpv6Collector::new()));
    registry.register(PoolsCollector::NAME, || Box::new(PoolsCollector::new()));
    registry.register(RoutesCollector::NAME, || Box::new(RoutesCollector::new()));
    registry.register(BgpCollector::NAME, || Box::new(BgpCollector::new()));
    registry.register(ConntrackCollector::NAME, || Box::new(ConntrackCollector::new()));
    registry.register(FirmwareCollector::NAME, || Box::new(FirmwareCollector::new()));
    registry.register(NetwatchCollector::NAME, || Box::new(NetwatchCollector::new()));
    registry.register(IpsecCollector::NAME, || Box::new(IpsecCollector::new()));
    registry.register(OpticsCollector::NAME, || Box::new(OpticsCollector::new()));
    registry.register(WlanStationCollector::NAME, || Box::new(WlanStationCollector::new()));
    registry.register(WlanInterfaceCollector::NAME, || Box::new(WlanInterfaceCollector::new()));
    registry.register(LteCollector::NAME, || Box::new(LteCollector::new()));
    registry.register(W60gCollector::NAME, || Box::new(W60gCollector::new()));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_builtin_names() {
        let registry = builtin();
        let names: Vec<_> = registry.names().collect();
        assert_eq!(names.len(), 18);
        for name in DEFAULT_FEATURES {
            assert!(registry.contains(name));
        }
    }

    #[test]
    fn test_builtin_instances_match_names() {
        let registry = builtin();
        let names: Vec<String> = registry.names().map(str::to_string).collect();
        let collectors = registry.resolve(&names).unwrap();

        let mut seen = HashSet::new();
        for (name, collector) in names.iter().zip(&collectors) {
            assert_eq!(collector.name(), name);
            assert!(!collector.describe().is_empty(), "{name} declares no metrics");
            for desc in collector.describe() {
                assert!(seen.insert(desc.fq_name().to_string()), "duplicate {}", desc.fq_name());
                assert_eq!(&desc.label_names[..2], &["name", "address"]);
            }
        }
    }
}
