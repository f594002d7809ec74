//! Metric descriptors and the per-pass sample sink.
//!
//! Collectors declare [`MetricDescriptor`]s once at construction and emit
//! samples against them into a [`MetricSink`]. The sink is shared by every
//! device task of one scrape pass and renders to Prometheus metric families.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use prometheus::proto::{Counter, Gauge, LabelPair, Metric, MetricFamily, MetricType};

/// Namespace prefixed to every exported series.
pub const NAMESPACE: &str = "mikrotik";

/// Value type of a published series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Gauge,
    Counter,
}

impl MetricKind {
    fn proto_type(self) -> MetricType {
        match self {
            Self::Gauge => MetricType::GAUGE,
            Self::Counter => MetricType::COUNTER,
        }
    }
}

/// Identity of a published time series.
///
/// The fully-qualified name is `namespace_subsystem_name`, skipping empty
/// parts. Label names are ordered; samples must supply values in the same order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricDescriptor {
    pub namespace: String,
    pub subsystem: String,
    pub name: String,
    pub help: String,
    pub label_names: Vec<String>,
    pub kind: MetricKind,
    fq_name: String,
}

impl MetricDescriptor {
    /// Create a descriptor in the exporter namespace.
    pub fn new(
        subsystem: &str,
        name: &str,
        help: &str,
        label_names: &[&str],
        kind: MetricKind,
    ) -> Self {
        let fq_name = [NAMESPACE, subsystem, name]
            .iter()
            .filter(|part| !part.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join("_");

        Self {
            namespace: NAMESPACE.to_string(),
            subsystem: subsystem.to_string(),
            name: name.to_string(),
            help: help.to_string(),
            label_names: label_names.iter().map(|l| l.to_string()).collect(),
            kind,
            fq_name,
        }
    }

    /// Create a descriptor named after a RouterOS property (`rx-byte` -> `rx_byte`).
    ///
    /// The property name doubles as help text.
    pub fn for_property(
        subsystem: &str,
        property: &str,
        label_names: &[&str],
        kind: MetricKind,
    ) -> Self {
        Self::new(
            subsystem,
            &property.replace('-', "_"),
            property,
            label_names,
            kind,
        )
    }

    /// Fully-qualified series name.
    pub fn fq_name(&self) -> &str {
        &self.fq_name
    }
}

/// Thread-safe accumulator for one scrape pass.
#[derive(Debug, Default)]
pub struct MetricSink {
    families: Mutex<BTreeMap<String, MetricFamily>>,
}

impl MetricSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit a sample using the descriptor's own kind.
    pub fn emit(&self, desc: &MetricDescriptor, value: f64, label_values: &[&str]) {
        if label_values.len() != desc.label_names.len() {
            tracing::warn!(
                metric = desc.fq_name(),
                expected = desc.label_names.len(),
                got = label_values.len(),
                "Dropping sample with mismatched label count"
            );
            return;
        }

        let labels: Vec<LabelPair> = desc
            .label_names
            .iter()
            .zip(label_values)
            .map(|(name, value)| {
                let mut pair = LabelPair::default();
                pair.set_name(name.clone());
                pair.set_value(value.to_string());
                pair
            })
            .collect();

        let mut metric = Metric::default();
        metric.set_label(labels.into());
        match desc.kind {
            MetricKind::Gauge => {
                let mut gauge = Gauge::default();
                gauge.set_value(value);
                metric.set_gauge(gauge);
            }
            MetricKind::Counter => {
                let mut counter = Counter::default();
                counter.set_value(value);
                metric.set_counter(counter);
            }
        }

        let mut families = self
            .families
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        families
            .entry(desc.fq_name().to_string())
            .or_insert_with(|| {
                let mut family = MetricFamily::default();
                family.set_name(desc.fq_name().to_string());
                family.set_help(desc.help.clone());
                family.set_field_type(desc.kind.proto_type());
                family
            })
            .mut_metric()
            .push(metric);
    }

    /// Number of samples emitted so far.
    pub fn len(&self) -> usize {
        self.families
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|f| f.get_metric().len())
            .sum()
    }

    /// Whether nothing has been emitted yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot all families, ordered by name.
    pub fn gather(&self) -> Vec<MetricFamily> {
        self.families
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Collect `(label values, value)` pairs of one series, for assertions and debugging.
    pub fn samples(&self, fq_name: &str) -> Vec<(Vec<String>, f64)> {
        let families = self
            .families
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(family) = families.get(fq_name) else {
            return Vec::new();
        };

        family
            .get_metric()
            .iter()
            .map(|m| {
                let labels = m
                    .get_label()
                    .iter()
                    .map(|l| l.get_value().to_string())
                    .collect();
                let value = match family.get_field_type() {
                    MetricType::COUNTER => m.get_counter().get_value(),
                    _ => m.get_gauge().get_value(),
                };
                (labels, value)
            })
            .collect()
    }
}
