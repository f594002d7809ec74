//! Name to factory table for collectors.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::collector::Collector;

/// Zero-argument constructor of a collector instance.
pub type Factory = fn() -> Box<dyn Collector>;

/// A requested feature name has no registered collector.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no collector for {0}")]
pub struct UnknownCollectorError(pub String);

/// Registry of collector factories keyed by feature name.
///
/// Filled once at startup and read-only afterwards.
#[derive(Default)]
pub struct CollectorRegistry {
    factories: BTreeMap<String, Factory>,
}

impl std::fmt::Debug for CollectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectorRegistry")
            .field("names", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl CollectorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory` under `name`.
    ///
    /// # Panics
    /// If `name` is already registered.
    pub fn register(&mut self, name: &str, factory: Factory) {
        if self.factories.contains_key(name) {
            panic!("collector '{name}' is already registered");
        }
        self.factories.insert(name.to_string(), factory);
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Instantiate the named collectors in the requested order.
    ///
    /// Names are trimmed and empty entries skipped. Every name is checked
    /// before anything is instantiated, so an unknown name yields no
    /// collectors at all.
    pub fn resolve<S: AsRef<str>>(
        &self,
        names: &[S],
    ) -> Result<Vec<Box<dyn Collector>>, UnknownCollectorError> {
        let factories = names
            .iter()
            .map(|n| n.as_ref().trim())
            .filter(|n| !n.is_empty())
            .map(|n| {
                self.factories
                    .get(n)
                    .copied()
                    .ok_or_else(|| UnknownCollectorError(n.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(factories.into_iter().map(|make| make()).collect())
    }
}
