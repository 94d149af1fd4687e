//! Common types for metrics definitions.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Histogram,
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricType::Counter => f.write_str("Counter"),
            MetricType::Histogram => f.write_str("Histogram"),
        }
    }
}

/// A statically declared metric. Every metric emitted by a crate is listed
/// in its `metrics_defs` module so the full set can be enumerated.
#[derive(Debug, Clone, Copy)]
pub struct MetricDef {
    pub name: &'static str,
    pub metric_type: MetricType,
    pub description: &'static str,
}
