//! Metrics definitions for the catalog provider.

use shared::metrics_defs::{MetricDef, MetricType};

pub const CATALOG_SYNC_DURATION: MetricDef = MetricDef {
    name: "catalog.sync.duration",
    metric_type: MetricType::Histogram,
    description: "Time to fetch the cluster catalog in seconds. Tagged with status.",
};

pub const CATALOG_SYNC_CLUSTERS: MetricDef = MetricDef {
    name: "catalog.sync.clusters",
    metric_type: MetricType::Histogram,
    description: "Number of clusters returned by a catalog fetch",
};

pub const ALL_METRICS: &[MetricDef] = &[CATALOG_SYNC_DURATION, CATALOG_SYNC_CLUSTERS];
