//! Metrics definitions for the gateway.

use shared::metrics_defs::{MetricDef, MetricType};

pub const ROUTE_CACHE_HIT: MetricDef = MetricDef {
    name: "route_cache.hit",
    metric_type: MetricType::Counter,
    description: "Resolves served from the route cache, including coalesced in-flight waits",
};

pub const ROUTE_CACHE_MISS: MetricDef = MetricDef {
    name: "route_cache.miss",
    metric_type: MetricType::Counter,
    description: "Resolves that had to run the full upstream chain",
};

pub const RESOLVE_DURATION: MetricDef = MetricDef {
    name: "resolve.duration",
    metric_type: MetricType::Histogram,
    description: "Time to resolve an identity to a tenant route in seconds. Tagged with outcome.",
};

pub const ALL_METRICS: &[MetricDef] = &[ROUTE_CACHE_HIT, ROUTE_CACHE_MISS, RESOLVE_DURATION];
