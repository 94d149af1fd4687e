pub mod metrics_defs;
pub mod routing;

/// Header the auth middleware writes and the forwarder dispatches on.
pub const TARGET_HEADER: &str = "target";

/// Trims a single trailing `/` so URL comparisons stay bit-stable between
/// the middleware, the provider and the routing table.
pub fn normalize_url(url: &str) -> &str {
    url.strip_suffix('/').unwrap_or(url)
}

/// Returns a counter handle for a [`metrics_defs::MetricDef`].
#[macro_export]
macro_rules! counter {
    ($def:expr) => {
        ::metrics::counter!($def.name)
    };
}
