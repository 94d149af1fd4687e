pub mod forward;
pub mod headers;
pub mod metrics_defs;
pub mod routing_table;

pub use forward::{Forwarder, forward};
pub use routing_table::RoutingTable;
