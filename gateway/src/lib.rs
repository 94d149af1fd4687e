pub mod access_token;
pub mod classifier;
pub mod cluster_secret;
pub mod errors;
pub mod metrics_defs;
pub mod middleware;
pub mod request_path;
pub mod single_flight;
pub mod tenant;
pub mod token_exchange;

#[cfg(test)]
mod testutil;
