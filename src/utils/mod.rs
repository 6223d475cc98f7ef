//! Shared utilities: subnet arithmetic helpers.

pub mod ip_utils;

pub use ip_utils::{add_to_address, ipv6_network_64, network_address, same_subnet, subnet_gateway};
