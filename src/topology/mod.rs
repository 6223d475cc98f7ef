//! Network topology module.
//!
//! This module derives host names from origins and plans the full topology
//! (nodes, switches, links, routes and host commands) from a configuration.

use std::net::Ipv4Addr;

pub mod builder;
pub mod naming;
pub mod types;

pub use builder::{plan_topology, PlanOptions};
pub use naming::{host_name, OriginUrl};
pub use types::{DefaultRoute, HostCommand, InterfaceAddress, Link, Node, NodeKind, TopologyPlan};

pub const ROUTER: &str = "router";
pub const DNS: &str = "dns";
pub const ROOT: &str = "root";
pub const CORE_SWITCH: &str = "s0";

/// Management subnet: 192.168.1.0/24
pub const CORE_PREFIX_LEN: u8 = 24;
pub const CORE_GATEWAY: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 1);
pub const ROOT_ADDRESS: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 2);
pub const DNS_ADDRESS: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 100);

/// Addresses owned by the management nodes
pub const RESERVED_ADDRESSES: [Ipv4Addr; 3] = [CORE_GATEWAY, ROOT_ADDRESS, DNS_ADDRESS];
