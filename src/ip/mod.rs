//! Subnet bookkeeping.
//!
//! This module maps subnet gateways to the switches that serve them.

pub mod registry;

pub use registry::{SubnetRegistry, SubnetSwitch};
