//! Process management module.
//!
//! This module builds the command lines of the auxiliary services (name
//! server, origin servers, reset requests) and supervises the long-running
//! ones.

pub mod managed;
pub mod services;

pub use managed::ManagedProcess;
pub use services::{dnsmasq_command, origin_command, reset_command, RESET_PATH};
