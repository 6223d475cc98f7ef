//! Network emulation module.
//!
//! This module turns a topology plan into network namespaces, bridges and
//! shaped veth links on the local host, runs the services inside them and
//! removes everything again on shutdown.

pub mod impairment;
pub mod network;
pub mod runner;

pub use impairment::{ImpairmentError, LinkImpairment};
pub use network::{Network, NetworkError, ServiceOptions, NETNS_PREFIX};
pub use runner::{CommandError, CommandRunner, CommandSpec, RecordingRunner, SystemRunner};
