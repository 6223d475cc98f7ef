//! HAR import module.
//!
//! This module reads recorded HTTP archives and derives a topology
//! configuration and hosts file that replay them.

pub mod generator;
pub mod types;

pub use generator::{
    generate, GeneratedConfig, GeneratorError, GeneratorOptions, CONFIG_FILE, DEFAULT_SERVER_CMD, HOSTS_FILE,
};
pub use types::{load_har, Har, HarEntry, HarLog, HarRequest};
