//! # harnet - Emulated networks for replaying recorded web page loads
//!
//! This library builds a virtual network on a Linux host in which every web
//! origin of a recorded page load is served by its own emulated host, behind
//! a router and an impaired uplink.
//!
//! ## Overview
//!
//! A topology file maps origin URLs to the command their host runs and the
//! addresses it owns. From it harnet plans a fixed management subnet (router,
//! name server, uplink to the host's root namespace) plus one switch per
//! distinct gateway and one host per origin, then realizes the plan with
//! network namespaces, Linux bridges, veth pairs and `tc` shaping.
//!
//! ## Architecture
//!
//! - `config`: topology file types and validation
//! - `config_loader`: reading and writing topology files
//! - `topology`: host naming and the side-effect-free topology plan
//! - `ip`: gateway to subnet switch bookkeeping
//! - `emulation`: command runners, link impairments, the live network
//! - `process`: service command lines and supervised child processes
//! - `connectivity`: all-pairs ping check
//! - `shell`: the interactive command loop
//! - `signals`: SIGINT/SIGTERM flags polled by the shell and the binary
//! - `har`: topology generation from HAR files
//! - `utils`: address arithmetic
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::path::{Path, PathBuf};
//! use harnet::config_loader::load_config;
//! use harnet::emulation::{LinkImpairment, Network, SystemRunner};
//! use harnet::topology::{plan_topology, PlanOptions};
//!
//! let config = load_config(Path::new("mininet-config.json"))?;
//! let options = PlanOptions {
//!     uplink: LinkImpairment::new(1.6, 300, 0, 0)?,
//!     log_dir: PathBuf::from("/var/log/har"),
//! };
//! let plan = plan_topology(&config, &options)?;
//!
//! let mut network = Network::new(plan, SystemRunner);
//! network.build()?;
//! // ... use the network ...
//! network.stop();
//! # Ok::<(), color_eyre::Report>(())
//! ```
//!
//! ## Configuration Format
//!
//! ```json
//! {
//!   "https://www.example.com:443": {
//!     "cmd": "./har-server.js page.har https://www.example.com:443 93.184.216.34",
//!     "ips": [{ "ip": "93.184.216.34", "subnetMask": 24, "gateway": "93.184.216.1" }]
//!   }
//! }
//! ```
//!
//! ## Error Handling
//!
//! Library modules return typed `thiserror` errors; the binaries wrap them
//! with `color_eyre` context.

pub mod config;
pub mod config_loader;
pub mod connectivity;
pub mod emulation;
pub mod har;
pub mod ip;
pub mod process;
pub mod shell;
pub mod signals;
pub mod topology;
pub mod utils;
