//! Topology generation from a recorded HAR file.
//!
//! Every server address seen in the HAR becomes one origin host. Origins
//! that were served from the same address share that host, and every
//! hostname is mapped to its addresses in a hosts file for the name server.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::Write as _;
use std::fs;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::{Path, PathBuf};

use color_eyre::eyre::WrapErr;
use log::{debug, info};
use thiserror::Error;

use super::types::Har;
use crate::config::{ConfigError, IpAssignment, OriginConfig, TopologyConfig};
use crate::config_loader::write_config;
use crate::topology::{OriginUrl, CORE_GATEWAY, CORE_PREFIX_LEN};
use crate::utils::{add_to_address, ipv6_network_64, same_subnet, subnet_gateway};

pub const HOSTS_FILE: &str = "hosts";
pub const CONFIG_FILE: &str = "mininet-config.json";
pub const DEFAULT_SERVER_CMD: &str = "./har-server.js";

/// Prefix length of every generated subnet
const SUBNET_PREFIX_LEN: u8 = 24;
const IPV6_BLOCK_BASE: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 0);
const IPV6_BLOCK_SIZE: u32 = 256;
/// Offset of the first host address inside a block, after network and gateway
const IPV6_FIRST_HOST: u32 = 2;

#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("invalid server address '{0}'")]
    InvalidServerAddress(String),
    #[error("no IPv4 block left for IPv6 network {0}/64")]
    AddressSpaceExhausted(Ipv6Addr),
    #[error("too many addresses in IPv6 network {0}/64")]
    SubnetFull(Ipv6Addr),
    #[error("server address {0} is inside the management subnet {CORE_GATEWAY}/{CORE_PREFIX_LEN}")]
    ManagementAddress(Ipv4Addr),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, Clone)]
pub struct GeneratorOptions {
    /// The HAR file, as it should appear in each host's command
    pub har_path: PathBuf,
    /// Server program each host runs
    pub server_cmd: String,
}

impl GeneratorOptions {
    pub fn new(har_path: impl Into<PathBuf>) -> Self {
        Self {
            har_path: har_path.into(),
            server_cmd: DEFAULT_SERVER_CMD.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedConfig {
    /// Contents of the hosts file: one `<ip>\t<domain>` line per pair
    pub hosts: String,
    pub config: TopologyConfig,
}

impl GeneratedConfig {
    /// Write `hosts` and `mininet-config.json` into `dir`
    pub fn write_to(&self, dir: &Path) -> color_eyre::Result<()> {
        fs::create_dir_all(dir)
            .wrap_err_with(|| format!("Failed to create output directory '{}'", dir.display()))?;

        let hosts_path = dir.join(HOSTS_FILE);
        fs::write(&hosts_path, &self.hosts)
            .wrap_err_with(|| format!("Failed to write hosts file '{}'", hosts_path.display()))?;
        info!("Wrote hosts file to {:?}", hosts_path);

        write_config(&self.config, &dir.join(CONFIG_FILE))
    }
}

/// Maps recorded server addresses onto IPv4 host addresses.
///
/// IPv4 addresses are kept, except that `.1` is moved to `.101` because it
/// is the gateway of its /24. Addresses in the management subnet cannot be
/// emulated and are rejected. Each IPv6 /64 gets its own /24 carved out of
/// 10.0.0.0/8, in order of first appearance.
#[derive(Debug, Default)]
struct AddressMapper {
    ipv6_blocks: HashMap<Ipv6Addr, Ipv6Block>,
}

#[derive(Debug)]
struct Ipv6Block {
    base: Ipv4Addr,
    hosts: HashMap<Ipv6Addr, Ipv4Addr>,
}

impl AddressMapper {
    fn map(&mut self, server_address: &str) -> Result<Ipv4Addr, GeneratorError> {
        let invalid = || GeneratorError::InvalidServerAddress(server_address.to_string());

        if let Ok(ip) = server_address.parse::<Ipv4Addr>() {
            if same_subnet(ip, CORE_GATEWAY, CORE_PREFIX_LEN) {
                return Err(GeneratorError::ManagementAddress(ip));
            }
            let [a, b, c, d] = ip.octets();
            return Ok(if d == 1 { Ipv4Addr::new(a, b, c, 101) } else { ip });
        }

        let unbracketed = server_address
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .unwrap_or(server_address);
        let ip: Ipv6Addr = unbracketed.parse().map_err(|_| invalid())?;
        self.map_ipv6(ip)
    }

    fn map_ipv6(&mut self, ip: Ipv6Addr) -> Result<Ipv4Addr, GeneratorError> {
        let network = ipv6_network_64(ip);
        let next_block = self.ipv6_blocks.len() as u32;

        if !self.ipv6_blocks.contains_key(&network) {
            let base = next_block
                .checked_mul(IPV6_BLOCK_SIZE)
                .and_then(|offset| add_to_address(IPV6_BLOCK_BASE, offset))
                .filter(|base| base.octets()[0] == IPV6_BLOCK_BASE.octets()[0])
                .ok_or(GeneratorError::AddressSpaceExhausted(network))?;
            debug!("IPv6 network {}/64 -> {}/{}", network, base, SUBNET_PREFIX_LEN);
            self.ipv6_blocks.insert(
                network,
                Ipv6Block {
                    base,
                    hosts: HashMap::new(),
                },
            );
        }

        let block = self
            .ipv6_blocks
            .get_mut(&network)
            .ok_or(GeneratorError::AddressSpaceExhausted(network))?;
        if let Some(mapped) = block.hosts.get(&ip) {
            return Ok(*mapped);
        }

        let offset = IPV6_FIRST_HOST + block.hosts.len() as u32;
        if offset >= IPV6_BLOCK_SIZE - 1 {
            return Err(GeneratorError::SubnetFull(network));
        }
        let mapped = add_to_address(block.base, offset).ok_or(GeneratorError::SubnetFull(network))?;
        debug!("{} -> {}", ip, mapped);
        block.hosts.insert(ip, mapped);
        Ok(mapped)
    }
}

/// Origins sharing one server address
#[derive(Debug, Default)]
struct OriginGroup {
    ips: Vec<Ipv4Addr>,
    origins: Vec<String>,
}

fn push_unique<T: PartialEq>(items: &mut Vec<T>, item: T) {
    if !items.contains(&item) {
        items.push(item);
    }
}

/// Derive the hosts file and topology configuration from a HAR
pub fn generate(har: &Har, options: &GeneratorOptions) -> Result<GeneratedConfig, GeneratorError> {
    let mut mapper = AddressMapper::default();
    let mut domains: BTreeMap<String, BTreeSet<Ipv4Addr>> = BTreeMap::new();
    let mut group_of_ip: HashMap<Ipv4Addr, String> = HashMap::new();
    let mut groups: Vec<(String, OriginGroup)> = Vec::new();

    for entry in &har.log.entries {
        if entry.server_ip_address.is_empty() {
            debug!("Skipping {}: no server address", entry.request.url);
            continue;
        }

        let server_ip = mapper.map(&entry.server_ip_address)?;
        let url = OriginUrl::parse(&entry.request.url)?;
        let origin = url.origin();

        domains.entry(url.hostname.clone()).or_default().insert(server_ip);

        // The first origin seen at an address names the group
        let key = group_of_ip.entry(server_ip).or_insert_with(|| origin.clone()).clone();
        let index = match groups.iter().position(|(existing, _)| *existing == key) {
            Some(index) => index,
            None => {
                groups.push((key, OriginGroup::default()));
                groups.len() - 1
            }
        };
        let group = &mut groups[index].1;
        push_unique(&mut group.ips, server_ip);
        push_unique(&mut group.origins, origin);
    }

    let mut hosts = String::new();
    for (domain, ips) in &domains {
        for ip in ips {
            let _ = writeln!(hosts, "{ip}\t{domain}");
        }
    }

    let mut config = TopologyConfig::new();
    for (origin, group) in groups {
        let ip_list: Vec<String> = group.ips.iter().map(ToString::to_string).collect();
        let cmd = format!(
            "{} {} {} {}",
            options.server_cmd,
            options.har_path.display(),
            origin,
            ip_list.join(",")
        );
        let ips = group
            .ips
            .iter()
            .map(|&ip| IpAssignment {
                ip,
                subnet_mask: SUBNET_PREFIX_LEN,
                gateway: subnet_gateway(ip, SUBNET_PREFIX_LEN),
            })
            .collect();
        config.insert(
            origin,
            OriginConfig {
                cmd,
                ips,
                origins: group.origins,
            },
        );
    }

    config.validate()?;

    info!(
        "Generated {} origin host(s) for {} domain(s)",
        config.len(),
        domains.len()
    );
    Ok(GeneratedConfig { hosts, config })
}
