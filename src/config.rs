//! Topology configuration structures and validation.
//!
//! The configuration file is a JSON object keyed by origin URL. Key order is
//! significant because it decides the order hosts are created in (and with it
//! the subnet switch numbering), so [`TopologyConfig`] keeps origins in file
//! order rather than collecting them into a hash map.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::net::Ipv4Addr;

use crate::topology::naming::host_name;
use crate::topology::RESERVED_ADDRESSES;
use crate::utils::ip_utils::same_subnet;

/// A single address assignment for an origin host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpAssignment {
    pub ip: Ipv4Addr,
    /// Prefix length of the subnet, e.g. 24
    pub subnet_mask: u8,
    /// Router-side address of the subnet
    pub gateway: Ipv4Addr,
}

/// Configuration for one origin host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OriginConfig {
    /// Shell command started inside the host once the network is up
    pub cmd: String,
    pub ips: Vec<IpAssignment>,
    /// Every origin served by this host. Informational only.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub origins: Vec<String>,
}

/// The whole topology file: origin URL -> origin configuration, in file order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TopologyConfig {
    origins: Vec<(String, OriginConfig)>,
}

impl TopologyConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an origin. Re-inserting an existing origin replaces its
    /// configuration but keeps its original position.
    pub fn insert(&mut self, origin: impl Into<String>, config: OriginConfig) {
        let origin = origin.into();
        match self.origins.iter_mut().find(|(existing, _)| *existing == origin) {
            Some((_, slot)) => *slot = config,
            None => self.origins.push((origin, config)),
        }
    }

    pub fn get(&self, origin: &str) -> Option<&OriginConfig> {
        self.origins
            .iter()
            .find(|(existing, _)| existing == origin)
            .map(|(_, config)| config)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &OriginConfig)> {
        self.origins.iter().map(|(origin, config)| (origin.as_str(), config))
    }

    pub fn len(&self) -> usize {
        self.origins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }

    /// Validate the configuration
    ///
    /// Checks every origin for:
    /// - a parseable origin URL whose sanitized host name is unique
    /// - a non-empty command
    /// - at least one address, each with a prefix length in 0..=32
    /// - addresses that are not a gateway, not reserved for the management
    ///   subnet and not shared with another origin
    ///
    /// A gateway outside its address's subnet is only logged, as the router
    /// will still accept it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut host_names: HashMap<String, &str> = HashMap::new();
        let mut addresses: HashMap<Ipv4Addr, &str> = HashMap::new();
        // Every gateway becomes a router interface, whichever origin named it
        let gateways: HashSet<Ipv4Addr> = self
            .iter()
            .flat_map(|(_, config)| config.ips.iter().map(|assignment| assignment.gateway))
            .collect();

        for (origin, config) in self.iter() {
            let name = host_name(origin)?;
            if let Some(first) = host_names.insert(name.clone(), origin) {
                return Err(ConfigError::DuplicateHost {
                    name,
                    first: first.to_string(),
                    second: origin.to_string(),
                });
            }

            if config.cmd.trim().is_empty() {
                return Err(ConfigError::EmptyCommand(origin.to_string()));
            }

            if config.ips.is_empty() {
                return Err(ConfigError::NoAddresses(origin.to_string()));
            }

            for assignment in &config.ips {
                if assignment.subnet_mask > 32 {
                    return Err(ConfigError::InvalidSubnetMask {
                        origin: origin.to_string(),
                        mask: assignment.subnet_mask,
                    });
                }

                if gateways.contains(&assignment.ip) {
                    return Err(ConfigError::AddressIsGateway {
                        origin: origin.to_string(),
                        ip: assignment.ip,
                    });
                }

                if RESERVED_ADDRESSES.contains(&assignment.ip) {
                    return Err(ConfigError::ReservedAddress {
                        origin: origin.to_string(),
                        ip: assignment.ip,
                    });
                }

                if let Some(first) = addresses.insert(assignment.ip, origin) {
                    if first != origin {
                        return Err(ConfigError::DuplicateAddress {
                            ip: assignment.ip,
                            first: first.to_string(),
                            second: origin.to_string(),
                        });
                    }
                }

                if !same_subnet(assignment.ip, assignment.gateway, assignment.subnet_mask) {
                    log::warn!(
                        "Gateway {} for {} is outside {}/{}",
                        assignment.gateway,
                        origin,
                        assignment.ip,
                        assignment.subnet_mask
                    );
                }
            }
        }

        Ok(())
    }
}

impl Serialize for TopologyConfig {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.origins.len()))?;
        for (origin, config) in &self.origins {
            map.serialize_entry(origin, config)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for TopologyConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TopologyVisitor;

        impl<'de> Visitor<'de> for TopologyVisitor {
            type Value = TopologyConfig;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object mapping origin URLs to origin configurations")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut config = TopologyConfig::new();
                while let Some((origin, origin_config)) =
                    access.next_entry::<String, OriginConfig>()?
                {
                    config.insert(origin, origin_config);
                }
                Ok(config)
            }
        }

        deserializer.deserialize_map(TopologyVisitor)
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid origin '{origin}': {reason}")]
    InvalidOrigin { origin: String, reason: String },
    #[error("Origins '{first}' and '{second}' both map to host name '{name}'")]
    DuplicateHost {
        name: String,
        first: String,
        second: String,
    },
    #[error("Origin '{0}' has an empty command")]
    EmptyCommand(String),
    #[error("Origin '{0}' has no IP addresses")]
    NoAddresses(String),
    #[error("Origin '{origin}' has invalid subnet mask /{mask}")]
    InvalidSubnetMask { origin: String, mask: u8 },
    #[error("Origin '{origin}' uses gateway address {ip}")]
    AddressIsGateway { origin: String, ip: Ipv4Addr },
    #[error("Origin '{origin}' uses reserved management address {ip}")]
    ReservedAddress { origin: String, ip: Ipv4Addr },
    #[error("Address {ip} is assigned to both '{first}' and '{second}'")]
    DuplicateAddress {
        ip: Ipv4Addr,
        first: String,
        second: String,
    },
}
