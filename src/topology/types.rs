//! Topology type definitions.
//!
//! A [`TopologyPlan`] is the fully resolved description of the network:
//! which nodes exist, which switches, how they are wired and addressed, and
//! what each origin host runs. It has no side effects of its own; the
//! emulation layer turns it into namespaces, bridges and veth pairs.

use std::fmt;
use std::net::Ipv4Addr;
use std::path::PathBuf;

use crate::emulation::LinkImpairment;
use crate::ip::SubnetSwitch;

/// Role of a node in the topology
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Forwarding node joining every subnet
    Router,
    /// Name server on the management subnet
    Dns,
    /// One host per configured origin
    Origin,
    /// The host's own root namespace, joined through the impaired uplink
    Root,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Router => "router",
            NodeKind::Dns => "dns",
            NodeKind::Origin => "origin",
            NodeKind::Root => "root",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub name: String,
    pub kind: NodeKind,
}

impl Node {
    pub fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Every node except `root` lives in its own network namespace
    pub fn in_namespace(&self) -> bool {
        self.kind != NodeKind::Root
    }

    /// Nodes that take part in the all-pairs connectivity check
    pub fn is_host(&self) -> bool {
        self.kind != NodeKind::Root
    }
}

/// An IPv4 address with its prefix length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceAddress {
    pub ip: Ipv4Addr,
    pub prefix_len: u8,
}

impl InterfaceAddress {
    pub fn new(ip: Ipv4Addr, prefix_len: u8) -> Self {
        Self { ip, prefix_len }
    }
}

impl fmt::Display for InterfaceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.ip, self.prefix_len)
    }
}

/// A node attached to a switch port.
///
/// Every link in this topology joins exactly one node to one switch. When
/// an impairment is set it shapes both ends.
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    pub node: String,
    pub interface: String,
    pub address: Option<InterfaceAddress>,
    pub switch: String,
    pub switch_port: String,
    pub impairment: Option<LinkImpairment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultRoute {
    pub node: String,
    pub via: Ipv4Addr,
    pub dev: Option<String>,
}

impl DefaultRoute {
    /// `ip route` arguments installing this route
    pub fn ip_route_args(&self) -> Vec<String> {
        let mut args = vec!["route".to_string(), "add".to_string(), "default".to_string()];
        if let Some(dev) = &self.dev {
            args.push("dev".to_string());
            args.push(dev.clone());
        }
        args.push("via".to_string());
        args.push(self.via.to_string());
        args
    }
}

/// The server process an origin host runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostCommand {
    pub node: String,
    pub origin: String,
    pub command: String,
    pub log_path: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TopologyPlan {
    pub nodes: Vec<Node>,
    pub switches: Vec<SubnetSwitch>,
    pub links: Vec<Link>,
    pub routes: Vec<DefaultRoute>,
    pub commands: Vec<HostCommand>,
}

impl TopologyPlan {
    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|node| node.name == name)
    }

    pub fn links_of<'a>(&'a self, node: &'a str) -> impl Iterator<Item = &'a Link> + 'a {
        self.links.iter().filter(move |link| link.node == node)
    }

    pub fn links_on_switch<'a>(&'a self, switch: &'a str) -> impl Iterator<Item = &'a Link> + 'a {
        self.links.iter().filter(move |link| link.switch == switch)
    }

    /// Address of the node's first addressed interface
    pub fn primary_address(&self, node: &str) -> Option<Ipv4Addr> {
        self.links_of(node)
            .find_map(|link| link.address)
            .map(|address| address.ip)
    }

    pub fn hosts(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|node| node.is_host())
    }

    pub fn origin_hosts(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|node| node.kind == NodeKind::Origin)
    }
}
