//! Topology planning.
//!
//! Translates a [`TopologyConfig`] into a [`TopologyPlan`]. The fixed part of
//! the network is the same for every configuration:
//!
//! ```text
//!   root --(impaired uplink)-- s0 -- router -- s2 -- origin hosts ...
//!                              |          \--- s3 -- origin hosts ...
//!                             dns
//! ```
//!
//! Each origin then adds one host and, for every gateway not seen before, a
//! subnet switch attached to the router.

use std::collections::HashMap;
use std::path::PathBuf;

use log::info;

use super::naming::host_name;
use super::types::{DefaultRoute, HostCommand, InterfaceAddress, Link, Node, NodeKind, TopologyPlan};
use super::{
    CORE_GATEWAY, CORE_PREFIX_LEN, CORE_SWITCH, DNS, DNS_ADDRESS, ROOT, ROOT_ADDRESS, ROUTER,
};
use crate::config::{ConfigError, TopologyConfig};
use crate::emulation::LinkImpairment;
use crate::ip::{SubnetRegistry, SubnetSwitch};

/// Settings that shape the plan but do not come from the topology file
#[derive(Debug, Clone)]
pub struct PlanOptions {
    /// Round-trip impairment of the root uplink
    pub uplink: LinkImpairment,
    /// Directory receiving one log file per origin host
    pub log_dir: PathBuf,
}

/// Accumulates nodes and links while keeping per-switch port numbering
struct PlanBuilder {
    plan: TopologyPlan,
    registry: SubnetRegistry,
    switch_ports: HashMap<String, usize>,
}

impl PlanBuilder {
    fn new() -> Self {
        let core = SubnetSwitch {
            name: CORE_SWITCH.to_string(),
            gateway: CORE_GATEWAY,
            prefix_len: CORE_PREFIX_LEN,
            router_interface: format!("{ROUTER}-eth1"),
        };
        Self {
            plan: TopologyPlan::default(),
            registry: SubnetRegistry::with_core(core),
            switch_ports: HashMap::new(),
        }
    }

    fn next_port(&mut self, switch: &str) -> String {
        let counter = self.switch_ports.entry(switch.to_string()).or_insert(0);
        *counter += 1;
        format!("{switch}-eth{counter}")
    }

    fn add_node(&mut self, name: &str, kind: NodeKind) {
        self.plan.nodes.push(Node::new(name, kind));
    }

    fn add_link(
        &mut self,
        node: &str,
        interface: String,
        address: Option<InterfaceAddress>,
        switch: &str,
        impairment: Option<LinkImpairment>,
    ) {
        let switch_port = self.next_port(switch);
        self.plan.links.push(Link {
            node: node.to_string(),
            interface,
            address,
            switch: switch.to_string(),
            switch_port,
            impairment,
        });
    }

    /// Router, core switch, dns and the impaired root uplink
    fn add_management_subnet(&mut self, options: &PlanOptions) {
        self.add_node(ROUTER, NodeKind::Router);
        let core = &self.registry.switches()[0];
        let router_interface = core.router_interface.clone();
        self.add_link(
            ROUTER,
            router_interface,
            Some(InterfaceAddress::new(CORE_GATEWAY, CORE_PREFIX_LEN)),
            CORE_SWITCH,
            None,
        );

        self.add_node(DNS, NodeKind::Dns);
        self.add_link(
            DNS,
            format!("{DNS}-eth0"),
            Some(InterfaceAddress::new(DNS_ADDRESS, CORE_PREFIX_LEN)),
            CORE_SWITCH,
            None,
        );
        self.plan.routes.push(DefaultRoute {
            node: DNS.to_string(),
            via: CORE_GATEWAY,
            dev: None,
        });

        self.add_node(ROOT, NodeKind::Root);
        self.add_link(
            ROOT,
            format!("{ROOT}-eth0"),
            Some(InterfaceAddress::new(ROOT_ADDRESS, CORE_PREFIX_LEN)),
            CORE_SWITCH,
            Some(options.uplink.per_direction()),
        );
        self.plan.routes.push(DefaultRoute {
            node: ROOT.to_string(),
            via: CORE_GATEWAY,
            dev: None,
        });
    }

    fn finish(mut self) -> TopologyPlan {
        self.plan.switches = self.registry.into_switches();
        self.plan
    }
}

/// Build the plan for `config`
///
/// Hosts are created in configuration order. Host interface `eth{i}` carries
/// the `i`-th address of the origin and is attached to the switch of that
/// address's gateway. The default route of each host leaves through `eth0`
/// towards the gateway of its first address.
pub fn plan_topology(config: &TopologyConfig, options: &PlanOptions) -> Result<TopologyPlan, ConfigError> {
    let mut builder = PlanBuilder::new();
    builder.add_management_subnet(options);
    let mut origin_hosts: HashMap<String, &str> = HashMap::new();

    for (origin, origin_config) in config.iter() {
        let name = host_name(origin)?;
        info!("Creating host {} for origin {}", name, origin);

        if let Some(first) = origin_hosts.insert(name.clone(), origin) {
            return Err(ConfigError::DuplicateHost {
                name,
                first: first.to_string(),
                second: origin.to_string(),
            });
        }
        builder.add_node(&name, NodeKind::Origin);

        for (index, assignment) in origin_config.ips.iter().enumerate() {
            let (switch, created) = builder
                .registry
                .switch_for(assignment.gateway, assignment.subnet_mask);
            let switch = switch.clone();

            if created {
                info!("Creating subnet {}/{}", assignment.gateway, assignment.subnet_mask);
                builder.add_link(
                    ROUTER,
                    switch.router_interface.clone(),
                    Some(InterfaceAddress::new(switch.gateway, switch.prefix_len)),
                    &switch.name,
                    None,
                );
            }

            builder.add_link(
                &name,
                format!("eth{index}"),
                Some(InterfaceAddress::new(assignment.ip, assignment.subnet_mask)),
                &switch.name,
                None,
            );
        }

        let first = origin_config
            .ips
            .first()
            .ok_or_else(|| ConfigError::NoAddresses(origin.to_string()))?;
        builder.plan.routes.push(DefaultRoute {
            node: name.clone(),
            via: first.gateway,
            dev: Some("eth0".to_string()),
        });

        builder.plan.commands.push(HostCommand {
            node: name.clone(),
            origin: origin.to_string(),
            command: origin_config.cmd.clone(),
            log_path: options.log_dir.join(&name),
        });
    }

    Ok(builder.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{IpAssignment, OriginConfig};
    use std::net::Ipv4Addr;

    fn options() -> PlanOptions {
        PlanOptions {
            uplink: LinkImpairment::new(1.6, 300, 0, 0).unwrap(),
            log_dir: PathBuf::from("/var/log/har"),
        }
    }

    fn origin(ips: &[(&str, &str)]) -> OriginConfig {
        OriginConfig {
            cmd: "serve".to_string(),
            ips: ips
                .iter()
                .map(|(ip, gateway)| IpAssignment {
                    ip: ip.parse().unwrap(),
                    subnet_mask: 24,
                    gateway: gateway.parse().unwrap(),
                })
                .collect(),
            origins: Vec::new(),
        }
    }

    #[test]
    fn test_empty_config_builds_management_subnet() {
        let plan = plan_topology(&TopologyConfig::new(), &options()).unwrap();

        let names: Vec<&str> = plan.nodes.iter().map(|node| node.name.as_str()).collect();
        assert_eq!(names, vec!["router", "dns", "root"]);
        assert_eq!(plan.switches.len(), 1);
        assert_eq!(plan.switches[0].name, "s0");

        let ports: Vec<&str> = plan.links.iter().map(|link| link.switch_port.as_str()).collect();
        assert_eq!(ports, vec!["s0-eth1", "s0-eth2", "s0-eth3"]);
        assert_eq!(plan.primary_address("router"), Some(Ipv4Addr::new(192, 168, 1, 1)));
        assert_eq!(plan.primary_address("dns"), Some(Ipv4Addr::new(192, 168, 1, 100)));
    }

    #[test]
    fn test_uplink_carries_half_delay() {
        let plan = plan_topology(&TopologyConfig::new(), &options()).unwrap();
        let uplink = plan.links_of("root").next().unwrap();
        let impairment = uplink.impairment.unwrap();
        assert_eq!(impairment.delay_ms, 150);
        assert_eq!(uplink.interface, "root-eth0");
        assert!(plan.links.iter().filter(|link| link.impairment.is_some()).count() == 1);
    }

    #[test]
    fn test_host_per_origin_and_switch_per_gateway() {
        let mut config = TopologyConfig::new();
        config.insert(
            "https://a.example.com:443",
            origin(&[("10.0.0.5", "10.0.0.1"), ("10.0.1.5", "10.0.1.1")]),
        );
        config.insert("https://b.example.com:443", origin(&[("10.0.0.6", "10.0.0.1")]));

        let plan = plan_topology(&config, &options()).unwrap();

        let hosts: Vec<&str> = plan.origin_hosts().map(|node| node.name.as_str()).collect();
        assert_eq!(hosts, vec!["https_a_example_com_443", "https_b_example_com_443"]);

        let switches: Vec<(&str, &str)> = plan
            .switches
            .iter()
            .map(|switch| (switch.name.as_str(), switch.router_interface.as_str()))
            .collect();
        assert_eq!(
            switches,
            vec![("s0", "router-eth1"), ("s2", "router-eth3"), ("s3", "router-eth4")]
        );

        let a_links: Vec<(&str, &str)> = plan
            .links_of("https_a_example_com_443")
            .map(|link| (link.interface.as_str(), link.switch.as_str()))
            .collect();
        assert_eq!(a_links, vec![("eth0", "s2"), ("eth1", "s3")]);

        let b_link = plan.links_of("https_b_example_com_443").next().unwrap();
        assert_eq!(b_link.switch, "s2");
        assert_eq!(b_link.address.unwrap().to_string(), "10.0.0.6/24");
    }

    #[test]
    fn test_router_gets_gateway_addresses() {
        let mut config = TopologyConfig::new();
        config.insert("http://a.test:80", origin(&[("10.0.4.5", "10.0.4.1")]));

        let plan = plan_topology(&config, &options()).unwrap();
        let router: Vec<String> = plan
            .links_of("router")
            .map(|link| format!("{} {}", link.interface, link.address.unwrap()))
            .collect();
        assert_eq!(router, vec!["router-eth1 192.168.1.1/24", "router-eth3 10.0.4.1/24"]);
    }

    #[test]
    fn test_origin_on_core_subnet_reuses_s0() {
        let mut config = TopologyConfig::new();
        config.insert("http://a.test:80", origin(&[("192.168.1.50", "192.168.1.1")]));

        let plan = plan_topology(&config, &options()).unwrap();
        assert_eq!(plan.switches.len(), 1);
        assert_eq!(plan.links_of("http_a_test_80").next().unwrap().switch, "s0");
    }

    #[test]
    fn test_default_route_and_command() {
        let mut config = TopologyConfig::new();
        config.insert(
            "http://a.test:80",
            origin(&[("10.0.0.5", "10.0.0.1"), ("10.0.1.5", "10.0.1.1")]),
        );

        let plan = plan_topology(&config, &options()).unwrap();
        let route = plan.routes.iter().find(|route| route.node == "http_a_test_80").unwrap();
        assert_eq!(route.ip_route_args().join(" "), "route add default dev eth0 via 10.0.0.1");

        let command = &plan.commands[0];
        assert_eq!(command.origin, "http://a.test:80");
        assert_eq!(command.command, "serve");
        assert_eq!(command.log_path, PathBuf::from("/var/log/har/http_a_test_80"));
    }
}
