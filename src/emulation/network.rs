//! The live emulated network.
//!
//! [`Network`] applies a [`TopologyPlan`] to the host: every namespaced node
//! gets a network namespace, every switch a Linux bridge in the root
//! namespace, and every link a veth pair with one end in the node and the
//! other enslaved to the bridge. Teardown reverses all of it and also runs
//! on drop.

use std::path::PathBuf;
use std::process::Output;

use log::{debug, info, warn};
use thiserror::Error;

use super::runner::{CommandError, CommandRunner, CommandSpec};
use crate::process::{dnsmasq_command, origin_command, ManagedProcess};
use crate::topology::{Link, TopologyPlan, DNS, ROUTER};

/// Prefix of every network namespace created for a node
pub const NETNS_PREFIX: &str = "harnet-";

const FORWARDING_SYSCTLS: [&str; 3] = [
    "net.ipv4.ip_forward",
    "net.ipv6.conf.default.forwarding",
    "net.ipv6.conf.all.forwarding",
];

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("unknown node '{0}'")]
    UnknownNode(String),
    #[error("node '{0}' has no address")]
    NoAddress(String),
    #[error(transparent)]
    Command(#[from] CommandError),
}

/// Where the services find their inputs and put their logs
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    pub hosts_file: PathBuf,
    pub log_dir: PathBuf,
}

/// Host resources created so far, in creation order
#[derive(Debug, Default)]
struct Created {
    namespaces: Vec<String>,
    bridges: Vec<String>,
    root_interfaces: Vec<String>,
    forwarding: bool,
}

pub struct Network<R: CommandRunner> {
    plan: TopologyPlan,
    runner: R,
    created: Created,
    processes: Vec<ManagedProcess>,
}

impl<R: CommandRunner> Network<R> {
    pub fn new(plan: TopologyPlan, runner: R) -> Self {
        Self {
            plan,
            runner,
            created: Created::default(),
            processes: Vec::new(),
        }
    }

    pub fn plan(&self) -> &TopologyPlan {
        &self.plan
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn processes(&mut self) -> &mut [ManagedProcess] {
        &mut self.processes
    }

    /// Namespace of a node, `None` for the root node
    pub fn netns(&self, node: &str) -> Result<Option<String>, NetworkError> {
        let node = self
            .plan
            .node(node)
            .ok_or_else(|| NetworkError::UnknownNode(node.to_string()))?;
        Ok(node.in_namespace().then(|| format!("{NETNS_PREFIX}{}", node.name)))
    }

    /// Wrap `command` so that it runs inside `node`
    pub fn command_in(&self, node: &str, command: CommandSpec) -> Result<CommandSpec, NetworkError> {
        Ok(command.in_netns(self.netns(node)?))
    }

    /// Run a shell command line inside `node` and return its raw output
    pub fn exec(&self, node: &str, command_line: &str) -> Result<Output, NetworkError> {
        let command = self.command_in(node, CommandSpec::shell(command_line))?;
        Ok(self.runner.output(&command)?)
    }

    /// Create every namespace, bridge, link, address and route in the plan.
    ///
    /// On failure everything created so far is torn down again.
    pub fn build(&mut self) -> Result<(), NetworkError> {
        info!(
            "Building network: {} nodes, {} switches, {} links",
            self.plan.nodes.len(),
            self.plan.switches.len(),
            self.plan.links.len()
        );
        if let Err(err) = self.build_inner() {
            warn!("Network build failed, tearing down: {}", err);
            self.stop();
            return Err(err);
        }
        Ok(())
    }

    fn build_inner(&mut self) -> Result<(), NetworkError> {
        self.create_namespaces()?;
        self.create_bridges()?;

        let links = self.plan.links.clone();
        for (index, link) in links.iter().enumerate() {
            self.create_link(index, link)?;
        }

        self.enable_forwarding()?;
        self.add_routes()?;
        Ok(())
    }

    fn create_namespaces(&mut self) -> Result<(), NetworkError> {
        let names: Vec<String> = self
            .plan
            .nodes
            .iter()
            .filter(|node| node.in_namespace())
            .map(|node| node.name.clone())
            .collect();

        for name in names {
            let Some(netns) = self.netns(&name)? else { continue };

            // Stale namespace from an earlier run
            let _ = self.runner.output(&CommandSpec::new("ip").args(["netns", "del", netns.as_str()]));

            self.runner
                .run(&CommandSpec::new("ip").args(["netns", "add", netns.as_str()]))?;
            self.created.namespaces.push(netns.clone());
            debug!("created network namespace {} for {}", netns, name);

            self.runner.run(
                &CommandSpec::new("ip")
                    .args(["link", "set", "lo", "up"])
                    .in_netns(Some(netns)),
            )?;
        }
        Ok(())
    }

    fn create_bridges(&mut self) -> Result<(), NetworkError> {
        let switches: Vec<String> = self.plan.switches.iter().map(|switch| switch.name.clone()).collect();
        for switch in switches {
            let _ = self.runner.output(&CommandSpec::new("ip").args(["link", "del", switch.as_str()]));

            self.runner.run(
                &CommandSpec::new("ip").args(["link", "add", "name", switch.as_str(), "type", "bridge"]),
            )?;
            self.created.bridges.push(switch.clone());
            self.runner
                .run(&CommandSpec::new("ip").args(["link", "set", switch.as_str(), "up"]))?;
            debug!("created bridge {}", switch);
        }
        Ok(())
    }

    /// veth pair between `link.node` and its switch.
    ///
    /// Namespaced ends are created under a short temporary name and renamed
    /// once inside their namespace; interface names are limited to 15
    /// characters and must be unique in the root namespace.
    fn create_link(&mut self, index: usize, link: &Link) -> Result<(), NetworkError> {
        let netns = self.netns(&link.node)?;
        let node_end = match netns {
            Some(_) => format!("hnv{index}"),
            None => link.interface.clone(),
        };

        if netns.is_none() {
            let _ = self.runner.output(&CommandSpec::new("ip").args(["link", "del", node_end.as_str()]));
        }

        self.runner.run(&CommandSpec::new("ip").args([
            "link",
            "add",
            node_end.as_str(),
            "type",
            "veth",
            "peer",
            "name",
            link.switch_port.as_str(),
        ]))?;

        match &netns {
            Some(netns) => {
                self.runner.run(&CommandSpec::new("ip").args([
                    "link",
                    "set",
                    node_end.as_str(),
                    "netns",
                    netns.as_str(),
                ]))?;
                self.runner.run(
                    &CommandSpec::new("ip")
                        .args(["link", "set", node_end.as_str(), "name", link.interface.as_str()])
                        .in_netns(Some(netns.clone())),
                )?;
            }
            None => self.created.root_interfaces.push(node_end.clone()),
        }

        if let Some(address) = link.address {
            self.runner.run(
                &CommandSpec::new("ip")
                    .args(["addr", "add"])
                    .arg(address.to_string())
                    .args(["dev", link.interface.as_str()])
                    .in_netns(netns.clone()),
            )?;
        }
        self.runner.run(
            &CommandSpec::new("ip")
                .args(["link", "set", link.interface.as_str(), "up"])
                .in_netns(netns.clone()),
        )?;

        self.runner.run(&CommandSpec::new("ip").args([
            "link",
            "set",
            link.switch_port.as_str(),
            "master",
            link.switch.as_str(),
        ]))?;
        self.runner
            .run(&CommandSpec::new("ip").args(["link", "set", link.switch_port.as_str(), "up"]))?;

        if let Some(impairment) = link.impairment {
            for args in impairment.tc_commands(&link.interface) {
                self.runner
                    .run(&CommandSpec::new("tc").args(args).in_netns(netns.clone()))?;
            }
            for args in impairment.tc_commands(&link.switch_port) {
                self.runner.run(&CommandSpec::new("tc").args(args))?;
            }
            debug!(
                "shaped {} <-> {}: {:?}",
                link.interface, link.switch_port, impairment
            );
        }

        debug!("linked {}:{} <-> {}:{}", link.node, link.interface, link.switch, link.switch_port);
        Ok(())
    }

    fn enable_forwarding(&mut self) -> Result<(), NetworkError> {
        let netns = self.netns(ROUTER)?;
        for key in FORWARDING_SYSCTLS {
            self.runner.run(
                &CommandSpec::new("sysctl")
                    .arg("-w")
                    .arg(format!("{key}=1"))
                    .in_netns(netns.clone()),
            )?;
        }
        self.created.forwarding = true;
        Ok(())
    }

    fn add_routes(&mut self) -> Result<(), NetworkError> {
        for route in &self.plan.routes {
            let netns = self.netns(&route.node)?;
            let command = CommandSpec::new("ip")
                .args(route.ip_route_args())
                .in_netns(netns.clone());

            if netns.is_some() {
                self.runner.run(&command)?;
            } else {
                // The root namespace usually has a default route already
                let output = self.runner.output(&command)?;
                if !output.status.success() {
                    warn!(
                        "Could not add default route in root namespace: {}",
                        String::from_utf8_lossy(&output.stderr).trim()
                    );
                }
            }
        }
        Ok(())
    }

    /// Start the name server and every origin host's command
    pub fn start_services(&mut self, options: &ServiceOptions) -> Result<(), NetworkError> {
        self.runner.run(
            &CommandSpec::new("mkdir")
                .arg("-p")
                .arg(options.log_dir.display().to_string()),
        )?;

        let dnsmasq = self.command_in(DNS, dnsmasq_command(&options.hosts_file, &options.log_dir))?;
        info!("Starting name server: {}", dnsmasq);
        if let Some(child) = self.runner.spawn(&dnsmasq, None)? {
            self.processes.push(ManagedProcess::new("dnsmasq", child));
        }

        let commands = self.plan.commands.clone();
        for host in commands {
            let command = self.command_in(&host.node, origin_command(&host.command))?;
            info!(
                "Running command for {}\n{} >{} 2>&1",
                host.node,
                host.command,
                host.log_path.display()
            );
            if let Some(child) = self.runner.spawn(&command, Some(&host.log_path))? {
                self.processes.push(ManagedProcess::new(host.node.clone(), child));
            }
        }
        Ok(())
    }

    /// Tear down everything this network created. Safe to call repeatedly;
    /// failures are logged and skipped.
    pub fn stop(&mut self) {
        for mut process in self.processes.drain(..).rev() {
            process.stop();
        }

        if self.created.forwarding {
            if let Ok(netns) = self.netns(ROUTER) {
                for key in FORWARDING_SYSCTLS {
                    let command = CommandSpec::new("sysctl")
                        .arg("-w")
                        .arg(format!("{key}=0"))
                        .in_netns(netns.clone());
                    self.best_effort(&command);
                }
            }
            self.created.forwarding = false;
        }

        let namespaces: Vec<String> = self.created.namespaces.drain(..).rev().collect();
        for netns in namespaces {
            self.best_effort(&CommandSpec::new("ip").args(["netns", "del", netns.as_str()]));
        }

        let bridges: Vec<String> = self.created.bridges.drain(..).rev().collect();
        for bridge in bridges {
            self.best_effort(&CommandSpec::new("ip").args(["link", "del", bridge.as_str()]));
        }

        let interfaces: Vec<String> = self.created.root_interfaces.drain(..).rev().collect();
        for interface in interfaces {
            self.best_effort(&CommandSpec::new("ip").args(["link", "del", interface.as_str()]));
        }
    }

    fn best_effort(&self, command: &CommandSpec) {
        if let Err(err) = self.runner.run(command) {
            warn!("Teardown step failed: {}", err);
        }
    }

    /// Addresses of a node, formatted `interface:address`
    pub fn describe_interfaces(&self, node: &str) -> Vec<String> {
        self.plan
            .links_of(node)
            .map(|link| match link.address {
                Some(address) => format!("{}:{}", link.interface, address),
                None => link.interface.clone(),
            })
            .collect()
    }

    pub fn is_node(&self, name: &str) -> bool {
        self.plan.node(name).is_some()
    }
}

impl<R: CommandRunner> Drop for Network<R> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{IpAssignment, OriginConfig, TopologyConfig};
    use crate::emulation::{LinkImpairment, RecordingRunner};
    use crate::topology::{plan_topology, PlanOptions};

    fn plan() -> TopologyPlan {
        let mut config = TopologyConfig::new();
        config.insert(
            "http://a.test:80",
            OriginConfig {
                cmd: "serve a".to_string(),
                ips: vec![IpAssignment {
                    ip: "10.0.0.5".parse().unwrap(),
                    subnet_mask: 24,
                    gateway: "10.0.0.1".parse().unwrap(),
                }],
                origins: Vec::new(),
            },
        );
        let options = PlanOptions {
            uplink: LinkImpairment::new(1.6, 300, 0, 0).unwrap(),
            log_dir: PathBuf::from("/var/log/har"),
        };
        plan_topology(&config, &options).unwrap()
    }

    fn position(commands: &[String], needle: &str) -> usize {
        commands
            .iter()
            .position(|command| command == needle)
            .unwrap_or_else(|| panic!("missing command: {needle}\n{commands:#?}"))
    }

    #[test]
    fn test_build_creates_namespaces_and_bridges() {
        let mut network = Network::new(plan(), RecordingRunner::new());
        network.build().unwrap();
        let commands = network.runner().rendered();

        for netns in ["harnet-router", "harnet-dns", "harnet-http_a_test_80"] {
            position(&commands, &format!("ip netns add {netns}"));
        }
        assert!(!commands.iter().any(|command| command == "ip netns add harnet-root"));

        let s0 = position(&commands, "ip link add name s0 type bridge");
        let s2 = position(&commands, "ip link add name s2 type bridge");
        assert!(s0 < s2);
    }

    #[test]
    fn test_build_wires_host_link() {
        let mut network = Network::new(plan(), RecordingRunner::new());
        network.build().unwrap();
        let commands = network.runner().rendered();

        // router-eth1, dns-eth0, root-eth0, router-eth3, then the host's eth0
        let add = position(&commands, "ip link add hnv4 type veth peer name s2-eth2");
        let moved = position(&commands, "ip link set hnv4 netns harnet-http_a_test_80");
        let renamed = position(
            &commands,
            "ip netns exec harnet-http_a_test_80 ip link set hnv4 name eth0",
        );
        let addressed = position(
            &commands,
            "ip netns exec harnet-http_a_test_80 ip addr add 10.0.0.5/24 dev eth0",
        );
        let enslaved = position(&commands, "ip link set s2-eth2 master s2");
        assert!(add < moved && moved < renamed && renamed < addressed && addressed < enslaved);

        position(
            &commands,
            "ip netns exec harnet-http_a_test_80 ip route add default dev eth0 via 10.0.0.1",
        );
    }

    #[test]
    fn test_build_shapes_both_uplink_ends() {
        let mut network = Network::new(plan(), RecordingRunner::new());
        network.build().unwrap();
        let commands = network.runner().rendered();

        position(&commands, "ip link add root-eth0 type veth peer name s0-eth3");
        position(&commands, "ip addr add 192.168.1.2/24 dev root-eth0");
        position(
            &commands,
            "tc qdisc add dev root-eth0 parent 5:1 handle 10: netem delay 150ms",
        );
        position(
            &commands,
            "tc qdisc add dev s0-eth3 parent 5:1 handle 10: netem delay 150ms",
        );
        assert_eq!(
            commands.iter().filter(|command| command.contains("netem")).count(),
            2
        );
    }

    #[test]
    fn test_build_enables_forwarding_on_router() {
        let mut network = Network::new(plan(), RecordingRunner::new());
        network.build().unwrap();
        let commands = network.runner().rendered();

        position(&commands, "ip netns exec harnet-router sysctl -w net.ipv4.ip_forward=1");
        position(
            &commands,
            "ip netns exec harnet-router sysctl -w net.ipv6.conf.all.forwarding=1",
        );
    }

    #[test]
    fn test_root_route_failure_is_not_fatal() {
        let runner = RecordingRunner::new();
        runner.fail_when("ip route add default via 192.168.1.1");
        let mut network = Network::new(plan(), runner);
        assert!(network.build().is_ok());
    }

    #[test]
    fn test_failed_build_tears_down() {
        let runner = RecordingRunner::new();
        runner.fail_when("ip link add name s2 type bridge");
        let mut network = Network::new(plan(), runner);

        let err = network.build().unwrap_err();
        assert!(matches!(err, NetworkError::Command(CommandError::Failed { .. })));

        let commands = network.runner().rendered();
        let failed = position(&commands, "ip link add name s2 type bridge");
        let cleanup = &commands[failed + 1..];
        assert!(cleanup.contains(&"ip netns del harnet-router".to_string()));
        assert!(cleanup.contains(&"ip link del s0".to_string()));
        assert!(!cleanup.iter().any(|command| command.contains("sysctl")));
    }

    #[test]
    fn test_stop_reverses_creation_once() {
        let mut network = Network::new(plan(), RecordingRunner::new());
        network.build().unwrap();
        let built = network.runner().rendered().len();

        network.stop();
        let commands = network.runner().rendered();
        let teardown = &commands[built..];
        assert_eq!(
            teardown.first().unwrap(),
            "ip netns exec harnet-router sysctl -w net.ipv4.ip_forward=0"
        );
        assert!(teardown.contains(&"ip link del s0".to_string()));
        assert_eq!(teardown.last().unwrap(), "ip link del root-eth0");

        network.stop();
        assert_eq!(network.runner().rendered().len(), commands.len());
    }

    #[test]
    fn test_start_services_under_recorder() {
        let mut network = Network::new(plan(), RecordingRunner::new());
        network.build().unwrap();
        network
            .start_services(&ServiceOptions {
                hosts_file: PathBuf::from("/opt/src/hosts"),
                log_dir: PathBuf::from("/var/log/har"),
            })
            .unwrap();

        let commands = network.runner().rendered();
        position(
            &commands,
            "ip netns exec harnet-dns dnsmasq -k -R -h -H /opt/src/hosts --log-facility=/var/log/har/dns",
        );
        position(&commands, "ip netns exec harnet-http_a_test_80 sh -c 'serve a'");
        assert!(network.processes().is_empty());
    }

    #[test]
    fn test_exec_in_node() {
        let network = Network::new(plan(), RecordingRunner::new());
        network.exec("dns", "cat /etc/hosts").unwrap();
        network.exec("root", "ip addr").unwrap();
        assert!(matches!(
            network.exec("nope", "true"),
            Err(NetworkError::UnknownNode(_))
        ));

        assert_eq!(
            network.runner().rendered(),
            vec![
                "ip netns exec harnet-dns sh -c 'cat /etc/hosts'",
                "sh -c 'ip addr'"
            ]
        );
    }
}
