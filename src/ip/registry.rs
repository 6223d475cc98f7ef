//! Subnet registry.
//!
//! Tracks which switch serves which gateway so that every distinct gateway
//! gets exactly one subnet switch, no matter how many hosts have an address
//! behind it.

use std::collections::HashMap;
use std::net::Ipv4Addr;

/// A switch serving one subnet, attached to the router
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetSwitch {
    pub name: String,
    /// Router-side address of the subnet
    pub gateway: Ipv4Addr,
    pub prefix_len: u8,
    /// Router interface attached to this switch
    pub router_interface: String,
}

/// Gateway -> switch registry
#[derive(Debug)]
pub struct SubnetRegistry {
    switches: Vec<SubnetSwitch>,
    by_gateway: HashMap<Ipv4Addr, usize>,
}

impl SubnetRegistry {
    /// Create a registry seeded with the core switch
    pub fn with_core(core: SubnetSwitch) -> Self {
        let mut by_gateway = HashMap::new();
        by_gateway.insert(core.gateway, 0);
        SubnetRegistry {
            switches: vec![core],
            by_gateway,
        }
    }

    /// Look up the switch for `gateway`, creating it if this is the first
    /// time the gateway is seen. Returns the switch and whether it was
    /// created.
    ///
    /// New switches are named `s{N+1}` with `N` the registry size before the
    /// insert, and attach to router interface `router-eth{M+1}` with `M` the
    /// size after it. With only the core switch registered, the first subnet
    /// switch is therefore `s2` on `router-eth3`.
    pub fn switch_for(&mut self, gateway: Ipv4Addr, prefix_len: u8) -> (&SubnetSwitch, bool) {
        if let Some(index) = self.by_gateway.get(&gateway).copied() {
            let existing = &self.switches[index];
            if existing.prefix_len != prefix_len {
                log::warn!(
                    "Gateway {} already serves a /{} subnet, ignoring /{}",
                    gateway,
                    existing.prefix_len,
                    prefix_len
                );
            }
            return (existing, false);
        }

        let before = self.switches.len();
        let switch = SubnetSwitch {
            name: format!("s{}", before + 1),
            gateway,
            prefix_len,
            router_interface: format!("router-eth{}", before + 2),
        };
        self.switches.push(switch);
        self.by_gateway.insert(gateway, before);
        (&self.switches[before], true)
    }

    pub fn get(&self, gateway: Ipv4Addr) -> Option<&SubnetSwitch> {
        self.by_gateway.get(&gateway).map(|&index| &self.switches[index])
    }

    /// All switches, core first, in creation order
    pub fn switches(&self) -> &[SubnetSwitch] {
        &self.switches
    }

    pub fn len(&self) -> usize {
        self.switches.len()
    }

    pub fn into_switches(self) -> Vec<SubnetSwitch> {
        self.switches
    }
}
