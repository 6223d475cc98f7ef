use std::net::{Ipv4Addr, Ipv6Addr};

/// IP utility functions for subnet arithmetic

/// Network address of `ip` under a `/prefix_len` mask
pub fn network_address(ip: Ipv4Addr, prefix_len: u8) -> Ipv4Addr {
    Ipv4Addr::from(u32::from(ip) & prefix_mask(prefix_len))
}

/// Conventional gateway of the subnet containing `ip`: the first host address
pub fn subnet_gateway(ip: Ipv4Addr, prefix_len: u8) -> Ipv4Addr {
    let network = u32::from(network_address(ip, prefix_len));
    Ipv4Addr::from(network.wrapping_add(1))
}

/// True if `a` and `b` fall in the same `/prefix_len` subnet
pub fn same_subnet(a: Ipv4Addr, b: Ipv4Addr, prefix_len: u8) -> bool {
    network_address(a, prefix_len) == network_address(b, prefix_len)
}

/// Add `n` to an IPv4 address, returning `None` past 255.255.255.255
pub fn add_to_address(ip: Ipv4Addr, n: u32) -> Option<Ipv4Addr> {
    u32::from(ip).checked_add(n).map(Ipv4Addr::from)
}

/// The /64 network an IPv6 address belongs to
pub fn ipv6_network_64(ip: Ipv6Addr) -> Ipv6Addr {
    let mut segments = ip.segments();
    for segment in segments.iter_mut().skip(4) {
        *segment = 0;
    }
    Ipv6Addr::from(segments)
}

fn prefix_mask(prefix_len: u8) -> u32 {
    match prefix_len {
        0 => 0,
        len if len >= 32 => u32::MAX,
        len => u32::MAX << (32 - u32::from(len)),
    }
}
