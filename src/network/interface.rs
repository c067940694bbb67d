use std::net::Ipv4Addr;

use tracing::debug;

use crate::core::Result;

/// Name prefixes of bridges, tunnels and hypervisor adapters
const VIRTUAL_PREFIXES: [&str; 10] = [
    "docker", "veth", "br-", "virbr", "vmnet", "vboxnet", "utun", "tun", "tap", "zt",
];

/// An IPv4 interface the transport binds to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInterface {
    /// Interface name, empty when configured by address only
    pub name: String,
    /// Interface address
    pub addr: Ipv4Addr,
    /// Network mask, if known
    pub netmask: Option<Ipv4Addr>,
}

impl NetworkInterface {
    /// Creates an interface description from an address
    pub fn from_addr(addr: Ipv4Addr) -> Self {
        NetworkInterface {
            name: String::new(),
            addr,
            netmask: None,
        }
    }

    /// Returns true if `dest` is on this interface's subnet
    pub fn contains(&self, dest: Ipv4Addr) -> bool {
        if dest.is_loopback() {
            return self.addr.is_loopback();
        }
        match self.netmask {
            Some(mask) => {
                let mask = u32::from(mask);
                u32::from(self.addr) & mask == u32::from(dest) & mask
            }
            None => false,
        }
    }
}

/// Returns true for interface names that belong to virtual adapters
pub fn is_virtual(name: &str) -> bool {
    VIRTUAL_PREFIXES.iter().any(|prefix| name.starts_with(prefix))
}

/// Lists up, non-loopback, non-virtual, multicast capable IPv4 interfaces
#[cfg(unix)]
pub fn available_interfaces() -> Result<Vec<NetworkInterface>> {
    use nix::ifaddrs::getifaddrs;
    use nix::net::if_::InterfaceFlags;
    use std::net::SocketAddrV4;

    let mut interfaces = Vec::new();
    for ifaddr in getifaddrs().map_err(std::io::Error::from)? {
        let flags = ifaddr.flags;
        if !flags.contains(InterfaceFlags::IFF_UP)
            || !flags.contains(InterfaceFlags::IFF_MULTICAST)
            || flags.contains(InterfaceFlags::IFF_LOOPBACK)
            || is_virtual(&ifaddr.interface_name)
        {
            continue;
        }

        let Some(addr) = ifaddr.address.as_ref().and_then(|a| a.as_sockaddr_in()) else {
            continue;
        };
        let addr = *SocketAddrV4::from(*addr).ip();
        let netmask = ifaddr
            .netmask
            .as_ref()
            .and_then(|m| m.as_sockaddr_in())
            .map(|m| *SocketAddrV4::from(*m).ip());

        debug!("[NET] interface {} {} mask {:?}", ifaddr.interface_name, addr, netmask);
        interfaces.push(NetworkInterface {
            name: ifaddr.interface_name,
            addr,
            netmask,
        });
    }
    Ok(interfaces)
}

/// Without interface enumeration the transport binds the wildcard address
#[cfg(not(unix))]
pub fn available_interfaces() -> Result<Vec<NetworkInterface>> {
    Ok(vec![NetworkInterface::from_addr(Ipv4Addr::UNSPECIFIED)])
}

/// Resolves the interfaces to bind: the configured addresses (with netmask
/// filled in when the system knows it), or every available interface
pub fn select_interfaces(configured: &[Ipv4Addr]) -> Result<Vec<NetworkInterface>> {
    if configured.is_empty() {
        return available_interfaces();
    }

    let known = available_interfaces().unwrap_or_default();
    Ok(configured
        .iter()
        .map(|&addr| {
            known
                .iter()
                .find(|iface| iface.addr == addr)
                .cloned()
                .unwrap_or_else(|| NetworkInterface::from_addr(addr))
        })
        .collect())
}
