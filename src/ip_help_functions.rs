//! This module contains some help functions regarding the IP address
//!
//! Node ids are not configured. Every node knows the same sorted set of peer
//! addresses after discovery, and a node's id is the position of its own
//! address in that set.
//!
//! Functions
//! - [local_ipv4_addrs]: IPv4 addresses of the local network interfaces.
//! - [id_of]: Position of an address in a peer set.
//! - [id_from_peers]: The local node's id in a peer set.

use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr};

use log::warn;

use crate::error::Fault;

/// IPv4 addresses of every local network interface, loopback included.
///
/// Falls back to the primary address alone if the interfaces cannot be listed.
pub fn local_ipv4_addrs() -> Vec<Ipv4Addr> {
    let listed = match local_ip_address::list_afinet_netifas() {
        Ok(ifaces) => ifaces.into_iter().map(|(_, ip)| ip).collect(),
        Err(e) => {
            warn!("could not list network interfaces: {}", e);
            local_ip_address::local_ip().into_iter().collect::<Vec<IpAddr>>()
        }
    };
    listed
        .into_iter()
        .filter_map(|ip| match ip {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(_) => None,
        })
        .collect()
}

/// Id of `addr` within `peers`
///
/// ## Example
/// ```
/// use elevatorbank::ip_help_functions::id_of;
/// use std::collections::BTreeSet;
/// use std::net::Ipv4Addr;
///
/// let peers: BTreeSet<Ipv4Addr> = ["10.0.0.7", "10.0.0.3"].iter().map(|a| a.parse().unwrap()).collect();
/// assert_eq!(id_of(&peers, "10.0.0.7".parse().unwrap()), Some(1));
/// assert_eq!(id_of(&peers, "10.0.0.9".parse().unwrap()), None);
/// ```
pub fn id_of(peers: &BTreeSet<Ipv4Addr>, addr: Ipv4Addr) -> Option<i32> {
    peers
        .iter()
        .position(|peer| *peer == addr)
        .and_then(|i| i32::try_from(i).ok())
}

/// Id of the local node: the position of the first peer that is one of `local` addresses.
///
/// ## Returns
/// [Fault::NoNodeId] if no peer is local, discovery went wrong in that case.
pub fn id_from_peers(peers: &BTreeSet<Ipv4Addr>, local: &[Ipv4Addr]) -> Result<i32, Fault> {
    peers
        .iter()
        .filter(|peer| local.contains(peer))
        .find_map(|peer| id_of(peers, *peer))
        .ok_or(Fault::NoNodeId)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peers(addrs: &[&str]) -> BTreeSet<Ipv4Addr> {
        addrs.iter().map(|a| a.parse().unwrap()).collect()
    }

    #[test]
    fn id_is_the_sorted_position() {
        let set = peers(&["10.0.0.30", "10.0.0.4", "10.0.0.200"]);
        let local: Ipv4Addr = "10.0.0.30".parse().unwrap();
        assert_eq!(id_from_peers(&set, &[local]).unwrap(), 1);
    }

    #[test]
    fn missing_local_address_is_fatal() {
        let set = peers(&["10.0.0.1", "10.0.0.2"]);
        let err = id_from_peers(&set, &["127.0.0.1".parse().unwrap()]).unwrap_err();
        assert!(matches!(err, Fault::NoNodeId));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn local_addresses_are_listed() {
        // loopback is always configured on a test host
        assert!(!local_ipv4_addrs().is_empty());
    }
}
