use std::{net::IpAddr, sync::Arc};

// Stable identity for a peer connection, assigned by the peer manager.
// Remains a valid key even if the manager recycles the underlying
// connection object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Connecting,
    Handshaking,
    // Actively exchanging pieces; byte counters only move in this state.
    Transferring,
    Disconnected,
}

// Read-only view of a live peer, exposed by the peer manager.
pub trait Peer: Send + Sync {

    fn id(&self) -> PeerId;

    fn address(&self) -> IpAddr;

    fn is_lan_local(&self) -> bool;

    fn state(&self) -> PeerState;

    // Cumulative data bytes for the current connection, non-decreasing.
    fn bytes_sent(&self) -> u64;

    fn bytes_received(&self) -> u64;

}

// Enumerable groups of currently active peers, one group per download.
// A removed peer must not appear in any group.
pub trait PeerSource: Send + Sync {
    fn peer_groups(&self) -> Vec<Vec<Arc<dyn Peer>>>;
}

// Country lookup for a network address. The first entry of the returned
// list is the country code.
pub trait CountryResolver: Send + Sync {
    fn resolve(&self, address: IpAddr) -> Option<Vec<String>>;
}

// Collapse a lookup result to a single code, falling back to the
// sentinel on failure.
pub(crate) fn resolve_cc(resolver: &dyn CountryResolver, address: IpAddr) -> String {
    match resolver.resolve(address) {
        Some(mut details) if !details.is_empty() => details.remove(0),
        _ => crate::UNKNOWN_CC.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    struct EmptyResolver;

    impl CountryResolver for EmptyResolver {
        fn resolve(&self, _address: IpAddr) -> Option<Vec<String>> {
            Some(Vec::new())
        }
    }

    #[test]
    fn empty_lookup_falls_back_to_sentinel() {
        let address = IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4));
        assert_eq!(resolve_cc(&EmptyResolver, address), crate::UNKNOWN_CC);
    }
}
