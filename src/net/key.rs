use super::Network;
use std::{fmt, sync::Arc};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
/// Canonical (network, address) pair identifying one dial lane.
///
/// Two requests that produce an equal key share a single background
/// dial worker and a single stream of pre-dialed connections.
pub struct DestinationKey {
    network: Network,
    address: Arc<str>,
}

impl DestinationKey {
    /// Create a new [`DestinationKey`].
    ///
    /// With `force_ipv4` set the network is rewritten to its IPv4-only form
    /// before the key is built, see [`Network::force_ipv4`].
    #[must_use]
    pub fn new(network: Network, address: impl Into<Arc<str>>, force_ipv4: bool) -> Self {
        let network = if force_ipv4 {
            network.force_ipv4()
        } else {
            network
        };
        Self {
            network,
            address: address.into(),
        }
    }

    /// The (possibly rewritten) [`Network`] to dial over.
    #[must_use]
    pub fn network(&self) -> Network {
        self.network
    }

    /// The `host:port` address to dial.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }
}

impl fmt::Display for DestinationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.network, self.address)
    }
}
