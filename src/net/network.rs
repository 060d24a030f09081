use std::{fmt, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// The transport network a destination is dialed over.
///
/// The family-agnostic variants ([`Network::Tcp`], [`Network::Udp`])
/// resolve to either IPv4 or IPv6 addresses, the others are pinned
/// to a single address family.
pub enum Network {
    /// The `tcp` network, IPv4 or IPv6.
    Tcp,
    /// The `tcp4` network, IPv4 only.
    Tcp4,
    /// The `tcp6` network, IPv6 only.
    Tcp6,
    /// The `udp` network, IPv4 or IPv6.
    Udp,
    /// The `udp4` network, IPv4 only.
    Udp4,
    /// The `udp6` network, IPv6 only.
    Udp6,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Address family a [`Network`] is restricted to.
pub enum AddressFamily {
    /// Both IPv4 and IPv6 addresses are acceptable.
    Any,
    /// Only IPv4 addresses are acceptable.
    V4,
    /// Only IPv6 addresses are acceptable.
    V6,
}

impl AddressFamily {
    /// Returns `true` if the given address belongs to this family.
    #[must_use]
    pub fn matches(self, addr: &std::net::SocketAddr) -> bool {
        match self {
            Self::Any => true,
            Self::V4 => addr.is_ipv4(),
            Self::V6 => addr.is_ipv6(),
        }
    }
}

impl Network {
    /// Rewrite this network to its IPv4-only form.
    ///
    /// `tcp` and `tcp6` become `tcp4`, `udp` and `udp6` become `udp4`.
    #[must_use]
    pub fn force_ipv4(self) -> Self {
        match self {
            Self::Tcp | Self::Tcp4 | Self::Tcp6 => Self::Tcp4,
            Self::Udp | Self::Udp4 | Self::Udp6 => Self::Udp4,
        }
    }

    /// Returns `true` for byte-stream (tcp-like) networks.
    #[must_use]
    pub fn is_stream(self) -> bool {
        matches!(self, Self::Tcp | Self::Tcp4 | Self::Tcp6)
    }

    /// The [`AddressFamily`] resolved addresses are filtered by.
    #[must_use]
    pub fn family(self) -> AddressFamily {
        match self {
            Self::Tcp | Self::Udp => AddressFamily::Any,
            Self::Tcp4 | Self::Udp4 => AddressFamily::V4,
            Self::Tcp6 | Self::Udp6 => AddressFamily::V6,
        }
    }

    /// The canonical lowercase name of this network.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Tcp4 => "tcp4",
            Self::Tcp6 => "tcp6",
            Self::Udp => "udp",
            Self::Udp4 => "udp4",
            Self::Udp6 => "udp6",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = UnknownNetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let network = match s.trim() {
            s if s.eq_ignore_ascii_case("tcp") => Self::Tcp,
            s if s.eq_ignore_ascii_case("tcp4") => Self::Tcp4,
            s if s.eq_ignore_ascii_case("tcp6") => Self::Tcp6,
            s if s.eq_ignore_ascii_case("udp") => Self::Udp,
            s if s.eq_ignore_ascii_case("udp4") => Self::Udp4,
            s if s.eq_ignore_ascii_case("udp6") => Self::Udp6,
            _ => return Err(UnknownNetworkError(s.to_owned())),
        };
        Ok(network)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Error returned when parsing a [`Network`] from an unsupported name.
pub struct UnknownNetworkError(String);

impl fmt::Display for UnknownNetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown network: {:?}", self.0)
    }
}

impl std::error::Error for UnknownNetworkError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_parse_and_display() {
        for (name, expected) in [
            ("tcp", Network::Tcp),
            ("tcp4", Network::Tcp4),
            ("TCP6", Network::Tcp6),
            ("udp", Network::Udp),
            (" udp4 ", Network::Udp4),
            ("udp6", Network::Udp6),
        ] {
            let network: Network = name.parse().unwrap();
            assert_eq!(network, expected);
            assert_eq!(network.to_string(), name.trim().to_ascii_lowercase());
        }
    }

    #[test]
    fn test_network_parse_unknown() {
        let err = "unix".parse::<Network>().unwrap_err();
        assert_eq!(err.to_string(), "unknown network: \"unix\"");
    }

    #[test]
    fn test_force_ipv4() {
        assert_eq!(Network::Tcp.force_ipv4(), Network::Tcp4);
        assert_eq!(Network::Tcp6.force_ipv4(), Network::Tcp4);
        assert_eq!(Network::Tcp4.force_ipv4(), Network::Tcp4);
        assert_eq!(Network::Udp.force_ipv4(), Network::Udp4);
        assert_eq!(Network::Udp6.force_ipv4(), Network::Udp4);
    }

    #[test]
    fn test_family_matches() {
        let v4: std::net::SocketAddr = "127.0.0.1:80".parse().unwrap();
        let v6: std::net::SocketAddr = "[::1]:80".parse().unwrap();
        assert!(Network::Tcp.family().matches(&v4));
        assert!(Network::Tcp.family().matches(&v6));
        assert!(Network::Udp4.family().matches(&v4));
        assert!(!Network::Udp4.family().matches(&v6));
        assert!(!Network::Tcp6.family().matches(&v4));
    }
}
