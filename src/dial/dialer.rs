use std::{io, net::SocketAddr, time::Duration};

use tokio::net::{TcpStream, UdpSocket};

use super::TransportStream;
use crate::net::DestinationKey;

/// A connection produced by a [`Dialer`].
///
/// Dropping the connection closes it.
pub trait Connection: Send + 'static {
    /// Returns the keep-alive capability of this connection,
    /// `None` when it is not a byte-stream connection.
    fn as_keep_alive(&self) -> Option<&dyn KeepAlive> {
        None
    }
}

/// Capability of byte-stream connections to enable transport-level keep-alive probing.
pub trait KeepAlive {
    /// Enable periodic keep-alive probes, configured by the given [`KeepAliveConfig`].
    fn enable_keep_alive(&self, config: &KeepAliveConfig) -> io::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Keep-alive configuration applied to every byte-stream connection
/// a dial worker establishes.
pub struct KeepAliveConfig {
    /// Idle time after which keep-alive probes start being sent.
    pub time: Duration,
}

impl Default for KeepAliveConfig {
    fn default() -> Self {
        Self {
            time: Duration::from_secs(15),
        }
    }
}

/// Trait used by the dial workers of a [`DialCache`]
/// to actually establish a connection to a destination.
///
/// Implemented by [`TransportDialer`] and by any
/// `Fn(DestinationKey) -> impl Future<Output = io::Result<C>>`.
///
/// [`DialCache`]: super::DialCache
pub trait Dialer: Send + Sync + 'static {
    /// The connection type established by this dialer.
    type Connection: Connection;

    /// Dial the destination identified by the given [`DestinationKey`].
    fn dial(
        &self,
        key: DestinationKey,
    ) -> impl Future<Output = io::Result<Self::Connection>> + Send + '_;
}

impl<DialFn, DialFnFut, C> Dialer for DialFn
where
    DialFn: Fn(DestinationKey) -> DialFnFut + Send + Sync + 'static,
    DialFnFut: Future<Output = io::Result<C>> + Send + 'static,
    C: Connection,
{
    type Connection = C;

    fn dial(
        &self,
        key: DestinationKey,
    ) -> impl Future<Output = io::Result<Self::Connection>> + Send + '_ {
        (self)(key)
    }
}

#[derive(Debug, Clone, Default)]
#[non_exhaustive]
/// The default [`Dialer`], establishing tcp and udp connections
/// using the system resolver.
///
/// Resolved addresses not matching the address family of the
/// destination's network are skipped, the others are tried in order
/// until one connects.
pub struct TransportDialer {
    connect_timeout: Option<Duration>,
}

impl TransportDialer {
    /// Create a new [`Default`] [`TransportDialer`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit the time a single connect attempt may take.
    ///
    /// By default the operating system's connect timeout applies.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    async fn connect_addr(
        &self,
        key: &DestinationKey,
        addr: SocketAddr,
    ) -> io::Result<TransportStream> {
        let connect = async {
            if key.network().is_stream() {
                TcpStream::connect(addr).await.map(TransportStream::from)
            } else {
                let bind_addr: SocketAddr = if addr.is_ipv4() {
                    (std::net::Ipv4Addr::UNSPECIFIED, 0).into()
                } else {
                    (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
                };
                let socket = UdpSocket::bind(bind_addr).await?;
                socket.connect(addr).await?;
                Ok(TransportStream::from(socket))
            }
        };

        match self.connect_timeout {
            Some(timeout) => tokio::time::timeout(timeout, connect)
                .await
                .map_err(|_elapsed| {
                    io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("connect to {addr} timed out after {timeout:?}"),
                    )
                })?,
            None => connect.await,
        }
    }
}

impl Dialer for TransportDialer {
    type Connection = TransportStream;

    async fn dial(&self, key: DestinationKey) -> io::Result<Self::Connection> {
        let family = key.network().family();

        let mut last_err = None;
        for addr in tokio::net::lookup_host(key.address()).await? {
            if !family.matches(&addr) {
                tracing::trace!(%key, %addr, "skip resolved address: address family mismatch");
                continue;
            }
            match self.connect_addr(&key, addr).await {
                Ok(stream) => return Ok(stream),
                Err(err) => {
                    tracing::trace!(%key, %addr, error = %err, "connect attempt failed");
                    last_err = Some(err);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("no suitable address found for {key}"),
            )
        }))
    }
}
