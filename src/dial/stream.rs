use std::{
    io,
    net::SocketAddr,
    pin::Pin,
    task::{Context, Poll},
};

use pin_project_lite::pin_project;
use tokio::{
    io::{AsyncRead, AsyncWrite, ReadBuf},
    net::{TcpStream, UdpSocket},
};

use super::{Connection, KeepAlive, KeepAliveConfig};

pin_project! {
    #[project = TransportStreamProj]
    #[derive(Debug)]
    /// A connection established by the [`TransportDialer`].
    ///
    /// Byte-stream networks produce a [`TcpStream`], datagram networks
    /// a connected [`UdpSocket`]. Both are usable as an async byte stream,
    /// where for udp every write is sent as a single datagram.
    ///
    /// [`TransportDialer`]: super::TransportDialer
    pub enum TransportStream {
        Tcp { #[pin] stream: TcpStream },
        Udp { socket: UdpSocket },
    }
}

impl TransportStream {
    /// Returns the local address of this connection.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        match self {
            Self::Tcp { stream } => stream.local_addr(),
            Self::Udp { socket } => socket.local_addr(),
        }
    }

    /// Returns the remote address this connection is connected to.
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        match self {
            Self::Tcp { stream } => stream.peer_addr(),
            Self::Udp { socket } => socket.peer_addr(),
        }
    }

    /// Returns `true` if this is a byte-stream (tcp) connection.
    #[must_use]
    pub fn is_tcp(&self) -> bool {
        matches!(self, Self::Tcp { .. })
    }
}

impl From<TcpStream> for TransportStream {
    fn from(stream: TcpStream) -> Self {
        Self::Tcp { stream }
    }
}

impl From<UdpSocket> for TransportStream {
    fn from(socket: UdpSocket) -> Self {
        Self::Udp { socket }
    }
}

impl Connection for TransportStream {
    fn as_keep_alive(&self) -> Option<&dyn KeepAlive> {
        match self {
            Self::Tcp { stream } => Some(stream as &dyn KeepAlive),
            Self::Udp { .. } => None,
        }
    }
}

impl KeepAlive for TcpStream {
    fn enable_keep_alive(&self, config: &KeepAliveConfig) -> io::Result<()> {
        let keep_alive = socket2::TcpKeepalive::new().with_time(config.time);
        socket2::SockRef::from(self).set_tcp_keepalive(&keep_alive)
    }
}

impl AsyncRead for TransportStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.project() {
            TransportStreamProj::Tcp { stream } => stream.poll_read(cx, buf),
            TransportStreamProj::Udp { socket } => socket.poll_recv(cx, buf),
        }
    }
}

impl AsyncWrite for TransportStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.project() {
            TransportStreamProj::Tcp { stream } => stream.poll_write(cx, buf),
            TransportStreamProj::Udp { socket } => socket.poll_send(cx, buf),
        }
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        match self.project() {
            TransportStreamProj::Tcp { stream } => stream.poll_write_vectored(cx, bufs),
            TransportStreamProj::Udp { socket } => {
                let buf = bufs
                    .iter()
                    .find(|b| !b.is_empty())
                    .map_or(&[][..], |b| &**b);
                socket.poll_send(cx, buf)
            }
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.project() {
            TransportStreamProj::Tcp { stream } => stream.poll_flush(cx),
            TransportStreamProj::Udp { .. } => Poll::Ready(Ok(())),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.project() {
            TransportStreamProj::Tcp { stream } => stream.poll_shutdown(cx),
            TransportStreamProj::Udp { .. } => Poll::Ready(Ok(())),
        }
    }

    fn is_write_vectored(&self) -> bool {
        match self {
            Self::Tcp { stream } => stream.is_write_vectored(),
            Self::Udp { .. } => false,
        }
    }
}
