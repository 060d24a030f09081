use std::{
    fmt, io,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use http::Uri;
use hyper_util::{
    client::legacy::connect::{Connected, Connection as HyperConnection},
    rt::TokioIo,
};
use pin_project_lite::pin_project;
use rustls::{ClientConfig, pki_types::ServerName};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_rustls::{TlsConnector, client::TlsStream};
use tower_service::Service;

use crate::{
    dial::{DialCache, Dialer},
    error::{BoxError, ErrorContext},
    net::Network,
};

const DEFAULT_HTTP_PORT: u16 = 80;
const DEFAULT_HTTPS_PORT: u16 = 443;

/// Connector for the pooling http client which takes its connections
/// from a [`DialCache`] instead of dialing them itself.
///
/// For `https` upstreams the tls handshake runs over the cached connection.
pub struct DialConnector<D: Dialer> {
    cache: DialCache<D>,
    tls: TlsConnector,
}

impl<D: Dialer> DialConnector<D> {
    /// Create a new [`DialConnector`] acquiring connections from the given cache,
    /// using the given client config for `https` upstreams.
    pub fn new(cache: DialCache<D>, tls_config: Arc<ClientConfig>) -> Self {
        Self {
            cache,
            tls: TlsConnector::from(tls_config),
        }
    }
}

impl<D: Dialer> Clone for DialConnector<D> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            tls: self.tls.clone(),
        }
    }
}

impl<D: Dialer> fmt::Debug for DialConnector<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DialConnector")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl<D> Service<Uri> for DialConnector<D>
where
    D: Dialer,
    D::Connection: AsyncRead + AsyncWrite + Unpin,
{
    type Response = HttpConn<D::Connection>;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, uri: Uri) -> Self::Future {
        let cache = self.cache.clone();
        let tls = self.tls.clone();
        Box::pin(async move {
            let upstream = Upstream::from_uri(&uri)?;
            let conn = cache
                .acquire(Network::Tcp, &upstream.address)
                .await
                .context("acquire upstream connection")?;

            let stream = match upstream.server_name {
                None => UpstreamStream::Plain { stream: conn },
                Some(server_name) => {
                    let stream = tls
                        .connect(server_name, conn)
                        .await
                        .with_context(|| format!("tls handshake with {}", upstream.address))?;
                    tracing::trace!(address = %upstream.address, "tls upstream connection ready");
                    UpstreamStream::Tls { stream }
                }
            };
            Ok(HttpConn {
                inner: TokioIo::new(stream),
            })
        })
    }
}

/// Where and how to connect for an upstream request uri.
#[derive(Debug)]
struct Upstream {
    /// The `host:port` to dial.
    address: String,
    /// Server name to verify, `None` for plain http.
    server_name: Option<ServerName<'static>>,
}

impl Upstream {
    fn from_uri(uri: &Uri) -> Result<Self, BoxError> {
        let tls = match uri.scheme_str() {
            None | Some("http") => false,
            Some("https") => true,
            Some(scheme) => return Err(format!("unsupported upstream scheme: {scheme}").into()),
        };
        let host = uri.host().context("upstream uri has no host")?;
        let default_port = if tls {
            DEFAULT_HTTPS_PORT
        } else {
            DEFAULT_HTTP_PORT
        };
        let port = uri.port_u16().unwrap_or(default_port);

        let server_name = if tls {
            let name = host.trim_start_matches('[').trim_end_matches(']');
            Some(ServerName::try_from(name.to_owned()).context("invalid tls server name")?)
        } else {
            None
        };

        Ok(Self {
            address: format!("{host}:{port}"),
            server_name,
        })
    }
}

pin_project! {
    #[project = UpstreamStreamProj]
    enum UpstreamStream<C> {
        Plain { #[pin] stream: C },
        Tls { #[pin] stream: TlsStream<C> },
    }
}

impl<C> AsyncRead for UpstreamStream<C>
where
    C: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.project() {
            UpstreamStreamProj::Plain { stream } => stream.poll_read(cx, buf),
            UpstreamStreamProj::Tls { stream } => stream.poll_read(cx, buf),
        }
    }
}

impl<C> AsyncWrite for UpstreamStream<C>
where
    C: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.project() {
            UpstreamStreamProj::Plain { stream } => stream.poll_write(cx, buf),
            UpstreamStreamProj::Tls { stream } => stream.poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.project() {
            UpstreamStreamProj::Plain { stream } => stream.poll_flush(cx),
            UpstreamStreamProj::Tls { stream } => stream.poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.project() {
            UpstreamStreamProj::Plain { stream } => stream.poll_shutdown(cx),
            UpstreamStreamProj::Tls { stream } => stream.poll_shutdown(cx),
        }
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        match self.project() {
            UpstreamStreamProj::Plain { stream } => stream.poll_write_vectored(cx, bufs),
            UpstreamStreamProj::Tls { stream } => stream.poll_write_vectored(cx, bufs),
        }
    }

    fn is_write_vectored(&self) -> bool {
        match self {
            Self::Plain { stream } => stream.is_write_vectored(),
            Self::Tls { stream } => stream.is_write_vectored(),
        }
    }
}

pin_project! {
    /// A connection from a [`DialCache`], usable by the pooling http client.
    ///
    /// Carries tls on top of the cached connection for `https` upstreams.
    pub struct HttpConn<C> {
        #[pin]
        inner: TokioIo<UpstreamStream<C>>,
    }
}

impl<C> HttpConn<C> {
    /// Returns `true` if tls runs on top of the cached connection.
    pub fn is_tls(&self) -> bool {
        matches!(self.inner.inner(), UpstreamStream::Tls { .. })
    }
}

impl<C> fmt::Debug for HttpConn<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpConn")
            .field("tls", &self.is_tls())
            .finish_non_exhaustive()
    }
}

impl<C> HyperConnection for HttpConn<C> {
    fn connected(&self) -> Connected {
        Connected::new()
    }
}

impl<C> hyper::rt::Read for HttpConn<C>
where
    C: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: hyper::rt::ReadBufCursor<'_>,
    ) -> Poll<Result<(), io::Error>> {
        hyper::rt::Read::poll_read(self.project().inner, cx, buf)
    }
}

impl<C> hyper::rt::Write for HttpConn<C>
where
    C: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<Result<usize, io::Error>> {
        hyper::rt::Write::poll_write(self.project().inner, cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
        hyper::rt::Write::poll_flush(self.project().inner, cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
        hyper::rt::Write::poll_shutdown(self.project().inner, cx)
    }

    fn is_write_vectored(&self) -> bool {
        hyper::rt::Write::is_write_vectored(&self.inner)
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<Result<usize, io::Error>> {
        hyper::rt::Write::poll_write_vectored(self.project().inner, cx, bufs)
    }
}
