use std::{convert::Infallible, io, pin::pin, time::Duration};

use bytes::Bytes;
use http::{Method, Request, Response, StatusCode};
use hyper::{body::Incoming, server::conn::http1, service::service_fn, upgrade::OnUpgrade};
use hyper_util::rt::TokioIo;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{TcpListener, TcpStream},
    time::Instant,
};
use tokio_graceful::ShutdownGuard;

use super::{ProxyBody, ProxyConfig, empty, forward::Forwarder, full, tunnel::relay};
use crate::{
    dial::{DialCache, Dialer},
    net::{Network, conn::is_connection_error},
};

/// HTTP/1.1 forward proxy served on top of a [`DialCache`].
///
/// `CONNECT host:port` requests are answered with `200` once a connection
/// to the destination was acquired from the cache, after which bytes are
/// relayed as-is. All other requests are passed through by the [`Forwarder`].
pub struct ProxyServer<D: Dialer> {
    cache: DialCache<D>,
    forwarder: Forwarder<D>,
}

impl<D: Dialer> Clone for ProxyServer<D> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            forwarder: self.forwarder.clone(),
        }
    }
}

impl<D: Dialer> std::fmt::Debug for ProxyServer<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyServer")
            .field("cache", &self.cache)
            .field("forwarder", &self.forwarder)
            .finish()
    }
}

impl<D> ProxyServer<D>
where
    D: Dialer,
    D::Connection: AsyncRead + AsyncWrite + Unpin,
{
    /// Create a new [`ProxyServer`] using the given cache for tunnels and forwarding.
    pub fn new(cache: DialCache<D>, config: &ProxyConfig) -> Self {
        let forwarder = Forwarder::new(cache.clone(), config);
        Self { cache, forwarder }
    }

    /// Serve proxy connections accepted on the given listener, forever.
    pub async fn serve(self, listener: TcpListener) {
        self.serve_inner(listener, None).await;
    }

    /// Serve proxy connections accepted on the given listener until shutdown.
    ///
    /// On shutdown no more connections are accepted, and open ones are
    /// asked to finish their in-flight request and close.
    pub async fn serve_graceful(self, guard: ShutdownGuard, listener: TcpListener) {
        self.serve_inner(listener, Some(guard)).await;
    }

    async fn serve_inner(self, listener: TcpListener, guard: Option<ShutdownGuard>) {
        let mut cancelled = pin!(cancelled(guard.clone()));
        loop {
            tokio::select! {
                () = cancelled.as_mut() => {
                    tracing::trace!("signal received: stop accepting proxy connections");
                    return;
                }
                result = listener.accept() => match result {
                    Ok((stream, peer_addr)) => {
                        tracing::trace!(%peer_addr, "accepted proxy connection");
                        let server = self.clone();
                        let conn_guard = guard.clone();
                        spawn(
                            guard.as_ref(),
                            async move { server.serve_connection(stream, conn_guard).await },
                        );
                    }
                    Err(err) => handle_accept_err(err).await,
                },
            }
        }
    }

    async fn serve_connection(self, stream: TcpStream, guard: Option<ShutdownGuard>) {
        let peer_addr = stream.peer_addr().ok();
        let service_guard = guard.clone();
        let service = service_fn(move |req| {
            let server = self.clone();
            let guard = service_guard.clone();
            async move { Ok::<_, Infallible>(server.handle(req, guard.as_ref()).await) }
        });

        let conn = http1::Builder::new()
            .preserve_header_case(true)
            .serve_connection(TokioIo::new(stream), service)
            .with_upgrades();
        let mut conn = pin!(conn);

        let result = tokio::select! {
            result = conn.as_mut() => result,
            () = cancelled(guard) => {
                conn.as_mut().graceful_shutdown();
                conn.await
            }
        };
        if let Err(err) = result {
            tracing::debug!(?peer_addr, error = %err, "proxy connection ended with error");
        }
    }

    async fn handle(
        &self,
        req: Request<Incoming>,
        guard: Option<&ShutdownGuard>,
    ) -> Response<ProxyBody> {
        if req.method() == Method::CONNECT {
            self.connect(req, guard).await
        } else {
            self.forwarder.forward(req).await
        }
    }

    async fn connect(
        &self,
        mut req: Request<Incoming>,
        guard: Option<&ShutdownGuard>,
    ) -> Response<ProxyBody> {
        let Some(authority) = req.uri().authority().map(|authority| authority.to_string()) else {
            tracing::debug!(uri = %req.uri(), "reject CONNECT without authority");
            return status_response(StatusCode::BAD_REQUEST, empty());
        };
        let Some(on_upgrade) = req.extensions_mut().remove::<OnUpgrade>() else {
            tracing::error!(%authority, "CONNECT connection cannot be taken over");
            return status_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                full(Bytes::from_static(b"proxy connection cannot be hijacked")),
            );
        };

        let started_at = Instant::now();
        let remote = match self.cache.acquire(Network::Tcp, &authority).await {
            Ok(remote) => remote,
            Err(err) => {
                tracing::debug!(%authority, error = %err, "CONNECT dial failed");
                return status_response(
                    StatusCode::SERVICE_UNAVAILABLE,
                    full(Bytes::from(err.to_string())),
                );
            }
        };
        tracing::info!(%authority, elapsed = ?started_at.elapsed(), "CONNECT tunnel ready");

        spawn(guard, async move {
            match on_upgrade.await {
                Ok(upgraded) => {
                    let stats = relay(TokioIo::new(upgraded), remote).await;
                    tracing::debug!(
                        %authority,
                        client_to_remote = stats.client_to_remote,
                        remote_to_client = stats.remote_to_client,
                        elapsed = ?started_at.elapsed(),
                        "CONNECT tunnel closed",
                    );
                }
                Err(err) => tracing::debug!(%authority, error = %err, "CONNECT upgrade failed"),
            }
        });

        status_response(StatusCode::OK, empty())
    }
}

fn status_response(status: StatusCode, body: ProxyBody) -> Response<ProxyBody> {
    let mut resp = Response::new(body);
    *resp.status_mut() = status;
    resp
}

fn spawn<F>(guard: Option<&ShutdownGuard>, future: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    match guard {
        Some(guard) => {
            guard.spawn_task(future);
        }
        None => {
            tokio::spawn(future);
        }
    }
}

async fn cancelled(guard: Option<ShutdownGuard>) {
    match guard {
        Some(guard) => guard.cancelled().await,
        None => std::future::pending::<()>().await,
    }
}

async fn handle_accept_err(err: io::Error) {
    if is_connection_error(&err) {
        tracing::trace!(error = %err, "proxy accept error: connection error");
    } else {
        // e.g. out of file descriptors: back off before accepting again
        tracing::error!(error = %err, "proxy accept error");
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}
