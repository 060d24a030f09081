use bytes::Bytes;
use http::{Request, Response, StatusCode, Uri, header, uri::Scheme};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::Client,
    rt::{TokioExecutor, TokioTimer},
};
use tokio::io::{AsyncRead, AsyncWrite};

use super::{
    ProxyBody, ProxyConfig, empty, full,
    connector::DialConnector,
    headers::{remove_hop_by_hop_request_headers, remove_hop_by_hop_response_headers},
};
use crate::dial::{DialCache, Dialer};

/// Pass-through for all non-CONNECT proxy requests.
///
/// Requests are sent upstream by a pooling http/1.1 client,
/// whose connections come from the [`DialCache`]. For `https` upstreams
/// the tls handshake runs over the cached connection.
/// Upstream responses, redirects included, are returned as received.
pub struct Forwarder<D: Dialer> {
    client: Client<DialConnector<D>, Incoming>,
}

impl<D: Dialer> Clone for Forwarder<D> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
        }
    }
}

impl<D: Dialer> std::fmt::Debug for Forwarder<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Forwarder").finish_non_exhaustive()
    }
}

impl<D> Forwarder<D>
where
    D: Dialer,
    D::Connection: AsyncRead + AsyncWrite + Unpin,
{
    /// Create a new [`Forwarder`] for the given cache.
    pub fn new(cache: DialCache<D>, config: &ProxyConfig) -> Self {
        let client = Client::builder(TokioExecutor::new())
            .pool_timer(TokioTimer::new())
            .pool_max_idle_per_host(config.pool_max_idle_per_host())
            .pool_idle_timeout(config.pool_idle_timeout())
            .build(DialConnector::new(cache, config.tls_client_config()));
        Self { client }
    }

    /// Forward a (non-CONNECT) proxy request and return the upstream response.
    ///
    /// Requests in origin form are treated as transparent proxy requests,
    /// addressed to the `Host` header over plain http.
    pub async fn forward(&self, req: Request<Incoming>) -> Response<ProxyBody> {
        let (mut parts, body) = req.into_parts();

        parts.uri = match absolute_uri(&parts) {
            Ok(uri) => uri,
            Err(reason) => {
                tracing::debug!(uri = %parts.uri, reason, "reject proxy request");
                return text_response(StatusCode::BAD_REQUEST, reason);
            }
        };
        remove_hop_by_hop_request_headers(&mut parts.headers);

        let method = parts.method.clone();
        let uri = parts.uri.clone();
        let started_at = tokio::time::Instant::now();

        match self.client.request(Request::from_parts(parts, body)).await {
            Ok(resp) => {
                tracing::debug!(
                    %method,
                    %uri,
                    status = resp.status().as_u16(),
                    elapsed = ?started_at.elapsed(),
                    "forwarded request",
                );
                let (mut parts, body) = resp.into_parts();
                remove_hop_by_hop_response_headers(&mut parts.headers);
                Response::from_parts(parts, body.boxed())
            }
            Err(err) => {
                tracing::error!(%method, %uri, error = %err, "forward request");
                let mut resp = Response::new(empty());
                *resp.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                resp
            }
        }
    }
}

/// Make the request uri absolute, or explain why it can't be forwarded.
fn absolute_uri(parts: &http::request::Parts) -> Result<Uri, &'static str> {
    match parts.uri.scheme() {
        Some(scheme) if *scheme == Scheme::HTTP || *scheme == Scheme::HTTPS => {
            if parts.uri.authority().is_none() {
                return Err("request uri has no authority");
            }
            return Ok(parts.uri.clone());
        }
        Some(_) => return Err("only http and https upstreams are supported"),
        None => (),
    }

    let host = parts
        .headers
        .get(header::HOST)
        .and_then(|host| host.to_str().ok())
        .ok_or("request has no scheme and no Host header")?;
    let path_and_query = parts
        .uri
        .path_and_query()
        .map_or("/", |path_and_query| path_and_query.as_str());

    Uri::builder()
        .scheme(Scheme::HTTP)
        .authority(host)
        .path_and_query(path_and_query)
        .build()
        .map_err(|_invalid| "invalid Host header")
}

fn text_response(status: StatusCode, text: &'static str) -> Response<ProxyBody> {
    let mut resp = Response::new(full(Bytes::from_static(text.as_bytes())));
    *resp.status_mut() = status;
    resp
}
