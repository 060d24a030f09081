//! HTTP forward proxy front end.
//!
//! The [`ProxyServer`] accepts HTTP/1.1 proxy requests:
//!
//! - `CONNECT host:port` acquires a tcp connection from the [`DialCache`]
//!   and [`relay`]s raw bytes between client and destination;
//! - any other method is passed through by the [`Forwarder`],
//!   a pooling http client whose connections also come from the [`DialCache`]
//!   (with tls on top for `https` upstreams).
//!
//! [`DialCache`]: crate::dial::DialCache

use std::{
    convert::Infallible,
    sync::{Arc, OnceLock},
    time::Duration,
};

use bytes::Bytes;
use http_body_util::{BodyExt, Empty, Full, combinators::BoxBody};
use rustls::{ClientConfig, RootCertStore};

mod connector;
#[doc(inline)]
pub use connector::{DialConnector, HttpConn};

mod forward;
#[doc(inline)]
pub use forward::Forwarder;

mod headers;

mod server;
#[doc(inline)]
pub use server::ProxyServer;

mod tunnel;
#[doc(inline)]
pub use tunnel::{RelayStats, relay};

/// Body type of all responses produced by the proxy.
pub type ProxyBody = BoxBody<Bytes, hyper::Error>;

const DEFAULT_POOL_MAX_IDLE_PER_HOST: usize = 64;
const DEFAULT_POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
/// Configuration of the pass-through [`Forwarder`] and its idle connection pool.
pub struct ProxyConfig {
    pool_max_idle_per_host: usize,
    pool_idle_timeout: Option<Duration>,
    tls_client_config: Arc<ClientConfig>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            pool_max_idle_per_host: DEFAULT_POOL_MAX_IDLE_PER_HOST,
            pool_idle_timeout: Some(DEFAULT_POOL_IDLE_TIMEOUT),
            tls_client_config: default_tls_client_config(),
        }
    }
}

impl ProxyConfig {
    /// Maximum number of idle upstream connections kept per host (default: 64).
    #[must_use]
    pub fn with_pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.pool_max_idle_per_host = max;
        self
    }

    /// Close idle upstream connections after this long (default: 5 minutes).
    ///
    /// A zero duration keeps idle connections around until the upstream closes them.
    #[must_use]
    pub fn with_pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool_idle_timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    /// Use the given rustls client config for `https` upstreams.
    ///
    /// By default the webpki root certificates are trusted.
    #[must_use]
    pub fn with_tls_client_config(mut self, config: Arc<ClientConfig>) -> Self {
        self.tls_client_config = config;
        self
    }

    /// Maximum number of idle upstream connections kept per host.
    #[must_use]
    pub fn pool_max_idle_per_host(&self) -> usize {
        self.pool_max_idle_per_host
    }

    /// Idle timeout of pooled upstream connections, `None` if unlimited.
    #[must_use]
    pub fn pool_idle_timeout(&self) -> Option<Duration> {
        self.pool_idle_timeout
    }

    /// The rustls client config used for `https` upstreams.
    #[must_use]
    pub fn tls_client_config(&self) -> Arc<ClientConfig> {
        self.tls_client_config.clone()
    }
}

fn default_tls_client_config() -> Arc<ClientConfig> {
    static CONFIG: OnceLock<Arc<ClientConfig>> = OnceLock::new();
    CONFIG
        .get_or_init(|| {
            let mut root_storage = RootCertStore::empty();
            root_storage.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            Arc::new(
                ClientConfig::builder()
                    .with_root_certificates(root_storage)
                    .with_no_client_auth(),
            )
        })
        .clone()
}

fn empty() -> ProxyBody {
    Empty::<Bytes>::new()
        .map_err(|never: Infallible| match never {})
        .boxed()
}

fn full(chunk: Bytes) -> ProxyBody {
    Full::new(chunk)
        .map_err(|never: Infallible| match never {})
        .boxed()
}
