//! Forward HTTP proxy with a pre-dialing connection cache.
//!
//! For every distinct destination a background worker keeps one freshly
//! established connection ready, so that proxy requests are usually served
//! without waiting for the connect to complete.
//!
//! - [`dial`]: the [`DialCache`](dial::DialCache) and its dial workers,
//!   the [`Dialer`](dial::Dialer) abstraction and the default transport dialer;
//! - [`net`]: networks and [`DestinationKey`](net::DestinationKey)s;
//! - [`proxy`]: the http proxy front end, CONNECT tunnels and the
//!   pass-through forwarder;
//! - [`error`]: error utilities.
//!
//! # Example
//!
//! ```no_run
//! use predial::{
//!     dial::{DialCache, DialCacheConfig},
//!     proxy::{ProxyConfig, ProxyServer},
//! };
//! use std::time::Duration;
//!
//! # async fn run() -> std::io::Result<()> {
//! let cache = DialCache::new(
//!     DialCacheConfig::default().with_stale_timeout(Duration::from_secs(30)),
//! );
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:3129").await?;
//! ProxyServer::new(cache, &ProxyConfig::default())
//!     .serve(listener)
//!     .await;
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod dial;
pub mod error;
pub mod net;
pub mod proxy;
