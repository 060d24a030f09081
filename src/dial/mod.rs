//! Pre-dialing connection cache.
//!
//! A [`DialCache`] runs one background worker per destination,
//! which establishes the next connection before it is asked for.
//! Callers [`acquire`] connections and mostly receive one that is
//! already connected, hiding the connect latency.
//!
//! [`acquire`]: DialCache::acquire
//!
//! # Example
//!
//! ```no_run
//! use predial::{dial::{DialCache, DialCacheConfig}, net::Network};
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), predial::dial::DialError> {
//! let cache = DialCache::new(
//!     DialCacheConfig::default().with_stale_timeout(Duration::from_secs(30)),
//! );
//! let stream = cache.acquire(Network::Tcp, "example.com:80").await?;
//! # drop(stream);
//! # Ok(())
//! # }
//! ```

mod cache;
#[doc(inline)]
pub use cache::{DialCache, DialCacheConfig};

mod dialer;
#[doc(inline)]
pub use dialer::{Connection, Dialer, KeepAlive, KeepAliveConfig, TransportDialer};

mod error;
#[doc(inline)]
pub use error::{DialError, DialErrorKind};

mod stream;
#[doc(inline)]
pub use stream::TransportStream;

mod outcome;
mod worker;
