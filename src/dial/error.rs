use std::{fmt, io};

use crate::net::DestinationKey;

#[derive(Debug)]
/// Error returned by [`DialCache::acquire`] when no connection could be handed out.
///
/// [`DialCache::acquire`]: super::DialCache::acquire
pub struct DialError {
    key: DestinationKey,
    kind: DialErrorKind,
}

#[derive(Debug)]
/// The reason a [`DialError`] occurred.
pub enum DialErrorKind {
    /// Establishing the transport connection failed:
    /// refused, unreachable, timed out or the address failed to resolve.
    Connect(io::Error),
    /// The connection was established but keep-alive probing
    /// could not be enabled on it. The connection was closed.
    KeepAlive(io::Error),
    /// The worker of a still registered lane is gone.
    ///
    /// This is never expected to happen and indicates a bug.
    LaneClosed,
}

impl DialError {
    pub(crate) fn new(key: DestinationKey, kind: DialErrorKind) -> Self {
        Self { key, kind }
    }

    /// The destination the failed dial was for.
    #[must_use]
    pub fn key(&self) -> &DestinationKey {
        &self.key
    }

    /// The reason this dial failed.
    #[must_use]
    pub fn kind(&self) -> &DialErrorKind {
        &self.kind
    }

    /// The underlying I/O error, if any.
    #[must_use]
    pub fn io_error(&self) -> Option<&io::Error> {
        match &self.kind {
            DialErrorKind::Connect(err) | DialErrorKind::KeepAlive(err) => Some(err),
            DialErrorKind::LaneClosed => None,
        }
    }
}

impl fmt::Display for DialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            DialErrorKind::Connect(err) => write!(f, "dial {}: {err}", self.key),
            DialErrorKind::KeepAlive(err) => {
                write!(f, "enable keep-alive for {}: {err}", self.key)
            }
            DialErrorKind::LaneClosed => write!(f, "dial lane {} closed unexpectedly", self.key),
        }
    }
}

impl std::error::Error for DialError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.io_error().map(|err| err as &(dyn std::error::Error + 'static))
    }
}
