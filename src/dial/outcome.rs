use std::time::Duration;

use tokio::time::Instant;

use super::DialError;

/// The result of a single dial attempt, as handed from a dial worker to one consumer.
///
/// Never mutated once produced. A carried connection is owned by whoever
/// takes the outcome; dropping the outcome closes it.
#[derive(Debug)]
pub(crate) struct DialOutcome<C> {
    pub(crate) result: Result<C, DialError>,
    pub(crate) started_at: Instant,
    pub(crate) expires_at: Option<Instant>,
}

impl<C> DialOutcome<C> {
    /// Create an outcome for a dial attempt started at `started_at`.
    ///
    /// The expiry is fixed here, at completion of the dial,
    /// as "now + `stale_timeout`". Without a timeout, or when that instant
    /// is not representable, the outcome never expires.
    pub(crate) fn new(
        result: Result<C, DialError>,
        started_at: Instant,
        stale_timeout: Option<Duration>,
    ) -> Self {
        let expires_at = stale_timeout.and_then(|timeout| Instant::now().checked_add(timeout));
        Self {
            result,
            started_at,
            expires_at,
        }
    }

    /// Returns `true` once the expiry instant has passed at `now`.
    pub(crate) fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }

    /// Time elapsed since the dial attempt was started.
    pub(crate) fn age(&self) -> Duration {
        self.started_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dial::DialErrorKind,
        net::{DestinationKey, Network},
    };

    fn failed() -> Result<(), DialError> {
        Err(DialError::new(
            DestinationKey::new(Network::Tcp, "example.com:80", false),
            DialErrorKind::Connect(std::io::ErrorKind::ConnectionRefused.into()),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_outcome_without_timeout_never_expires() {
        let outcome = DialOutcome::new(Ok(()), Instant::now(), None);
        tokio::time::advance(Duration::from_secs(24 * 60 * 60)).await;
        assert!(!outcome.is_expired_at(Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_outcome_expires_relative_to_dial_completion() {
        let started_at = Instant::now();
        tokio::time::advance(Duration::from_secs(3)).await;

        // dial took 3s, expiry counts from completion
        let outcome = DialOutcome::new(Ok(()), started_at, Some(Duration::from_secs(5)));
        assert_eq!(outcome.age(), Duration::from_secs(3));

        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(!outcome.is_expired_at(Instant::now()));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(outcome.is_expired_at(Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_outcome_expires_too() {
        let outcome = DialOutcome::new(failed(), Instant::now(), Some(Duration::from_secs(1)));
        assert!(!outcome.is_expired_at(Instant::now()));
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(outcome.is_expired_at(Instant::now()));
    }
}
