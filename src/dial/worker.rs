use std::sync::Arc;

use tokio::{sync::oneshot, time::Instant};

use super::{Connection, DialCacheConfig, DialError, DialErrorKind, Dialer, outcome::DialOutcome};
use crate::net::DestinationKey;

/// A consumer asking a worker for its next outcome.
///
/// The worker answers at most one request per outcome. A request whose
/// consumer is gone fails to receive and the outcome is kept for the next one.
pub(crate) type HandoffRequest<C> = oneshot::Sender<DialOutcome<C>>;

/// Why a [`DialWorker`] stopped running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WorkerExit {
    /// No consumer asked for the pending outcome within the idle timeout.
    Idle,
    /// Every request sender is gone, the cache was dropped.
    Orphaned,
}

/// Background worker that keeps one pre-dialed outcome ready for a single destination.
pub(crate) struct DialWorker<D: Dialer> {
    key: DestinationKey,
    dialer: Arc<D>,
    config: DialCacheConfig,
    requests: flume::Receiver<HandoffRequest<D::Connection>>,
}

impl<D: Dialer> DialWorker<D> {
    pub(crate) fn new(
        key: DestinationKey,
        dialer: Arc<D>,
        config: DialCacheConfig,
        requests: flume::Receiver<HandoffRequest<D::Connection>>,
    ) -> Self {
        Self {
            key,
            dialer,
            config,
            requests,
        }
    }

    pub(crate) fn key(&self) -> &DestinationKey {
        &self.key
    }

    /// Dial and publish, one outcome at a time, until the lane retires.
    ///
    /// The next dial only starts once the previous outcome was received
    /// by a consumer, except after a keep-alive failure which is retried immediately.
    pub(crate) async fn run(&self) -> WorkerExit {
        loop {
            let started_at = Instant::now();
            let result = self.dialer.dial(self.key.clone()).await;
            tracing::debug!(
                key = %self.key,
                elapsed = ?started_at.elapsed(),
                success = result.is_ok(),
                "finished dial",
            );

            let result = match result {
                Ok(conn) => match self.enable_keep_alive(conn) {
                    Ok(conn) => Ok(conn),
                    Err(err) => {
                        tracing::warn!(
                            key = %self.key,
                            error = %err,
                            "connection closed: failed to enable keep-alive; dial again",
                        );
                        let outcome =
                            DialOutcome::new(Err(err), started_at, self.config.stale_timeout());
                        if let Some(exit) = self.offer_failure(outcome) {
                            return exit;
                        }
                        tokio::task::yield_now().await;
                        continue;
                    }
                },
                Err(err) => Err(DialError::new(
                    self.key.clone(),
                    DialErrorKind::Connect(err),
                )),
            };

            let outcome = DialOutcome::new(result, started_at, self.config.stale_timeout());
            if let Some(exit) = self.publish(outcome).await {
                return exit;
            }
        }
    }

    fn enable_keep_alive(&self, conn: D::Connection) -> Result<D::Connection, DialError> {
        let result = conn
            .as_keep_alive()
            .map(|keep_alive| keep_alive.enable_keep_alive(&self.config.keep_alive()));
        match result {
            Some(Err(err)) => {
                drop(conn);
                Err(DialError::new(
                    self.key.clone(),
                    DialErrorKind::KeepAlive(err),
                ))
            }
            Some(Ok(())) | None => Ok(conn),
        }
    }

    /// Hand a keep-alive failure to a consumer that is waiting right now, if any.
    fn offer_failure(&self, outcome: DialOutcome<D::Connection>) -> Option<WorkerExit> {
        match self.requests.try_recv() {
            Ok(reply) => {
                if reply.send(outcome).is_err() {
                    tracing::trace!(key = %self.key, "consumer gone: drop keep-alive failure");
                }
                None
            }
            Err(flume::TryRecvError::Empty) => None,
            Err(flume::TryRecvError::Disconnected) => Some(WorkerExit::Orphaned),
        }
    }

    /// Wait until a consumer received the outcome.
    ///
    /// Returns `Some` when the worker has to stop instead,
    /// in which case the outcome is dropped.
    async fn publish(&self, mut outcome: DialOutcome<D::Connection>) -> Option<WorkerExit> {
        loop {
            let reply = match self.next_request().await {
                Ok(reply) => reply,
                Err(exit) => return Some(exit),
            };
            match reply.send(outcome) {
                Ok(()) => return None,
                Err(unclaimed) => {
                    tracing::trace!(key = %self.key, "consumer gone: keep outcome for the next");
                    outcome = unclaimed;
                }
            }
        }
    }

    async fn next_request(&self) -> Result<HandoffRequest<D::Connection>, WorkerExit> {
        let recv = self.requests.recv_async();
        let result = match self.config.idle_timeout() {
            Some(idle_timeout) => match tokio::time::timeout(idle_timeout, recv).await {
                Ok(result) => result,
                Err(_elapsed) => {
                    tracing::info!(
                        key = %self.key,
                        ?idle_timeout,
                        "retire idle dial worker",
                    );
                    return Err(WorkerExit::Idle);
                }
            },
            None => recv.await,
        };
        result.map_err(|_disconnected| WorkerExit::Orphaned)
    }
}
