use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc, Weak,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
    time::Duration,
};

use parking_lot::Mutex;
use tokio::{sync::oneshot, time::Instant};

use super::{
    DialError, DialErrorKind, Dialer, KeepAliveConfig, TransportDialer,
    worker::{DialWorker, HandoffRequest, WorkerExit},
};
use crate::net::{DestinationKey, Network};

const WORKER_RESTART_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Default)]
/// Configuration of a [`DialCache`].
pub struct DialCacheConfig {
    stale_timeout: Option<Duration>,
    force_ipv4: bool,
    idle_timeout: Option<Duration>,
    keep_alive: KeepAliveConfig,
}

impl DialCacheConfig {
    /// Discard pre-dialed outcomes once this much time passed since their dial completed.
    ///
    /// A zero duration disables staleness checks, which is also the default.
    #[must_use]
    pub fn with_stale_timeout(mut self, timeout: Duration) -> Self {
        self.stale_timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    /// Rewrite `tcp`/`tcp6` to `tcp4` and `udp`/`udp6` to `udp4` before dialing.
    #[must_use]
    pub fn with_force_ipv4(mut self, force_ipv4: bool) -> Self {
        self.force_ipv4 = force_ipv4;
        self
    }

    /// Stop the worker of a destination that saw no acquisition for this long.
    ///
    /// A zero duration keeps workers alive forever, which is also the default.
    #[must_use]
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    /// Set the [`KeepAliveConfig`] used for byte-stream connections.
    #[must_use]
    pub fn with_keep_alive(mut self, keep_alive: KeepAliveConfig) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// The staleness timeout, `None` if disabled.
    #[must_use]
    pub fn stale_timeout(&self) -> Option<Duration> {
        self.stale_timeout
    }

    /// Whether the IPv4-only policy is applied.
    #[must_use]
    pub fn force_ipv4(&self) -> bool {
        self.force_ipv4
    }

    /// The idle worker timeout, `None` if workers are never retired.
    #[must_use]
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout
    }

    /// The [`KeepAliveConfig`] used for byte-stream connections.
    #[must_use]
    pub fn keep_alive(&self) -> KeepAliveConfig {
        self.keep_alive
    }
}

/// A connection cache that dials ahead of demand.
///
/// For every distinct [`DestinationKey`] a background worker is spawned
/// on first use. It keeps dialing that destination, one connection at a time,
/// and hands each outcome to exactly one waiting [`DialCache::acquire`] call,
/// so that the caller usually gets a connection that is already established.
///
/// At most one spare connection per destination exists at any time:
/// a worker only starts its next dial once a caller received its previous outcome.
///
/// Cloning is cheap, all clones share the same workers.
pub struct DialCache<D: Dialer = TransportDialer> {
    inner: Arc<Inner<D>>,
}

struct Inner<D: Dialer> {
    dialer: Arc<D>,
    config: DialCacheConfig,
    registry: Mutex<HashMap<DestinationKey, Lane<D::Connection>>>,
    next_lane_id: AtomicU64,
    spawned_workers: AtomicUsize,
}

/// Registry entry: the request queue of one worker.
struct Lane<C> {
    id: u64,
    requests: flume::Sender<HandoffRequest<C>>,
}

impl<C> Clone for Lane<C> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            requests: self.requests.clone(),
        }
    }
}

impl<D: Dialer> Clone for DialCache<D> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<D: Dialer> fmt::Debug for DialCache<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DialCache")
            .field("config", &self.inner.config)
            .field("lanes", &self.lane_count())
            .field("spawned_workers", &self.spawned_workers())
            .finish()
    }
}

impl DialCache {
    /// Create a new [`DialCache`] using the default [`TransportDialer`].
    #[must_use]
    pub fn new(config: DialCacheConfig) -> Self {
        Self::with_dialer(TransportDialer::default(), config)
    }
}

impl<D: Dialer> DialCache<D> {
    /// Create a new [`DialCache`] establishing its connections using the given [`Dialer`].
    pub fn with_dialer(dialer: D, config: DialCacheConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                dialer: Arc::new(dialer),
                config,
                registry: Mutex::new(HashMap::new()),
                next_lane_id: AtomicU64::new(0),
                spawned_workers: AtomicUsize::new(0),
            }),
        }
    }

    /// The [`DialCacheConfig`] this cache was created with.
    pub fn config(&self) -> &DialCacheConfig {
        &self.inner.config
    }

    /// Acquire a connection to `address` over `network`.
    ///
    /// Spawns the destination's worker if it does not exist yet and waits
    /// for its next outcome. Stale outcomes are closed and skipped.
    /// The error of a fresh failed dial is returned as-is, no retry is
    /// attempted on behalf of the caller.
    ///
    /// Dropping the returned future while it waits does not lose a pre-dialed
    /// connection, the worker hands it to the next caller instead.
    pub async fn acquire(
        &self,
        network: Network,
        address: &str,
    ) -> Result<D::Connection, DialError> {
        let key = DestinationKey::new(network, address, self.inner.config.force_ipv4());
        loop {
            let lane = self.lane(&key);
            if let Some(result) = self.take(&key, &lane).await {
                return result;
            }
            tracing::debug!(%key, "dial lane retired while waiting: respawn");
        }
    }

    /// Number of destinations that currently have a worker.
    pub fn lane_count(&self) -> usize {
        self.inner.registry.lock().len()
    }

    /// Total number of workers spawned over the lifetime of this cache.
    pub fn spawned_workers(&self) -> usize {
        self.inner.spawned_workers.load(Ordering::Acquire)
    }

    /// Get the lane for `key`, spawning its worker when absent.
    fn lane(&self, key: &DestinationKey) -> Lane<D::Connection> {
        let mut registry = self.inner.registry.lock();
        if let Some(lane) = registry.get(key) {
            return lane.clone();
        }

        let (tx, rx) = flume::unbounded();
        let lane = Lane {
            id: self.inner.next_lane_id.fetch_add(1, Ordering::Relaxed),
            requests: tx,
        };
        registry.insert(key.clone(), lane.clone());
        self.inner.spawned_workers.fetch_add(1, Ordering::AcqRel);

        let worker = DialWorker::new(
            key.clone(),
            self.inner.dialer.clone(),
            self.inner.config.clone(),
            rx,
        );
        tracing::info!(%key, lane = lane.id, "spawn dial worker");
        tokio::spawn(supervise(worker, Arc::downgrade(&self.inner), lane.id));

        lane
    }

    /// Take the next fresh outcome of a lane.
    ///
    /// Returns `None` if the lane was retired in the meantime.
    async fn take(
        &self,
        key: &DestinationKey,
        lane: &Lane<D::Connection>,
    ) -> Option<Result<D::Connection, DialError>> {
        loop {
            let (reply, outcome) = oneshot::channel();
            let outcome = match lane.requests.send(reply) {
                Ok(()) => outcome.await.ok(),
                Err(_disconnected) => None,
            };
            let Some(outcome) = outcome else {
                if self.inner.owns_lane(key, lane.id) {
                    tracing::error!(
                        %key,
                        lane = lane.id,
                        "worker of registered dial lane is gone",
                    );
                    return Some(Err(DialError::new(
                        key.clone(),
                        DialErrorKind::LaneClosed,
                    )));
                }
                return None;
            };

            if outcome.is_expired_at(Instant::now()) {
                tracing::debug!(%key, age = ?outcome.age(), "ignore dial outcome: timed out");
                drop(outcome);
                continue;
            }

            return Some(outcome.result.inspect_err(|err| {
                tracing::debug!(%key, error = %err, "dial failed");
            }));
        }
    }
}

impl<D: Dialer> Inner<D> {
    fn owns_lane(&self, key: &DestinationKey, lane_id: u64) -> bool {
        self.registry
            .lock()
            .get(key)
            .is_some_and(|lane| lane.id == lane_id)
    }

    /// Remove the registry entry of a retired lane, unless it was replaced already.
    fn retire(&self, key: &DestinationKey, lane_id: u64) {
        let mut registry = self.registry.lock();
        if registry.get(key).is_some_and(|lane| lane.id == lane_id) {
            registry.remove(key);
        }
    }
}

/// Run the worker of one lane, restarting it when it panics.
///
/// The worker (and thus the receiving end of the request queue) stays alive
/// until the lane is removed from the registry, so that consumers only ever
/// observe a closed queue for lanes that were retired.
async fn supervise<D: Dialer>(worker: DialWorker<D>, cache: Weak<Inner<D>>, lane_id: u64) {
    let worker = Arc::new(worker);
    loop {
        let handle = tokio::spawn({
            let worker = worker.clone();
            async move { worker.run().await }
        });

        match handle.await {
            Ok(WorkerExit::Idle) => {
                if let Some(cache) = cache.upgrade() {
                    cache.retire(worker.key(), lane_id);
                }
                return;
            }
            Ok(WorkerExit::Orphaned) => {
                tracing::debug!(key = %worker.key(), "dial cache dropped: stop dial worker");
                return;
            }
            Err(err) if err.is_panic() => {
                tracing::error!(key = %worker.key(), "dial worker panicked: restart");
                tokio::time::sleep(WORKER_RESTART_DELAY).await;
            }
            Err(_cancelled) => return,
        }
    }
}
