//! Connection pool: at most one live QUIC connection per peer address.
//!
//! Each address maps to a [`PoolEntry`] holding a dial lock and a slot. The
//! dial lock is the dedup boundary: concurrent `get_or_dial` callers for one
//! address queue behind it, so only one of them dials. The slot lock guards
//! the bound connection and is never held across an await.
//!
//! Lock order is dial lock, then slot lock, then map shard. Eviction only
//! happens when the dial lock can be taken without waiting, so an entry
//! being dialed is never removed from under its dialer.

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use quinn::Connection;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::DEFAULT_SWEEP_INTERVAL;
use crate::connection::is_alive;
use crate::endpoint::QuicSocket;
use crate::error::{Result, TransportError};

/// Called with every connection this pool dials.
pub type NewConnHook = Arc<dyn Fn(Connection) + Send + Sync>;

#[derive(Debug)]
struct Slot {
    conn: Option<Connection>,
    created_at: Instant,
}

impl Slot {
    fn live(&self) -> Option<&Connection> {
        self.conn.as_ref().filter(|conn| is_alive(conn))
    }

    fn bind(&mut self, conn: Connection) {
        self.conn = Some(conn);
        self.created_at = Instant::now();
    }
}

#[derive(Debug)]
struct PoolEntry {
    dial: tokio::sync::Mutex<()>,
    slot: Mutex<Slot>,
}

impl PoolEntry {
    fn new() -> Self {
        Self {
            dial: tokio::sync::Mutex::new(()),
            slot: Mutex::new(Slot {
                conn: None,
                created_at: Instant::now(),
            }),
        }
    }

    fn live_conn(&self) -> Option<Connection> {
        self.slot.lock().live().cloned()
    }
}

/// Outcome of binding a dialed connection.
enum Binding {
    Bound,
    Existing(Connection),
    Detached,
}

/// Pool of QUIC connections keyed by textual peer address.
pub struct ConnPool {
    socket: QuicSocket,
    entries: DashMap<String, Arc<PoolEntry>>,
    on_new_conn: Option<NewConnHook>,
    max_age: Duration,
    shutdown: CancellationToken,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for ConnPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnPool")
            .field("local_addr", &self.socket.local_addr())
            .field("entries", &self.entries.len())
            .field("max_age", &self.max_age)
            .finish_non_exhaustive()
    }
}

impl ConnPool {
    /// Create a pool dialing through `socket` and start its sweep loop.
    ///
    /// `max_age` of zero disables age eviction; a zero `sweep_interval` means
    /// [`DEFAULT_SWEEP_INTERVAL`]. `on_new_conn` runs for every
    /// connection the pool dials; inbound connections are handed to
    /// [`add_inbound`](Self::add_inbound) by the accept path instead.
    pub fn new(
        socket: QuicSocket,
        max_age: Duration,
        sweep_interval: Duration,
        on_new_conn: Option<NewConnHook>,
    ) -> Arc<Self> {
        let pool = Arc::new(Self {
            socket,
            entries: DashMap::new(),
            on_new_conn,
            max_age,
            shutdown: CancellationToken::new(),
            sweeper: Mutex::new(None),
        });

        let handle = tokio::spawn(sweep_loop(
            Arc::downgrade(&pool),
            pool.shutdown.clone(),
            sweep_period(sweep_interval),
        ));
        *pool.sweeper.lock() = Some(handle);

        pool
    }

    /// The live connection for `addr`, if any. Never dials.
    ///
    /// A dead entry is evicted on the way out, unless someone is dialing it.
    pub fn get_connection(&self, addr: &str) -> Option<Connection> {
        let entry = self.entry(addr)?;
        if let Some(conn) = entry.live_conn() {
            return Some(conn);
        }

        if let Ok(_dialing) = entry.dial.try_lock() {
            let slot = entry.slot.lock();
            if slot.live().is_none() {
                self.entries
                    .remove_if(addr, |_, current| Arc::ptr_eq(current, &entry));
            }
        }
        None
    }

    /// The live connection for `addr`, dialing one if needed.
    ///
    /// Concurrent callers for the same address share one dial. `cancel`
    /// aborts both the wait for the dial lock and the dial itself. On dial
    /// failure the entry is left for a later caller to retry or evict.
    pub async fn get_or_dial(&self, cancel: &CancellationToken, addr: &str) -> Result<Connection> {
        if self.shutdown.is_cancelled() || cancel.is_cancelled() {
            return Err(TransportError::Shutdown);
        }
        if let Some(conn) = self.get_connection(addr) {
            return Ok(conn);
        }

        let remote = self.socket.resolve(addr).await?;
        let server_name = remote.ip().to_string();

        loop {
            let entry = Arc::clone(
                self.entries
                    .entry(addr.to_owned())
                    .or_insert_with(|| Arc::new(PoolEntry::new()))
                    .value(),
            );

            let _dialing = tokio::select! {
                guard = entry.dial.lock() => guard,
                () = cancel.cancelled() => return Err(TransportError::Shutdown),
                () = self.shutdown.cancelled() => return Err(TransportError::Shutdown),
            };

            // Evicted while we waited; start over with whatever is current.
            if !self.is_current(addr, &entry) {
                continue;
            }

            if let Some(conn) = entry.live_conn() {
                return Ok(conn);
            }

            let conn = tokio::select! {
                result = self.socket.dial(cancel, remote, &server_name) => result?,
                () = self.shutdown.cancelled() => return Err(TransportError::Shutdown),
            };

            match self.bind_dialed(addr, &entry, &conn) {
                Binding::Bound => {}
                Binding::Existing(existing) => {
                    debug!(peer = %addr, "inbound connection won dial race");
                    conn.close(0u32.into(), b"duplicate connection");
                    return Ok(existing);
                }
                Binding::Detached => {
                    debug!(peer = %addr, "entry closed during dial, redialing");
                    conn.close(0u32.into(), b"connection closed");
                    continue;
                }
            }

            debug!(peer = %addr, "pooled outbound connection");
            if let Some(hook) = &self.on_new_conn {
                hook(conn.clone());
            }
            return Ok(conn);
        }
    }

    /// Bind a freshly dialed connection into `entry`.
    ///
    /// An inbound connection from the same peer may have landed while we
    /// dialed; the first live connection wins. An entry removed by
    /// [`close_connection`](Self::close_connection) mid-dial is not bound.
    fn bind_dialed(&self, addr: &str, entry: &Arc<PoolEntry>, conn: &Connection) -> Binding {
        let mut slot = entry.slot.lock();
        if !self.is_current(addr, entry) {
            return Binding::Detached;
        }
        if let Some(existing) = slot.live() {
            return Binding::Existing(existing.clone());
        }
        slot.bind(conn.clone());
        Binding::Bound
    }

    /// Remove and close the connection for `addr`. No-op if absent.
    pub fn close_connection(&self, addr: &str) {
        if let Some((_, entry)) = self.entries.remove(addr) {
            if let Some(conn) = entry.slot.lock().conn.take() {
                conn.close(0u32.into(), b"connection closed");
            }
        }
    }

    /// Register a connection accepted by the listener, keyed by its remote
    /// address.
    ///
    /// An existing live connection for the same address is kept and the
    /// inbound one is left out of the pool. The inbound connection is not
    /// closed: the peer may be using it as its own pooled connection, and
    /// its receive loops still deliver traffic until it idles out.
    pub fn add_inbound(&self, conn: Connection) {
        let addr = conn.remote_address().to_string();

        loop {
            let entry = Arc::clone(
                self.entries
                    .entry(addr.clone())
                    .or_insert_with(|| Arc::new(PoolEntry::new()))
                    .value(),
            );

            let mut slot = entry.slot.lock();
            if !self.is_current(&addr, &entry) {
                continue;
            }

            if slot.live().is_some() {
                debug!(peer = %addr, "keeping existing connection over inbound duplicate");
                return;
            }

            slot.bind(conn);
            debug!(peer = %addr, "pooled inbound connection");
            return;
        }
    }

    /// Call `f` with every live connection until it returns `false`.
    ///
    /// Dead entries are skipped and left in place.
    pub fn range<F>(&self, mut f: F)
    where
        F: FnMut(&str, &Connection) -> bool,
    {
        for (addr, entry) in self.snapshot() {
            let Some(conn) = entry.live_conn() else {
                continue;
            };
            if !f(&addr, &conn) {
                break;
            }
        }
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.snapshot()
            .iter()
            .filter(|(_, entry)| entry.live_conn().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evict dead entries and close connections older than the max age.
    pub fn sweep(&self) {
        for (addr, entry) in self.snapshot() {
            let Ok(_dialing) = entry.dial.try_lock() else {
                continue;
            };
            let mut slot = entry.slot.lock();

            let expired = match slot.live() {
                None => false,
                Some(_) if self.max_age.is_zero() => continue,
                Some(_) if slot.created_at.elapsed() > self.max_age => true,
                Some(_) => continue,
            };

            if expired {
                if let Some(conn) = slot.conn.take() {
                    info!(peer = %addr, max_age = ?self.max_age, "closing connection past max age");
                    conn.close(0u32.into(), b"max connection age exceeded");
                }
            }
            self.entries
                .remove_if(&addr, |_, current| Arc::ptr_eq(current, &entry));
        }
    }

    /// Stop the sweep loop, close every connection, and empty the pool.
    pub async fn close(&self) {
        self.shutdown.cancel();

        for (_, entry) in self.snapshot() {
            if let Some(conn) = entry.slot.lock().conn.take() {
                conn.close(0u32.into(), b"transport shutdown");
            }
        }
        self.entries.clear();

        let sweeper = self.sweeper.lock().take();
        if let Some(handle) = sweeper {
            if let Err(e) = handle.await {
                warn!(error = %e, "pool sweeper panicked");
            }
        }
    }

    fn entry(&self, addr: &str) -> Option<Arc<PoolEntry>> {
        self.entries.get(addr).map(|entry| Arc::clone(entry.value()))
    }

    fn is_current(&self, addr: &str, entry: &Arc<PoolEntry>) -> bool {
        self.entry(addr)
            .is_some_and(|current| Arc::ptr_eq(&current, entry))
    }

    /// Copy of the map so no shard lock is held while touching entries.
    fn snapshot(&self) -> Vec<(String, Arc<PoolEntry>)> {
        self.entries
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect()
    }
}

fn sweep_period(interval: Duration) -> Duration {
    if interval.is_zero() {
        DEFAULT_SWEEP_INTERVAL
    } else {
        interval
    }
}

async fn sweep_loop(pool: Weak<ConnPool>, shutdown: CancellationToken, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            () = shutdown.cancelled() => break,
        }
        let Some(pool) = pool.upgrade() else {
            break;
        };
        pool.sweep();
    }
    debug!("pool sweeper stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_sweep_interval_falls_back_to_default() {
        assert_eq!(sweep_period(Duration::ZERO), DEFAULT_SWEEP_INTERVAL);
    }

    #[test]
    fn explicit_sweep_interval_is_kept() {
        let period = Duration::from_millis(250);
        assert_eq!(sweep_period(period), period);
    }

    #[tokio::test]
    async fn sweep_loop_survives_zero_interval() {
        // `tokio::time::interval` panics on a zero period.
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(sweep_loop(
            Weak::new(),
            shutdown.clone(),
            sweep_period(Duration::ZERO),
        ));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished(), "sweeper should still be waiting for its first tick");

        shutdown.cancel();
        handle.await.expect("sweeper must not panic");
    }
}
