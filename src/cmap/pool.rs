//! Bounded, per-server connection pool.
//!
//! A `Mutex`-guarded inner `Pool` plus a `Condvar` for waiters, a LIFO
//! `Vec` of idle connections, and a generation counter bumped on `clear()`
//! so stale in-flight checkouts are discarded on checkin rather than
//! pushed back into a cleared pool. `checkout`'s loop — pop-available,
//! else-connect-if-under-size, else-wait — also enforces a wait-queue-size
//! cap and idle/life-time eviction.

use std::{
    sync::{
        atomic::{AtomicI32, AtomicI64, Ordering},
        Arc, Condvar, Mutex,
    },
    thread,
    time::{Duration, Instant},
};

use crate::{
    error::{ErrorKind, Result},
    options::ServerAddress,
    trace::{trace_event, CMAP_TRACING_EVENT_TARGET},
};

use super::{
    conn::Connection,
    options::{ConnectionPoolOptions, DEFAULT_MAINTENANCE_FREQUENCY},
};

#[derive(Debug)]
struct Inner {
    available: Vec<Connection>,
    total: u32,
    waiters: u32,
    generation: u64,
    closed: bool,
}

/// A bounded multiset of `Connection`s keyed to one `ServerAddress`
///. Cloning shares the same underlying pool — clones are
/// cheap handles, not independent pools.
#[derive(Clone, Debug)]
pub(crate) struct ConnectionPool {
    address: ServerAddress,
    options: ConnectionPoolOptions,
    inner: Arc<Mutex<Inner>>,
    available_signal: Arc<Condvar>,
    /// Wakes the maintenance thread promptly on `close()`, kept separate
    /// from `available_signal` so a maintenance-thread wakeup never steals
    /// a notification meant for a blocked `checkout()` waiter.
    maintenance_signal: Arc<Condvar>,
    /// The most recently published `ServerDescription`'s framing limits,
    /// enforced on every outbound frame. Kept outside `Inner` and updated
    /// by the `Topology` whenever the `Monitor` publishes a fresh
    /// description, since these are properties of the server, not of any
    /// one `Connection` — a dedicated monitor connection observes them,
    /// not the pooled connections that actually frame requests.
    max_message_size_bytes: Arc<AtomicI32>,
    max_write_batch_size: Arc<AtomicI64>,
}

/// A checked-out connection. Returned to the pool on `Drop` unless it
/// poisoned itself or the pool generation moved on underneath it, exactly
/// as `PooledStream::drop` behaves in the prototype driver.
#[derive(Debug)]
pub(crate) struct PooledConnection {
    conn: Option<Connection>,
    pool: ConnectionPool,
    generation: u64,
}

impl PooledConnection {
    /// The originating server's current framing limits,
    /// read live from the pool rather than cached on the `Connection`
    /// itself.
    pub(crate) fn limits(&self) -> (i32, i64) {
        self.pool.limits()
    }
}

impl std::ops::Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("connection taken before drop")
    }
}

impl std::ops::DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("connection taken before drop")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let mut conn = match self.conn.take() {
            Some(conn) => conn,
            None => return,
        };

        let mut inner = match self.pool.inner.lock() {
            Ok(inner) => inner,
            Err(_) => return,
        };

        if inner.generation != self.generation || conn.has_errored() || inner.closed {
            inner.total = inner.total.saturating_sub(1);
            drop(inner);
            trace_event!(
                DEBUG,
                target: CMAP_TRACING_EVENT_TARGET,
                "discarding connection {} on checkin (stale generation or poisoned)",
                conn.id.0
            );
        } else {
            inner.available.push(conn);
            drop(inner);
            self.pool.available_signal.notify_one();
        }
    }
}

impl ConnectionPool {
    pub(crate) fn new(address: ServerAddress, options: ConnectionPoolOptions) -> Self {
        let pool = Self {
            address,
            options,
            inner: Arc::new(Mutex::new(Inner {
                available: Vec::new(),
                total: 0,
                waiters: 0,
                generation: 0,
                closed: false,
            })),
            available_signal: Arc::new(Condvar::new()),
            maintenance_signal: Arc::new(Condvar::new()),
            // Mirrors `ServerDescription::unknown`'s defaults until the
            // first successful probe publishes real values.
            max_message_size_bytes: Arc::new(AtomicI32::new(48 * 1024 * 1024)),
            max_write_batch_size: Arc::new(AtomicI64::new(1000)),
        };
        pool.spawn_maintenance_thread();
        pool
    }

    /// Records the latest server-reported framing limits, called by the
    /// `Topology` each time the `Monitor` publishes a fresh
    /// `ServerDescription` for this address.
    pub(crate) fn update_limits(&self, max_message_size_bytes: i32, max_write_batch_size: i64) {
        self.max_message_size_bytes.store(max_message_size_bytes, Ordering::Relaxed);
        self.max_write_batch_size.store(max_write_batch_size, Ordering::Relaxed);
    }

    /// The limits operations must frame outbound requests against, used
    /// by insert-batch splitting.
    pub(crate) fn limits(&self) -> (i32, i64) {
        (
            self.max_message_size_bytes.load(Ordering::Relaxed),
            self.max_write_batch_size.load(Ordering::Relaxed),
        )
    }

    /// Spawns the background maintenance task, a dedicated thread for
    /// consistency with how `Monitor` schedules its own heartbeat loop.
    /// Parks on `maintenance_signal`, which `close()` also notifies, so
    /// the thread wakes immediately on shutdown rather than waiting out a
    /// full maintenance interval.
    fn spawn_maintenance_thread(&self) {
        let pool = self.clone();
        let address = self.address.clone();
        thread::Builder::new()
            .name(format!("docflux-pool-maintenance-{address}"))
            .spawn(move || loop {
                let should_stop = {
                    let inner = pool.inner.lock().expect("pool mutex poisoned");
                    if inner.closed {
                        true
                    } else {
                        let (guard, _timeout) = pool
                            .maintenance_signal
                            .wait_timeout(inner, DEFAULT_MAINTENANCE_FREQUENCY)
                            .expect("pool mutex poisoned");
                        guard.closed
                    }
                };
                if should_stop {
                    return;
                }
                pool.run_maintenance();
            })
            .expect("failed to spawn pool maintenance thread");
    }

    pub(crate) fn address(&self) -> &ServerAddress {
        &self.address
    }

    /// Checks out a connection: pop an available one, open a fresh one if
    /// under capacity, or wait for one to free up, in that order of
    /// preference.
    pub(crate) fn checkout(&self) -> Result<PooledConnection> {
        let deadline = Instant::now() + self.options.max_wait_time;
        let mut inner = self.inner.lock().expect("pool mutex poisoned");

        loop {
            if inner.closed {
                return Err(ErrorKind::PoolClosed {
                    address: self.address.clone(),
                }
                .into());
            }

            if let Some(conn) = self.take_usable_connection(&mut inner) {
                let generation = inner.generation;
                return Ok(PooledConnection {
                    conn: Some(conn),
                    pool: self.clone(),
                    generation,
                });
            }

            if inner.total < self.options.max_pool_size {
                inner.total += 1;
                let generation = inner.generation;
                drop(inner);

                return match self.open_and_authenticate(generation) {
                    Ok(conn) => Ok(PooledConnection {
                        conn: Some(conn),
                        pool: self.clone(),
                        generation,
                    }),
                    Err(e) => {
                        let mut inner = self.inner.lock().expect("pool mutex poisoned");
                        inner.total = inner.total.saturating_sub(1);
                        drop(inner);
                        self.available_signal.notify_one();
                        Err(e)
                    }
                };
            }

            if inner.waiters >= self.options.max_wait_queue_size {
                return Err(ErrorKind::WaitQueueFull.into());
            }

            inner.waiters += 1;
            let now = Instant::now();
            if now >= deadline {
                inner.waiters -= 1;
                return Err(ErrorKind::WaitQueueTimeout.into());
            }
            let (guard, timeout_result) = self
                .available_signal
                .wait_timeout(inner, deadline - now)
                .expect("pool mutex poisoned");
            inner = guard;
            inner.waiters -= 1;
            // Whether we woke on a signal or timed out, loop back to the
            // top: it re-checks for an available connection before
            // re-checking the deadline, so a connection that was returned
            // right at the deadline is still honored.
            if timeout_result.timed_out() && inner.available.is_empty() && inner.total >= self.options.max_pool_size {
                return Err(ErrorKind::WaitQueueTimeout.into());
            }
        }
    }

    /// Opens a new connection and, if the pool was configured with a
    /// credential, authenticates it before it is ever handed out or placed
    /// in `available` — the pool never offers an unauthenticated
    /// connection to a caller. A failed handshake closes the connection
    /// and propagates the authentication error rather than caching
    /// anything.
    fn open_and_authenticate(&self, generation: u64) -> Result<Connection> {
        let mut conn = Connection::connect(&self.address, generation, &self.options)?;
        if let Some(credential) = &self.options.credential {
            crate::auth::authenticate(&mut conn, credential)?;
        }
        Ok(conn)
    }

    /// Pops an available connection that hasn't aged out, discarding (and
    /// decrementing `total` for) any that have.
    fn take_usable_connection(&self, inner: &mut Inner) -> Option<Connection> {
        while let Some(conn) = inner.available.pop() {
            if conn.is_idle(self.options.max_connection_idle_time)
                || conn.exceeds_lifetime(self.options.max_connection_life_time)
            {
                inner.total = inner.total.saturating_sub(1);
                continue;
            }
            return Some(conn);
        }
        None
    }

    /// Bumps the generation and drops all idle connections; in-flight
    /// connections are poisoned on checkin via the generation mismatch
    /// check in `PooledConnection::drop`.
    pub(crate) fn clear(&self) {
        let mut inner = self.inner.lock().expect("pool mutex poisoned");
        inner.generation += 1;
        let dropped = inner.available.len() as u32;
        inner.available.clear();
        inner.total = inner.total.saturating_sub(dropped);
        drop(inner);
        trace_event!(
            DEBUG,
            target: CMAP_TRACING_EVENT_TARGET,
            "connection pool for {} cleared",
            self.address
        );
    }

    pub(crate) fn close(&self) {
        let mut inner = self.inner.lock().expect("pool mutex poisoned");
        inner.closed = true;
        inner.available.clear();
        drop(inner);
        self.available_signal.notify_all();
        self.maintenance_signal.notify_all();
    }

    /// One step of the maintenance task: evicts idle/expired
    /// connections and tops the pool back up to `min_pool_size`. Intended
    /// to be called on a fixed interval (`DEFAULT_MAINTENANCE_FREQUENCY`)
    /// by a dedicated thread owned by the `Server`.
    pub(crate) fn run_maintenance(&self) {
        let mut inner = self.inner.lock().expect("pool mutex poisoned");
        if inner.closed {
            return;
        }

        let before = inner.available.len();
        inner.available.retain(|conn| {
            !conn.is_idle(self.options.max_connection_idle_time)
                && !conn.exceeds_lifetime(self.options.max_connection_life_time)
        });
        let evicted = before - inner.available.len();
        inner.total = inner.total.saturating_sub(evicted as u32);

        let to_open = self.options.min_pool_size.saturating_sub(inner.total);
        if to_open == 0 {
            return;
        }
        inner.total += 1;
        let generation = inner.generation;
        drop(inner);

        match self.open_and_authenticate(generation) {
            Ok(conn) => {
                let mut inner = self.inner.lock().expect("pool mutex poisoned");
                if inner.generation == generation && !inner.closed {
                    inner.available.push(conn);
                } else {
                    inner.total = inner.total.saturating_sub(1);
                }
            }
            Err(_) => {
                let mut inner = self.inner.lock().expect("pool mutex poisoned");
                inner.total = inner.total.saturating_sub(1);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn test_options() -> ConnectionPoolOptions {
        ConnectionPoolOptions {
            max_pool_size: 2,
            min_pool_size: 0,
            max_wait_queue_size: 1,
            max_wait_time: Duration::from_millis(50),
            max_connection_idle_time: None,
            max_connection_life_time: None,
            connect_timeout: Duration::from_millis(50),
            socket_timeout: None,
            socket_keep_alive: false,
            credential: None,
        }
    }

    #[test]
    fn checkout_fails_fast_when_server_is_unreachable() {
        // Port 0 never accepts connections; this exercises the
        // `total`-decrement-on-connect-failure path without a real server.
        let pool = ConnectionPool::new(ServerAddress::new("127.0.0.1", Some(1)), test_options());
        let err = pool.checkout().unwrap_err();
        assert!(matches!(
            err.kind(),
            ErrorKind::SocketOpenTimeout { .. } | ErrorKind::Socket { .. }
        ));
    }

    #[test]
    fn closed_pool_rejects_checkout() {
        let pool = ConnectionPool::new(ServerAddress::new("127.0.0.1", Some(1)), test_options());
        pool.close();
        let err = pool.checkout().unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::PoolClosed { .. }));
    }

    #[test]
    fn limits_default_until_a_description_is_published() {
        let pool = ConnectionPool::new(ServerAddress::new("127.0.0.1", Some(1)), test_options());
        let (max_message_size, max_write_batch_size) = pool.limits();
        assert_eq!(max_message_size, 48 * 1024 * 1024);
        assert_eq!(max_write_batch_size, 1000);
    }

    #[test]
    fn update_limits_is_reflected_immediately() {
        let pool = ConnectionPool::new(ServerAddress::new("127.0.0.1", Some(1)), test_options());
        pool.update_limits(16_000_000, 500);
        assert_eq!(pool.limits(), (16_000_000, 500));
    }
}
