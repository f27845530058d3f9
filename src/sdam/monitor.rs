//! The periodic health-probe loop for one server.
//!
//! One OS thread per `ServerAddress`, matching the thread-per-resource
//! style the connection pool already uses for connections — the simplest
//! of the available background-task strategies, and enough for a bounded
//! number of monitored servers.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Condvar, Mutex,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use bson::doc;

use super::description::{HelloCommandResponse, ServerDescription};
use crate::{
    cmap::{Connection, ConnectionPoolOptions},
    error::Result,
    options::{ClientOptions, ServerAddress},
    trace::{trace_event, SDAM_TRACING_EVENT_TARGET},
};

/// A condvar-gated sleep that a `stop()` call can interrupt immediately,
/// so closing the cluster doesn't wait out a full heartbeat interval.
struct Interrupt {
    stopped: Mutex<bool>,
    condvar: Condvar,
}

impl Interrupt {
    fn new() -> Self {
        Self {
            stopped: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    fn sleep(&self, duration: Duration) {
        let guard = self.stopped.lock().expect("monitor interrupt mutex poisoned");
        let _ = self
            .condvar
            .wait_timeout_while(guard, duration, |stopped| !*stopped);
    }

    fn stop(&self) {
        *self.stopped.lock().expect("monitor interrupt mutex poisoned") = true;
        self.condvar.notify_all();
    }

    fn is_stopped(&self) -> bool {
        *self.stopped.lock().expect("monitor interrupt mutex poisoned")
    }
}

/// One dedicated connection plus background thread probing a single
/// server. Never returns its connection to any pool — it's a dedicated
/// monitor connection, never checked out by an operation.
pub(crate) struct Monitor {
    interrupt: Arc<Interrupt>,
    handle: Option<JoinHandle<()>>,
}

impl Monitor {
    /// Spawns the monitor thread. `on_update` is invoked with every fresh
    /// `ServerDescription`, including the initial `Unknown` one published
    /// before the first probe runs — it is the `Topology`'s hook for
    /// recomputing `ClusterDescription` and for invalidating that server's
    /// connection pool on a failed probe.
    pub(crate) fn start(
        address: ServerAddress,
        options: Arc<ClientOptions>,
        on_update: impl Fn(ServerDescription) + Send + Sync + 'static,
        on_probe_failure: impl Fn(&ServerAddress) + Send + Sync + 'static,
    ) -> Monitor {
        let interrupt = Arc::new(Interrupt::new());
        let thread_interrupt = interrupt.clone();

        let handle = thread::Builder::new()
            .name(format!("docflux-monitor-{address}"))
            .spawn(move || {
                on_update(ServerDescription::unknown(address.clone()));

                let pool_options = monitor_pool_options(&options);
                let mut conn: Option<Connection> = None;
                let mut generation = 0u64;

                while !thread_interrupt.is_stopped() {
                    let started = Instant::now();
                    match probe(&mut conn, &address, &pool_options, generation) {
                        Ok(description) => {
                            trace_event!(
                                DEBUG,
                                target: SDAM_TRACING_EVENT_TARGET,
                                "heartbeat succeeded for {} in {:?}",
                                address,
                                started.elapsed()
                            );
                            on_update(description);
                            thread_interrupt.sleep(options.heartbeat_frequency);
                        }
                        Err(e) => {
                            trace_event!(
                                DEBUG,
                                target: SDAM_TRACING_EVENT_TARGET,
                                "heartbeat failed for {}: {}",
                                address,
                                e
                            );
                            conn = None;
                            generation += 1;
                            on_probe_failure(&address);
                            on_update(ServerDescription::unknown_with_error(address.clone(), e));
                            thread_interrupt.sleep(options.heartbeat_connect_retry_frequency);
                        }
                    }
                }
            })
            .expect("failed to spawn monitor thread");

        Monitor {
            interrupt,
            handle: Some(handle),
        }
    }

    /// Signals the thread to stop and joins it. Idempotent.
    pub(crate) fn stop(&mut self) {
        self.interrupt.stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn monitor_pool_options(options: &ClientOptions) -> ConnectionPoolOptions {
    ConnectionPoolOptions {
        max_pool_size: 1,
        min_pool_size: 0,
        max_wait_queue_size: 0,
        max_wait_time: Duration::from_secs(0),
        max_connection_idle_time: None,
        max_connection_life_time: None,
        connect_timeout: options.heartbeat_connect_timeout,
        socket_timeout: Some(options.heartbeat_socket_timeout),
        socket_keep_alive: options.socket_keep_alive,
        // The monitor connection runs isMaster only and is never handed out
        // for application operations, so it never authenticates.
        credential: None,
    }
}

/// Opens (or reuses) the monitor connection, runs `{ismaster: 1}`, and
/// parses the reply into a fresh `ServerDescription`.
fn probe(
    conn: &mut Option<Connection>,
    address: &ServerAddress,
    pool_options: &ConnectionPoolOptions,
    generation: u64,
) -> Result<ServerDescription> {
    if conn.is_none() {
        *conn = Some(Connection::connect(address, generation, pool_options)?);
    }
    let connection = conn.as_mut().expect("connection just established");

    let started = Instant::now();
    let result = crate::auth::run_command(connection, "admin", doc! { "ismaster": 1 });
    let round_trip_time = started.elapsed();

    match result {
        Ok(doc) => {
            let response: HelloCommandResponse = bson::from_document(doc)?;
            Ok(ServerDescription::from_hello(address.clone(), response, round_trip_time))
        }
        Err(e) => {
            *conn = None;
            Err(e)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn interrupt_wakes_a_sleeping_thread_immediately() {
        let interrupt = Arc::new(Interrupt::new());
        let waiter = interrupt.clone();
        let handle = thread::spawn(move || {
            let started = Instant::now();
            waiter.sleep(Duration::from_secs(30));
            started.elapsed()
        });

        thread::sleep(Duration::from_millis(20));
        interrupt.stop();
        let elapsed = handle.join().unwrap();
        assert!(elapsed < Duration::from_secs(5));
    }
}
