//! `Cluster`: owns one `Server` (pool + monitor) per known address, folds
//! every `ServerDescription` update into a `ClusterDescription` snapshot,
//! and blocks callers in `select_server` until that snapshot satisfies
//! their selector.
//!
//! The overall shape is a mutex-guarded snapshot plus a condvar callers
//! park on, blocking synchronously rather than through an async
//! notification primitive. The update algorithm applies a fixed set of
//! rules on every fresh `ServerDescription`: unseen-member adoption,
//! primary-authoritative removal, `requiredReplicaSetName` filtering, the
//! stale-primary electionId rule, and sharded-mode collapsing.

use std::{
    collections::BTreeSet,
    sync::{Arc, Condvar, Mutex, Weak},
    time::Instant,
};

use super::{
    description::{ClusterDescription, ServerDescription, ServerType},
    monitor::Monitor,
    server_selection,
};
use crate::{
    cmap::{ConnectionPool, ConnectionPoolOptions},
    error::{ErrorKind, Result},
    options::{ClientOptions, ClusterMode, ServerAddress},
    selection_criteria::SelectionCriteria,
    trace::{trace_event, SDAM_TRACING_EVENT_TARGET},
};

struct ServerHandle {
    pool: ConnectionPool,
    monitor: Monitor,
}

struct State {
    description: ClusterDescription,
    servers: std::collections::HashMap<ServerAddress, ServerHandle>,
    last_election_id: Option<bson::oid::ObjectId>,
    closed: bool,
}

struct Shared {
    options: Arc<ClientOptions>,
    state: Mutex<State>,
    condvar: Condvar,
}

/// A cheaply-clonable handle to the whole cluster. Every clone shares the
/// same monitors and pools.
#[derive(Clone)]
pub(crate) struct Topology {
    shared: Arc<Shared>,
}

impl Topology {
    pub(crate) fn new(options: Arc<ClientOptions>) -> Self {
        let description = ClusterDescription::new(options.cluster_mode, options.replica_set_name.clone());
        let shared = Arc::new(Shared {
            options: options.clone(),
            state: Mutex::new(State {
                description,
                servers: std::collections::HashMap::new(),
                last_election_id: None,
                closed: false,
            }),
            condvar: Condvar::new(),
        });

        for address in &options.hosts {
            Self::add_server(&shared, address.clone());
        }

        Topology { shared }
    }

    /// Starts a `Server` (pool + monitor) for `address` unless one already
    /// exists or the cluster has been closed. Two concurrent callers
    /// racing to add the same address is resolved by letting the loser's
    /// `Monitor`/`ConnectionPool` drop unused rather than taking a lock
    /// across the (possibly slow) `Monitor::start` call.
    fn add_server(shared: &Arc<Shared>, address: ServerAddress) {
        {
            let state = shared.state.lock().expect("topology mutex poisoned");
            if state.closed || state.servers.contains_key(&address) {
                return;
            }
        }

        let pool = ConnectionPool::new(
            address.clone(),
            ConnectionPoolOptions::from_client_options(&shared.options),
        );

        let weak_update: Weak<Shared> = Arc::downgrade(shared);
        let weak_failure: Weak<Shared> = Arc::downgrade(shared);
        let monitor = Monitor::start(
            address.clone(),
            shared.options.clone(),
            move |description| {
                if let Some(shared) = weak_update.upgrade() {
                    Topology::on_server_description(&shared, description);
                }
            },
            move |failed_address| {
                if let Some(shared) = weak_failure.upgrade() {
                    Topology::on_probe_failure(&shared, failed_address);
                }
            },
        );

        let mut state = shared.state.lock().expect("topology mutex poisoned");
        if state.closed || state.servers.contains_key(&address) {
            // Another thread beat us to it, or the cluster closed while we
            // were connecting; let `monitor`/`pool` drop and clean up.
            return;
        }
        state.servers.insert(address, ServerHandle { pool, monitor });
    }

    fn remove_server(shared: &Arc<Shared>, address: &ServerAddress) {
        let handle = {
            let mut state = shared.state.lock().expect("topology mutex poisoned");
            state.servers.remove(address)
        };
        if let Some(mut handle) = handle {
            handle.monitor.stop();
            handle.pool.close();
        }
    }

    fn on_probe_failure(shared: &Arc<Shared>, address: &ServerAddress) {
        let state = shared.state.lock().expect("topology mutex poisoned");
        if let Some(handle) = state.servers.get(address) {
            handle.pool.clear();
        }
    }

    /// Folds one freshly published `ServerDescription` into the cluster
    /// snapshot, applying the membership/primary/sharded rules above,
    /// then wakes every thread parked in `select_server`.
    fn on_server_description(shared: &Arc<Shared>, description: ServerDescription) {
        let address = description.address().clone();
        let mut newly_seen = Vec::new();
        let mut no_longer_members = Vec::new();

        {
            let mut state = shared.state.lock().expect("topology mutex poisoned");
            if state.closed {
                return;
            }

            // Sharded mode: any member that isn't a router is not part of
            // this cluster.
            if state.description.mode == ClusterMode::Sharded
                && description.ok
                && description.server_type() != ServerType::Mongos
            {
                state.description.servers.remove(&address);
                no_longer_members.push(address.clone());
                drop(state);
                for removed in no_longer_members {
                    Self::remove_server(shared, &removed);
                }
                shared.condvar.notify_all();
                return;
            }

            // requiredReplicaSetName: a member reporting a different set
            // name never belongs to this cluster.
            if let Some(required) = &shared.options.replica_set_name {
                if description.ok
                    && description
                        .set_name
                        .as_deref()
                        .map(|name| name != required)
                        .unwrap_or(false)
                {
                    state.description.servers.remove(&address);
                    no_longer_members.push(address.clone());
                    drop(state);
                    for removed in no_longer_members {
                        Self::remove_server(shared, &removed);
                    }
                    shared.condvar.notify_all();
                    return;
                }
            }

            // Stale-primary rule: an older electionId than the last one we
            // accepted is ignored outright.
            if description.ok && description.server_type() == ServerType::RsPrimary {
                if let (Some(last), Some(new_id)) = (&state.last_election_id, &description.election_id) {
                    if new_id < last {
                        trace_event!(
                            DEBUG,
                            target: SDAM_TRACING_EVENT_TARGET,
                            "ignoring stale primary {} (electionId older than last accepted)",
                            address
                        );
                        return;
                    }
                }
                if let Some(new_id) = &description.election_id {
                    state.last_election_id = Some(*new_id);
                }
            }

            // Resolve an Unknown cluster mode from the first successful
            // probe's server type.
            if state.description.mode == ClusterMode::Unknown && description.ok {
                state.description.mode = if description.server_type().is_replica_set_member() {
                    ClusterMode::ReplicaSet
                } else if description.server_type() == ServerType::Mongos {
                    ClusterMode::Sharded
                } else if shared.options.hosts.len() == 1 {
                    ClusterMode::Single
                } else {
                    ClusterMode::ReplicaSet
                };
                if state.description.set_name.is_none() {
                    state.description.set_name = description.set_name.clone();
                }
            }

            // A primary's host/passive/arbiter lists are authoritative for
            // replica-set membership: adopt unseen members, drop anyone it
            // no longer lists.
            if state.description.mode == ClusterMode::ReplicaSet
                && description.ok
                && description.server_type() == ServerType::RsPrimary
            {
                let member_set: BTreeSet<ServerAddress> = description.all_members().cloned().collect();

                for member in &member_set {
                    if !state.description.servers.contains_key(member) && *member != address {
                        newly_seen.push(member.clone());
                    }
                }

                let stale: Vec<ServerAddress> = state
                    .description
                    .servers
                    .keys()
                    .filter(|known| **known != address && !member_set.contains(known))
                    .cloned()
                    .collect();
                for removed in &stale {
                    state.description.servers.remove(removed);
                }
                no_longer_members.extend(stale);
            }

            if description.ok {
                if let Some(handle) = state.servers.get(&address) {
                    handle
                        .pool
                        .update_limits(description.max_message_size_bytes, description.max_write_batch_size);
                }
            }

            state.description.servers.insert(address, description);
        }

        for member in newly_seen {
            Self::add_server(shared, member);
        }
        for removed in no_longer_members {
            Self::remove_server(shared, &removed);
        }
        shared.condvar.notify_all();
    }

    /// Evaluates `criteria` against the current snapshot, blocking (with
    /// wake-on-update) until a server qualifies or `maxWaitTime` elapses.
    pub(crate) fn select_server(&self, criteria: &SelectionCriteria) -> Result<ConnectionPool> {
        let deadline = Instant::now() + self.shared.options.max_wait_time;
        let mut state = self.shared.state.lock().expect("topology mutex poisoned");

        loop {
            if state.closed {
                return Err(ErrorKind::NoServerAvailable {
                    message: "cluster is closed".to_string(),
                }
                .into());
            }

            if let Some(address) = server_selection::select(criteria, &state.description) {
                if let Some(handle) = state.servers.get(&address) {
                    return Ok(handle.pool.clone());
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(ErrorKind::no_server_available(
                    "no server matched the selection criteria within maxWaitTime",
                ));
            }
            let (guard, _timeout) = self
                .shared
                .condvar
                .wait_timeout(state, deadline - now)
                .expect("topology mutex poisoned");
            state = guard;
        }
    }

    /// A read-only snapshot for diagnostics: a full management-bean
    /// surface is replaced by this plain value view.
    pub(crate) fn description(&self) -> ClusterDescription {
        self.shared
            .state
            .lock()
            .expect("topology mutex poisoned")
            .description
            .clone()
    }

    /// Invalidates every known server's connection pool.
    pub(crate) fn invalidate_all(&self) {
        let state = self.shared.state.lock().expect("topology mutex poisoned");
        for handle in state.servers.values() {
            handle.pool.clear();
        }
    }

    /// Closes every pool, stops every monitor, and wakes any thread parked
    /// in `select_server` so it observes `closed` rather than timing out.
    pub(crate) fn close(&self) {
        let handles: Vec<ServerHandle> = {
            let mut state = self.shared.state.lock().expect("topology mutex poisoned");
            state.closed = true;
            state.servers.drain().map(|(_, handle)| handle).collect()
        };
        self.shared.condvar.notify_all();
        for mut handle in handles {
            handle.monitor.stop();
            handle.pool.close();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn options(hosts: Vec<&str>) -> Arc<ClientOptions> {
        Arc::new(
            ClientOptions::builder()
                .hosts(hosts.into_iter().map(|h| h.parse().unwrap()).collect())
                .max_wait_time(std::time::Duration::from_millis(50))
                .heartbeat_frequency(std::time::Duration::from_secs(3600))
                .build(),
        )
    }

    #[test]
    fn select_server_times_out_with_no_reachable_servers() {
        let topology = Topology::new(options(vec!["127.0.0.1:1"]));
        let err = topology
            .select_server(&SelectionCriteria::Write)
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::NoServerAvailable { .. }));
    }

    #[test]
    fn close_wakes_a_blocked_selector() {
        let mut long_wait = ClientOptions::builder()
            .hosts(vec!["127.0.0.1:1".parse().unwrap()])
            .max_wait_time(std::time::Duration::from_secs(30))
            .heartbeat_frequency(std::time::Duration::from_secs(3600))
            .build();
        long_wait.heartbeat_connect_retry_frequency = std::time::Duration::from_secs(3600);
        let topology = Topology::new(Arc::new(long_wait));
        let waiter = topology.clone();

        let handle = std::thread::spawn(move || waiter.select_server(&SelectionCriteria::Write));

        std::thread::sleep(std::time::Duration::from_millis(50));
        topology.close();

        let result = handle.join().unwrap();
        assert!(result.is_err());
    }
}
