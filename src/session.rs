//! `Session`: the stateless handle that binds one request to one selected
//! server.
//!
//! This core implements neither server sessions nor causal consistency
//! — `Session` does only what the request-flow
//! diagram asks of it: ask the `Cluster` for a server matching a selector,
//! then check out a `Connection` from that server's pool. Every operation
//! constructs a fresh `Session` per call; nothing here is held across
//! operations.

use crate::{
    cmap::{ConnectionPool, PooledConnection},
    error::Result,
    sdam::Topology,
    selection_criteria::SelectionCriteria,
};

pub(crate) struct Session {
    topology: Topology,
}

impl Session {
    pub(crate) fn new(topology: Topology) -> Self {
        Self { topology }
    }

    /// Selects a server matching `criteria` and checks out one of its
    /// connections, per the request-flow diagram: "operation asks the
    /// Session for a server matching a selector → Session asks the
    /// Cluster → Cluster returns a server proxy → operation checks out a
    /// Connection from that server's Pool."
    pub(crate) fn checkout(&self, criteria: &SelectionCriteria) -> Result<PooledConnection> {
        let pool = self.topology.select_server(criteria)?;
        pool.checkout()
    }

    /// Selects a server matching `criteria` and returns its pool directly,
    /// rather than an already-checked-out connection. `Find` needs this
    /// shape so the `Cursor` it returns can check out a fresh connection
    /// for each `getMore` from the same server: a `Cursor` only records a
    /// `serverAddress`, not a pinned `Connection`.
    pub(crate) fn select_pool(&self, criteria: &SelectionCriteria) -> Result<ConnectionPool> {
        self.topology.select_server(criteria)
    }
}
