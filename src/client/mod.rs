//! `Client`: the crate's single public entry point. A caller builds an
//! operation and hands it to a `Client` method, which selects a server,
//! binds a `Session` to it, and executes the operation.
//!
//! `Client` is a small handle wrapping an `Arc<ClientInner>`, so cloning is
//! cheap and every clone shares one `Topology`. There is no
//! `db()`/`collection()` builder chain or change-stream machinery: this
//! core has no collection/database façade, so `Client` exposes the
//! operation types directly as methods.

use std::sync::Arc;

use bson::Document;

use crate::{
    cursor::Cursor,
    error::Result,
    operation::{
        Delete, DeleteResult, Find, FindAndModify, FindAndModifyResult, FindAndRemove,
        FindAndReplace, FindAndUpdate, Insert, InsertResult, RunCommand, Update, UpdateResult,
    },
    sdam::{ServerInfo, Topology},
    selection_criteria::SelectionCriteria,
    session::Session,
    trace::{trace_event, COMMAND_TRACING_EVENT_TARGET},
    ClientOptions, Namespace,
};

struct ClientInner {
    options: ClientOptions,
    topology: Topology,
}

/// A handle to one cluster. Cheap to clone: every clone shares the same
/// background monitors and connection pools via the inner `Arc`.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Parses `uri` and opens a client against it. Returns as soon as the
    /// monitor threads are started; it does not block for an initial
    /// server description the way some drivers' `connect` does.
    pub fn with_uri_str(uri: impl AsRef<str>) -> Result<Self> {
        let options = ClientOptions::parse(uri.as_ref())?;
        Self::with_options(options)
    }

    pub fn with_options(options: ClientOptions) -> Result<Self> {
        options.validate()?;
        let shared_options = Arc::new(options.clone());
        let topology = Topology::new(shared_options);
        trace_event!(
            DEBUG,
            target: COMMAND_TRACING_EVENT_TARGET,
            "client constructed for {} seed host(s)",
            options.hosts.len()
        );
        Ok(Self {
            inner: Arc::new(ClientInner { options, topology }),
        })
    }

    pub fn options(&self) -> &ClientOptions {
        &self.inner.options
    }

    /// The most recent snapshot of every known server. This is the closest
    /// this core gets to a management/diagnostics surface — enough for a
    /// caller to introspect cluster health without a full JMX-style bean
    /// exposure.
    pub fn server_descriptions(&self) -> Vec<ServerInfo> {
        self.inner
            .topology
            .description()
            .servers()
            .map(ServerInfo::from)
            .collect()
    }

    fn session(&self) -> Session {
        Session::new(self.inner.topology.clone())
    }

    pub fn insert(&self, namespace: Namespace, documents: Vec<Document>) -> Result<InsertResult> {
        self.insert_with_write_concern(namespace, documents, self.inner.options.write_concern.clone())
    }

    pub fn insert_with_write_concern(
        &self,
        namespace: Namespace,
        documents: Vec<Document>,
        write_concern: crate::WriteConcern,
    ) -> Result<InsertResult> {
        let result = Insert::new(namespace, documents, write_concern).execute(&self.session());
        log_outcome("insert", &result);
        result
    }

    pub fn update(&self, update: Update) -> Result<UpdateResult> {
        let result = update.execute(&self.session());
        log_outcome("update", &result);
        result
    }

    pub fn delete(&self, delete: Delete) -> Result<DeleteResult> {
        let result = delete.execute(&self.session());
        log_outcome("delete", &result);
        result
    }

    pub fn find(&self, find: Find) -> Result<Cursor> {
        let result = find.execute(&self.session());
        log_outcome("find", &result);
        result
    }

    pub fn find_and_update(&self, find_and_modify: FindAndUpdate) -> Result<FindAndModifyResult> {
        self.run_find_and_modify(find_and_modify.build())
    }

    pub fn find_and_replace(&self, find_and_modify: FindAndReplace) -> Result<FindAndModifyResult> {
        let built = find_and_modify.build()?;
        self.run_find_and_modify(built)
    }

    pub fn find_and_remove(&self, find_and_modify: FindAndRemove) -> Result<FindAndModifyResult> {
        let built = find_and_modify.build()?;
        self.run_find_and_modify(built)
    }

    fn run_find_and_modify(&self, find_and_modify: FindAndModify) -> Result<FindAndModifyResult> {
        let result = find_and_modify.execute(&self.session());
        log_outcome("findAndModify", &result);
        result
    }

    /// Drops a collection. A `CommandFailure` whose message is exactly
    /// `"ns not found"` (the collection never existed) is swallowed here
    /// rather than surfaced — the one place in this crate that policy
    /// applies.
    pub fn drop_collection(&self, namespace: &Namespace) -> Result<()> {
        let command = bson::doc! { "drop": namespace.coll.clone() };
        match RunCommand::new(namespace.db.clone(), command).execute(&self.session()) {
            Ok(_) => Ok(()),
            Err(e) if e.is_ns_not_found() => {
                trace_event!(
                    DEBUG,
                    target: COMMAND_TRACING_EVENT_TARGET,
                    "dropCollection({}): collection did not exist, ignoring",
                    namespace
                );
                Ok(())
            }
            Err(e) => {
                log_outcome("dropCollection", &Err::<(), _>(e.clone()));
                Err(e)
            }
        }
    }

    /// Runs an administrative command against `db` on a server matching
    /// `selection_criteria`.
    pub fn run_command(
        &self,
        db: impl Into<String>,
        command: Document,
        selection_criteria: SelectionCriteria,
    ) -> Result<Document> {
        let result = RunCommand::new(db, command)
            .with_selection_criteria(selection_criteria)
            .execute(&self.session());
        log_outcome("runCommand", &result);
        result
    }

    /// Stops every monitor thread and closes every connection pool.
    /// Clones of this `Client` keep the `Topology` alive via the shared
    /// `Arc`, but any operation attempted afterwards fails server
    /// selection once the closed topology stops answering.
    pub fn shutdown(&self) {
        self.inner.topology.close();
    }
}

fn log_outcome<T>(operation: &str, result: &Result<T>) {
    match result {
        Ok(_) => trace_event!(
            DEBUG,
            target: COMMAND_TRACING_EVENT_TARGET,
            "{} succeeded",
            operation
        ),
        Err(e) => trace_event!(
            DEBUG,
            target: COMMAND_TRACING_EVENT_TARGET,
            "{} failed: {}",
            operation,
            e
        ),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn with_uri_str_rejects_a_malformed_uri() {
        let err = Client::with_uri_str("not-a-uri").unwrap_err();
        assert!(matches!(err.kind(), crate::ErrorKind::Config { .. }));
    }

    #[test]
    fn with_uri_str_opens_a_client_without_blocking_for_a_server() {
        let client = Client::with_uri_str("mongodb://127.0.0.1:1").unwrap();
        assert_eq!(client.options().hosts.len(), 1);
        client.shutdown();
    }

    #[test]
    fn drop_collection_is_exposed_and_routes_through_run_command() {
        // No reachable server in this test environment; just confirms the
        // method exists with the right signature and fails the way every
        // other operation does when no server is selectable, rather than
        // panicking or swallowing an unrelated error. A short maxWaitTime
        // keeps this from blocking for the 120s default.
        let options = ClientOptions::builder()
            .hosts(vec!["127.0.0.1:1".parse().unwrap()])
            .max_wait_time(std::time::Duration::from_millis(50))
            .heartbeat_frequency(std::time::Duration::from_secs(3600))
            .build();
        let client = Client::with_options(options).unwrap();
        let err = client
            .drop_collection(&Namespace::new("appdb", "widgets"))
            .unwrap_err();
        assert!(matches!(err.kind(), crate::ErrorKind::NoServerAvailable { .. }));
        client.shutdown();
    }

    #[test]
    fn server_descriptions_starts_empty_before_any_probe_completes() {
        let client = Client::with_uri_str("mongodb://127.0.0.1:1").unwrap();
        // The monitor thread races this assertion; either it hasn't
        // published its first Unknown description yet, or it has and
        // every server in the snapshot is still unreachable/unknown.
        let descriptions = client.server_descriptions();
        assert!(descriptions.iter().all(|d| !d.ok) || descriptions.is_empty());
        client.shutdown();
    }
}
