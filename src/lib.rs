//! Cluster driver core for the Docflux document database.
//!
//! This crate implements the connection substrate that sits underneath a
//! high-level collection API: connection-string parsing, cluster topology
//! monitoring, server selection, per-server connection pooling, wire
//! protocol framing, and the handful of operations (insert/update/delete/
//! find/getMore/killCursors/findAndModify) that compose those layers.
//!
//! The driver is entirely synchronous: every blocking point (pool checkout,
//! server selection, socket I/O) is an ordinary blocking call guarded by a
//! deadline, and background work (server monitoring, pool maintenance) runs
//! on dedicated OS threads rather than on an async runtime.

mod auth;
pub mod client;
mod cmap;
pub mod cursor;
pub mod error;
pub mod operation;
pub mod options;
mod sdam;
pub mod selection_criteria;
mod session;
mod trace;
mod wire;

pub use bson::{self, doc, Document};
pub use client::Client;
pub use cursor::Cursor;
pub use error::{Error, ErrorKind, Result};
pub use options::{ClientOptions, Credential, ReadPreference, ServerAddress, WriteConcern};
pub use sdam::{ServerInfo, ServerType};

/// A fully qualified `database.collection` pair, as used by every operation
/// and by the cursor namespace carried in an `OP_REPLY`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Namespace {
    pub db: String,
    pub coll: String,
}

impl Namespace {
    pub fn new(db: impl Into<String>, coll: impl Into<String>) -> Self {
        Self {
            db: db.into(),
            coll: coll.into(),
        }
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.db, self.coll)
    }
}

#[cfg(test)]
mod test {
    use super::Namespace;

    #[test]
    fn namespace_display() {
        let ns = Namespace::new("appdb", "widgets");
        assert_eq!(ns.to_string(), "appdb.widgets");
    }
}
