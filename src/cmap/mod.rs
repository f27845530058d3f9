//! Per-server connection management: pooling and the
//! `Connection` type itself.

pub(crate) mod conn;
pub(crate) mod options;
pub(crate) mod pool;

pub(crate) use conn::{Connection, ConnectionId};
pub(crate) use options::ConnectionPoolOptions;
pub(crate) use pool::{ConnectionPool, PooledConnection};
