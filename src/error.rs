//! Error taxonomy.
//!
//! Errors are values, not exceptions: every fallible operation in this
//! crate returns `Result<T>`, and the `ErrorKind` a caller matches on tells
//! them exactly which class of failure they hit, without needing to
//! downcast or pattern-match on a string message.

use std::{fmt, io, sync::Arc};

use crate::options::ServerAddress;

pub type Result<T> = std::result::Result<T, Error>;

/// An error produced by this crate.
///
/// Cheaply clonable (`ErrorKind` is wrapped in an `Arc`) because a single
/// I/O error is often both returned to the caller and recorded as the
/// poisoning cause for a `Connection`/`ConnectionPool`.
#[derive(Clone, Debug)]
pub struct Error {
    kind: Arc<ErrorKind>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind: Arc::new(kind),
        }
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Whether this error should poison the `Connection` it occurred on
    /// rather than let it return to the pool.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            *self.kind,
            ErrorKind::Socket { .. }
                | ErrorKind::SocketReadTimeout { .. }
                | ErrorKind::SocketWriteTimeout { .. }
                | ErrorKind::SocketOpenTimeout { .. }
                | ErrorKind::Protocol { .. }
        )
    }

    /// True for the one error that's swallowed, and only by `drop()`:
    /// a `CommandFailure` whose message is exactly `"ns not found"`.
    pub fn is_ns_not_found(&self) -> bool {
        matches!(
            &*self.kind,
            ErrorKind::CommandFailure { message, .. } if message == "ns not found"
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.kind.source()
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error::new(kind)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => {
                ErrorKind::SocketReadTimeout {
                    message: err.to_string(),
                }
                .into()
            }
            _ => ErrorKind::Socket {
                message: err.to_string(),
            }
            .into(),
        }
    }
}

impl From<bson::de::Error> for Error {
    fn from(err: bson::de::Error) -> Self {
        ErrorKind::Protocol {
            message: format!("failed to decode BSON document: {}", err),
        }
        .into()
    }
}

impl From<bson::ser::Error> for Error {
    fn from(err: bson::ser::Error) -> Self {
        ErrorKind::Protocol {
            message: format!("failed to encode BSON document: {}", err),
        }
        .into()
    }
}

/// Every variant is a *kind*, not a type: callers match on `error.kind()`
/// rather than downcasting.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ErrorKind {
    /// URI malformed, or an illegal builder argument (e.g. `maxPoolSize=0`
    /// with a non-empty wait queue multiple).
    #[error("invalid client configuration: {message}")]
    Config { message: String },

    /// Authentication handshake failed, or credentials were exhausted.
    #[error("authentication error for user {user:?} on {source}: {message}")]
    Authentication {
        user: Option<String>,
        source: String,
        message: String,
    },

    /// Transport-level failure not otherwise classified below.
    #[error("socket error: {message}")]
    Socket { message: String },

    #[error("socket read timed out: {message}")]
    SocketReadTimeout { message: String },

    #[error("socket write timed out: {message}")]
    SocketWriteTimeout { message: String },

    #[error("socket open timed out: {message}")]
    SocketOpenTimeout { message: String },

    /// A frame was malformed, or a reply's `responseTo` didn't match the
    /// outstanding request.
    #[error("protocol error: {message}")]
    Protocol { message: String },

    #[error("wait queue is full (maxWaitQueueSize exceeded)")]
    WaitQueueFull,

    #[error("timed out waiting for a connection to become available")]
    WaitQueueTimeout,

    #[error("connection pool for {address} is closed")]
    PoolClosed { address: ServerAddress },

    /// Server selection exhausted its deadline without finding a
    /// satisfying server.
    #[error("server selection timed out: {message}")]
    NoServerAvailable { message: String },

    /// The server returned `ok: 0`, or a non-empty `$err`/`errmsg`.
    #[error("command failed (code {code:?}): {message}")]
    CommandFailure {
        code: Option<i32>,
        code_name: Option<String>,
        message: String,
    },

    /// `OP_REPLY`'s `CursorNotFound` flag was set.
    #[error("cursor {cursor_id} not found on {address}")]
    CursorNotFound {
        cursor_id: i64,
        address: ServerAddress,
    },

    /// A write command failed with one of the duplicate-key codes
    /// (11000, 11001, 12582).
    #[error("duplicate key error (code {code}): {message}")]
    DuplicateKey { code: i32, message: String },

    /// `getLastError` reported a `wnote`/`wtimeout` failure.
    #[error("write concern error: {message}")]
    WriteConcern { message: String },

    /// An internal invariant was violated (e.g. a reply arrived with an
    /// unexpected `responseTo` on a connection that only ever has one
    /// request in flight).
    #[error("internal invariant violated: {message}")]
    Internal { message: String },
}

impl ErrorKind {
    pub(crate) fn command_failure_from_document(doc: &bson::Document) -> Option<ErrorKind> {
        let ok = doc
            .get("ok")
            .and_then(|b| b.as_f64().or_else(|| b.as_i32().map(|i| i as f64)));
        let err_msg = doc
            .get_str("errmsg")
            .ok()
            .or_else(|| doc.get_str("$err").ok());
        if ok == Some(1.0) && err_msg.is_none() {
            return None;
        }
        let message = err_msg.unwrap_or("command failed").to_string();
        let code = doc.get_i32("code").ok();
        let code_name = doc.get_str("codeName").ok().map(|s| s.to_string());

        if matches!(code, Some(11000) | Some(11001) | Some(12582)) {
            return Some(ErrorKind::DuplicateKey { code: code.unwrap(), message });
        }

        Some(ErrorKind::CommandFailure {
            code,
            code_name,
            message,
        })
    }

    /// Classifies a `getLastError` reply, which reports write failures
    /// through `err`/`wtimeout`/`wnote` rather than through `ok`/`errmsg` the
    /// way an ordinary command does.
    pub(crate) fn write_concern_error_from_get_last_error(doc: &bson::Document) -> Option<ErrorKind> {
        if doc.get_bool("wtimeout").unwrap_or(false) {
            return Some(ErrorKind::WriteConcern {
                message: "write concern timed out".to_string(),
            });
        }

        if let Ok(wnote) = doc.get_str("wnote") {
            return Some(ErrorKind::WriteConcern {
                message: wnote.to_string(),
            });
        }

        let err = doc.get_str("err").ok()?;
        let code = doc.get_i32("code").ok();

        if matches!(code, Some(11000) | Some(11001) | Some(12582)) {
            return Some(ErrorKind::DuplicateKey {
                code: code.unwrap(),
                message: err.to_string(),
            });
        }

        Some(ErrorKind::CommandFailure {
            code,
            code_name: None,
            message: err.to_string(),
        })
    }
}

/// Helper for building a `NoServerAvailable` error from `ClusterDescription`.
pub(crate) fn no_server_available(message: impl Into<String>) -> Error {
    ErrorKind::NoServerAvailable {
        message: message.into(),
    }
    .into()
}
