//! Configuration types.
//!
//! `ClientOptions` is parsed once, from a `ConnectionString`, and is
//! immutable afterwards: `parse::ConnectionString` is the mutable
//! intermediate a URI gets decoded into, `ClientOptions::parse` is the
//! construction helper that validates it, and every validator runs once at
//! parse time rather than per-field, so partial settings never leak out.

mod parse;

use std::{fmt, time::Duration};

use typed_builder::TypedBuilder;

use crate::{
    error::{ErrorKind, Result},
    selection_criteria::{ReadPreference, SelectionCriteria},
};

pub use parse::ConnectionString;

/// A single `host[:port]` entry from the connection string's host list.
///
/// Equality and hashing are on the normalized (lowercased host, port) pair.
#[derive(Clone, Debug)]
pub struct ServerAddress {
    host: String,
    port: u16,
}

impl ServerAddress {
    pub const DEFAULT_PORT: u16 = 27017;

    pub fn new(host: impl Into<String>, port: Option<u16>) -> Self {
        Self {
            host: host.into(),
            port: port.unwrap_or(Self::DEFAULT_PORT),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    fn normalized_host(&self) -> String {
        self.host.to_ascii_lowercase()
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl PartialEq for ServerAddress {
    fn eq(&self, other: &Self) -> bool {
        self.normalized_host() == other.normalized_host() && self.port == other.port
    }
}

impl Eq for ServerAddress {}

impl std::hash::Hash for ServerAddress {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.normalized_host().hash(state);
        self.port.hash(state);
    }
}

impl PartialOrd for ServerAddress {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ServerAddress {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.normalized_host(), self.port).cmp(&(other.normalized_host(), other.port))
    }
}

impl std::str::FromStr for ServerAddress {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.rsplit_once(':') {
            // IPv6 literals aren't part of this grammar; a bare colon
            // split is sufficient for `host:port`.
            Some((host, port)) if !host.is_empty() => {
                let port = port.parse::<u16>().map_err(|_| {
                    ErrorKind::Config {
                        message: format!("invalid port {:?} in host list", port),
                    }
                })?;
                Ok(ServerAddress::new(host, Some(port)))
            }
            _ => Ok(ServerAddress::new(s, None)),
        }
    }
}

/// How the driver has classified the cluster.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClusterMode {
    Single,
    ReplicaSet,
    Sharded,
    Unknown,
}

/// Supported authentication mechanisms.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthMechanism {
    /// Resolved to `MongoCr` at handshake time if nothing more specific
    /// was requested; kept distinct from `MongoCr` so the parser can tell
    /// "the user wrote no `authMechanism`" apart from "the user wrote
    /// `authMechanism=MONGODB-CR`".
    Default,
    MongoCr,
    Plain,
    GssApi,
    X509,
}

impl AuthMechanism {
    pub(crate) fn resolve(self) -> AuthMechanism {
        match self {
            AuthMechanism::Default => AuthMechanism::MongoCr,
            other => other,
        }
    }
}

/// A credential bound to one authentication database.
///
/// The password is a plain `Vec<u8>` rather than a `String` so that it can
/// be zeroed after use; rather than pull in a dedicated zeroizing-buffer
/// crate for one field, `Credential` takes care of it itself in `Drop`.
#[derive(Clone)]
pub struct Credential {
    pub mechanism: AuthMechanism,
    pub username: Option<String>,
    pub source: String,
    password: Option<Vec<u8>>,
    pub mechanism_properties: std::collections::BTreeMap<String, String>,
}

impl Credential {
    pub fn new(
        mechanism: AuthMechanism,
        username: Option<String>,
        source: String,
        password: Option<String>,
    ) -> Self {
        Self {
            mechanism,
            username,
            source,
            password: password.map(String::into_bytes),
            mechanism_properties: Default::default(),
        }
    }

    pub fn password(&self) -> Option<&[u8]> {
        self.password.as_deref()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("mechanism", &self.mechanism)
            .field("username", &self.username)
            .field("source", &self.source)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl PartialEq for Credential {
    fn eq(&self, other: &Self) -> bool {
        self.mechanism == other.mechanism
            && self.username == other.username
            && self.source == other.source
            && self.password == other.password
            && self.mechanism_properties == other.mechanism_properties
    }
}

impl Drop for Credential {
    fn drop(&mut self) {
        if let Some(password) = self.password.as_mut() {
            password.iter_mut().for_each(|b| *b = 0);
        }
    }
}

/// The `w` half of a write concern's durability contract.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Acknowledgment {
    Nodes(i32),
    Majority,
    Custom(String),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, TypedBuilder)]
pub struct WriteConcern {
    #[builder(default)]
    pub w: Option<Acknowledgment>,
    #[builder(default)]
    pub w_timeout: Option<Duration>,
    #[builder(default)]
    pub journal: Option<bool>,
    #[builder(default)]
    pub fsync: Option<bool>,
}

impl WriteConcern {
    pub fn acknowledged() -> Self {
        Self::default()
    }

    pub fn unacknowledged() -> Self {
        Self {
            w: Some(Acknowledgment::Nodes(0)),
            ..Default::default()
        }
    }

    pub fn majority() -> Self {
        Self {
            w: Some(Acknowledgment::Majority),
            ..Default::default()
        }
    }

    /// Whether a write chains a `getLastError` after the legacy write
    /// opcode; `w: 0` with no journal requirement skips it.
    pub fn is_acknowledged(&self) -> bool {
        !matches!(self.w, Some(Acknowledgment::Nodes(0))) || self.journal == Some(true)
    }

    pub(crate) fn to_get_last_error_command(&self) -> bson::Document {
        let mut doc = bson::doc! { "getLastError": 1 };
        match &self.w {
            Some(Acknowledgment::Nodes(n)) => {
                doc.insert("w", *n);
            }
            Some(Acknowledgment::Majority) => {
                doc.insert("w", "majority");
            }
            Some(Acknowledgment::Custom(tag)) => {
                doc.insert("w", tag.clone());
            }
            None => {}
        }
        if let Some(timeout) = self.w_timeout {
            doc.insert("wtimeout", timeout.as_millis() as i64);
        }
        if let Some(j) = self.journal {
            doc.insert("j", j);
        }
        if let Some(fsync) = self.fsync {
            doc.insert("fsync", fsync);
        }
        doc
    }
}

/// Pool, timeout, and cluster configuration.
///
/// Constructed either by [`ClientOptions::parse`] (the common path) or via
/// the `typed-builder` generated `ClientOptions::builder()` for
/// programmatic configuration that bypasses a connection string entirely.
#[derive(Clone, Debug, PartialEq, TypedBuilder)]
pub struct ClientOptions {
    pub hosts: Vec<ServerAddress>,

    #[builder(default)]
    pub credential: Option<Credential>,

    #[builder(default)]
    pub database: Option<String>,

    #[builder(default = ClusterMode::Unknown)]
    pub cluster_mode: ClusterMode,

    #[builder(default)]
    pub replica_set_name: Option<String>,

    #[builder(default = SelectionCriteria::ReadPreference(ReadPreference::Primary))]
    pub read_preference: SelectionCriteria,

    #[builder(default)]
    pub write_concern: WriteConcern,

    #[builder(default = 100)]
    pub max_pool_size: u32,

    #[builder(default = 0)]
    pub min_pool_size: u32,

    #[builder(default)]
    pub max_wait_queue_size: Option<u32>,

    #[builder(default = Duration::from_millis(120_000))]
    pub max_wait_time: Duration,

    #[builder(default)]
    pub max_connection_idle_time: Option<Duration>,

    #[builder(default)]
    pub max_connection_life_time: Option<Duration>,

    #[builder(default = Duration::from_millis(10_000))]
    pub connect_timeout: Duration,

    #[builder(default)]
    pub socket_timeout: Option<Duration>,

    #[builder(default = false)]
    pub socket_keep_alive: bool,

    #[builder(default = false)]
    pub ssl_enabled: bool,

    #[builder(default = Duration::from_millis(5_000))]
    pub heartbeat_frequency: Duration,

    #[builder(default = Duration::from_millis(10))]
    pub heartbeat_connect_retry_frequency: Duration,

    #[builder(default = Duration::from_millis(20_000))]
    pub heartbeat_connect_timeout: Duration,

    #[builder(default = Duration::from_millis(20_000))]
    pub heartbeat_socket_timeout: Duration,
}

impl ClientOptions {
    /// Parses a connection string into `ClientOptions`.
    pub fn parse(uri: impl AsRef<str>) -> Result<Self> {
        parse::parse(uri.as_ref())
    }

    pub(crate) fn max_wait_queue_size_or_default(&self) -> u32 {
        self.max_wait_queue_size
            .unwrap_or(self.max_pool_size.saturating_mul(5))
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.hosts.is_empty() {
            return Err(ErrorKind::Config {
                message: "connection string must contain at least one host".to_string(),
            }
            .into());
        }
        if self.max_pool_size == 0 {
            return Err(ErrorKind::Config {
                message: "maxPoolSize must be greater than zero".to_string(),
            }
            .into());
        }
        if self.min_pool_size > self.max_pool_size {
            return Err(ErrorKind::Config {
                message: "minPoolSize must not exceed maxPoolSize".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

pub use crate::selection_criteria::ReadPreference;
