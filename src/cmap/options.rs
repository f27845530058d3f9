//! The subset of `ClientOptions` a `ConnectionPool`/`Connection` actually
//! needs, extracted once per server rather than threading the whole
//! `ClientOptions` through every pool method.

use std::time::Duration;

use crate::options::{ClientOptions, Credential};

#[derive(Clone, Debug)]
pub(crate) struct ConnectionPoolOptions {
    pub(crate) max_pool_size: u32,
    pub(crate) min_pool_size: u32,
    pub(crate) max_wait_queue_size: u32,
    pub(crate) max_wait_time: Duration,
    pub(crate) max_connection_idle_time: Option<Duration>,
    pub(crate) max_connection_life_time: Option<Duration>,
    pub(crate) connect_timeout: Duration,
    pub(crate) socket_timeout: Option<Duration>,
    pub(crate) socket_keep_alive: bool,
    /// Run once against every freshly opened connection, before it is ever
    /// offered to the pool: the pool must never cache a
    /// connection against a credential that hasn't proven itself.
    pub(crate) credential: Option<Credential>,
}

impl ConnectionPoolOptions {
    pub(crate) fn from_client_options(options: &ClientOptions) -> Self {
        Self {
            max_pool_size: options.max_pool_size,
            min_pool_size: options.min_pool_size,
            max_wait_queue_size: options.max_wait_queue_size_or_default(),
            max_wait_time: options.max_wait_time,
            max_connection_idle_time: options.max_connection_idle_time,
            max_connection_life_time: options.max_connection_life_time,
            connect_timeout: options.connect_timeout,
            socket_timeout: options.socket_timeout,
            socket_keep_alive: options.socket_keep_alive,
            credential: options.credential.clone(),
        }
    }
}

pub(crate) const DEFAULT_MAINTENANCE_FREQUENCY: Duration = Duration::from_secs(60);
