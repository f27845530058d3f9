//! `ServerType`, `ServerDescription`, and `ClusterDescription`.
//!
//! `server_type()`'s classification logic and `HelloCommandResponse`'s
//! field set follow the same isMaster-parsing rules a `hello`-speaking
//! driver encodes: the `if/else` chain walks `setName`/`ismaster`/
//! `secondary`/`arbiterOnly`/`isreplicaset`/`msg` in that order to settle
//! on one of `RsPrimary`/`RsSecondary`/`RsArbiter`/`RsOther`/`RsGhost`/
//! `Mongos`/`Standalone`.

use std::{collections::BTreeMap, time::Duration};

use bson::oid::ObjectId;
use serde::Deserialize;

use crate::{
    error::Error,
    options::{ClusterMode, ServerAddress},
    selection_criteria::TagSet,
};

/// How the driver has classified a single server.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServerType {
    Standalone,
    RsPrimary,
    RsSecondary,
    RsArbiter,
    /// A replica-set member that is none of primary/secondary/arbiter/ghost
    /// (e.g. hidden, or still in a transitional state).
    RsOther,
    /// `isreplicaset: true` with no `setName` — a member that hasn't been
    /// added to a replica set config yet.
    RsGhost,
    Mongos,
    Unknown,
}

impl ServerType {
    pub(crate) fn is_replica_set_member(self) -> bool {
        matches!(
            self,
            ServerType::RsPrimary
                | ServerType::RsSecondary
                | ServerType::RsArbiter
                | ServerType::RsOther
                | ServerType::RsGhost
        )
    }
}

/// The response document to an `isMaster`/`hello` probe.
///
/// Only the fields `ServerDescription` actually uses are kept;
/// speculative-auth/load-balancer/compression fields that belong to the
/// modern command-based protocol are dropped since this core's legacy
/// isMaster handshake never negotiates them.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct HelloCommandResponse {
    pub(crate) is_writable_primary: Option<bool>,
    #[serde(rename = "ismaster")]
    pub(crate) is_master: Option<bool>,
    pub(crate) hosts: Option<Vec<String>>,
    pub(crate) passives: Option<Vec<String>>,
    pub(crate) arbiters: Option<Vec<String>>,
    pub(crate) msg: Option<String>,
    pub(crate) set_version: Option<i32>,
    pub(crate) set_name: Option<String>,
    pub(crate) secondary: Option<bool>,
    pub(crate) arbiter_only: Option<bool>,
    #[serde(rename = "isreplicaset")]
    pub(crate) is_replica_set: Option<bool>,
    pub(crate) min_wire_version: Option<i32>,
    pub(crate) max_wire_version: Option<i32>,
    pub(crate) tags: Option<TagSet>,
    pub(crate) election_id: Option<ObjectId>,
    pub(crate) primary: Option<String>,
    #[serde(default)]
    pub(crate) max_bson_object_size: i64,
    pub(crate) max_write_batch_size: Option<i64>,
    #[serde(default)]
    pub(crate) max_message_size_bytes: i32,
}

impl HelloCommandResponse {
    pub(crate) fn server_type(&self) -> ServerType {
        if self.msg.as_deref() == Some("isdbgrid") {
            ServerType::Mongos
        } else if self.set_name.is_some() {
            if self.is_writable_primary == Some(true) || self.is_master == Some(true) {
                ServerType::RsPrimary
            } else if self.secondary == Some(true) {
                ServerType::RsSecondary
            } else if self.arbiter_only == Some(true) {
                ServerType::RsArbiter
            } else {
                ServerType::RsOther
            }
        } else if self.is_replica_set == Some(true) {
            ServerType::RsGhost
        } else {
            ServerType::Standalone
        }
    }

    fn parse_address_list(list: &Option<Vec<String>>) -> Vec<ServerAddress> {
        list.iter()
            .flatten()
            .filter_map(|s| s.parse::<ServerAddress>().ok())
            .collect()
    }
}

/// A published description of one server. Immutable once
/// constructed; the monitor publishes a fresh replacement on every probe.
#[derive(Clone, Debug)]
pub struct ServerDescription {
    pub(crate) address: ServerAddress,
    pub(crate) server_type: ServerType,
    pub(crate) hosts: Vec<ServerAddress>,
    pub(crate) passives: Vec<ServerAddress>,
    pub(crate) arbiters: Vec<ServerAddress>,
    pub(crate) tags: TagSet,
    pub(crate) set_name: Option<String>,
    pub(crate) primary: Option<ServerAddress>,
    pub(crate) election_id: Option<ObjectId>,
    pub(crate) min_wire_version: i32,
    pub(crate) max_wire_version: i32,
    pub(crate) max_bson_object_size: i64,
    pub(crate) max_message_size_bytes: i32,
    pub(crate) max_write_batch_size: i64,
    pub(crate) round_trip_time: Option<Duration>,
    pub(crate) ok: bool,
    pub(crate) error: Option<Error>,
}

impl ServerDescription {
    /// The initial, not-yet-probed description published the instant a
    /// `Monitor` starts.
    pub(crate) fn unknown(address: ServerAddress) -> Self {
        Self {
            address,
            server_type: ServerType::Unknown,
            hosts: Vec::new(),
            passives: Vec::new(),
            arbiters: Vec::new(),
            tags: TagSet::new(),
            set_name: None,
            primary: None,
            election_id: None,
            min_wire_version: 0,
            max_wire_version: 0,
            max_bson_object_size: 16 * 1024 * 1024,
            max_message_size_bytes: 48 * 1024 * 1024,
            max_write_batch_size: 1000,
            round_trip_time: None,
            ok: false,
            error: None,
        }
    }

    /// The description published when a probe fails: a transient
    /// heartbeat failure is recovered locally by the monitor's retry loop,
    /// not surfaced as an error to any caller.
    pub(crate) fn unknown_with_error(address: ServerAddress, error: Error) -> Self {
        Self {
            error: Some(error),
            ..Self::unknown(address)
        }
    }

    pub(crate) fn from_hello(
        address: ServerAddress,
        response: HelloCommandResponse,
        round_trip_time: Duration,
    ) -> Self {
        let server_type = response.server_type();
        Self {
            server_type,
            hosts: HelloCommandResponse::parse_address_list(&response.hosts),
            passives: HelloCommandResponse::parse_address_list(&response.passives),
            arbiters: HelloCommandResponse::parse_address_list(&response.arbiters),
            tags: response.tags.unwrap_or_default(),
            set_name: response.set_name,
            primary: response.primary.and_then(|p| p.parse::<ServerAddress>().ok()),
            election_id: response.election_id,
            min_wire_version: response.min_wire_version.unwrap_or(0),
            max_wire_version: response.max_wire_version.unwrap_or(0),
            max_bson_object_size: if response.max_bson_object_size > 0 {
                response.max_bson_object_size
            } else {
                16 * 1024 * 1024
            },
            max_message_size_bytes: if response.max_message_size_bytes > 0 {
                response.max_message_size_bytes
            } else {
                48 * 1024 * 1024
            },
            max_write_batch_size: response.max_write_batch_size.unwrap_or(1000),
            round_trip_time: Some(round_trip_time),
            ok: true,
            error: None,
            address,
        }
    }

    pub fn address(&self) -> &ServerAddress {
        &self.address
    }

    pub fn server_type(&self) -> ServerType {
        self.server_type
    }

    pub fn round_trip_time(&self) -> Option<Duration> {
        self.round_trip_time
    }

    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    pub(crate) fn all_members(&self) -> impl Iterator<Item = &ServerAddress> {
        self.hosts.iter().chain(self.passives.iter()).chain(self.arbiters.iter())
    }
}

/// A read-only, public-facing view of a `ServerDescription`, returned from
/// `Client::server_descriptions` for monitoring/diagnostic use — a plain
/// value snapshot with no control surface, well short of a full
/// JMX-style management bean.
#[derive(Clone, Debug)]
pub struct ServerInfo {
    pub address: ServerAddress,
    pub server_type: ServerType,
    pub tags: TagSet,
    pub round_trip_time: Option<Duration>,
    pub ok: bool,
}

impl From<&ServerDescription> for ServerInfo {
    fn from(desc: &ServerDescription) -> Self {
        Self {
            address: desc.address.clone(),
            server_type: desc.server_type,
            tags: desc.tags.clone(),
            round_trip_time: desc.round_trip_time,
            ok: desc.ok,
        }
    }
}

/// An immutable snapshot of every known server. The `Topology`
/// atomically swaps its current one out for a new snapshot on every
/// monitor update; readers never see a partially updated map.
#[derive(Clone, Debug)]
pub struct ClusterDescription {
    pub(crate) mode: ClusterMode,
    pub(crate) set_name: Option<String>,
    pub(crate) servers: BTreeMap<ServerAddress, ServerDescription>,
}

impl ClusterDescription {
    pub(crate) fn new(mode: ClusterMode, set_name: Option<String>) -> Self {
        Self {
            mode,
            set_name,
            servers: BTreeMap::new(),
        }
    }

    pub fn mode(&self) -> ClusterMode {
        self.mode
    }

    pub fn servers(&self) -> impl Iterator<Item = &ServerDescription> {
        self.servers.values()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use bson::doc;

    fn response_from(doc: bson::Document) -> HelloCommandResponse {
        bson::from_document(doc).unwrap()
    }

    #[test]
    fn classifies_standalone() {
        let resp = response_from(doc! { "ismaster": true, "maxBsonObjectSize": 16_000_000i64 });
        assert_eq!(resp.server_type(), ServerType::Standalone);
    }

    #[test]
    fn classifies_replica_set_primary_and_secondary() {
        let primary = response_from(doc! { "ismaster": true, "setName": "rs0", "maxBsonObjectSize": 1i64 });
        assert_eq!(primary.server_type(), ServerType::RsPrimary);

        let secondary = response_from(doc! { "ismaster": false, "secondary": true, "setName": "rs0", "maxBsonObjectSize": 1i64 });
        assert_eq!(secondary.server_type(), ServerType::RsSecondary);
    }

    #[test]
    fn classifies_arbiter_and_ghost_and_mongos() {
        let arbiter = response_from(doc! { "ismaster": false, "arbiterOnly": true, "setName": "rs0", "maxBsonObjectSize": 1i64 });
        assert_eq!(arbiter.server_type(), ServerType::RsArbiter);

        let ghost = response_from(doc! { "ismaster": false, "isreplicaset": true, "maxBsonObjectSize": 1i64 });
        assert_eq!(ghost.server_type(), ServerType::RsGhost);

        let mongos = response_from(doc! { "ismaster": true, "msg": "isdbgrid", "maxBsonObjectSize": 1i64 });
        assert_eq!(mongos.server_type(), ServerType::Mongos);
    }

    #[test]
    fn unknown_description_is_not_ok() {
        let desc = ServerDescription::unknown(ServerAddress::new("localhost", None));
        assert!(!desc.ok);
        assert_eq!(desc.server_type(), ServerType::Unknown);
    }
}
