//! Connection-string parsing.
//!
//! `ClientOptions::parse` is the entry point; each recognized key is
//! documented next to the field it maps to.

use std::{collections::BTreeMap, time::Duration};

use percent_encoding::percent_decode_str;

use super::{Acknowledgment, AuthMechanism, ClientOptions, ClusterMode, Credential, ServerAddress, WriteConcern};
use crate::{
    error::{ErrorKind, Result},
    selection_criteria::{ReadPreference, SelectionCriteria, TagSet},
    trace::{trace_event, OPTIONS_TRACING_EVENT_TARGET},
};

const SCHEME: &str = "mongodb://";

/// The pieces pulled directly out of a connection-string's text, before
/// they're validated and promoted into a `ClientOptions`. This is the
/// mutable intermediate representation; nothing downstream of
/// `ClientOptions::parse` ever sees a partially valid one.
#[derive(Clone, Debug, Default)]
pub struct ConnectionString {
    pub hosts: Vec<ServerAddress>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    /// Raw `key=value` option pairs in the order they appeared, with keys
    /// already lowercased. Kept (rather than folded into a map) because
    /// `readPreferenceTags` is order-significant and may repeat.
    pub options: Vec<(String, String)>,
}

pub(crate) fn parse(uri: &str) -> Result<ClientOptions> {
    let conn_str = parse_connection_string(uri)?;
    build_client_options(conn_str)
}

fn config_err(message: impl Into<String>) -> crate::Error {
    ErrorKind::Config {
        message: message.into(),
    }
    .into()
}

fn parse_connection_string(uri: &str) -> Result<ConnectionString> {
    let rest = uri
        .strip_prefix(SCHEME)
        .ok_or_else(|| config_err(format!("connection string must start with {:?}", SCHEME)))?;

    // Split off the query string, if any. A `?` with no preceding `/`
    // separating it from the authority is an error.
    let (before_query, query) = match rest.find('?') {
        Some(idx) => (&rest[..idx], Some(&rest[idx + 1..])),
        None => (rest, None),
    };
    if query.is_some() && !before_query.contains('/') {
        return Err(config_err(
            "URI contains options without trailing slash",
        ));
    }

    let (authority, path) = match before_query.find('/') {
        Some(idx) => (&before_query[..idx], Some(&before_query[idx + 1..])),
        None => (before_query, None),
    };

    if authority.is_empty() {
        return Err(config_err("connection string must contain a host list"));
    }

    let (userinfo, host_list) = match authority.rsplit_once('@') {
        Some((userinfo, hosts)) => (Some(userinfo), hosts),
        None => (None, authority),
    };

    let (username, password) = match userinfo {
        Some(userinfo) => {
            let (user, pass) = match userinfo.split_once(':') {
                Some((u, p)) => (u, Some(p)),
                None => (userinfo, None),
            };
            let user = percent_decode_str(user)
                .decode_utf8()
                .map_err(|e| config_err(format!("invalid percent-encoding in username: {e}")))?
                .into_owned();
            let pass = pass
                .map(|p| {
                    percent_decode_str(p)
                        .decode_utf8()
                        .map_err(|e| config_err(format!("invalid percent-encoding in password: {e}")))
                        .map(|s| s.into_owned())
                })
                .transpose()?;
            (Some(user), pass)
        }
        None => (None, None),
    };

    if host_list.is_empty() {
        return Err(config_err("connection string must contain at least one host"));
    }

    let hosts = host_list
        .split(',')
        .map(|h| h.parse::<ServerAddress>())
        .collect::<Result<Vec<_>>>()?;

    let database = path
        .map(|p| p.trim_end_matches('/'))
        .filter(|p| !p.is_empty())
        .map(|p| p.to_string());

    let mut options = Vec::new();
    if let Some(query) = query {
        for pair in query.split(|c| c == '&' || c == ';') {
            if pair.is_empty() {
                continue;
            }
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = key.to_ascii_lowercase();
            let value = percent_decode_str(value)
                .decode_utf8()
                .map_err(|e| config_err(format!("invalid percent-encoding in option value: {e}")))?
                .into_owned();
            options.push((key, value));
        }
    }

    Ok(ConnectionString {
        hosts,
        username,
        password,
        database,
        options,
    })
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}

/// Well-known option keys, used only to compute a did-you-mean suggestion
/// for unrecognized ones.
const KNOWN_OPTION_KEYS: &[&str] = &[
    "maxpoolsize",
    "minpoolsize",
    "waitqueuemultiple",
    "waitqueuetimeoutms",
    "connecttimeoutms",
    "sockettimeoutms",
    "maxidletimems",
    "maxlifetimems",
    "ssl",
    "replicaset",
    "slaveok",
    "readpreference",
    "readpreferencetags",
    "safe",
    "w",
    "wtimeout",
    "wtimeoutms",
    "fsync",
    "j",
    "authmechanism",
    "authsource",
    "authmechanismproperties",
];

fn warn_unknown_key(key: &str) {
    let suggestion = KNOWN_OPTION_KEYS
        .iter()
        .map(|known| (*known, strsim::levenshtein(key, known)))
        .min_by_key(|(_, dist)| *dist)
        .filter(|(_, dist)| *dist <= 2)
        .map(|(known, _)| known);

    match suggestion {
        Some(suggestion) => {
            trace_event!(
                WARN,
                target: OPTIONS_TRACING_EVENT_TARGET,
                "unrecognized connection string option {:?}; did you mean {:?}?",
                key,
                suggestion
            );
        }
        None => {
            trace_event!(
                WARN,
                target: OPTIONS_TRACING_EVENT_TARGET,
                "unrecognized connection string option {:?}",
                key
            );
        }
    }
}

fn build_client_options(conn_str: ConnectionString) -> Result<ClientOptions> {
    let mut max_pool_size = 100u32;
    let mut min_pool_size = 0u32;
    let mut max_wait_queue_size: Option<u32> = None;
    let mut max_wait_time = Duration::from_millis(120_000);
    let mut connect_timeout = Duration::from_millis(10_000);
    let mut socket_timeout = None;
    let mut max_connection_idle_time = None;
    let mut max_connection_life_time = None;
    let mut ssl_enabled = false;
    let mut replica_set_name = None;

    let mut slave_ok = false;
    let mut read_preference_name: Option<String> = None;
    let mut read_preference_tags: Vec<TagSet> = Vec::new();

    let mut safe: Option<bool> = None;
    let mut w: Option<Acknowledgment> = None;
    let mut w_timeout: Option<Duration> = None;
    let mut journal: Option<bool> = None;
    let mut fsync: Option<bool> = None;
    let mut wc_explicit = false;

    let mut auth_mechanism: Option<AuthMechanism> = None;
    let mut auth_source: Option<String> = None;
    let mut auth_mechanism_properties = BTreeMap::new();

    for (key, value) in &conn_str.options {
        match key.as_str() {
            "maxpoolsize" => max_pool_size = parse_u32(&key, value)?,
            "minpoolsize" => min_pool_size = parse_u32(&key, value)?,
            "waitqueuemultiple" => {
                let multiple = parse_u32(&key, value)?;
                max_wait_queue_size = Some(max_pool_size.saturating_mul(multiple));
            }
            "waitqueuetimeoutms" => max_wait_time = Duration::from_millis(parse_u64(&key, value)?),
            "connecttimeoutms" => connect_timeout = Duration::from_millis(parse_u64(&key, value)?),
            "sockettimeoutms" => socket_timeout = Some(Duration::from_millis(parse_u64(&key, value)?)),
            "maxidletimems" => max_connection_idle_time = Some(Duration::from_millis(parse_u64(&key, value)?)),
            "maxlifetimems" => max_connection_life_time = Some(Duration::from_millis(parse_u64(&key, value)?)),
            "ssl" => ssl_enabled = parse_bool(value),
            "replicaset" => replica_set_name = Some(value.clone()),

            "slaveok" => slave_ok = parse_bool(value),
            "readpreference" => read_preference_name = Some(value.to_ascii_lowercase()),
            "readpreferencetags" => {
                let tag_set: TagSet = if value.trim().is_empty() {
                    TagSet::new()
                } else {
                    value
                        .split(',')
                        .filter_map(|pair| pair.split_once(':'))
                        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                        .collect()
                };
                read_preference_tags.push(tag_set);
            }

            "safe" => safe = Some(parse_bool(value)),
            "w" => {
                wc_explicit = true;
                w = Some(parse_w(value));
            }
            "wtimeout" | "wtimeoutms" => {
                wc_explicit = true;
                w_timeout = Some(Duration::from_millis(parse_u64(&key, value)?));
            }
            "j" => {
                wc_explicit = true;
                journal = Some(parse_bool(value));
            }
            "fsync" => {
                wc_explicit = true;
                fsync = Some(parse_bool(value));
            }

            "authmechanism" => {
                auth_mechanism = Some(match value.to_ascii_uppercase().as_str() {
                    "MONGODB-CR" => AuthMechanism::MongoCr,
                    "GSSAPI" => AuthMechanism::GssApi,
                    "PLAIN" => AuthMechanism::Plain,
                    "MONGODB-X509" => AuthMechanism::X509,
                    // Unknown mechanisms are deferred to handshake time,
                    // not rejected here.
                    _ => {
                        trace_event!(
                            WARN,
                            target: OPTIONS_TRACING_EVENT_TARGET,
                            "unrecognized authMechanism {:?}; deferring validation to handshake time",
                            value
                        );
                        AuthMechanism::Default
                    }
                });
            }
            "authsource" => auth_source = Some(value.clone()),
            "authmechanismproperties" => {
                for pair in value.split(',') {
                    if let Some((k, v)) = pair.split_once(':') {
                        auth_mechanism_properties.insert(k.trim().to_string(), v.trim().to_string());
                    }
                }
            }

            _ => warn_unknown_key(key),
        }
    }

    let cluster_mode = if conn_str.hosts.len() == 1 && replica_set_name.is_none() {
        ClusterMode::Single
    } else {
        ClusterMode::Unknown
    };

    let read_preference = match read_preference_name.as_deref() {
        Some("primary") => ReadPreference::Primary,
        Some("primarypreferred") => ReadPreference::primary_preferred(read_preference_tags),
        Some("secondary") => ReadPreference::secondary(read_preference_tags),
        Some("secondarypreferred") => ReadPreference::secondary_preferred(read_preference_tags),
        Some("nearest") => ReadPreference::nearest(read_preference_tags),
        Some(other) => {
            return Err(config_err(format!("unrecognized readPreference {:?}", other)));
        }
        None if slave_ok => ReadPreference::secondary_preferred(read_preference_tags),
        None => ReadPreference::Primary,
    };

    let write_concern = if wc_explicit {
        WriteConcern {
            w,
            w_timeout,
            journal,
            fsync,
        }
    } else if let Some(safe) = safe {
        if safe {
            WriteConcern::acknowledged()
        } else {
            WriteConcern::unacknowledged()
        }
    } else {
        WriteConcern::acknowledged()
    };

    let credential = conn_str.username.map(|username| {
        let mut mechanism = auth_mechanism.unwrap_or(AuthMechanism::Default);
        let source = auth_source
            .or_else(|| conn_str.database.clone())
            .unwrap_or_else(|| "admin".to_string());
        let password = if matches!(mechanism, AuthMechanism::GssApi | AuthMechanism::X509) {
            None
        } else {
            conn_str.password.clone()
        };
        if matches!(mechanism, AuthMechanism::Default) && conn_str.password.is_none() {
            // A bare username with no password and no explicit mechanism
            // still defaults to MongoCR; leaving it as `Default` is also
            // correct since it resolves the same way.
            mechanism = AuthMechanism::Default;
        }
        let mut credential = Credential::new(mechanism, Some(username), source, password);
        credential.mechanism_properties = auth_mechanism_properties;
        credential
    });

    let options = ClientOptions {
        hosts: conn_str.hosts,
        credential,
        database: conn_str.database,
        cluster_mode,
        replica_set_name,
        read_preference: SelectionCriteria::ReadPreference(read_preference),
        write_concern,
        max_pool_size,
        min_pool_size,
        max_wait_queue_size,
        max_wait_time,
        max_connection_idle_time,
        max_connection_life_time,
        connect_timeout,
        socket_timeout,
        socket_keep_alive: false,
        ssl_enabled,
        heartbeat_frequency: Duration::from_millis(5_000),
        heartbeat_connect_retry_frequency: Duration::from_millis(10),
        heartbeat_connect_timeout: Duration::from_millis(20_000),
        heartbeat_socket_timeout: Duration::from_millis(20_000),
    };
    options.validate()?;
    Ok(options)
}

fn parse_w(value: &str) -> Acknowledgment {
    if let Ok(n) = value.parse::<i32>() {
        Acknowledgment::Nodes(n)
    } else if value.eq_ignore_ascii_case("majority") {
        Acknowledgment::Majority
    } else {
        Acknowledgment::Custom(value.to_string())
    }
}

fn parse_u32(key: &str, value: &str) -> Result<u32> {
    value
        .parse()
        .map_err(|_| config_err(format!("option {:?} must be a non-negative integer, got {:?}", key, value)))
}

fn parse_u64(key: &str, value: &str) -> Result<u64> {
    value
        .parse()
        .map_err(|_| config_err(format!("option {:?} must be a non-negative integer, got {:?}", key, value)))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::selection_criteria::ReadPreference;

    #[test]
    fn default_uri() {
        let opts = ClientOptions::parse("mongodb://localhost").unwrap();
        assert_eq!(opts.hosts, vec![ServerAddress::new("localhost", Some(27017))]);
        assert!(opts.database.is_none());
        assert!(opts.credential.is_none());
        assert_eq!(opts.write_concern, WriteConcern::acknowledged());
        assert_eq!(
            opts.read_preference,
            SelectionCriteria::ReadPreference(ReadPreference::Primary)
        );
        assert!(!opts.ssl_enabled);
        assert_eq!(opts.max_pool_size, 100);
    }

    #[test]
    fn full_uri() {
        let uri = "mongodb://alice:secret@h1:27018,h2:27019/appdb?replicaSet=rs0&readPreference=secondaryPreferred&readPreferenceTags=dc:east&readPreferenceTags=&w=majority&wtimeoutMS=250&ssl=true";
        let opts = ClientOptions::parse(uri).unwrap();
        assert_eq!(
            opts.hosts,
            vec![
                ServerAddress::new("h1", Some(27018)),
                ServerAddress::new("h2", Some(27019)),
            ]
        );
        assert_eq!(opts.database.as_deref(), Some("appdb"));
        let cred = opts.credential.as_ref().unwrap();
        assert_eq!(cred.mechanism, AuthMechanism::Default);
        assert_eq!(cred.username.as_deref(), Some("alice"));
        assert_eq!(cred.source, "appdb");
        assert_eq!(cred.password(), Some("secret".as_bytes()));
        assert_eq!(opts.replica_set_name.as_deref(), Some("rs0"));
        match &opts.read_preference {
            SelectionCriteria::ReadPreference(ReadPreference::SecondaryPreferred { tag_sets }) => {
                assert_eq!(tag_sets.len(), 2);
                assert_eq!(tag_sets[0].get("dc").map(String::as_str), Some("east"));
                assert!(tag_sets[1].is_empty());
            }
            other => panic!("unexpected read preference: {other:?}"),
        }
        assert_eq!(opts.write_concern.w, Some(Acknowledgment::Majority));
        assert_eq!(opts.write_concern.w_timeout, Some(Duration::from_millis(250)));
        assert!(opts.ssl_enabled);
    }

    #[test]
    fn options_without_trailing_slash_is_an_error() {
        let err = ClientOptions::parse("mongodb://localhost?replicaSet=rs0").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Config { .. }));
    }

    #[test]
    fn unknown_options_are_warnings_not_failures() {
        let opts = ClientOptions::parse("mongodb://localhost/?madeUpOption=1").unwrap();
        assert_eq!(opts.hosts.len(), 1);
    }

    #[test]
    fn uri_round_trip_is_stable() {
        for uri in [
            "mongodb://localhost",
            "mongodb://alice:secret@h1:27018,h2:27019/appdb?replicaSet=rs0&w=majority",
        ] {
            let first = ClientOptions::parse(uri).unwrap();
            let second = ClientOptions::parse(uri).unwrap();
            assert_eq!(first, second);
        }
    }
}
