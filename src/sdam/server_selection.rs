//! Read/write selector evaluation and the latency window.
//!
//! `select` evaluates a selector against the latest `ClusterDescription`
//! snapshot and returns a chosen address, or `None` for the caller to
//! retry against a later snapshot — a plain synchronous function, with no
//! async plumbing of its own.

use rand::seq::SliceRandom;

use super::description::{ClusterDescription, ServerDescription, ServerType};
use crate::{
    options::{ClusterMode, ServerAddress},
    selection_criteria::{tags_match, ReadPreference, SelectionCriteria, TagSet},
};

/// Among the servers a selector admits, every server whose RTT is within
/// 15ms of the minimum RTT is an equally likely candidate.
const LATENCY_WINDOW: std::time::Duration = std::time::Duration::from_millis(15);

fn is_writable(server_type: ServerType) -> bool {
    matches!(
        server_type,
        ServerType::Standalone | ServerType::RsPrimary | ServerType::Mongos
    )
}

fn is_readable_primary(server_type: ServerType) -> bool {
    is_writable(server_type)
}

fn primary_candidates(description: &ClusterDescription) -> Vec<&ServerDescription> {
    description
        .servers
        .values()
        .filter(|s| s.ok && is_readable_primary(s.server_type))
        .collect()
}

/// Filters replica-set secondaries by the first tag set in `tag_sets` that
/// yields at least one match. An empty
/// `tag_sets` list is treated as a single empty tag set, which matches
/// anything.
fn secondary_candidates<'a>(
    description: &'a ClusterDescription,
    tag_sets: &[TagSet],
) -> Vec<&'a ServerDescription> {
    let empty = [TagSet::new()];
    let tag_sets = if tag_sets.is_empty() { &empty[..] } else { tag_sets };

    for wanted in tag_sets {
        let matches: Vec<&ServerDescription> = description
            .servers
            .values()
            .filter(|s| s.ok && s.server_type == ServerType::RsSecondary && tags_match(&s.tags, wanted))
            .collect();
        if !matches.is_empty() {
            return matches;
        }
    }
    Vec::new()
}

fn nearest_candidates<'a>(
    description: &'a ClusterDescription,
    tag_sets: &[TagSet],
) -> Vec<&'a ServerDescription> {
    let empty = [TagSet::new()];
    let tag_sets = if tag_sets.is_empty() { &empty[..] } else { tag_sets };

    for wanted in tag_sets {
        let matches: Vec<&ServerDescription> = description
            .servers
            .values()
            .filter(|s| {
                s.ok
                    && matches!(s.server_type, ServerType::RsPrimary | ServerType::RsSecondary)
                    && tags_match(&s.tags, wanted)
            })
            .collect();
        if !matches.is_empty() {
            return matches;
        }
    }
    Vec::new()
}

fn candidates_for_read_preference<'a>(
    preference: &ReadPreference,
    description: &'a ClusterDescription,
) -> Vec<&'a ServerDescription> {
    match preference {
        ReadPreference::Primary => primary_candidates(description),
        ReadPreference::PrimaryPreferred { tag_sets } => {
            let primary = primary_candidates(description);
            if !primary.is_empty() {
                primary
            } else {
                secondary_candidates(description, tag_sets)
            }
        }
        ReadPreference::Secondary { tag_sets } => secondary_candidates(description, tag_sets),
        ReadPreference::SecondaryPreferred { tag_sets } => {
            let secondary = secondary_candidates(description, tag_sets);
            if !secondary.is_empty() {
                secondary
            } else {
                primary_candidates(description)
            }
        }
        ReadPreference::Nearest { tag_sets } => nearest_candidates(description, tag_sets),
    }
}

/// The full candidate set admitted by `criteria` against `description`,
/// before the latency window is applied. Exposed for tests; callers should
/// use [`select`].
fn candidates<'a>(
    criteria: &SelectionCriteria,
    description: &'a ClusterDescription,
) -> Vec<&'a ServerDescription> {
    // Shard routers and standalones ignore tags, and any selector against a
    // sharded cluster collapses to "any Mongos".
    if description.mode == ClusterMode::Sharded {
        return description
            .servers
            .values()
            .filter(|s| s.ok && s.server_type == ServerType::Mongos)
            .collect();
    }

    match criteria {
        SelectionCriteria::Write => description
            .servers
            .values()
            .filter(|s| s.ok && is_writable(s.server_type))
            .collect(),
        SelectionCriteria::ReadPreference(preference) => {
            candidates_for_read_preference(preference, description)
        }
    }
}

/// Applies the 15ms latency window to `candidates`, returning the subset
/// that are equally eligible.
fn apply_latency_window<'a>(candidates: Vec<&'a ServerDescription>) -> Vec<&'a ServerDescription> {
    let Some(min_rtt) = candidates
        .iter()
        .filter_map(|s| s.round_trip_time)
        .min()
    else {
        // No candidate has a measured RTT yet (e.g. immediately after
        // topology discovery); admit them all rather than stalling.
        return candidates;
    };

    candidates
        .into_iter()
        .filter(|s| match s.round_trip_time {
            Some(rtt) => rtt <= min_rtt + LATENCY_WINDOW,
            None => false,
        })
        .collect()
}

/// Evaluates `criteria` against `description` and returns one matching
/// address, chosen uniformly at random among the servers within the
/// latency window, or `None` if no server currently qualifies — the
/// caller is expected to wait and retry on `None`.
pub(crate) fn select(
    criteria: &SelectionCriteria,
    description: &ClusterDescription,
) -> Option<ServerAddress> {
    let windowed = apply_latency_window(candidates(criteria, description));
    windowed
        .choose(&mut rand::thread_rng())
        .map(|s| s.address.clone())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::options::ServerAddress;
    use bson::doc;
    use std::time::Duration;

    fn server(addr: &str, server_type: ServerType, rtt_ms: u64) -> ServerDescription {
        ServerDescription {
            round_trip_time: Some(Duration::from_millis(rtt_ms)),
            ok: true,
            ..ServerDescription::unknown(addr.parse().unwrap())
        }
        .with_type(server_type)
    }

    impl ServerDescription {
        fn with_type(mut self, t: ServerType) -> Self {
            self.server_type = t;
            self
        }
    }

    fn cluster(servers: Vec<ServerDescription>, mode: ClusterMode) -> ClusterDescription {
        let mut desc = ClusterDescription::new(mode, None);
        for s in servers {
            desc.servers.insert(s.address.clone(), s);
        }
        desc
    }

    #[test]
    fn write_selects_only_writable_types() {
        let desc = cluster(
            vec![
                server("a:1", ServerType::RsSecondary, 1),
                server("b:1", ServerType::RsPrimary, 1),
            ],
            ClusterMode::ReplicaSet,
        );
        let selected = select(&SelectionCriteria::Write, &desc).unwrap();
        assert_eq!(selected, "b:1".parse().unwrap());
    }

    #[test]
    fn secondary_selection_requires_tag_match() {
        let mut secondary = server("a:1", ServerType::RsSecondary, 1);
        secondary.tags.insert("dc".to_string(), "east".to_string());
        let desc = cluster(vec![secondary], ClusterMode::ReplicaSet);

        let wanted = doc! { "dc": "west" };
        let tag_set: TagSet = wanted
            .iter()
            .map(|(k, v)| (k.clone(), v.as_str().unwrap().to_string()))
            .collect();
        let criteria = SelectionCriteria::ReadPreference(ReadPreference::secondary(vec![tag_set]));
        assert!(select(&criteria, &desc).is_none());
    }

    #[test]
    fn secondary_preferred_falls_back_to_primary() {
        let desc = cluster(
            vec![server("p:1", ServerType::RsPrimary, 1)],
            ClusterMode::ReplicaSet,
        );
        let criteria = SelectionCriteria::ReadPreference(ReadPreference::secondary_preferred(vec![]));
        assert_eq!(select(&criteria, &desc).unwrap(), "p:1".parse().unwrap());
    }

    #[test]
    fn sharded_mode_selects_any_mongos_regardless_of_criteria() {
        let desc = cluster(vec![server("s:1", ServerType::Mongos, 1)], ClusterMode::Sharded);
        assert_eq!(select(&SelectionCriteria::Write, &desc).unwrap(), "s:1".parse().unwrap());
        let read = SelectionCriteria::ReadPreference(ReadPreference::secondary(vec![]));
        assert_eq!(select(&read, &desc).unwrap(), "s:1".parse().unwrap());
    }

    #[test]
    fn latency_window_admits_all_within_fifteen_millis_of_the_minimum() {
        let desc = cluster(
            vec![
                server("a:1", ServerType::RsPrimary, 0),
                server("b:1", ServerType::RsSecondary, 10),
                server("c:1", ServerType::RsSecondary, 20),
            ],
            ClusterMode::ReplicaSet,
        );
        let windowed = apply_latency_window(candidates(&SelectionCriteria::Write, &desc));
        assert_eq!(windowed.len(), 1);

        let read = SelectionCriteria::ReadPreference(ReadPreference::nearest(vec![]));
        let windowed = apply_latency_window(candidates(&read, &desc));
        // a(0) and b(10) are within 15ms of the 0ms minimum; c(20) is not.
        assert_eq!(windowed.len(), 2);
    }

    #[test]
    fn no_qualifying_server_returns_none() {
        let desc = ClusterDescription::new(ClusterMode::ReplicaSet, None);
        assert!(select(&SelectionCriteria::Write, &desc).is_none());
    }
}
