//! Read/write selectors and the tag-set types they filter on.

use std::collections::BTreeMap;

/// An ordered list of `{k:v}` maps; a `ServerDescription` matches a tag set
/// if its own `tags` map is a superset of it. An empty map matches any
/// server.
pub type TagSet = BTreeMap<String, String>;

/// Policy selecting which server type(s) and tag set a read may target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReadPreference {
    Primary,
    PrimaryPreferred { tag_sets: Vec<TagSet> },
    Secondary { tag_sets: Vec<TagSet> },
    SecondaryPreferred { tag_sets: Vec<TagSet> },
    Nearest { tag_sets: Vec<TagSet> },
}

impl ReadPreference {
    pub fn primary() -> Self {
        ReadPreference::Primary
    }

    pub fn primary_preferred(tag_sets: Vec<TagSet>) -> Self {
        ReadPreference::PrimaryPreferred { tag_sets }
    }

    pub fn secondary(tag_sets: Vec<TagSet>) -> Self {
        ReadPreference::Secondary { tag_sets }
    }

    pub fn secondary_preferred(tag_sets: Vec<TagSet>) -> Self {
        ReadPreference::SecondaryPreferred { tag_sets }
    }

    pub fn nearest(tag_sets: Vec<TagSet>) -> Self {
        ReadPreference::Nearest { tag_sets }
    }

    /// The ordered tag-set preference list, empty for `Primary` (which
    /// never applies tag filtering).
    pub fn tag_sets(&self) -> &[TagSet] {
        match self {
            ReadPreference::Primary => &[],
            ReadPreference::PrimaryPreferred { tag_sets }
            | ReadPreference::Secondary { tag_sets }
            | ReadPreference::SecondaryPreferred { tag_sets }
            | ReadPreference::Nearest { tag_sets } => tag_sets,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ReadPreference::Primary => "primary",
            ReadPreference::PrimaryPreferred { .. } => "primaryPreferred",
            ReadPreference::Secondary { .. } => "secondary",
            ReadPreference::SecondaryPreferred { .. } => "secondaryPreferred",
            ReadPreference::Nearest { .. } => "nearest",
        }
    }
}

/// The criteria an operation selects a server with: either a durable write
/// (requiring a writable server) or a `ReadPreference`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SelectionCriteria {
    ReadPreference(ReadPreference),
    Write,
}

impl SelectionCriteria {
    pub fn is_write(&self) -> bool {
        matches!(self, SelectionCriteria::Write)
    }
}

impl Default for SelectionCriteria {
    fn default() -> Self {
        SelectionCriteria::ReadPreference(ReadPreference::Primary)
    }
}

/// A `ServerDescription`'s tags are a superset of `wanted` iff every key in
/// `wanted` is present in `tags` with an equal value. An empty `wanted`
/// always matches.
pub(crate) fn tags_match(tags: &TagSet, wanted: &TagSet) -> bool {
    wanted.iter().all(|(k, v)| tags.get(k) == Some(v))
}

#[cfg(test)]
mod test {
    use super::*;

    fn tagset(pairs: &[(&str, &str)]) -> TagSet {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn empty_wanted_matches_anything() {
        let tags = tagset(&[("dc", "east")]);
        assert!(tags_match(&tags, &TagSet::new()));
    }

    #[test]
    fn superset_matches() {
        let tags = tagset(&[("dc", "east"), ("rack", "1")]);
        let wanted = tagset(&[("dc", "east")]);
        assert!(tags_match(&tags, &wanted));
    }

    #[test]
    fn mismatched_value_fails() {
        let tags = tagset(&[("dc", "west")]);
        let wanted = tagset(&[("dc", "east")]);
        assert!(!tags_match(&tags, &wanted));
    }
}
