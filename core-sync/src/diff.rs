//! # Collection Diff
//!
//! Compares a local listing with a remote one by identity only. Content
//! differences between members present on both sides are not reported here;
//! those are resolved per entity by merging.
//!
//! Runs in `O(|local| + |remote|)` using id sets.

use core_library::{Album, Artist, CatalogEntity, Entity, EntityId, Playlist, Track, User};
use std::collections::HashSet;

/// Anything with a catalog identity.
pub trait Keyed {
    fn key(&self) -> &EntityId;
}

impl Keyed for EntityId {
    fn key(&self) -> &EntityId {
        self
    }
}

impl Keyed for Entity {
    fn key(&self) -> &EntityId {
        self.id()
    }
}

macro_rules! keyed_entity {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl Keyed for $ty {
                fn key(&self) -> &EntityId {
                    self.id()
                }
            }
        )+
    };
}

keyed_entity!(Artist, Track, Album, Playlist, User);

/// Result of [`diff`].
///
/// `added` holds remote members missing locally, in remote order. `removed`
/// holds local members missing remotely, in local order. Each id appears at
/// most once, and no id appears in both.
#[derive(Debug, Clone, PartialEq)]
pub struct Delta<L, R = L> {
    pub added: Vec<R>,
    pub removed: Vec<L>,
}

impl<L, R> Delta<L, R> {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

impl<L, R> Default for Delta<L, R> {
    fn default() -> Self {
        Self {
            added: Vec::new(),
            removed: Vec::new(),
        }
    }
}

pub fn diff<L, R>(local: &[L], remote: &[R]) -> Delta<L, R>
where
    L: Keyed + Clone,
    R: Keyed + Clone,
{
    let local_ids: HashSet<&EntityId> = local.iter().map(Keyed::key).collect();
    let remote_ids: HashSet<&EntityId> = remote.iter().map(Keyed::key).collect();

    Delta {
        added: only_in(remote, &local_ids),
        removed: only_in(local, &remote_ids),
    }
}

fn only_in<T: Keyed + Clone>(items: &[T], other: &HashSet<&EntityId>) -> Vec<T> {
    let mut seen = HashSet::new();
    items
        .iter()
        .filter(|item| !other.contains(item.key()) && seen.insert(item.key()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(id: &str, ts: i64) -> Track {
        Track::new(id, ts).unwrap()
    }

    fn keys<T: Keyed>(items: &[T]) -> Vec<&str> {
        items.iter().map(|i| i.key().as_str()).collect()
    }

    #[test]
    fn test_identical_listings_have_no_delta() {
        let listing = vec![track("a", 1), track("b", 2)];
        let delta = diff(&listing, &listing);
        assert!(delta.is_empty());
    }

    #[test]
    fn test_added_and_removed() {
        let local = vec![track("a", 1), track("b", 1)];
        let remote = vec![track("b", 5), track("c", 5)];

        let delta = diff(&local, &remote);
        assert_eq!(keys(&delta.added), vec!["c"]);
        assert_eq!(keys(&delta.removed), vec!["a"]);
    }

    #[test]
    fn test_swapping_arguments_swaps_sides() {
        let left = vec![track("a", 1), track("b", 1)];
        let right = vec![track("b", 1), track("c", 1), track("d", 1)];

        let forward = diff(&left, &right);
        let backward = diff(&right, &left);
        assert_eq!(keys(&forward.added), keys(&backward.removed));
        assert_eq!(keys(&forward.removed), keys(&backward.added));
    }

    #[test]
    fn test_identity_ignores_content() {
        let local = vec![track("a", 1).with_name("Old")];
        let remote = vec![track("a", 9).with_name("New")];
        assert!(diff(&local, &remote).is_empty());
    }

    #[test]
    fn test_duplicates_reported_once_in_remote_order() {
        let local: Vec<EntityId> = vec![EntityId::new("x").unwrap()];
        let remote = vec![track("c", 1), track("b", 1), track("c", 2), track("x", 1)];

        let delta = diff(&local, &remote);
        assert_eq!(keys(&delta.added), vec!["c", "b"]);
        assert!(delta.removed.is_empty());
    }

    #[test]
    fn test_ids_against_entities() {
        let local: Vec<EntityId> = ["t1", "t3"]
            .iter()
            .map(|id| EntityId::new(*id).unwrap())
            .collect();
        let remote = vec![track("t1", 1), track("t2", 1)];

        let delta = diff(&local, &remote);
        assert_eq!(keys(&delta.added), vec!["t2"]);
        assert_eq!(keys(&delta.removed), vec!["t3"]);
    }

    #[test]
    fn test_large_listing() {
        let local: Vec<Track> = (0..5_000).map(|i| track(&format!("t{}", i), 1)).collect();
        let remote: Vec<Track> = (2_500..7_500)
            .map(|i| track(&format!("t{}", i), 1))
            .collect();

        let delta = diff(&local, &remote);
        assert_eq!(delta.added.len(), 2_500);
        assert_eq!(delta.removed.len(), 2_500);
        assert_eq!(delta.added[0].key().as_str(), "t5000");
        assert_eq!(delta.removed[0].key().as_str(), "t0");
    }
}
