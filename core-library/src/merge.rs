//! # Snapshot Merging
//!
//! Field-level rules for combining two snapshots of the same entity. Every
//! entity's [`CatalogEntity::merge`] picks the newer operand with
//! [`order_by_recency`] and then combines fields with the helpers below:
//!
//! | Field shape                 | Helper                     | Rule                                   |
//! |-----------------------------|----------------------------|----------------------------------------|
//! | `Option<T>`                 | [`merge_scalar`]           | newer value when present               |
//! | `Vec<T>` of plain values    | [`merge_list`]             | newer list unless empty                |
//! | `BTreeSet<T>`               | [`merge_set`]              | union unless the newer set is empty    |
//! | `Vec<E>` of entities        | [`merge_members`]          | newer defines membership, pairs merged |
//! | `Option<Vec<E>>`            | [`merge_optional_members`] | as above, `None` means not listed      |
//! | `Option<Box<E>>`            | [`merge_reference`]        | same id merges, other id replaces      |
//!
//! Absent data never overwrites present data, except for owned collections,
//! where the newer listing is authoritative and drops elements it no longer
//! contains.

use crate::error::{LibraryError, Result};
use crate::models::{CatalogEntity, EntityId};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Fails with `IdentityMismatch` unless both snapshots describe the same entity.
pub fn ensure_same_identity<E: CatalogEntity>(a: &E, b: &E) -> Result<()> {
    if a.id() != b.id() {
        return Err(LibraryError::IdentityMismatch {
            kind: E::KIND,
            left: a.id().clone(),
            right: b.id().clone(),
        });
    }
    Ok(())
}

/// Returns `(new, old)`. Ties go to `a`, the receiver of the merge.
pub fn order_by_recency<'a, E: CatalogEntity>(a: &'a E, b: &'a E) -> (&'a E, &'a E) {
    if b.timestamp() > a.timestamp() {
        (b, a)
    } else {
        (a, b)
    }
}

pub fn merge_scalar<T: Clone>(new: &Option<T>, old: &Option<T>) -> Option<T> {
    new.as_ref().or(old.as_ref()).cloned()
}

pub fn merge_list<T: Clone>(new: &[T], old: &[T]) -> Vec<T> {
    if new.is_empty() {
        old.to_vec()
    } else {
        new.to_vec()
    }
}

pub fn merge_set<T: Ord + Clone>(new: &BTreeSet<T>, old: &BTreeSet<T>) -> BTreeSet<T> {
    if new.is_empty() {
        old.clone()
    } else {
        new.union(old).cloned().collect()
    }
}

/// Merges two listings of owned entities.
///
/// The result holds exactly the ids of `new`, in `new`'s order, each at most
/// once. Elements also present in `old` are merged with their counterpart;
/// elements only in `old` are dropped.
pub fn merge_members<E: CatalogEntity>(new: &[E], old: &[E]) -> Result<Vec<E>> {
    let previous: HashMap<&EntityId, &E> = old.iter().map(|e| (e.id(), e)).collect();
    let mut seen = HashSet::with_capacity(new.len());
    let mut merged = Vec::with_capacity(new.len());

    for element in new {
        if !seen.insert(element.id()) {
            continue;
        }
        match previous.get(element.id()) {
            Some(counterpart) => merged.push(element.merge(counterpart)?),
            None => merged.push(element.clone()),
        }
    }

    Ok(merged)
}

/// Like [`merge_members`], but a `None` listing means "not listed in this
/// snapshot" and keeps the other side.
pub fn merge_optional_members<E: CatalogEntity>(
    new: &Option<Vec<E>>,
    old: &Option<Vec<E>>,
) -> Result<Option<Vec<E>>> {
    match (new, old) {
        (Some(new), Some(old)) => merge_members(new, old).map(Some),
        (Some(new), None) => merge_members(new, &[]).map(Some),
        (None, old) => Ok(old.clone()),
    }
}

/// Merges a single owned reference such as a track's album.
pub fn merge_reference<E: CatalogEntity>(
    new: &Option<Box<E>>,
    old: &Option<Box<E>>,
) -> Result<Option<Box<E>>> {
    match (new, old) {
        (None, old) => Ok(old.clone()),
        (Some(new), Some(old)) if new.id() == old.id() => Ok(Some(Box::new(new.merge(old)?))),
        (Some(new), _) => Ok(Some(new.clone())),
    }
}

/// Membership equality by id, ignoring order and duplicates.
pub fn same_members<E: CatalogEntity>(left: &[E], right: &[E]) -> bool {
    let left: HashSet<&EntityId> = left.iter().map(|e| e.id()).collect();
    let right: HashSet<&EntityId> = right.iter().map(|e| e.id()).collect();
    left == right
}

pub fn same_optional_members<E: CatalogEntity>(
    left: &Option<Vec<E>>,
    right: &Option<Vec<E>>,
) -> bool {
    match (left, right) {
        (None, None) => true,
        (Some(left), Some(right)) => same_members(left, right),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Album, Artist, Playlist, Track, User};

    fn track(id: &str, ts: i64) -> Track {
        Track::new(id, ts).unwrap()
    }

    fn ids<E: CatalogEntity>(items: &[E]) -> Vec<&str> {
        items.iter().map(|e| e.id().as_str()).collect()
    }

    #[test]
    fn test_merge_rejects_different_ids() {
        let a = Artist::new("a1", 1).unwrap();
        let b = Artist::new("a2", 2).unwrap();

        match a.merge(&b) {
            Err(LibraryError::IdentityMismatch { left, right, .. }) => {
                assert_eq!(left.as_str(), "a1");
                assert_eq!(right.as_str(), "a2");
            }
            other => panic!("expected IdentityMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_merge_is_idempotent() {
        let album = Album::new("al1", 7)
            .unwrap()
            .with_name("Record")
            .with_artists(vec![Artist::new("a1", 7).unwrap().with_name("Band")])
            .with_tracks(vec![track("t1", 7).with_name("One"), track("t2", 7)]);
        let merged = album.merge(&album).unwrap();
        assert!(merged.is_equal(&album));
        assert_eq!(merged.timestamp, 7);

        let user = User::new("u1", 3).unwrap().with_display_name("Someone");
        assert!(user.merge(&user).unwrap().is_equal(&user));
    }

    #[test]
    fn test_merged_timestamp_is_max() {
        let older = track("t1", 5);
        let newer = track("t1", 10);

        assert_eq!(older.merge(&newer).unwrap().timestamp, 10);
        assert_eq!(newer.merge(&older).unwrap().timestamp, 10);
    }

    #[test]
    fn test_newer_scalar_wins_and_older_fills_gaps() {
        let mut older = track("t1", 5).with_name("Old name");
        older.duration_ms = Some(180_000);
        older.popularity = Some(40);

        let mut newer = track("t1", 10).with_name("New name");
        newer.popularity = None;

        let merged = older.merge(&newer).unwrap();
        assert_eq!(merged.name.as_deref(), Some("New name"));
        assert_eq!(merged.duration_ms, Some(180_000));
        assert_eq!(merged.popularity, Some(40));
    }

    #[test]
    fn test_false_is_a_value() {
        let mut older = track("t1", 5);
        older.explicit = Some(true);
        let mut newer = track("t1", 10);
        newer.explicit = Some(false);

        assert_eq!(older.merge(&newer).unwrap().explicit, Some(false));

        newer.explicit = None;
        assert_eq!(older.merge(&newer).unwrap().explicit, Some(true));
    }

    #[test]
    fn test_tie_prefers_receiver() {
        let left = track("t1", 5).with_name("left");
        let right = track("t1", 5).with_name("right");

        assert_eq!(left.merge(&right).unwrap().name.as_deref(), Some("left"));
        assert_eq!(right.merge(&left).unwrap().name.as_deref(), Some("right"));
    }

    #[test]
    fn test_genres_union_unless_new_is_empty() {
        let older = Artist::new("a1", 1).unwrap().with_genres(["rock", "indie"]);
        let newer = Artist::new("a1", 2).unwrap().with_genres(["pop"]);
        let merged = older.merge(&newer).unwrap();
        let genres: Vec<&str> = merged.genres.iter().map(String::as_str).collect();
        assert_eq!(genres, vec!["indie", "pop", "rock"]);

        let partial = Artist::new("a1", 3).unwrap();
        let merged = older.merge(&partial).unwrap();
        assert_eq!(merged.genres, older.genres);
    }

    #[test]
    fn test_newer_listing_defines_playlist_membership() {
        let older = Playlist::new("p1", 5).unwrap().with_tracks(vec![
            track("T1", 5).with_name("First"),
            track("T2", 5),
        ]);
        let mut t1 = track("T1", 10);
        t1.duration_ms = Some(200_000);
        let newer = Playlist::new("p1", 10).unwrap().with_tracks(vec![t1]);

        let merged = older.merge(&newer).unwrap();
        let tracks = merged.tracks.unwrap();
        assert_eq!(ids(&tracks), vec!["T1"]);
        assert_eq!(tracks[0].name.as_deref(), Some("First"));
        assert_eq!(tracks[0].duration_ms, Some(200_000));
    }

    #[test]
    fn test_unlisted_tracks_keep_previous_listing() {
        let older = Album::new("al1", 5)
            .unwrap()
            .with_tracks(vec![track("t1", 5), track("t2", 5)]);
        let newer = Album::new("al1", 10).unwrap().with_name("Record");

        let merged = older.merge(&newer).unwrap();
        assert_eq!(ids(merged.tracks.as_deref().unwrap()), vec!["t1", "t2"]);
        assert_eq!(merged.name.as_deref(), Some("Record"));
    }

    #[test]
    fn test_members_are_deduplicated_in_new_order() {
        let new = vec![track("b", 1), track("a", 1), track("b", 1)];
        let old = vec![track("a", 0), track("c", 0)];

        let merged = merge_members(&new, &old).unwrap();
        assert_eq!(ids(&merged), vec!["b", "a"]);
    }

    #[test]
    fn test_album_reference_merges_or_replaces() {
        let old_album = Album::new("al1", 5).unwrap().with_name("Record");
        let older = track("t1", 5).with_album(old_album);

        let newer = track("t1", 10).with_album(Album::new("al1", 10).unwrap());
        let merged = older.merge(&newer).unwrap();
        let album = merged.album.unwrap();
        assert_eq!(album.name.as_deref(), Some("Record"));
        assert_eq!(album.timestamp, 10);

        let moved = track("t1", 10).with_album(Album::new("al2", 10).unwrap());
        let merged = older.merge(&moved).unwrap();
        let album = merged.album.unwrap();
        assert_eq!(album.id().as_str(), "al2");
        assert!(album.name.is_none());

        let unknown = track("t1", 10);
        let merged = older.merge(&unknown).unwrap();
        assert_eq!(merged.album_id().map(EntityId::as_str), Some("al1"));
    }

    #[test]
    fn test_images_replaced_only_when_present() {
        let mut older = Artist::new("a1", 1).unwrap();
        older.images = vec![crate::models::Image::new("https://img/1")];
        let newer = Artist::new("a1", 2).unwrap();

        assert_eq!(older.merge(&newer).unwrap().images, older.images);
    }
}
