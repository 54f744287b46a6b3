//! Outcomes of the collection passes.

use crate::error::SyncError;
use core_library::{EntityId, EntityKind, Playlist, Track};
use serde::Serialize;

/// Result of one favorites reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FavoritesReport {
    /// Tracks newly linked to the user, as cached, in remote order
    pub added: Vec<Track>,
    /// Tracks unlinked from the user; their rows are kept
    pub removed: Vec<Track>,
    /// Tracks that could not be cached and were left unlinked
    #[serde(serialize_with = "serialize_failures")]
    pub failed: Vec<(EntityId, SyncError)>,
}

impl FavoritesReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Result of one followed-playlists reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlaylistsReport {
    /// Playlists followed after the pass, as cached
    pub playlists: Vec<Playlist>,
    pub added: Vec<EntityId>,
    pub removed: Vec<EntityId>,
    #[serde(serialize_with = "serialize_failures")]
    pub failed: Vec<(EntityId, SyncError)>,
}

impl PlaylistsReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Result of a refresh pass over stale or incomplete rows of one kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepReport {
    pub kind: EntityKind,
    pub candidates: usize,
    pub refreshed: Vec<EntityId>,
    #[serde(serialize_with = "serialize_failures")]
    pub failed: Vec<(EntityId, SyncError)>,
}

fn serialize_failures<S>(failures: &[(EntityId, SyncError)], serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    use serde::ser::SerializeMap;

    let mut map = serializer.serialize_map(Some(failures.len()))?;
    for (id, error) in failures {
        map.serialize_entry(id.as_str(), &error.to_string())?;
    }
    map.end()
}
