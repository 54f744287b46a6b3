//! Domain models for the catalog mirror
//!
//! Five entity kinds are mirrored from the remote catalog. Every kind shares an
//! immutable [`EntityId`], an optional display name, the unix `timestamp` the
//! snapshot was true as of, and a freshness window (`expires_after`). Anything
//! else may be `None`, meaning "unknown in this snapshot"; [`CatalogEntity::merge`]
//! fills those gaps from another snapshot of the same entity.

use crate::error::{LibraryError, Result};
use crate::merge::{
    ensure_same_identity, merge_list, merge_members, merge_optional_members, merge_reference,
    merge_scalar, merge_set, order_by_recency, same_members, same_optional_members,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Freshness window applied when a kind has no configured TTL.
pub const DEFAULT_EXPIRES_AFTER: Duration = Duration::from_secs(60 * 60 * 4);

// =============================================================================
// Identity
// =============================================================================

/// Remote catalog identifier. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId(String);

impl EntityId {
    /// Rejects empty and whitespace-only ids.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(LibraryError::InvalidEntity(
                "entity id must not be empty".to_string(),
            ));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for EntityId {
    type Error = LibraryError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl TryFrom<&str> for EntityId {
    type Error = LibraryError;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> Self {
        id.0
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The five mirrored entity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Artist,
    Track,
    Album,
    Playlist,
    User,
}

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Artist,
        EntityKind::Track,
        EntityKind::Album,
        EntityKind::Playlist,
        EntityKind::User,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Artist => "artist",
            EntityKind::Track => "track",
            EntityKind::Album => "album",
            EntityKind::Playlist => "playlist",
            EntityKind::User => "user",
        }
    }

    pub fn default_ttl(&self) -> Duration {
        DEFAULT_EXPIRES_AFTER
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = LibraryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "artist" => Ok(EntityKind::Artist),
            "track" => Ok(EntityKind::Track),
            "album" => Ok(EntityKind::Album),
            "playlist" => Ok(EntityKind::Playlist),
            "user" => Ok(EntityKind::User),
            other => Err(LibraryError::InvalidInput {
                field: "entity_kind".to_string(),
                message: format!("unknown entity kind '{}'", other),
            }),
        }
    }
}

/// Membership edges owned by a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionKind {
    /// Saved tracks
    Favorites,
    /// Playlists the user follows
    FollowedPlaylists,
}

impl CollectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionKind::Favorites => "favorites",
            CollectionKind::FollowedPlaylists => "followed_playlists",
        }
    }

    /// Kind of the entities listed in this collection.
    pub fn member_kind(&self) -> EntityKind {
        match self {
            CollectionKind::Favorites => EntityKind::Track,
            CollectionKind::FollowedPlaylists => EntityKind::Playlist,
        }
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CollectionKind {
    type Err = LibraryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "favorites" => Ok(CollectionKind::Favorites),
            "followed_playlists" => Ok(CollectionKind::FollowedPlaylists),
            other => Err(LibraryError::InvalidInput {
                field: "collection_kind".to_string(),
                message: format!("unknown collection kind '{}'", other),
            }),
        }
    }
}

// =============================================================================
// Value types
// =============================================================================

/// Artwork reference as returned by the remote catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Image {
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl Image {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            width: None,
            height: None,
        }
    }
}

/// Opaque credential material for a user. Values never show up in `Debug`.
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthToken(BTreeMap<String, String>);

impl AuthToken {
    pub fn new(fields: BTreeMap<String, String>) -> Self {
        Self(fields)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.0.keys().map(|key| (key, "[REDACTED]")))
            .finish()
    }
}

// =============================================================================
// Shared behaviour
// =============================================================================

/// Behaviour shared by every mirrored entity.
pub trait CatalogEntity: Clone + fmt::Debug + Send + Sync + Sized {
    const KIND: EntityKind;

    fn id(&self) -> &EntityId;
    fn name(&self) -> Option<&str>;
    fn timestamp(&self) -> i64;
    fn set_timestamp(&mut self, timestamp: i64);
    fn expires_after(&self) -> Duration;
    fn set_expires_after(&mut self, ttl: Duration);

    /// Combines two snapshots of the same entity. Newer data wins per field,
    /// absent values never overwrite present ones.
    fn merge(&self, other: &Self) -> Result<Self>;

    /// Same id, same scalars, same nested membership by id.
    fn is_equal(&self, other: &Self) -> bool;

    /// Whether the record carries what a full remote fetch supplies.
    fn is_complete(&self) -> bool;

    /// A snapshot older than its freshness window, or one never synced.
    fn is_stale(&self, now: i64) -> bool {
        let timestamp = self.timestamp();
        if timestamp <= 0 {
            return true;
        }
        let ttl = i64::try_from(self.expires_after().as_secs()).unwrap_or(i64::MAX);
        now.saturating_sub(timestamp) > ttl
    }

    /// True when `observed` carries information this record lacks or contradicts.
    ///
    /// The observation is treated as the newer snapshot regardless of its
    /// timestamp; fields it leaves unknown never count as a disagreement.
    fn is_contradicted_by(&self, observed: &Self) -> Result<bool> {
        let mut observed = observed.clone();
        observed.set_timestamp(observed.timestamp().max(self.timestamp()));
        let merged = observed.merge(self)?;
        Ok(!merged.is_equal(self))
    }
}

// =============================================================================
// Artist
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artist {
    id: EntityId,
    pub name: Option<String>,
    pub timestamp: i64,
    pub expires_after: Duration,
    pub genres: BTreeSet<String>,
    pub images: Vec<Image>,
    pub popularity: Option<u32>,
    pub followers: Option<u64>,
}

impl Artist {
    pub fn new(id: impl Into<String>, timestamp: i64) -> Result<Self> {
        Ok(Self::stub(EntityId::new(id)?, timestamp))
    }

    /// Record that only knows its id.
    pub fn stub(id: EntityId, timestamp: i64) -> Self {
        Self {
            id,
            name: None,
            timestamp,
            expires_after: EntityKind::Artist.default_ttl(),
            genres: BTreeSet::new(),
            images: Vec::new(),
            popularity: None,
            followers: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_genres<I, S>(mut self, genres: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.genres = genres.into_iter().map(Into::into).collect();
        self
    }
}

impl CatalogEntity for Artist {
    const KIND: EntityKind = EntityKind::Artist;

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn timestamp(&self) -> i64 {
        self.timestamp
    }

    fn set_timestamp(&mut self, timestamp: i64) {
        self.timestamp = timestamp;
    }

    fn expires_after(&self) -> Duration {
        self.expires_after
    }

    fn set_expires_after(&mut self, ttl: Duration) {
        self.expires_after = ttl;
    }

    fn merge(&self, other: &Self) -> Result<Self> {
        ensure_same_identity(self, other)?;
        let (new, old) = order_by_recency(self, other);

        Ok(Self {
            id: new.id.clone(),
            name: merge_scalar(&new.name, &old.name),
            timestamp: new.timestamp,
            expires_after: new.expires_after,
            genres: merge_set(&new.genres, &old.genres),
            images: merge_list(&new.images, &old.images),
            popularity: merge_scalar(&new.popularity, &old.popularity),
            followers: merge_scalar(&new.followers, &old.followers),
        })
    }

    fn is_equal(&self, other: &Self) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.genres == other.genres
            && self.images == other.images
            && self.popularity == other.popularity
            && self.followers == other.followers
    }

    fn is_complete(&self) -> bool {
        self.name.is_some() && self.followers.is_some()
    }
}

// =============================================================================
// Track
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    id: EntityId,
    pub name: Option<String>,
    pub timestamp: i64,
    pub expires_after: Duration,
    pub duration_ms: Option<u64>,
    pub disc_number: Option<u32>,
    pub track_number: Option<u32>,
    /// `Some(false)` is a real value, only `None` is unknown
    pub explicit: Option<bool>,
    pub popularity: Option<u32>,
    pub artists: Vec<Artist>,
    pub album: Option<Box<Album>>,
}

impl Track {
    pub fn new(id: impl Into<String>, timestamp: i64) -> Result<Self> {
        Ok(Self::stub(EntityId::new(id)?, timestamp))
    }

    pub fn stub(id: EntityId, timestamp: i64) -> Self {
        Self {
            id,
            name: None,
            timestamp,
            expires_after: EntityKind::Track.default_ttl(),
            duration_ms: None,
            disc_number: None,
            track_number: None,
            explicit: None,
            popularity: None,
            artists: Vec::new(),
            album: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_artists(mut self, artists: Vec<Artist>) -> Self {
        self.artists = artists;
        self
    }

    pub fn with_album(mut self, album: Album) -> Self {
        self.album = Some(Box::new(album));
        self
    }

    pub fn album_id(&self) -> Option<&EntityId> {
        self.album.as_ref().map(|album| album.id())
    }
}

impl CatalogEntity for Track {
    const KIND: EntityKind = EntityKind::Track;

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn timestamp(&self) -> i64 {
        self.timestamp
    }

    fn set_timestamp(&mut self, timestamp: i64) {
        self.timestamp = timestamp;
    }

    fn expires_after(&self) -> Duration {
        self.expires_after
    }

    fn set_expires_after(&mut self, ttl: Duration) {
        self.expires_after = ttl;
    }

    fn merge(&self, other: &Self) -> Result<Self> {
        ensure_same_identity(self, other)?;
        let (new, old) = order_by_recency(self, other);

        Ok(Self {
            id: new.id.clone(),
            name: merge_scalar(&new.name, &old.name),
            timestamp: new.timestamp,
            expires_after: new.expires_after,
            duration_ms: merge_scalar(&new.duration_ms, &old.duration_ms),
            disc_number: merge_scalar(&new.disc_number, &old.disc_number),
            track_number: merge_scalar(&new.track_number, &old.track_number),
            explicit: merge_scalar(&new.explicit, &old.explicit),
            popularity: merge_scalar(&new.popularity, &old.popularity),
            artists: merge_members(&new.artists, &old.artists)?,
            album: merge_reference(&new.album, &old.album)?,
        })
    }

    fn is_equal(&self, other: &Self) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.duration_ms == other.duration_ms
            && self.disc_number == other.disc_number
            && self.track_number == other.track_number
            && self.explicit == other.explicit
            && self.popularity == other.popularity
            && same_members(&self.artists, &other.artists)
            && self.album_id() == other.album_id()
    }

    fn is_complete(&self) -> bool {
        self.name.is_some() && self.duration_ms.is_some() && self.album.is_some()
    }
}

// =============================================================================
// Album
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Album {
    id: EntityId,
    pub name: Option<String>,
    pub timestamp: i64,
    pub expires_after: Duration,
    pub release_date: Option<String>,
    pub total_tracks: Option<u32>,
    pub popularity: Option<u32>,
    pub images: Vec<Image>,
    pub artists: Vec<Artist>,
    /// `None` when this snapshot did not list the tracks
    pub tracks: Option<Vec<Track>>,
}

impl Album {
    pub fn new(id: impl Into<String>, timestamp: i64) -> Result<Self> {
        Ok(Self::stub(EntityId::new(id)?, timestamp))
    }

    pub fn stub(id: EntityId, timestamp: i64) -> Self {
        Self {
            id,
            name: None,
            timestamp,
            expires_after: EntityKind::Album.default_ttl(),
            release_date: None,
            total_tracks: None,
            popularity: None,
            images: Vec::new(),
            artists: Vec::new(),
            tracks: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_artists(mut self, artists: Vec<Artist>) -> Self {
        self.artists = artists;
        self
    }

    pub fn with_tracks(mut self, tracks: Vec<Track>) -> Self {
        self.tracks = Some(tracks);
        self
    }
}

impl CatalogEntity for Album {
    const KIND: EntityKind = EntityKind::Album;

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn timestamp(&self) -> i64 {
        self.timestamp
    }

    fn set_timestamp(&mut self, timestamp: i64) {
        self.timestamp = timestamp;
    }

    fn expires_after(&self) -> Duration {
        self.expires_after
    }

    fn set_expires_after(&mut self, ttl: Duration) {
        self.expires_after = ttl;
    }

    fn merge(&self, other: &Self) -> Result<Self> {
        ensure_same_identity(self, other)?;
        let (new, old) = order_by_recency(self, other);

        Ok(Self {
            id: new.id.clone(),
            name: merge_scalar(&new.name, &old.name),
            timestamp: new.timestamp,
            expires_after: new.expires_after,
            release_date: merge_scalar(&new.release_date, &old.release_date),
            total_tracks: merge_scalar(&new.total_tracks, &old.total_tracks),
            popularity: merge_scalar(&new.popularity, &old.popularity),
            images: merge_list(&new.images, &old.images),
            artists: merge_members(&new.artists, &old.artists)?,
            tracks: merge_optional_members(&new.tracks, &old.tracks)?,
        })
    }

    fn is_equal(&self, other: &Self) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.release_date == other.release_date
            && self.total_tracks == other.total_tracks
            && self.popularity == other.popularity
            && self.images == other.images
            && same_members(&self.artists, &other.artists)
            && same_optional_members(&self.tracks, &other.tracks)
    }

    fn is_complete(&self) -> bool {
        self.name.is_some() && self.release_date.is_some() && self.tracks.is_some()
    }
}

// =============================================================================
// Playlist
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playlist {
    id: EntityId,
    pub name: Option<String>,
    pub timestamp: i64,
    pub expires_after: Duration,
    pub description: Option<String>,
    pub image_url: Option<String>,
    /// Whether this installation curates the playlist. Never set by the remote.
    pub managed: Option<bool>,
    pub genres: BTreeSet<String>,
    pub owner_id: Option<EntityId>,
    pub following_user_id: Option<EntityId>,
    /// `None` when this snapshot did not list the tracks
    pub tracks: Option<Vec<Track>>,
}

impl Playlist {
    pub fn new(id: impl Into<String>, timestamp: i64) -> Result<Self> {
        Ok(Self::stub(EntityId::new(id)?, timestamp))
    }

    pub fn stub(id: EntityId, timestamp: i64) -> Self {
        Self {
            id,
            name: None,
            timestamp,
            expires_after: EntityKind::Playlist.default_ttl(),
            description: None,
            image_url: None,
            managed: None,
            genres: BTreeSet::new(),
            owner_id: None,
            following_user_id: None,
            tracks: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_owner(mut self, owner_id: EntityId) -> Self {
        self.owner_id = Some(owner_id);
        self
    }

    pub fn with_tracks(mut self, tracks: Vec<Track>) -> Self {
        self.tracks = Some(tracks);
        self
    }
}

impl CatalogEntity for Playlist {
    const KIND: EntityKind = EntityKind::Playlist;

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn timestamp(&self) -> i64 {
        self.timestamp
    }

    fn set_timestamp(&mut self, timestamp: i64) {
        self.timestamp = timestamp;
    }

    fn expires_after(&self) -> Duration {
        self.expires_after
    }

    fn set_expires_after(&mut self, ttl: Duration) {
        self.expires_after = ttl;
    }

    fn merge(&self, other: &Self) -> Result<Self> {
        ensure_same_identity(self, other)?;
        let (new, old) = order_by_recency(self, other);

        Ok(Self {
            id: new.id.clone(),
            name: merge_scalar(&new.name, &old.name),
            timestamp: new.timestamp,
            expires_after: new.expires_after,
            description: merge_scalar(&new.description, &old.description),
            image_url: merge_scalar(&new.image_url, &old.image_url),
            managed: merge_scalar(&new.managed, &old.managed),
            genres: merge_set(&new.genres, &old.genres),
            owner_id: merge_scalar(&new.owner_id, &old.owner_id),
            following_user_id: merge_scalar(&new.following_user_id, &old.following_user_id),
            tracks: merge_optional_members(&new.tracks, &old.tracks)?,
        })
    }

    fn is_equal(&self, other: &Self) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.description == other.description
            && self.image_url == other.image_url
            && self.managed == other.managed
            && self.genres == other.genres
            && self.owner_id == other.owner_id
            && self.following_user_id == other.following_user_id
            && same_optional_members(&self.tracks, &other.tracks)
    }

    fn is_complete(&self) -> bool {
        self.name.is_some() && self.tracks.is_some()
    }
}

// =============================================================================
// User
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    id: EntityId,
    pub name: Option<String>,
    pub timestamp: i64,
    pub expires_after: Duration,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub image_url: Option<String>,
    pub followers: Option<u64>,
    pub auth_token: Option<AuthToken>,
}

impl User {
    pub fn new(id: impl Into<String>, timestamp: i64) -> Result<Self> {
        Ok(Self::stub(EntityId::new(id)?, timestamp))
    }

    pub fn stub(id: EntityId, timestamp: i64) -> Self {
        Self {
            id,
            name: None,
            timestamp,
            expires_after: EntityKind::User.default_ttl(),
            display_name: None,
            email: None,
            image_url: None,
            followers: None,
            auth_token: None,
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }
}

impl CatalogEntity for User {
    const KIND: EntityKind = EntityKind::User;

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn timestamp(&self) -> i64 {
        self.timestamp
    }

    fn set_timestamp(&mut self, timestamp: i64) {
        self.timestamp = timestamp;
    }

    fn expires_after(&self) -> Duration {
        self.expires_after
    }

    fn set_expires_after(&mut self, ttl: Duration) {
        self.expires_after = ttl;
    }

    fn merge(&self, other: &Self) -> Result<Self> {
        ensure_same_identity(self, other)?;
        let (new, old) = order_by_recency(self, other);

        Ok(Self {
            id: new.id.clone(),
            name: merge_scalar(&new.name, &old.name),
            timestamp: new.timestamp,
            expires_after: new.expires_after,
            display_name: merge_scalar(&new.display_name, &old.display_name),
            email: merge_scalar(&new.email, &old.email),
            image_url: merge_scalar(&new.image_url, &old.image_url),
            followers: merge_scalar(&new.followers, &old.followers),
            auth_token: merge_scalar(&new.auth_token, &old.auth_token),
        })
    }

    fn is_equal(&self, other: &Self) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.display_name == other.display_name
            && self.email == other.email
            && self.image_url == other.image_url
            && self.followers == other.followers
            && self.auth_token == other.auth_token
    }

    fn is_complete(&self) -> bool {
        self.display_name.is_some() || self.name.is_some()
    }
}

// =============================================================================
// Kind-erased entity
// =============================================================================

/// Any mirrored entity. Used where the kind is only known at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Entity {
    Artist(Artist),
    Track(Track),
    Album(Album),
    Playlist(Playlist),
    User(User),
}

macro_rules! dispatch {
    ($entity:expr, $inner:ident => $body:expr) => {
        match $entity {
            Entity::Artist($inner) => $body,
            Entity::Track($inner) => $body,
            Entity::Album($inner) => $body,
            Entity::Playlist($inner) => $body,
            Entity::User($inner) => $body,
        }
    };
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Artist(_) => EntityKind::Artist,
            Entity::Track(_) => EntityKind::Track,
            Entity::Album(_) => EntityKind::Album,
            Entity::Playlist(_) => EntityKind::Playlist,
            Entity::User(_) => EntityKind::User,
        }
    }

    pub fn id(&self) -> &EntityId {
        dispatch!(self, e => e.id())
    }

    pub fn name(&self) -> Option<&str> {
        dispatch!(self, e => e.name())
    }

    pub fn timestamp(&self) -> i64 {
        dispatch!(self, e => e.timestamp())
    }

    pub fn set_timestamp(&mut self, timestamp: i64) {
        dispatch!(self, e => e.set_timestamp(timestamp))
    }

    pub fn set_expires_after(&mut self, ttl: Duration) {
        dispatch!(self, e => e.set_expires_after(ttl))
    }

    pub fn is_stale(&self, now: i64) -> bool {
        dispatch!(self, e => e.is_stale(now))
    }

    pub fn is_complete(&self) -> bool {
        dispatch!(self, e => e.is_complete())
    }

    /// Merges two snapshots. Different kinds fail with `TypeMismatch`.
    pub fn merge(&self, other: &Entity) -> Result<Entity> {
        match (self, other) {
            (Entity::Artist(a), Entity::Artist(b)) => Ok(Entity::Artist(a.merge(b)?)),
            (Entity::Track(a), Entity::Track(b)) => Ok(Entity::Track(a.merge(b)?)),
            (Entity::Album(a), Entity::Album(b)) => Ok(Entity::Album(a.merge(b)?)),
            (Entity::Playlist(a), Entity::Playlist(b)) => Ok(Entity::Playlist(a.merge(b)?)),
            (Entity::User(a), Entity::User(b)) => Ok(Entity::User(a.merge(b)?)),
            (a, b) => Err(LibraryError::TypeMismatch {
                left: a.kind(),
                right: b.kind(),
            }),
        }
    }

    /// Structural equality. Entities of different kinds are never equal.
    pub fn is_equal(&self, other: &Entity) -> bool {
        match (self, other) {
            (Entity::Artist(a), Entity::Artist(b)) => a.is_equal(b),
            (Entity::Track(a), Entity::Track(b)) => a.is_equal(b),
            (Entity::Album(a), Entity::Album(b)) => a.is_equal(b),
            (Entity::Playlist(a), Entity::Playlist(b)) => a.is_equal(b),
            (Entity::User(a), Entity::User(b)) => a.is_equal(b),
            _ => false,
        }
    }

    pub fn is_contradicted_by(&self, observed: &Entity) -> Result<bool> {
        match (self, observed) {
            (Entity::Artist(a), Entity::Artist(b)) => a.is_contradicted_by(b),
            (Entity::Track(a), Entity::Track(b)) => a.is_contradicted_by(b),
            (Entity::Album(a), Entity::Album(b)) => a.is_contradicted_by(b),
            (Entity::Playlist(a), Entity::Playlist(b)) => a.is_contradicted_by(b),
            (Entity::User(a), Entity::User(b)) => a.is_contradicted_by(b),
            (a, b) => Err(LibraryError::TypeMismatch {
                left: a.kind(),
                right: b.kind(),
            }),
        }
    }
}

macro_rules! entity_conversions {
    ($($variant:ident),+ $(,)?) => {
        $(
            impl From<$variant> for Entity {
                fn from(value: $variant) -> Self {
                    Entity::$variant(value)
                }
            }

            impl TryFrom<Entity> for $variant {
                type Error = LibraryError;

                fn try_from(entity: Entity) -> Result<Self> {
                    match entity {
                        Entity::$variant(inner) => Ok(inner),
                        other => Err(LibraryError::TypeMismatch {
                            left: EntityKind::$variant,
                            right: other.kind(),
                        }),
                    }
                }
            }
        )+
    };
}

entity_conversions!(Artist, Track, Album, Playlist, User);
