//! Row types and column conversions shared by the repositories.
//!
//! SQLite stores every integer as `i64`; the entity model uses narrower
//! unsigned types. Conversions that do not fit fail with `InvalidInput`
//! instead of truncating.

use crate::error::{LibraryError, Result};
use crate::models::{Album, Artist, AuthToken, EntityId, Image, Playlist, Track, User};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::FromRow;
use std::collections::BTreeSet;

#[derive(Debug, Clone, FromRow)]
pub(crate) struct ArtistRow {
    pub id: String,
    pub name: Option<String>,
    pub genres: String,
    pub images: String,
    pub popularity: Option<i64>,
    pub followers: Option<i64>,
    pub timestamp: i64,
}

impl ArtistRow {
    pub fn into_artist(self) -> Result<Artist> {
        let mut artist = Artist::stub(EntityId::new(self.id)?, self.timestamp);
        artist.name = self.name;
        artist.genres = decode_json::<BTreeSet<String>>("genres", &self.genres)?;
        artist.images = decode_json::<Vec<Image>>("images", &self.images)?;
        artist.popularity = narrow("popularity", self.popularity)?;
        artist.followers = narrow("followers", self.followers)?;
        Ok(artist)
    }
}

#[derive(Debug, Clone, FromRow)]
pub(crate) struct AlbumRow {
    pub id: String,
    pub name: Option<String>,
    pub release_date: Option<String>,
    pub total_tracks: Option<i64>,
    pub popularity: Option<i64>,
    pub images: String,
    pub tracks_listed: i64,
    pub timestamp: i64,
}

impl AlbumRow {
    /// Album without its artists; tracks stay unlisted.
    pub fn into_album(self) -> Result<Album> {
        let mut album = Album::stub(EntityId::new(self.id)?, self.timestamp);
        album.name = self.name;
        album.release_date = self.release_date;
        album.total_tracks = narrow("total_tracks", self.total_tracks)?;
        album.popularity = narrow("popularity", self.popularity)?;
        album.images = decode_json::<Vec<Image>>("images", &self.images)?;
        Ok(album)
    }
}

#[derive(Debug, Clone, FromRow)]
pub(crate) struct TrackRow {
    pub id: String,
    pub name: Option<String>,
    pub duration_ms: Option<i64>,
    pub disc_number: Option<i64>,
    pub track_number: Option<i64>,
    pub explicit: Option<bool>,
    pub popularity: Option<i64>,
    pub album_id: Option<String>,
    pub timestamp: i64,
}

impl TrackRow {
    /// Track without artists or album; `album_id` is left for the caller.
    pub fn into_track(self) -> Result<Track> {
        let mut track = Track::stub(EntityId::new(self.id)?, self.timestamp);
        track.name = self.name;
        track.duration_ms = narrow("duration_ms", self.duration_ms)?;
        track.disc_number = narrow("disc_number", self.disc_number)?;
        track.track_number = narrow("track_number", self.track_number)?;
        track.explicit = self.explicit;
        track.popularity = narrow("popularity", self.popularity)?;
        Ok(track)
    }
}

#[derive(Debug, Clone, FromRow)]
pub(crate) struct PlaylistRow {
    pub id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub managed: Option<bool>,
    pub genres: String,
    pub owner_id: Option<String>,
    pub following_user_id: Option<String>,
    pub tracks_listed: i64,
    pub timestamp: i64,
}

impl PlaylistRow {
    pub fn into_playlist(self) -> Result<Playlist> {
        let mut playlist = Playlist::stub(EntityId::new(self.id)?, self.timestamp);
        playlist.name = self.name;
        playlist.description = self.description;
        playlist.image_url = self.image_url;
        playlist.managed = self.managed;
        playlist.genres = decode_json::<BTreeSet<String>>("genres", &self.genres)?;
        playlist.owner_id = self.owner_id.map(EntityId::new).transpose()?;
        playlist.following_user_id = self.following_user_id.map(EntityId::new).transpose()?;
        Ok(playlist)
    }
}

#[derive(Debug, Clone, FromRow)]
pub(crate) struct UserRow {
    pub id: String,
    pub name: Option<String>,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub image_url: Option<String>,
    pub followers: Option<i64>,
    pub auth_token: Option<String>,
    pub timestamp: i64,
}

impl UserRow {
    pub fn into_user(self) -> Result<User> {
        let mut user = User::stub(EntityId::new(self.id)?, self.timestamp);
        user.name = self.name;
        user.display_name = self.display_name;
        user.email = self.email;
        user.image_url = self.image_url;
        user.followers = narrow("followers", self.followers)?;
        user.auth_token = self
            .auth_token
            .as_deref()
            .map(|raw| decode_json::<AuthToken>("auth_token", raw))
            .transpose()?;
        Ok(user)
    }
}

pub(crate) fn narrow<T>(field: &str, value: Option<i64>) -> Result<Option<T>>
where
    T: TryFrom<i64>,
{
    value
        .map(|raw| {
            T::try_from(raw).map_err(|_| LibraryError::InvalidInput {
                field: field.to_string(),
                message: format!("value {} out of range", raw),
            })
        })
        .transpose()
}

pub(crate) fn widen<T>(field: &str, value: Option<T>) -> Result<Option<i64>>
where
    T: Copy + TryInto<i64> + std::fmt::Display,
{
    value
        .map(|v| {
            v.try_into().map_err(|_| LibraryError::InvalidInput {
                field: field.to_string(),
                message: format!("value {} out of range", v),
            })
        })
        .transpose()
}

pub(crate) fn encode_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

pub(crate) fn decode_json<T: DeserializeOwned>(field: &str, raw: &str) -> Result<T> {
    serde_json::from_str(raw).map_err(|e| LibraryError::InvalidInput {
        field: field.to_string(),
        message: format!("malformed column: {}", e),
    })
}
