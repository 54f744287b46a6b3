//! # Catalog Library
//!
//! Local mirror of a remote music catalog: the entity model, the field-level
//! merge rules that reconcile two snapshots of the same entity, and the SQLite
//! store that persists them.
//!
//! ## Overview
//!
//! - [`models`]: artists, tracks, albums, playlists and users, each carrying a
//!   sync timestamp and a freshness window
//! - [`merge`]: newest-wins merge helpers shared by every entity kind
//! - [`db`]: connection pool setup and embedded migrations
//! - [`repositories`]: per-kind persistence plus the [`CatalogStore`] facade
//!   used by the sync layer

pub mod db;
pub mod error;
pub mod merge;
pub mod models;
pub mod repositories;

pub use error::{LibraryError, Result};
pub use models::{
    Album, Artist, AuthToken, CatalogEntity, CollectionKind, Entity, EntityId, EntityKind, Image,
    Playlist, Track, User, DEFAULT_EXPIRES_AFTER,
};
pub use repositories::{CatalogStore, PageRequest, SqliteCatalogStore};
