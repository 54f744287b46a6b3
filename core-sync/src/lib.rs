//! # Catalog Sync
//!
//! Keeps the local mirror consistent with the remote catalog.
//!
//! ## Overview
//!
//! The remote catalog is pull-only: nothing is pushed to this process, so the
//! mirror decides for itself when a local record can be trusted and when it
//! has to be fetched again.
//!
//! ## Components
//!
//! - **Diff** (`diff`): added/removed members between a local and a remote listing
//! - **Source** (`source`): the remote catalog seam and its error classes
//! - **Retry** (`retry`): linear backoff for transient remote failures
//! - **Single flight** (`singleflight`): at most one refresh per entity at a time
//! - **Session** (`session`): the staleness-driven refresh policy and the
//!   favorites / followed-playlists reconciliation passes

pub mod diff;
pub mod error;
pub mod report;
pub mod retry;
pub mod session;
pub mod singleflight;
pub mod source;

pub use diff::{diff, Delta, Keyed};
pub use error::{Result, SyncError};
pub use report::{FavoritesReport, PlaylistsReport, SweepReport};
pub use retry::{retry_transient, FetchFailure};
pub use session::{CacheState, MirrorSession, Resolution, SessionConfig};
pub use singleflight::{Flight, FlightFollower, FlightLeader, SingleFlight};
pub use source::{CatalogSource, FetchOutcome, SourceError, SourcePage};
