//! # Core Runtime Module
//!
//! Runtime infrastructure shared by the mirror crates:
//! - Logging and tracing bootstrap
//! - Configuration with fail-fast validation
//! - Event bus for reconciliation progress
//!
//! ## Overview
//!
//! Nothing in here knows about entities. The library and sync crates read
//! their knobs from [`config::CoreConfig`], log through `tracing`, and
//! publish [`events::MirrorEvent`]s that hosts can subscribe to.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
