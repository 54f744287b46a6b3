//! # Host Bridge Traits
//!
//! Capabilities the mirror core needs from whoever hosts it.
//!
//! ## Overview
//!
//! The core never reads the wall clock or writes to a terminal directly.
//! Hosts inject these capabilities so that staleness decisions are
//! deterministic under test and logs can be routed to the host's pipeline.
//!
//! ## Traits
//!
//! - [`Clock`](clock::Clock) - Wall-clock source, in unix seconds
//! - [`LoggerSink`](logging::LoggerSink) - Forward structured logs to host logging
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so they can be shared across the
//! tasks the session spawns.

pub mod clock;
pub mod error;
pub mod logging;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{BridgeError, Result};
pub use logging::{ConsoleLogger, LogEntry, LogLevel, LoggerSink};
