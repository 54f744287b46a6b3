//! Time-related operations.
//!
//! `sleep` and `timeout` integrate with Tokio's timer wheel. `Instant` is
//! monotonic and meant for measuring elapsed time; wall-clock time comes from
//! the `Clock` bridge instead.

pub use tokio::time::{interval, sleep, sleep_until, timeout, Interval, Sleep, Timeout};

pub use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

pub use tokio::time::error::Elapsed;
