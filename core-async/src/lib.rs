//! Async facade for the catalog mirror.
//!
//! Every other crate in the workspace goes through this crate for tasks,
//! timers and synchronization instead of depending on Tokio directly. That
//! keeps the executor choice in one place and gives the test suites a single
//! `#[core_async::test]` attribute.
//!
//! # Modules
//!
//! - `task`: Task spawning and joining
//! - `time`: Sleep, timeouts, durations and instants
//! - `sync`: Mutexes, semaphores, channels and cancellation tokens
//! - `runtime`: `block_on` for synchronous entry points
//!
//! # Examples
//!
//! ```rust
//! use core_async::task;
//! use core_async::time::{sleep, Duration};
//!
//! async fn example() {
//!     let handle = task::spawn(async {
//!         sleep(Duration::from_millis(5)).await;
//!         42
//!     });
//!     assert_eq!(handle.await.unwrap(), 42);
//! }
//! ```

pub use core_async_macros::{main, test};

pub mod runtime;
pub mod sync;
pub mod task;
pub mod time;

/// Waits on several branches at once and runs the first one to complete.
pub use tokio::select;

pub use task::spawn;
pub use time::{sleep, Duration, Instant};
