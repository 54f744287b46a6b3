//! Synchronization primitives.
//!
//! Thin re-exports of `tokio::sync` plus the cancellation token from
//! `tokio-util`. All primitives are `Send + Sync` and async-aware, so holding
//! a guard across an `.await` never blocks the executor.
//!
//! # Examples
//!
//! ```rust
//! use core_async::sync::{Mutex, Semaphore};
//!
//! async fn example() {
//!     let mutex = Mutex::new(42);
//!     *mutex.lock().await += 1;
//!
//!     let permits = Semaphore::new(2);
//!     let _permit = permits.acquire().await.unwrap();
//! }
//! ```

pub use tokio::sync::{
    broadcast, mpsc, oneshot, watch, Barrier, Mutex, MutexGuard, Notify, OwnedSemaphorePermit,
    RwLock, RwLockReadGuard, RwLockWriteGuard, Semaphore, SemaphorePermit,
};

pub use tokio_util::sync::CancellationToken;
