//! Retries for transient remote failures.
//!
//! Waits `base_delay + step * attempt` between attempts (1s, 3s, 5s, 7s with
//! the default policy). A rate-limit hint longer than the computed delay wins.
//! Non-transient failures return after the first attempt.

use crate::error::SyncError;
use crate::source::SourceError;
use core_runtime::config::RetryPolicy;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// A remote call that did not succeed within the retry budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    pub error: SourceError,
    pub attempts: u32,
}

impl FetchFailure {
    /// Whether retries ran out on a transient error, as opposed to a
    /// permanent rejection.
    pub fn exhausted(&self) -> bool {
        self.error.is_transient()
    }

    pub fn into_sync_error(self, target: impl Into<String>) -> SyncError {
        let target = target.into();
        match self.error {
            SourceError::Unauthorized(message) => SyncError::Unauthorized { target, message },
            error => SyncError::FetchFailed {
                target,
                attempts: self.attempts,
                message: error.to_string(),
            },
        }
    }
}

/// Runs `operation` until it succeeds, fails permanently, or the policy's
/// attempts are used up. The closure receives the 0-based attempt number.
pub async fn retry_transient<T, F, Fut>(
    policy: &RetryPolicy,
    target: &str,
    mut operation: F,
) -> Result<T, FetchFailure>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, SourceError>>,
{
    let mut attempt = 0;
    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) if !error.is_transient() => {
                debug!(target_entity = target, error = %error, "Remote call failed permanently");
                return Err(FetchFailure {
                    error,
                    attempts: attempt + 1,
                });
            }
            Err(error) if attempt >= policy.max_retries => {
                warn!(
                    target_entity = target,
                    attempts = attempt + 1,
                    error = %error,
                    "Giving up on remote call"
                );
                return Err(FetchFailure {
                    error,
                    attempts: attempt + 1,
                });
            }
            Err(error) => {
                let delay = backoff(policy, attempt, &error);
                warn!(
                    target_entity = target,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Transient remote failure, retrying"
                );
                if !delay.is_zero() {
                    core_async::time::sleep(delay).await;
                }
                attempt += 1;
            }
        }
    }
}

fn backoff(policy: &RetryPolicy, attempt: u32, error: &SourceError) -> Duration {
    let computed = policy.delay_for(attempt);
    match error {
        SourceError::RateLimited {
            retry_after: Some(hint),
        } => computed.max(*hint),
        _ => computed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{CatalogSource, FetchOutcome, SourcePage};
    use async_trait::async_trait;
    use core_library::{CollectionKind, EntityId, EntityKind, PageRequest};
    use mockall::{mock, Sequence};

    mock! {
        pub Source {}

        #[async_trait]
        impl CatalogSource for Source {
            async fn fetch(&self, kind: EntityKind, id: &EntityId) -> Result<FetchOutcome, SourceError>;
            async fn fetch_page(
                &self,
                collection: CollectionKind,
                user_id: &EntityId,
                page: PageRequest,
            ) -> Result<SourcePage, SourceError>;
        }
    }

    fn id() -> EntityId {
        EntityId::new("t1").unwrap()
    }

    #[core_async::test]
    async fn test_retries_transient_until_success() {
        let mut source = MockSource::new();
        let mut seq = Sequence::new();
        source
            .expect_fetch()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(SourceError::Timeout));
        source
            .expect_fetch()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(FetchOutcome::NotFound));

        let id = id();
        let outcome = retry_transient(&RetryPolicy::immediate(4), "track:t1", |_| {
            source.fetch(EntityKind::Track, &id)
        })
        .await;

        assert_eq!(outcome, Ok(FetchOutcome::NotFound));
    }

    #[core_async::test]
    async fn test_gives_up_after_max_retries() {
        let mut source = MockSource::new();
        source
            .expect_fetch()
            .times(5)
            .returning(|_, _| Err(SourceError::Transient("503".to_string())));

        let id = id();
        let failure = retry_transient(&RetryPolicy::immediate(4), "track:t1", |_| {
            source.fetch(EntityKind::Track, &id)
        })
        .await
        .unwrap_err();

        assert_eq!(failure.attempts, 5);
        assert!(failure.exhausted());
        assert!(matches!(
            failure.into_sync_error("track:t1"),
            SyncError::FetchFailed { attempts: 5, .. }
        ));
    }

    #[core_async::test]
    async fn test_permanent_errors_are_not_retried() {
        let mut source = MockSource::new();
        source
            .expect_fetch()
            .times(1)
            .returning(|_, _| Err(SourceError::Unauthorized("expired".to_string())));

        let id = id();
        let failure = retry_transient(&RetryPolicy::immediate(4), "track:t1", |_| {
            source.fetch(EntityKind::Track, &id)
        })
        .await
        .unwrap_err();

        assert_eq!(failure.attempts, 1);
        assert!(!failure.exhausted());
        assert!(matches!(
            failure.into_sync_error("track:t1"),
            SyncError::Unauthorized { .. }
        ));
    }

    #[test]
    fn test_backoff_schedule() {
        let policy = RetryPolicy::default();
        let timeout = SourceError::Timeout;
        let delays: Vec<u64> = (0..4)
            .map(|attempt| backoff(&policy, attempt, &timeout).as_secs())
            .collect();
        assert_eq!(delays, vec![1, 3, 5, 7]);
    }

    #[test]
    fn test_rate_limit_hint_extends_delay() {
        let policy = RetryPolicy::default();
        let limited = SourceError::RateLimited {
            retry_after: Some(Duration::from_secs(30)),
        };
        assert_eq!(backoff(&policy, 0, &limited), Duration::from_secs(30));

        let short = SourceError::RateLimited {
            retry_after: Some(Duration::from_millis(10)),
        };
        assert_eq!(backoff(&policy, 1, &short), Duration::from_secs(3));
    }

    #[core_async::test]
    async fn test_attempt_number_is_passed_through() {
        let mut seen = Vec::new();
        let result: Result<(), FetchFailure> =
            retry_transient(&RetryPolicy::immediate(2), "page", |attempt| {
                seen.push(attempt);
                async { Err(SourceError::Timeout) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(seen, vec![0, 1, 2]);
    }
}
