use engine_core::{
    connectors::fetch::FetchClient,
    metrics::Metrics,
    rate_limiter::RateLimiter,
    retry::{RetryDisposition, RetryPolicy},
};
use model::execution::{
    fetch_result::{Failure, FetchResult},
    work_item::WorkItem,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Decides whether a failure gets another attempt under `policy`.
pub fn classify_failure(policy: &RetryPolicy, failure: &Failure) -> RetryDisposition {
    policy.disposition(failure.item.attempt_count, failure.kind)
}

/// Runs one work item to a terminal result: rate-limited attempts, bounded retries.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    limiter: RateLimiter,
    metrics: Metrics,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy, limiter: RateLimiter, metrics: Metrics) -> Self {
        Self {
            policy,
            limiter,
            metrics,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetches `item` until it succeeds, fails terminally or runs out of retries.
    ///
    /// The returned result always carries the item with its final
    /// `attempt_count`. A cancellation observed while waiting for a retry ends
    /// the loop with the last failure.
    pub async fn execute(
        &self,
        client: &dyn FetchClient,
        mut item: WorkItem,
        cancel: &CancellationToken,
    ) -> FetchResult {
        self.limiter.wait().await;

        loop {
            self.metrics.begin_fetch();
            let result = client.fetch(&item).await;
            self.metrics.end_fetch();

            let failure = match result {
                FetchResult::Success { record, .. } => {
                    return FetchResult::Success { item, record };
                }
                FetchResult::Failure(failure) => Failure {
                    item: item.clone(),
                    ..failure
                },
            };

            if classify_failure(&self.policy, &failure) == RetryDisposition::Stop {
                if failure.kind.is_retryable() {
                    warn!(
                        item = %item.id,
                        kind = %failure.kind,
                        attempts = item.attempt_count + 1,
                        "Retries exhausted"
                    );
                }
                return FetchResult::Failure(failure);
            }

            let backoff = self.policy.backoff_delay(item.attempt_count);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(item = %item.id, "Cancelled while waiting to retry");
                    return FetchResult::Failure(failure);
                }
                _ = async {
                    tokio::time::sleep(backoff).await;
                    self.limiter.wait().await;
                } => {}
            }

            item.next_attempt();
            self.metrics.increment_retries(1);
            debug!(
                item = %item.id,
                kind = %failure.kind,
                attempt = item.attempt_count,
                error = %failure.message,
                "Retrying"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use model::{
        core::identifiers::ItemId, execution::fetch_result::FailureKind, records::record::Record,
    };
    use std::{
        collections::VecDeque,
        sync::Mutex,
        time::Duration,
    };

    struct Scripted {
        outcomes: Mutex<VecDeque<Option<FailureKind>>>,
        calls: Mutex<Vec<u32>>,
    }

    impl Scripted {
        fn new(outcomes: Vec<Option<FailureKind>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl FetchClient for Scripted {
        async fn fetch(&self, item: &WorkItem) -> FetchResult {
            self.calls.lock().unwrap().push(item.attempt_count);
            match self.outcomes.lock().unwrap().pop_front().flatten() {
                None => FetchResult::success(item, Record::new(item.id.clone())),
                Some(kind) => FetchResult::failure(item, kind, "scripted"),
            }
        }
    }

    fn executor(retries: u32) -> (RetryExecutor, Metrics) {
        let metrics = Metrics::new();
        let exec = RetryExecutor::new(
            RetryPolicy::new(retries, Duration::ZERO, Duration::ZERO),
            RateLimiter::disabled(),
            metrics.clone(),
        );
        (exec, metrics)
    }

    #[tokio::test]
    async fn succeeds_after_two_timeouts() {
        let (exec, metrics) = executor(2);
        let client = Scripted::new(vec![Some(FailureKind::Timeout), Some(FailureKind::Timeout), None]);

        let result = exec
            .execute(&client, WorkItem::new("3"), &CancellationToken::new())
            .await;

        assert!(result.is_success());
        assert_eq!(result.item().attempt_count, 2);
        assert_eq!(*client.calls.lock().unwrap(), vec![0, 1, 2]);
        assert_eq!(metrics.snapshot().retries, 2);
    }

    #[tokio::test]
    async fn not_found_is_terminal() {
        let (exec, _) = executor(2);
        let client = Scripted::new(vec![Some(FailureKind::NotFound)]);

        let result = exec
            .execute(&client, WorkItem::new("10"), &CancellationToken::new())
            .await;

        assert_eq!(result.failure_kind(), Some(FailureKind::NotFound));
        assert_eq!(result.item().attempt_count, 0);
        assert_eq!(client.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let (exec, _) = executor(2);
        let client = Scripted::new(vec![Some(FailureKind::TransportError); 5]);

        let result = exec
            .execute(&client, WorkItem::new(ItemId::from("7")), &CancellationToken::new())
            .await;

        assert_eq!(result.failure_kind(), Some(FailureKind::TransportError));
        assert_eq!(result.item().attempt_count, 2);
        assert_eq!(client.calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn cancellation_stops_retrying() {
        let (exec, _) = executor(5);
        let client = Scripted::new(vec![Some(FailureKind::Timeout); 6]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = exec.execute(&client, WorkItem::new("1"), &cancel).await;

        assert_eq!(result.failure_kind(), Some(FailureKind::Timeout));
        assert_eq!(client.calls.lock().unwrap().len(), 1);
    }
}
