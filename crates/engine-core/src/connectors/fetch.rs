use crate::error::SessionError;
use async_trait::async_trait;
use model::execution::{fetch_result::FetchResult, work_item::WorkItem};

/// Performs one fetch-and-extract for a work item.
///
/// Implementations never fail with `Err`: every outcome, including timeouts,
/// is reported as a classified `FetchResult::Failure`. A client is owned by a
/// single worker and must not mutate state shared with other workers.
#[async_trait]
pub trait FetchClient: Send + Sync {
    async fn fetch(&self, item: &WorkItem) -> FetchResult;

    /// Releases the session behind this client. Called once when the owning worker exits.
    async fn shutdown(&self) {}
}

/// Opens one `FetchClient` per worker.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    async fn open(&self, worker: usize) -> Result<Box<dyn FetchClient>, SessionError>;
}
