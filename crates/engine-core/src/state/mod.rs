use crate::{error::StateStoreError, state::models::Checkpoint};
use async_trait::async_trait;

pub mod file_store;
pub mod models;
pub mod sled_store;

/// Durable home of the run checkpoint.
///
/// `save_checkpoint` must be atomic: after it returns, a reader sees either
/// the previous checkpoint or the new one, never a mix.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn save_checkpoint(&self, cp: &Checkpoint) -> Result<(), StateStoreError>;
    async fn load_checkpoint(&self, run_key: &str) -> Result<Option<Checkpoint>, StateStoreError>;
    async fn clear_checkpoint(&self, run_key: &str) -> Result<(), StateStoreError>;
}
