use crate::error::SinkError;
use engine_core::state::{StateStore, models::Checkpoint};
use std::sync::Arc;
use tracing::info;

/// Loads and commits the checkpoint of one run.
pub struct StateManager {
    run_key: String,
    store: Arc<dyn StateStore>,
}

impl StateManager {
    pub fn new(run_key: impl Into<String>, store: Arc<dyn StateStore>) -> Self {
        Self {
            run_key: run_key.into(),
            store,
        }
    }

    pub fn run_key(&self) -> &str {
        &self.run_key
    }

    /// Last committed checkpoint, or an empty one when the run is new.
    pub async fn resume(&self) -> Result<Checkpoint, SinkError> {
        let loaded = self
            .store
            .load_checkpoint(&self.run_key)
            .await
            .map_err(|source| SinkError::Resume {
                run_key: self.run_key.clone(),
                source,
            })?;

        match loaded {
            Some(cp) => {
                info!(
                    run_key = %self.run_key,
                    completed = cp.completed_ids.len(),
                    flush_index = cp.last_flush_index,
                    "Resuming from checkpoint"
                );
                Ok(cp)
            }
            None => {
                info!(run_key = %self.run_key, "No checkpoint found, starting from the beginning");
                Ok(Checkpoint::new(self.run_key.clone()))
            }
        }
    }

    pub async fn commit(&self, cp: &Checkpoint) -> Result<(), SinkError> {
        self.store.save_checkpoint(cp).await?;
        Ok(())
    }
}
