use crate::{
    error::StateStoreError,
    state::{StateStore, models::Checkpoint},
};
use async_trait::async_trait;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use std::path::Path;
use tracing::debug;

pub struct SledStateStore {
    db: sled::Db,
}

impl SledStateStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StateStoreError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    #[inline]
    fn chk_key(run_key: &str) -> String {
        format!("chk:{}", run_key)
    }
}

#[async_trait]
impl StateStore for SledStateStore {
    async fn save_checkpoint(&self, cp: &Checkpoint) -> Result<(), StateStoreError> {
        let key = Self::chk_key(&cp.run_key);
        let new_bytes =
            bincode::serialize(cp).map_err(|e| StateStoreError::Encode(e.to_string()))?;

        // Check-then-set in one transaction so an older flush can never
        // overwrite a newer checkpoint.
        let result = self.db.transaction::<_, (), String>(|tx_db| {
            if let Some(existing_bytes) = tx_db.get(&key)? {
                let existing: Checkpoint = bincode::deserialize(&existing_bytes)
                    .map_err(|e| ConflictableTransactionError::Abort(e.to_string()))?;

                if existing.last_flush_index > cp.last_flush_index {
                    debug!(
                        run_key = %cp.run_key,
                        stored = existing.last_flush_index,
                        offered = cp.last_flush_index,
                        "Ignoring stale checkpoint"
                    );
                    return Ok(());
                }
            }

            tx_db.insert(key.as_bytes(), new_bytes.as_slice())?;
            Ok(())
        });

        match result {
            Ok(()) => {}
            Err(TransactionError::Abort(msg)) => return Err(StateStoreError::SaveCheckpoint(msg)),
            Err(TransactionError::Storage(e)) => return Err(StateStoreError::Sled(e)),
        }

        self.db.flush_async().await?;
        Ok(())
    }

    async fn load_checkpoint(&self, run_key: &str) -> Result<Option<Checkpoint>, StateStoreError> {
        match self.db.get(Self::chk_key(run_key))? {
            Some(bytes) => bincode::deserialize(&bytes)
                .map(Some)
                .map_err(|e| StateStoreError::LoadCheckpoint(e.to_string())),
            None => Ok(None),
        }
    }

    async fn clear_checkpoint(&self, run_key: &str) -> Result<(), StateStoreError> {
        self.db.remove(Self::chk_key(run_key))?;
        self.db.flush_async().await?;
        Ok(())
    }
}
