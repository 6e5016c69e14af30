use crate::{
    error::StateStoreError,
    state::{StateStore, models::Checkpoint},
};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::{fs, io::AsyncWriteExt};
use tracing::debug;

/// Keeps one human-readable `{run_key}.json` per run inside `dir`.
///
/// Writes go to a sibling temp file which is synced and renamed over the
/// previous checkpoint, so a reader only ever sees a complete document.
pub struct JsonFileStateStore {
    dir: PathBuf,
}

impl JsonFileStateStore {
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, StateStoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn path_for(&self, run_key: &str) -> PathBuf {
        self.dir.join(format!("{run_key}.json"))
    }
}

#[async_trait]
impl StateStore for JsonFileStateStore {
    async fn save_checkpoint(&self, cp: &Checkpoint) -> Result<(), StateStoreError> {
        if let Some(existing) = self.load_checkpoint(&cp.run_key).await? {
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

        let body = serde_json::to_vec_pretty(cp)
            .map_err(|e| StateStoreError::Encode(e.to_string()))?;

        let path = self.path_for(&cp.run_key);
        let tmp = path.with_extension("json.tmp");

        let mut file = fs::File::create(&tmp).await?;
        file.write_all(&body).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&tmp, &path)
            .await
            .map_err(|e| StateStoreError::SaveCheckpoint(format!("{}: {e}", path.display())))?;
        Ok(())
    }

    async fn load_checkpoint(&self, run_key: &str) -> Result<Option<Checkpoint>, StateStoreError> {
        let path = self.path_for(run_key);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StateStoreError::LoadCheckpoint(format!("{}: {e}", path.display())))
    }

    async fn clear_checkpoint(&self, run_key: &str) -> Result<(), StateStoreError> {
        match fs::remove_file(self.path_for(run_key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
