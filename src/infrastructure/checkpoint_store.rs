//! JSON-file [`CheckpointRepository`]

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use crate::domain::{CheckpointRepository, CrawlCheckpoint, StoreError};
use crate::infrastructure::atomic_write::atomic_write;

pub const CHECKPOINT_FILE_NAME: &str = "crawl_state.json";

pub struct JsonCheckpointStore {
    path: PathBuf,
}

impl JsonCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<data_dir>/crawl_state.json`
    pub fn in_data_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(CHECKPOINT_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CheckpointRepository for JsonCheckpointStore {
    async fn load(&self) -> CrawlCheckpoint {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No checkpoint at {:?}, starting from the beginning", self.path);
                return CrawlCheckpoint::default();
            }
            Err(e) => {
                warn!("Failed to read checkpoint {:?}, starting over: {}", self.path, e);
                return CrawlCheckpoint::default();
            }
        };

        match serde_json::from_str::<CrawlCheckpoint>(&raw) {
            Ok(checkpoint) if checkpoint.is_valid() => checkpoint,
            Ok(checkpoint) => {
                warn!("Checkpoint {:?} has invalid page {}, starting over", self.path, checkpoint.page);
                CrawlCheckpoint::default()
            }
            Err(e) => {
                warn!("Checkpoint {:?} is unreadable, starting over: {}", self.path, e);
                CrawlCheckpoint::default()
            }
        }
    }

    async fn save(&self, checkpoint: CrawlCheckpoint) -> Result<(), StoreError> {
        let path = self.path.clone();
        let contents = serde_json::to_vec_pretty(&checkpoint).map_err(|source| StoreError::Serialize {
            id: CHECKPOINT_FILE_NAME.to_string(),
            source,
        })?;
        tokio::task::spawn_blocking(move || atomic_write(&path, &contents).map_err(|e| StoreError::io(path, e)))
            .await
            .map_err(|e| StoreError::Join(e.to_string()))?
    }

    async fn clear(&self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(&self.path, e)),
        }
    }
}
