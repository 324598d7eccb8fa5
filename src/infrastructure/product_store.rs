//! JSON-file [`ProductHistoryRepository`]
//!
//! One pretty-printed document per product at `<data_dir>/<shard>/<id>.json`,
//! where the shard is the first three characters of the id. Older document
//! shapes are normalized on load; writes are atomic.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use crate::domain::{PersistedProduct, ProductHistoryRepository, ProductId, StoreError, StoredDocument};
use crate::infrastructure::atomic_write::atomic_write;

const SHARD_LEN: usize = 3;
const CORRUPTED_SUFFIX: &str = ".corrupted";

/// What to do with a product file that cannot be parsed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorruptRecordPolicy {
    /// Move it aside as `<id>.json.corrupted` (numbered if taken) and start a fresh record
    #[default]
    Quarantine,
    /// Leave it in place and skip the product for this run
    Skip,
}

pub struct JsonProductStore {
    data_dir: PathBuf,
    corrupt_policy: CorruptRecordPolicy,
}

impl JsonProductStore {
    pub fn new(data_dir: impl Into<PathBuf>, corrupt_policy: CorruptRecordPolicy) -> Self {
        Self {
            data_dir: data_dir.into(),
            corrupt_policy,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Location of a product's document; rejects ids that could escape the shard
    pub fn path_for(&self, id: &str) -> Result<PathBuf, StoreError> {
        validate_id(id)?;
        let shard: String = id.chars().take(SHARD_LEN).collect();
        Ok(self.data_dir.join(shard).join(format!("{id}.json")))
    }

    async fn handle_corrupt(&self, id: &str, path: &Path, reason: String) -> Result<Option<PersistedProduct>, StoreError> {
        match self.corrupt_policy {
            CorruptRecordPolicy::Skip => Err(StoreError::Corrupt {
                path: path.to_path_buf(),
                reason,
            }),
            CorruptRecordPolicy::Quarantine => {
                let backup = free_backup_path(path).await?;
                fs::rename(path, &backup)
                    .await
                    .map_err(|e| StoreError::io(path, e))?;
                warn!(
                    "Product {} had an unreadable record ({}); moved to {:?} and starting fresh",
                    id, reason, backup
                );
                Ok(None)
            }
        }
    }
}

/// `<file>.corrupted`, or `<file>.corrupted.<n>` when earlier backups exist
async fn free_backup_path(path: &Path) -> Result<PathBuf, StoreError> {
    let mut base = path.as_os_str().to_owned();
    base.push(CORRUPTED_SUFFIX);
    let base = PathBuf::from(base);

    let mut candidate = base.clone();
    let mut n = 0_u32;
    while fs::try_exists(&candidate).await.map_err(|e| StoreError::io(&candidate, e))? {
        n += 1;
        let mut numbered = base.as_os_str().to_owned();
        numbered.push(format!(".{n}"));
        candidate = PathBuf::from(numbered);
    }
    Ok(candidate)
}

fn validate_id(id: &str) -> Result<(), StoreError> {
    let suspicious = id.trim().is_empty()
        || id != id.trim()
        || id.starts_with('.')
        || id.contains("..")
        || id.chars().any(|c| matches!(c, '/' | '\\' | '\0') || c.is_control());
    if suspicious {
        return Err(StoreError::InvalidId(id.to_string()));
    }
    Ok(())
}

#[async_trait]
impl ProductHistoryRepository for JsonProductStore {
    async fn load(&self, id: &str) -> Result<Option<PersistedProduct>, StoreError> {
        let path = self.path_for(id)?;
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(&path, e)),
        };

        let raw = match String::from_utf8(bytes) {
            Ok(raw) => raw,
            Err(e) => return self.handle_corrupt(id, &path, e.to_string()).await,
        };
        let document = match StoredDocument::from_json(&raw) {
            Ok(document) => document,
            Err(e) => return self.handle_corrupt(id, &path, e.to_string()).await,
        };

        if !matches!(document, StoredDocument::Current(_)) {
            debug!("Product {} stored in {} format, upgrading on next save", id, document.schema_name());
        }
        let mut product = document.normalize(id);
        if product.id != id {
            warn!("Record at {:?} claims id {}, using {}", path, product.id, id);
            product.id = id.to_string();
        }
        Ok(Some(product))
    }

    async fn save(&self, product: &PersistedProduct) -> Result<(), StoreError> {
        let path = self.path_for(&product.id)?;
        let contents = serde_json::to_vec_pretty(product).map_err(|source| StoreError::Serialize {
            id: product.id.clone(),
            source,
        })?;
        tokio::task::spawn_blocking(move || atomic_write(&path, &contents).map_err(|e| StoreError::io(path, e)))
            .await
            .map_err(|e| StoreError::Join(e.to_string()))?
    }

    async fn list_ids(&self) -> Result<Vec<ProductId>, StoreError> {
        let data_dir = self.data_dir.clone();
        tokio::task::spawn_blocking(move || scan_product_ids(&data_dir))
            .await
            .map_err(|e| StoreError::Join(e.to_string()))?
    }
}

/// Every `<shard>/<id>.json` under `data_dir`, sorted
fn scan_product_ids(data_dir: &Path) -> Result<Vec<ProductId>, StoreError> {
    let shards = match std::fs::read_dir(data_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::io(data_dir, e)),
    };

    let mut ids = Vec::new();
    for shard in shards {
        let shard = shard.map_err(|e| StoreError::io(data_dir, e))?;
        let shard_path = shard.path();
        if !shard_path.is_dir() {
            continue;
        }
        for entry in std::fs::read_dir(&shard_path).map_err(|e| StoreError::io(&shard_path, e))? {
            let entry = entry.map_err(|e| StoreError::io(&shard_path, e))?;
            let file_name = entry.file_name();
            let Some(id) = file_name.to_str().and_then(|name| name.strip_suffix(".json")) else {
                continue;
            };
            if validate_id(id).is_ok() && entry.path().is_file() {
                ids.push(id.to_string());
            }
        }
    }

    ids.sort();
    Ok(ids)
}
