//! File-backed knowledge store
//!
//! Every operation is a full load, mutate, save cycle on the JSON document,
//! serialized behind one async lock.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Local;
use parley_core::{KnowledgeBase, KnowledgeError, KnowledgeItem};
use tokio::sync::Mutex;
use tracing::{error, info};

pub struct KnowledgeStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl KnowledgeStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn snapshot(&self) -> Result<KnowledgeBase, KnowledgeError> {
        let _guard = self.lock.lock().await;
        self.load().await
    }

    /// Stores a note in `ungrouped` and returns its id.
    pub async fn add_item(&self, content: &str) -> Result<u64, KnowledgeError> {
        let timestamp = Local::now().to_rfc3339();
        let id = self
            .update(|base| Ok(base.add_item(content, timestamp)))
            .await?;
        info!("Added knowledge item {}", id);
        Ok(id)
    }

    pub async fn delete_item(&self, id: u64) -> Result<KnowledgeItem, KnowledgeError> {
        self.update(|base| base.delete_item(id)).await
    }

    pub async fn create_group(&self, name: &str) -> Result<(), KnowledgeError> {
        self.update(|base| base.create_group(name)).await
    }

    /// Returns the number of items moved back into `ungrouped`.
    pub async fn delete_group(&self, name: &str) -> Result<usize, KnowledgeError> {
        self.update(|base| base.delete_group(name)).await
    }

    pub async fn move_item(&self, id: u64, group: &str) -> Result<(), KnowledgeError> {
        self.update(|base| base.move_item(id, group)).await
    }

    async fn update<T, F>(&self, mutate: F) -> Result<T, KnowledgeError>
    where
        F: FnOnce(&mut KnowledgeBase) -> Result<T, KnowledgeError>,
    {
        let _guard = self.lock.lock().await;
        let mut base = self.load().await?;
        let value = mutate(&mut base)?;
        self.save(&base).await?;
        Ok(value)
    }

    /// A missing file is an empty base. An unreadable document is set aside
    /// as `<file>.corrupt` and replaced by an empty base.
    async fn load(&self) -> Result<KnowledgeBase, KnowledgeError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(KnowledgeBase::default()),
            Err(e) => return Err(e.into()),
        };

        match KnowledgeBase::from_json(&bytes) {
            Ok(base) => Ok(base),
            Err(e) => {
                let backup = self.corrupt_path();
                error!(
                    "Failed to load knowledge file {}: {}; moving it to {}",
                    self.path.display(),
                    e,
                    backup.display()
                );
                tokio::fs::rename(&self.path, &backup).await?;
                Ok(KnowledgeBase::default())
            }
        }
    }

    async fn save(&self, base: &KnowledgeBase) -> Result<(), KnowledgeError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, base.to_json_pretty()?).await?;
        Ok(())
    }

    fn corrupt_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".corrupt");
        PathBuf::from(name)
    }
}
