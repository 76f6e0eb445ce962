use std::path::{Path, PathBuf};

use {async_trait::async_trait, tokio::sync::RwLock, tracing::debug};

use crate::{error::ReminderError, types::ReminderConfig};

/// Persistence for the user's reminder settings.
#[async_trait]
pub trait ReminderStore: Send + Sync {
    async fn load(&self) -> Result<ReminderConfig, ReminderError>;
    async fn save(&self, config: &ReminderConfig) -> Result<(), ReminderError>;
}

/// JSON file store. A missing file reads as the default config.
pub struct FileReminderStore {
    path: PathBuf,
}

impl FileReminderStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ReminderStore for FileReminderStore {
    async fn load(&self) -> Result<ReminderConfig, ReminderError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no reminder config yet, using defaults");
                Ok(ReminderConfig::default())
            },
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, config: &ReminderConfig) -> Result<(), ReminderError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(config)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), "saved reminder config");
        Ok(())
    }
}

/// In-process store.
#[derive(Default)]
pub struct MemoryReminderStore {
    config: RwLock<ReminderConfig>,
}

impl MemoryReminderStore {
    pub fn new(config: ReminderConfig) -> Self {
        Self {
            config: RwLock::new(config),
        }
    }
}

#[async_trait]
impl ReminderStore for MemoryReminderStore {
    async fn load(&self) -> Result<ReminderConfig, ReminderError> {
        Ok(self.config.read().await.clone())
    }

    async fn save(&self, config: &ReminderConfig) -> Result<(), ReminderError> {
        *self.config.write().await = config.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use {super::*, crate::types::ReminderKind};

    #[tokio::test]
    async fn test_missing_file_loads_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileReminderStore::new(tmp.path().join("reminders.json"));
        assert_eq!(store.load().await.unwrap(), ReminderConfig::default());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileReminderStore::new(tmp.path().join("nested/reminders.json"));
        let mut cfg = ReminderConfig::default();
        cfg.enabled = true;
        cfg.kinds.insert(ReminderKind::Sleep);
        store.save(&cfg).await.unwrap();

        assert_eq!(store.load().await.unwrap(), cfg);
        assert!(!tmp.path().join("nested/reminders.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("reminders.json");
        std::fs::write(&path, "{not json").unwrap();
        let store = FileReminderStore::new(path);
        assert!(matches!(store.load().await, Err(ReminderError::Json(_))));
    }
}
