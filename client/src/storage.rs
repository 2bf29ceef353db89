use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Mutex,
};

use async_trait::async_trait;
use tracing::warn;

use crate::{error::ClientResult, state::LocalState};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LocalStore: Send + Sync {
    async fn load(&self) -> ClientResult<LocalState>;

    async fn save(&self, state: &LocalState) -> ClientResult<()>;

    async fn clear(&self) -> ClientResult<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<LocalState>,
}

impl MemoryStore {
    pub fn new(state: LocalState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn snapshot(&self) -> LocalState {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LocalState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn load(&self) -> ClientResult<LocalState> {
        Ok(self.snapshot())
    }

    async fn save(&self, state: &LocalState) -> ClientResult<()> {
        *self.lock() = state.clone();
        Ok(())
    }

    async fn clear(&self) -> ClientResult<()> {
        *self.lock() = LocalState::default();
        Ok(())
    }
}

/// Local state kept as one JSON document on disk.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl LocalStore for FileStore {
    async fn load(&self) -> ClientResult<LocalState> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(LocalState::default()),
            Err(err) => return Err(err.into()),
        };

        // Corrupt state reads as empty.
        match serde_json::from_slice(&bytes) {
            Ok(state) => Ok(state),
            Err(err) => {
                warn!(
                    path = %self.path.display(),
                    error = %err,
                    "file_store: discarding unreadable local state"
                );
                Ok(LocalState::default())
            }
        }
    }

    async fn save(&self, state: &LocalState) -> ClientResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(state)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    async fn clear(&self) -> ClientResult<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::CachedSnapshot;
    use chrono::Utc;
    use crates::domain::value_objects::subscriptions::EntitlementSnapshot;

    fn scratch_path(name: &str) -> PathBuf {
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        std::env::temp_dir()
            .join(format!("subscription-client-{}-{nanos}", std::process::id()))
            .join(format!("{name}.json"))
    }

    #[tokio::test]
    async fn missing_file_loads_empty_state() {
        let store = FileStore::new(scratch_path("missing"));

        assert_eq!(store.load().await.unwrap(), LocalState::default());
    }

    #[tokio::test]
    async fn file_store_persists_and_clears() {
        let store = FileStore::new(scratch_path("persist"));
        let state = LocalState {
            email: Some("a@example.com".to_string()),
            cached: Some(CachedSnapshot::Authoritative {
                snapshot: EntitlementSnapshot::none(),
                fetched_at: Utc::now(),
            }),
            reset_requested: true,
        };

        store.save(&state).await.unwrap();
        assert_eq!(store.load().await.unwrap(), state);

        store.clear().await.unwrap();
        assert_eq!(store.load().await.unwrap(), LocalState::default());
        store.clear().await.unwrap();
    }

    #[tokio::test]
    async fn corrupt_file_is_discarded() {
        let path = scratch_path("corrupt");
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(&path, b"{not json").await.unwrap();

        let store = FileStore::new(&path);

        assert_eq!(store.load().await.unwrap(), LocalState::default());
    }
}
