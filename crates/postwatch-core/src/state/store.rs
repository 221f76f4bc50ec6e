use std::{
    fs::{self, File},
    io::Write,
    path::PathBuf,
    sync::Mutex,
};

use async_trait::async_trait;

use crate::{errors::Error, state::MonitorState, Result};

/// Storage seam for [`MonitorState`].
///
/// The monitor is the only writer; implementations need no locking beyond what
/// their own `&self` API requires.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load persisted state. Missing or unreadable state yields the default
    /// (and a warning), never an error.
    async fn load(&self) -> MonitorState;

    /// Replace persisted state. After a crash either the previous or the new
    /// state is observable, never a mix.
    async fn save(&self, state: &MonitorState) -> Result<()>;
}

/// Pretty-printed JSON file, replaced via write-to-temp + fsync + rename.
#[derive(Clone, Debug)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "state.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn persistence_error(&self, reason: impl ToString) -> Error {
        Error::Persistence {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }

    fn write_atomic(&self, contents: &[u8]) -> std::io::Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }

        let tmp = self.temp_path();
        {
            let mut f = File::create(&tmp)?;
            f.write_all(contents)?;
            f.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;

        // Persist the rename itself.
        #[cfg(unix)]
        {
            if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
                if let Ok(d) = File::open(dir) {
                    let _ = d.sync_all();
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl StateStore for JsonFileStore {
    async fn load(&self) -> MonitorState {
        let path = self.path.clone();
        let read = tokio::task::spawn_blocking(move || fs::read_to_string(path))
            .await
            .unwrap_or_else(|e| Err(std::io::Error::new(std::io::ErrorKind::Other, e)));
        let txt = match read {
            Ok(txt) => txt,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "no state file yet, starting fresh");
                return MonitorState::default();
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "state file unreadable, starting fresh");
                return MonitorState::default();
            }
        };

        match serde_json::from_str::<MonitorState>(&txt) {
            Ok(state) => {
                tracing::info!(
                    path = %self.path.display(),
                    last_seen = state.last_seen_post_id.as_ref().map(|id| id.as_str()).unwrap_or("none"),
                    "loaded state"
                );
                state
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "state file corrupt, starting fresh");
                MonitorState::default()
            }
        }
    }

    async fn save(&self, state: &MonitorState) -> Result<()> {
        let txt = serde_json::to_string_pretty(state).map_err(|e| self.persistence_error(e))?;
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.write_atomic(txt.as_bytes()))
            .await
            .map_err(|e| self.persistence_error(e))?
            .map_err(|e| self.persistence_error(e))
    }
}

/// In-process store, for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<Option<MonitorState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: MonitorState) -> Self {
        Self {
            state: Mutex::new(Some(state)),
        }
    }

    /// Last saved state, if any save happened.
    pub fn snapshot(&self) -> Option<MonitorState> {
        self.state.lock().ok().and_then(|g| g.clone())
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn load(&self) -> MonitorState {
        self.snapshot().unwrap_or_default()
    }

    async fn save(&self, state: &MonitorState) -> Result<()> {
        let mut guard = self
            .state
            .lock()
            .map_err(|_| Error::External("memory store lock poisoned".to_string()))?;
        *guard = Some(state.clone());
        Ok(())
    }
}
