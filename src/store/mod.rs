//! Local persistence of practice history
//!
//! State is one JSON document. A missing or `null` document means a fresh
//! install; a document that does not parse is an error and is never
//! silently replaced.

mod model;

pub use model::{AppState, AudioRef, Categories, PracticeSession, SentenceRecord};

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde_json::Value;

use crate::{Error, Result};

/// Load/save contract for the state document
pub trait Store: Send + Sync {
    /// Read the stored document, `None` if nothing has been saved
    ///
    /// # Errors
    ///
    /// Returns error if the document exists but cannot be read or parsed
    fn load(&self) -> Result<Option<Value>>;

    /// Replace the stored document
    ///
    /// # Errors
    ///
    /// Returns error if the document cannot be written
    fn save(&self, value: &Value) -> Result<()>;
}

/// JSON file on disk, replaced atomically on save
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Store for JsonFileStore {
    fn load(&self) -> Result<Option<Value>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if content.trim().is_empty() {
            return Ok(None);
        }

        let value: Value = serde_json::from_str(&content).map_err(|e| {
            Error::Store(format!("{} is not valid JSON: {e}", self.path.display()))
        })?;

        Ok((!value.is_null()).then_some(value))
    }

    fn save(&self, value: &Value) -> Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, value)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| Error::Io(e.error))?;

        tracing::debug!(path = %self.path.display(), "state saved");
        Ok(())
    }
}

/// In-process store
#[derive(Debug, Default)]
pub struct MemoryStore {
    value: Mutex<Option<Value>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with a document
    #[must_use]
    pub fn with_value(value: Value) -> Self {
        Self {
            value: Mutex::new(Some(value)),
        }
    }
}

impl Store for MemoryStore {
    fn load(&self) -> Result<Option<Value>> {
        let value = self.value.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(value.clone().filter(|v| !v.is_null()))
    }

    fn save(&self, value: &Value) -> Result<()> {
        *self.value.lock().unwrap_or_else(PoisonError::into_inner) = Some(value.clone());
        Ok(())
    }
}

/// Load application state, defaulting when nothing is stored
///
/// # Errors
///
/// Returns `Error::Store` if the stored document does not match the state layout
pub fn load_state(store: &dyn Store) -> Result<AppState> {
    let Some(value) = store.load()? else {
        tracing::debug!("no saved state, starting fresh");
        return Ok(AppState::default());
    };

    serde_json::from_value(value).map_err(|e| Error::Store(format!("malformed state: {e}")))
}

/// Persist application state
///
/// # Errors
///
/// Returns error if serialization or the store fails
pub fn save_state(store: &dyn Store, state: &AppState) -> Result<()> {
    let value = serde_json::to_value(state)?;
    store.save(&value)
}
