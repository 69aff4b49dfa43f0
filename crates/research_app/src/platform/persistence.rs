use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use research_logging::{research_error, research_info, research_warn};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;

pub const STATE_FILENAME: &str = ".research_state.ron";

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("state directory missing or not writable: {0}")]
    StateDir(String),
    #[error("could not serialize state: {0}")]
    Serialize(#[from] ron::Error),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// What survives between runs: the query of the last failed session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PersistedState {
    #[serde(default)]
    pub last_failed_query: Option<String>,
    /// RFC 3339 time of the last save.
    #[serde(default)]
    pub saved_at: Option<String>,
}

/// Ensure the state directory exists; create if missing.
pub fn ensure_state_dir(dir: &Path) -> Result<(), PersistError> {
    if dir.exists() {
        let meta = fs::metadata(dir).map_err(|e| PersistError::StateDir(e.to_string()))?;
        if !meta.is_dir() {
            return Err(PersistError::StateDir("path is not a directory".into()));
        }
    } else {
        fs::create_dir_all(dir).map_err(|e| PersistError::StateDir(e.to_string()))?;
    }
    Ok(())
}

/// Atomically replaces `{dir}/{filename}` by writing a temp file in the same
/// directory and renaming it over the target.
pub struct AtomicFileWriter {
    dir: PathBuf,
}

impl AtomicFileWriter {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn write(&self, filename: &str, content: &str) -> Result<PathBuf, PersistError> {
        ensure_state_dir(&self.dir)?;

        let target = self.dir.join(filename);
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.flush()?;
        tmp.as_file_mut().sync_all()?;
        tmp.persist(&target).map_err(|e| PersistError::Io(e.error))?;
        Ok(target)
    }
}

pub fn load_state(state_dir: &Path) -> PersistedState {
    let path = state_dir.join(STATE_FILENAME);
    let content = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return PersistedState::default(),
        Err(err) => {
            research_warn!("Failed to read persisted state from {:?}: {}", path, err);
            return PersistedState::default();
        }
    };

    match ron::from_str(&content) {
        Ok(state) => {
            research_info!("Loaded persisted state from {:?}", path);
            state
        }
        Err(err) => {
            research_warn!("Failed to parse persisted state from {:?}: {}", path, err);
            PersistedState::default()
        }
    }
}

pub fn load_last_query(state_dir: &Path) -> Option<String> {
    load_state(state_dir)
        .last_failed_query
        .filter(|query| !query.trim().is_empty())
}

pub fn save_last_query(state_dir: &Path, query: Option<&str>) -> Result<PathBuf, PersistError> {
    let state = PersistedState {
        last_failed_query: query.map(ToOwned::to_owned),
        saved_at: Some(Utc::now().to_rfc3339()),
    };
    let content = ron::ser::to_string_pretty(&state, ron::ser::PrettyConfig::new())?;
    AtomicFileWriter::new(state_dir.to_path_buf()).write(STATE_FILENAME, &content)
}

/// Saves the retry target, logging instead of failing.
pub fn persist_last_query(state_dir: &Path, query: Option<&str>) {
    match save_last_query(state_dir, query) {
        Ok(path) => research_info!("Saved retry state to {:?}", path),
        Err(err) => research_error!(
            "Failed to write persisted state to {:?}: {}",
            state_dir,
            err
        ),
    }
}
