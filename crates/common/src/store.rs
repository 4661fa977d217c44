use crate::types::RawItem;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// The persisted state: both raw collections, newest-first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredData {
    #[serde(default)]
    pub locks: Vec<RawItem>,
    #[serde(default)]
    pub votes: Vec<RawItem>,
}

impl StoredData {
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty() && self.votes.is_empty()
    }
}

/// JSON document store with atomic replace on save.
pub struct JsonStore {
    path: PathBuf,
}

impl JsonStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file is an empty store; an unreadable or malformed one is an error.
    pub fn load(&self) -> Result<StoredData> {
        if !self.path.exists() {
            return Ok(StoredData::default());
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read store {}", self.path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse store {}", self.path.display()))
    }

    /// Like [`Self::load`], but a broken store restarts from empty instead of failing.
    pub fn load_or_default(&self) -> StoredData {
        match self.load() {
            Ok(data) => {
                tracing::info!(
                    path = %self.path.display(),
                    locks = data.locks.len(),
                    votes = data.votes.len(),
                    "loaded store"
                );
                data
            }
            Err(e) => {
                tracing::error!(
                    path = %self.path.display(),
                    error = %format!("{e:#}"),
                    "store unreadable; starting fresh"
                );
                StoredData::default()
            }
        }
    }

    pub fn save(&self, data: &StoredData) -> Result<()> {
        write_json_atomic(&self.path, data)
    }
}

/// Serialize `value` to a temp file next to `path`, then rename it over `path`.
///
/// A failed write leaves any existing file at `path` untouched; the temp file
/// is removed when it is dropped unpersisted.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create directory {}", dir.display()))?;

    let mut tmp = tempfile::NamedTempFile::new_in(&dir)
        .with_context(|| format!("failed to create temp file in {}", dir.display()))?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        serde_json::to_writer_pretty(&mut writer, value).context("failed to serialize json")?;
        writer.flush().context("failed to flush temp file")?;
    }
    tmp.as_file().sync_all().context("failed to sync temp file")?;
    tmp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}
