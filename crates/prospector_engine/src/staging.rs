use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use engine_logging::{engine_info, engine_warn};
use prospector_core::{Marketplace, TaskId};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use thiserror::Error;

/// The minimal run context staged at start so the consumer can recover it
/// after a reload. Removed when the run completes or is stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedRun {
    pub source_url: String,
    pub marketplace: String,
    pub items: Vec<TaskId>,
}

#[derive(Debug, Error)]
pub enum StagingError {
    #[error("staging directory missing or not writable: {0}")]
    StagingDir(String),
    #[error("staged run is not valid json: {0}")]
    Format(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Atomic staged-run storage: one JSON file per source URL, written via a
/// temp file and rename so the consumer never observes a half-written run.
#[derive(Debug, Clone)]
pub struct StagingStore {
    dir: PathBuf,
}

impl StagingStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn stage(
        &self,
        source_url: &str,
        marketplace: Marketplace,
        items: &[TaskId],
    ) -> Result<PathBuf, StagingError> {
        let staged = StagedRun {
            source_url: source_url.to_string(),
            marketplace: marketplace.to_string(),
            items: items.to_vec(),
        };
        let content =
            serde_json::to_string_pretty(&staged).map_err(|err| StagingError::Format(err.to_string()))?;
        self.write_atomic(&staging_filename(source_url), &content)
    }

    /// Loads the staged run for a source URL, if one survived a reload.
    pub fn load(&self, source_url: &str) -> Option<StagedRun> {
        let path = self.dir.join(staging_filename(source_url));
        let content = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return None,
            Err(err) => {
                engine_warn!("failed to read staged run from {path:?}: {err}");
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(staged) => Some(staged),
            Err(err) => {
                engine_warn!("failed to parse staged run from {path:?}: {err}");
                None
            }
        }
    }

    /// Removes the staged run; a missing file is not an error.
    pub fn clear(&self, source_url: &str) -> Result<(), StagingError> {
        let path = self.dir.join(staging_filename(source_url));
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Staging is an aid for the consumer, never a reason to fail a run.
    pub(crate) fn stage_best_effort(
        &self,
        source_url: &str,
        marketplace: Marketplace,
        items: &[TaskId],
    ) {
        match self.stage(source_url, marketplace, items) {
            Ok(path) => engine_info!("staged run context at {path:?}"),
            Err(err) => engine_warn!("failed to stage run context: {err}"),
        }
    }

    pub(crate) fn clear_best_effort(&self, source_url: &str) {
        if let Err(err) = self.clear(source_url) {
            engine_warn!("failed to clear staged run context: {err}");
        }
    }

    fn write_atomic(&self, filename: &str, content: &str) -> Result<PathBuf, StagingError> {
        ensure_dir(&self.dir)?;
        let target = self.dir.join(filename);
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.flush()?;
        tmp.as_file_mut().sync_all()?;
        if target.exists() {
            fs::remove_file(&target)?;
        }
        tmp.persist(&target).map_err(|err| StagingError::Io(err.error))?;
        Ok(target)
    }
}

fn ensure_dir(dir: &Path) -> Result<(), StagingError> {
    if dir.exists() {
        let meta = fs::metadata(dir).map_err(|err| StagingError::StagingDir(err.to_string()))?;
        if !meta.is_dir() {
            return Err(StagingError::StagingDir("path is not a directory".into()));
        }
    } else {
        fs::create_dir_all(dir).map_err(|err| StagingError::StagingDir(err.to_string()))?;
    }
    Ok(())
}

/// Deterministic per-source filename: `run-{short_hash(source_url)}.json`.
fn staging_filename(source_url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_url.as_bytes());
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(8);
    for byte in digest.iter().take(4) {
        use std::fmt::Write;
        let _ = write!(&mut hex, "{byte:02x}");
    }
    format!("run-{hex}.json")
}
