//! Filesystem artifacts and the freshness relation used as the stage cache.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// A produced file (or directory) identified by its path.
///
/// An artifact is considered valid for a set of inputs when it exists and its
/// modification time is not older than any input that exists.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Artifact {
    path: PathBuf,
}

impl Artifact {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn into_path(self) -> PathBuf {
        self.path
    }

    /// Whether the path exists (symlinks are followed).
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Whether the path is a file with at least one byte.
    pub fn is_nonempty(&self) -> bool {
        fs::metadata(&self.path)
            .map(|m| m.is_file() && m.len() > 0)
            .unwrap_or(false)
    }

    /// Modification time, if the path exists and the platform reports one.
    pub fn modified(&self) -> Option<SystemTime> {
        modified(&self.path)
    }

    /// Check the stage marker: exists and is not older than every input.
    ///
    /// Inputs that do not exist are ignored.
    pub fn is_fresh_against<P: AsRef<Path>>(&self, inputs: &[P]) -> bool {
        let Some(own) = self.modified() else {
            return false;
        };
        inputs
            .iter()
            .filter_map(|input| modified(input.as_ref()))
            .all(|input_time| own >= input_time)
    }
}

impl AsRef<Path> for Artifact {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}
