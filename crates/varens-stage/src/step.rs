//! External step definitions.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// An output a step declares it will write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "path", rename_all = "snake_case")]
pub enum Produces {
    File(PathBuf),
    Dir(PathBuf),
}

impl Produces {
    pub fn path(&self) -> &Path {
        match self {
            Produces::File(p) | Produces::Dir(p) => p,
        }
    }
}

/// A fully built external command.
///
/// Argument construction belongs to the caller; the executor only runs the
/// vector as given and reports the exit status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSpec {
    /// Human-readable step name, used in logs and errors.
    pub name: String,

    /// Command to execute (first element is executable).
    pub command: Vec<String>,

    /// Directory the tool runs in. Intermediate files appear relative to it.
    pub working_dir: Option<PathBuf>,

    /// Redirect the tool's stdout to this file instead of capturing it.
    pub stdout_to: Option<PathBuf>,

    /// Outputs the tool is expected to write.
    pub produces: Vec<Produces>,

    /// Timeout in seconds (0 = none).
    pub timeout_secs: u64,
}

impl StepSpec {
    pub fn new(name: impl Into<String>, command: Vec<String>) -> Self {
        Self {
            name: name.into(),
            command,
            working_dir: None,
            stdout_to: None,
            produces: Vec::new(),
            timeout_secs: 0,
        }
    }

    /// Run the tool from `dir`.
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Write stdout to `path`. The file is also recorded as a produced output.
    pub fn stdout_to(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        self.produces.push(Produces::File(path.clone()));
        self.stdout_to = Some(path);
        self
    }

    pub fn produces_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.produces.push(Produces::File(path.into()));
        self
    }

    pub fn produces_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.produces.push(Produces::Dir(path.into()));
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Space-joined command line for logs and error messages.
    pub fn display_command(&self) -> String {
        self.command.join(" ")
    }
}
