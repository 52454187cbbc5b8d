//! Access to the host application's live search path.

use crate::state::write_atomic;
use crate::{Error, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Read and replace the live search path.
pub trait PathProvider {
    /// The live path. May have drifted since the last call.
    fn current(&self) -> Result<Vec<PathBuf>>;

    /// Replace the live path for the current session.
    fn apply(&mut self, path: &[PathBuf]) -> Result<()>;

    /// Record `path` in the host's startup configuration so it survives restarts.
    fn save_startup(&mut self, path: &[PathBuf]) -> Result<()>;
}

/// Live and startup paths kept as line-per-entry files.
///
/// Until a live path has been applied, the startup file stands in for it.
#[derive(Debug, Clone)]
pub struct PathFile {
    live: PathBuf,
    startup: PathBuf,
}

impl PathFile {
    pub fn new(live: impl Into<PathBuf>, startup: impl Into<PathBuf>) -> Self {
        Self {
            live: live.into(),
            startup: startup.into(),
        }
    }

    pub fn live_file(&self) -> &Path {
        &self.live
    }

    pub fn startup_file(&self) -> &Path {
        &self.startup
    }
}

impl PathProvider for PathFile {
    fn current(&self) -> Result<Vec<PathBuf>> {
        match read_path_list(&self.live)? {
            Some(path) => Ok(path),
            None => Ok(read_path_list(&self.startup)?.unwrap_or_default()),
        }
    }

    fn apply(&mut self, path: &[PathBuf]) -> Result<()> {
        write_path_list(&self.live, path)
    }

    fn save_startup(&mut self, path: &[PathBuf]) -> Result<()> {
        write_path_list(&self.startup, path)
    }
}

/// In-process live path, for embedding and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryPath {
    pub live: Vec<PathBuf>,
    pub startup: Option<Vec<PathBuf>>,
}

impl MemoryPath {
    pub fn new(live: Vec<PathBuf>) -> Self {
        Self { live, startup: None }
    }
}

impl PathProvider for MemoryPath {
    fn current(&self) -> Result<Vec<PathBuf>> {
        Ok(self.live.clone())
    }

    fn apply(&mut self, path: &[PathBuf]) -> Result<()> {
        self.live = path.to_vec();
        Ok(())
    }

    fn save_startup(&mut self, path: &[PathBuf]) -> Result<()> {
        self.startup = Some(path.to_vec());
        Ok(())
    }
}

/// Parse a path list, one entry per line taken verbatim; empty lines are
/// skipped. `None` when the file does not exist.
pub fn read_path_list(file: &Path) -> Result<Option<Vec<PathBuf>>> {
    match fs::read_to_string(file) {
        Ok(content) => Ok(Some(
            content
                .lines()
                .filter(|line| !line.is_empty())
                .map(PathBuf::from)
                .collect(),
        )),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(Error::Io {
            path: file.to_path_buf(),
            source,
        }),
    }
}

/// Entries must be UTF-8 without line breaks so they read back unchanged.
fn write_path_list(file: &Path, path: &[PathBuf]) -> Result<()> {
    let mut content = String::new();
    for entry in path {
        let line = entry.to_str().ok_or_else(|| {
            Error::Argument(format!(
                "path entry {} is not valid UTF-8",
                entry.display()
            ))
        })?;
        if line.contains(['\n', '\r']) {
            return Err(Error::Argument(format!(
                "path entry {line:?} contains a line break"
            )));
        }
        content.push_str(line);
        content.push('\n');
    }
    write_atomic(file, content.as_bytes())
}
