//! Persisted toggle state and the stores that hold it between sessions.

use crate::registry::Module;
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Everything needed to rebuild the search path for any combination of
/// enabled modules.
///
/// Both fields are required on the wire. An empty `baseline_path` is a
/// legitimate capture of an empty live path; only a missing one is invalid.
#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Deserialize, serde::Serialize)]
pub struct ToggleState {
    /// Search path captured on first use. Restoration target for every enable.
    pub baseline_path: Vec<PathBuf>,
    /// Module id to enabled flag.
    pub enabled: BTreeMap<String, bool>,
}

impl ToggleState {
    /// Fresh state: `baseline_path` becomes the baseline and every module starts enabled.
    pub fn capture(baseline_path: Vec<PathBuf>, modules: &[Module]) -> Self {
        Self {
            baseline_path,
            enabled: modules.iter().map(|module| (module.id.clone(), true)).collect(),
        }
    }

    /// Add modules installed since the state was captured, marked enabled.
    ///
    /// Returns whether anything was added.
    pub fn sync_modules(&mut self, modules: &[Module]) -> bool {
        let mut changed = false;
        for module in modules {
            if !self.enabled.contains_key(&module.id) {
                debug!(module = %module.id, "tracking newly installed module");
                self.enabled.insert(module.id.clone(), true);
                changed = true;
            }
        }
        changed
    }

    pub fn is_enabled(&self, id: &str) -> Option<bool> {
        self.enabled.get(id).copied()
    }

    pub fn set_enabled(&mut self, id: &str, enabled: bool) {
        self.enabled.insert(id.to_owned(), enabled);
    }

    /// Ids of every module currently switched off.
    pub fn disabled_ids(&self) -> impl Iterator<Item = &str> {
        self.enabled
            .iter()
            .filter(|(_, enabled)| !**enabled)
            .map(|(id, _)| id.as_str())
    }

    /// Check that a snapshot covers every known module.
    pub fn validate(&self, modules: &[Module]) -> Result<()> {
        if let Some(missing) = modules.iter().find(|m| !self.enabled.contains_key(&m.id)) {
            return Err(Error::InvalidSnapshot(format!(
                "no entry for module `{}`",
                missing.id
            )));
        }
        Ok(())
    }
}

/// Snapshot file contents before the required fields are checked.
#[derive(serde::Deserialize)]
struct SnapshotFields {
    baseline_path: Option<Vec<PathBuf>>,
    enabled: Option<BTreeMap<String, bool>>,
}

/// Read a snapshot written by [`write_snapshot`].
///
/// Malformed TOML is a `Parse` error; a missing `baseline_path` or
/// `enabled` table is an `InvalidSnapshot`.
pub fn read_snapshot(path: &Path) -> Result<ToggleState> {
    let content = fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let fields: SnapshotFields = toml::from_str(&content).map_err(|source| Error::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    let baseline_path = fields
        .baseline_path
        .ok_or_else(|| Error::InvalidSnapshot("baseline path is missing".into()))?;
    let enabled = fields
        .enabled
        .ok_or_else(|| Error::InvalidSnapshot("module flags are missing".into()))?;
    Ok(ToggleState {
        baseline_path,
        enabled,
    })
}

pub fn write_snapshot(path: &Path, state: &ToggleState) -> Result<()> {
    let content = toml::to_string_pretty(state)?;
    write_atomic(path, content.as_bytes())
}

/// Get-or-default and set of the single persisted [`ToggleState`].
pub trait StateStore {
    /// The stored state, or `None` before first use.
    fn load(&self) -> Result<Option<ToggleState>>;

    /// Replace the stored state.
    fn save(&mut self, state: &ToggleState) -> Result<()>;
}

/// TOML file backed state store.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for FileStateStore {
    fn load(&self) -> Result<Option<ToggleState>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(Error::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        // A corrupted file is an error: silently resetting would lose the baseline.
        toml::from_str(&content)
            .map(Some)
            .map_err(|source| Error::Parse {
                path: self.path.clone(),
                source,
            })
    }

    fn save(&mut self, state: &ToggleState) -> Result<()> {
        let content = toml::to_string_pretty(state)?;
        write_atomic(&self.path, content.as_bytes())
    }
}

/// In-process state store, for embedding and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    state: Option<ToggleState>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: ToggleState) -> Self {
        Self { state: Some(state) }
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self) -> Result<Option<ToggleState>> {
        Ok(self.state.clone())
    }

    fn save(&mut self, state: &ToggleState) -> Result<()> {
        self.state = Some(state.clone());
        Ok(())
    }
}

/// Write through a temp file and rename, creating parent directories.
pub(crate) fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let persist_err = |source| Error::Persistence {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(persist_err)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, content).map_err(persist_err)?;
    fs::rename(&tmp, path).map_err(persist_err)?;
    Ok(())
}
