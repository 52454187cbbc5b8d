//! Module registry: which toolboxes exist and where they are installed.

use crate::{Error, Result};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, warn};

/// File name of the optional per-module manifest.
pub const MANIFEST_FILE: &str = "module.toml";

/// Metadata describing an installed module.
#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Deserialize, serde::Serialize)]
pub struct Module {
    /// Stable identifier, the module's directory name.
    pub id: String,
    /// Human-readable name, e.g. "Wavelet Toolbox".
    pub name: String,
    pub description: String,
    /// Installation directory prefixes owned by this module.
    pub dirs: Vec<PathBuf>,
}

impl Module {
    /// Create a module owning a single installation directory.
    pub fn new(id: impl Into<String>, name: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            dirs: vec![dir.into()],
        }
    }

    fn matches(&self, input: &str) -> bool {
        self.id.eq_ignore_ascii_case(input) || self.name.to_lowercase() == input.to_lowercase()
    }
}

/// Lookup interface over the set of installed modules.
pub trait ModuleRegistry {
    /// All known modules, in a stable order.
    fn modules(&self) -> Result<&[Module]>;

    /// Find a module by id or display name, ignoring case and surrounding whitespace.
    fn resolve(&self, name: &str) -> Result<Option<&Module>> {
        let needle = name.trim();
        Ok(self.modules()?.iter().find(|module| module.matches(needle)))
    }

    /// Look up a module by its canonical id.
    fn get(&self, id: &str) -> Result<Option<&Module>> {
        Ok(self.modules()?.iter().find(|module| module.id == id))
    }

    /// `(id, display name)` pairs in registry order.
    fn list_names(&self) -> Result<Vec<(String, String)>> {
        Ok(self
            .modules()?
            .iter()
            .map(|module| (module.id.clone(), module.name.clone()))
            .collect())
    }
}

/// Registry handle that knows where module metadata lives on disk.
///
/// The directory scan runs once, on first access, and is cached for the
/// lifetime of the value.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    pub modules_dir: PathBuf,
    cache: OnceLock<Vec<Module>>,
}

impl Registry {
    /// Create a new registry pointing at the provided modules directory.
    pub fn new(modules_dir: PathBuf) -> Self {
        Self {
            modules_dir,
            cache: OnceLock::new(),
        }
    }

    /// Registry over a fixed module list; no directory is scanned.
    pub fn from_modules(modules: Vec<Module>) -> Self {
        Self {
            modules_dir: PathBuf::new(),
            cache: OnceLock::from(modules),
        }
    }
}

impl ModuleRegistry for Registry {
    fn modules(&self) -> Result<&[Module]> {
        if let Some(modules) = self.cache.get() {
            return Ok(modules);
        }
        let found = discover_modules(&self.modules_dir)?;
        Ok(self.cache.get_or_init(|| found))
    }
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct Manifest {
    name: Option<String>,
    description: Option<String>,
    dirs: Vec<PathBuf>,
}

/// Look for modules beneath the path.
///
/// Every non-hidden subdirectory is a module. A `module.toml` inside it may
/// provide `name`, `description` and extra `dirs` relative to the module.
/// Every returned directory is absolute with `.` and `..` resolved, so it
/// compares component-wise against live path entries.
pub fn discover_modules(dir: impl AsRef<Path>) -> Result<Vec<Module>> {
    let dir = &normalize(dir.as_ref())?;
    let io_err = |source| Error::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut modules = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        let root = entry.path();
        if !root.is_dir() {
            continue;
        }
        let Some(id) = entry.file_name().to_str().map(str::to_owned) else {
            warn!(path = %root.display(), "skipping module directory with non UTF-8 name");
            continue;
        };
        if id.starts_with('.') {
            continue;
        }

        let manifest = read_manifest(&root.join(MANIFEST_FILE))?;
        let mut dirs = vec![root.clone()];
        dirs.extend(manifest.dirs.iter().map(|extra| resolve_lexically(&root.join(extra))));

        modules.push(Module {
            name: manifest.name.unwrap_or_else(|| id.clone()),
            description: manifest.description.unwrap_or_default(),
            id,
            dirs,
        });
    }

    modules.sort_by(|a, b| a.id.cmp(&b.id));
    debug!(count = modules.len(), dir = %dir.display(), "discovered modules");
    Ok(modules)
}

/// Absolute form of `path` with `.` and `..` folded away. Symlinks are left
/// alone; live path entries name directories the way the user wrote them.
pub fn normalize(path: &Path) -> Result<PathBuf> {
    let absolute = std::path::absolute(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(resolve_lexically(&absolute))
}

fn resolve_lexically(path: &Path) -> PathBuf {
    let mut resolved = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !resolved.pop() {
                    resolved.push(component);
                }
            }
            other => resolved.push(other),
        }
    }
    resolved
}

fn read_manifest(path: &Path) -> Result<Manifest> {
    if !path.exists() {
        return Ok(Manifest::default());
    }
    let content = fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| Error::Parse {
        path: path.to_path_buf(),
        source,
    })
}
