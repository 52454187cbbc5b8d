//! Configuration models and loaders for the toolbox toggle.

use crate::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Directory under the state dir that holds everything this tool writes.
pub const STATE_NAMESPACE: &str = "toolbox";

/// High-level configuration for the toolbox runtime.
#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Deserialize, serde::Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory whose subdirectories are the installed modules.
    pub modules_dir: Option<PathBuf>,
    /// Id of the host module, which can never be disabled.
    pub host_module: Option<String>,
    /// Base directory for persisted state. Defaults to the XDG state dir.
    pub state_dir: Option<PathBuf>,
    /// Live search path file.
    pub path_file: Option<PathBuf>,
    /// Host startup search path file, written by permanent changes.
    pub startup_file: Option<PathBuf>,
}

impl Config {
    pub fn modules_dir(&self) -> PathBuf {
        self.modules_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("modules"))
    }

    pub fn host_module(&self) -> &str {
        self.host_module.as_deref().unwrap_or("core")
    }

    /// Namespaced directory for this tool's files.
    pub fn state_dir(&self) -> Result<PathBuf> {
        let base = match &self.state_dir {
            Some(dir) => dir.clone(),
            None => default_state_dir()?,
        };
        Ok(base.join(STATE_NAMESPACE))
    }

    /// Where the toggle state record lives.
    pub fn state_file(&self) -> Result<PathBuf> {
        Ok(self.state_dir()?.join("toggle.toml"))
    }

    pub fn path_file(&self) -> Result<PathBuf> {
        match &self.path_file {
            Some(file) => Ok(file.clone()),
            None => Ok(self.state_dir()?.join("path.txt")),
        }
    }

    pub fn startup_file(&self) -> Result<PathBuf> {
        match &self.startup_file {
            Some(file) => Ok(file.clone()),
            None => Ok(self.state_dir()?.join("startup-path.txt")),
        }
    }
}

/// Attempt to load configuration from the provided path.
///
/// Expected TOML keys, all optional:
/// - `modules_dir`, `state_dir`, `path_file`, `startup_file` as paths
/// - `host_module` as a module identifier
pub fn load_config(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config: Config = toml::from_str(&content).map_err(|source| Error::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    if config.host_module.as_deref().is_some_and(|id| id.trim().is_empty()) {
        return Err(Error::Argument("host_module must not be empty".into()));
    }
    Ok(config)
}

/// `$XDG_STATE_HOME`, falling back to `~/.local/state`.
fn default_state_dir() -> Result<PathBuf> {
    if let Some(state_home) = std::env::var_os("XDG_STATE_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(state_home));
    }
    if let Some(home_dir) = home::home_dir() {
        return Ok(home_dir.join(".local/state"));
    }
    Err(Error::Argument(
        "could not determine a state directory; set `state_dir` in the config".into(),
    ))
}
