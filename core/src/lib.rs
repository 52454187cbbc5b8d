//! Core crate for toggling toolbox modules on and off the host search path.

pub mod config;
pub mod controller;
pub mod live_path;
pub mod reconcile;
pub mod registry;
pub mod request;
pub mod state;

pub use config::Config;
pub use controller::{ToggleController, Toggled};
pub use live_path::{MemoryPath, PathFile, PathProvider};
pub use registry::{Module, ModuleRegistry, Registry};
pub use request::{Permanence, Request, Response, Selection, TargetState, Warning};
pub use state::{FileStateStore, MemoryStateStore, StateStore, ToggleState};

use std::path::PathBuf;
use thiserror::Error;

/// Common error type for the toolbox crates.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed request: empty module list, unknown state keyword, bad config value.
    #[error("invalid argument: {0}")]
    Argument(String),
    /// A module name or id that the registry does not know.
    #[error("unknown module `{0}`")]
    UnknownModule(String),
    /// A snapshot handed to `restore` is missing required fields.
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
    /// Writing state or a path file failed; memory and disk may now disagree.
    #[error("failed to write {}: {source}", .path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),
}

/// Convenient alias for results returned by the core crate.
pub type Result<T> = std::result::Result<T, Error>;
