//! Request and response shapes for the toggle controller.

use crate::state::ToggleState;
use crate::Error;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Which modules a request applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    All,
    /// Ids or display names, resolved by the controller.
    Modules(Vec<String>),
}

impl Selection {
    /// Build a selection from raw user input; a lone `all` (any case) selects everything.
    pub fn from_inputs<I, S>(inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let inputs: Vec<String> = inputs.into_iter().map(Into::into).collect();
        if inputs.iter().any(|input| input.trim().eq_ignore_ascii_case("all")) {
            Selection::All
        } else {
            Selection::Modules(inputs)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetState {
    Enabled,
    Disabled,
}

impl TargetState {
    pub fn as_bool(self) -> bool {
        self == TargetState::Enabled
    }
}

impl FromStr for TargetState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on" | "enable" | "enabled" | "true" => Ok(TargetState::Enabled),
            "off" | "disable" | "disabled" | "false" => Ok(TargetState::Disabled),
            other => Err(Error::Argument(format!(
                "invalid state `{other}`, expected on or off"
            ))),
        }
    }
}

impl fmt::Display for TargetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetState::Enabled => f.write_str("enabled"),
            TargetState::Disabled => f.write_str("disabled"),
        }
    }
}

/// How long a change lasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Permanence {
    /// Only the current session's live path changes.
    #[default]
    Temporary,
    /// The host's startup path is updated as well.
    Permanent,
}

/// Non-fatal conditions raised while handling a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// The host module cannot be disabled.
    ProtectedModule(String),
    AlreadyDisabled(String),
    AlreadyEnabled(String),
    /// Live path entries unknown to the baseline, dropped by the rebuild.
    ForeignEntries(Vec<PathBuf>),
    /// A permanence flag was given to a read-only request.
    PermanenceIgnored,
    /// No module changed state, so nothing was written.
    NothingToDo,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::ProtectedModule(id) => write!(f, "module `{id}` is protected and cannot be disabled"),
            Warning::AlreadyDisabled(id) => write!(f, "module `{id}` is already disabled"),
            Warning::AlreadyEnabled(id) => write!(f, "module `{id}` is already enabled"),
            Warning::ForeignEntries(entries) => {
                let list: Vec<_> = entries.iter().map(|e| e.display().to_string()).collect();
                write!(
                    f,
                    "path entries added outside the baseline will be dropped: {}",
                    list.join(", ")
                )
            }
            Warning::PermanenceIgnored => f.write_str("permanence flag is ignored when querying"),
            Warning::NothingToDo => f.write_str("no module changed state"),
        }
    }
}

/// A single call into the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Query {
        selection: Selection,
        permanence: Option<Permanence>,
    },
    ListNames,
    SetState {
        selection: Selection,
        target: TargetState,
        permanence: Permanence,
    },
    Restore {
        snapshot: ToggleState,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Flags for specifically requested modules.
    Flags {
        flags: BTreeMap<String, bool>,
        warnings: Vec<Warning>,
    },
    /// The whole state, returned when every module was queried.
    Snapshot {
        snapshot: ToggleState,
        warnings: Vec<Warning>,
    },
    /// Module id to display name.
    Names(Vec<(String, String)>),
    /// State before a `SetState`, suitable for a later `Restore`.
    Prior {
        snapshot: ToggleState,
        warnings: Vec<Warning>,
    },
    Restored {
        warnings: Vec<Warning>,
    },
}
