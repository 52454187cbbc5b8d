//! Orchestrates toggle requests over the registry, state store and live path.

use crate::live_path::PathProvider;
use crate::reconcile;
use crate::registry::ModuleRegistry;
use crate::request::{Permanence, Request, Response, Selection, TargetState, Warning};
use crate::state::{StateStore, ToggleState};
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Result of a `set_state` call.
#[derive(Debug, Clone, PartialEq)]
pub struct Toggled {
    /// Full state before the change.
    pub prior: ToggleState,
    pub warnings: Vec<Warning>,
}

/// Drives a single toggle request end to end.
///
/// Every mutating call computes the new state and path first, then persists
/// the state, then applies the path.
pub struct ToggleController<R, S, P> {
    registry: R,
    store: S,
    path: P,
    host_module: String,
}

impl<R, S, P> ToggleController<R, S, P>
where
    R: ModuleRegistry,
    S: StateStore,
    P: PathProvider,
{
    /// `host_module` is the id of the module that can never be disabled.
    pub fn new(registry: R, store: S, path: P, host_module: impl Into<String>) -> Self {
        Self {
            registry,
            store,
            path,
            host_module: host_module.into(),
        }
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn path_provider(&self) -> &P {
        &self.path
    }

    /// Mutable access to the live path, for callers simulating outside edits.
    pub fn path_provider_mut(&mut self) -> &mut P {
        &mut self.path
    }

    /// Dispatch a tagged request.
    pub fn handle(&mut self, request: Request) -> Result<Response> {
        match request {
            Request::Query {
                selection,
                permanence,
            } => {
                let mut warnings = Vec::new();
                if permanence.is_some() {
                    raise(&mut warnings, Warning::PermanenceIgnored);
                }
                match selection {
                    Selection::All => Ok(Response::Snapshot {
                        snapshot: self.snapshot()?,
                        warnings,
                    }),
                    selection => Ok(Response::Flags {
                        flags: self.query(&selection)?,
                        warnings,
                    }),
                }
            }
            Request::ListNames => Ok(Response::Names(self.list_names()?)),
            Request::SetState {
                selection,
                target,
                permanence,
            } => {
                let toggled = self.set_state(&selection, target, permanence)?;
                Ok(Response::Prior {
                    snapshot: toggled.prior,
                    warnings: toggled.warnings,
                })
            }
            Request::Restore { snapshot } => Ok(Response::Restored {
                warnings: self.restore(snapshot)?,
            }),
        }
    }

    /// Enabled flag per selected module. Never touches the live path.
    pub fn query(&mut self, selection: &Selection) -> Result<BTreeMap<String, bool>> {
        let ids = self.select(selection)?;
        let state = self.load_state()?;
        Ok(ids
            .into_iter()
            .map(|id| {
                let enabled = state.is_enabled(&id).unwrap_or(true);
                (id, enabled)
            })
            .collect())
    }

    /// The complete persisted state, initializing it on first use.
    pub fn snapshot(&mut self) -> Result<ToggleState> {
        self.load_state()
    }

    /// Module id and display name pairs in registry order.
    pub fn list_names(&self) -> Result<Vec<(String, String)>> {
        self.registry.list_names()
    }

    /// Map ids or display names to canonical module ids.
    ///
    /// Fails on the first input the registry does not know.
    pub fn resolve_names(&self, inputs: &[String]) -> Result<Vec<String>> {
        if inputs.is_empty() {
            return Err(Error::Argument("no modules given".into()));
        }
        let mut ids: Vec<String> = Vec::with_capacity(inputs.len());
        for input in inputs {
            let module = self
                .registry
                .resolve(input)?
                .ok_or_else(|| Error::UnknownModule(input.trim().to_owned()))?;
            if !ids.contains(&module.id) {
                ids.push(module.id.clone());
            }
        }
        Ok(ids)
    }

    /// Switch the selected modules on or off and apply the resulting path.
    ///
    /// Returns the state as it was before the call.
    pub fn set_state(
        &mut self,
        selection: &Selection,
        target: TargetState,
        permanence: Permanence,
    ) -> Result<Toggled> {
        let ids = self.select(selection)?;
        let whole = matches!(selection, Selection::All);
        let mut state = self.load_state()?;
        let prior = state.clone();
        let mut warnings = Vec::new();

        let new_path = match target {
            TargetState::Disabled => self.disable(&mut state, &ids, whole, &mut warnings)?,
            TargetState::Enabled => self.enable(&mut state, &ids, whole, &mut warnings)?,
        };

        match new_path {
            Some(new_path) => self.commit(&state, &new_path, permanence)?,
            None => raise(&mut warnings, Warning::NothingToDo),
        }
        Ok(Toggled { prior, warnings })
    }

    /// Make `snapshot` the current state and rebuild the live path from it.
    pub fn restore(&mut self, snapshot: ToggleState) -> Result<Vec<Warning>> {
        snapshot.validate(self.registry.modules()?)?;
        let mut state = snapshot;
        let mut warnings = Vec::new();

        if state.is_enabled(&self.host_module) == Some(false) {
            raise(
                &mut warnings,
                Warning::ProtectedModule(self.host_module.clone()),
            );
            state.set_enabled(&self.host_module, true);
        }

        let current = self.path.current()?;
        let new_path = self.rebuild(&state, &current, &mut warnings)?;
        self.commit(&state, &new_path, Permanence::Temporary)?;
        Ok(warnings)
    }

    fn select(&self, selection: &Selection) -> Result<Vec<String>> {
        match selection {
            Selection::All => Ok(self
                .registry
                .modules()?
                .iter()
                .map(|module| module.id.clone())
                .collect()),
            Selection::Modules(inputs) => self.resolve_names(inputs),
        }
    }

    fn load_state(&mut self) -> Result<ToggleState> {
        let modules = self.registry.modules()?;
        match self.store.load()? {
            Some(mut state) => {
                if state.sync_modules(modules) {
                    self.store.save(&state)?;
                }
                Ok(state)
            }
            None => {
                let baseline = self.path.current()?;
                info!(entries = baseline.len(), "capturing baseline search path");
                let state = ToggleState::capture(baseline, modules);
                self.store.save(&state)?;
                Ok(state)
            }
        }
    }

    /// Mark modules disabled and strip their directories from the live path.
    fn disable(
        &self,
        state: &mut ToggleState,
        ids: &[String],
        whole: bool,
        warnings: &mut Vec<Warning>,
    ) -> Result<Option<Vec<PathBuf>>> {
        let mut newly: Vec<&str> = Vec::new();
        for id in ids {
            if *id == self.host_module {
                if !whole {
                    raise(warnings, Warning::ProtectedModule(id.clone()));
                }
                continue;
            }
            if state.is_enabled(id) == Some(false) {
                if !whole {
                    raise(warnings, Warning::AlreadyDisabled(id.clone()));
                }
                continue;
            }
            state.set_enabled(id, false);
            newly.push(id);
        }
        if newly.is_empty() {
            return Ok(None);
        }

        debug!(modules = ?newly, "disabling");
        let dirs = self.module_dirs(newly.iter().copied())?;
        let current = self.path.current()?;
        Ok(Some(reconcile::disable(&current, &dirs)))
    }

    /// Mark modules enabled and rebuild the path from the baseline.
    fn enable(
        &self,
        state: &mut ToggleState,
        ids: &[String],
        whole: bool,
        warnings: &mut Vec<Warning>,
    ) -> Result<Option<Vec<PathBuf>>> {
        let mut newly: Vec<&str> = Vec::new();
        for id in ids {
            if state.is_enabled(id) != Some(false) {
                if !whole {
                    raise(warnings, Warning::AlreadyEnabled(id.clone()));
                }
                continue;
            }
            state.set_enabled(id, true);
            newly.push(id);
        }
        if newly.is_empty() {
            return Ok(None);
        }

        debug!(modules = ?newly, "enabling");
        let current = self.path.current()?;
        self.rebuild(state, &current, warnings).map(Some)
    }

    /// Baseline minus every still-disabled module. Foreign live entries are
    /// reported and dropped.
    fn rebuild(
        &self,
        state: &ToggleState,
        current: &[PathBuf],
        warnings: &mut Vec<Warning>,
    ) -> Result<Vec<PathBuf>> {
        let foreign = reconcile::foreign_entries(current, &state.baseline_path);
        if !foreign.is_empty() {
            raise(warnings, Warning::ForeignEntries(foreign));
        }
        let excluded = self.module_dirs(state.disabled_ids())?;
        Ok(reconcile::enable(&state.baseline_path, &excluded))
    }

    /// Installation directories of the given modules. Ids the registry no
    /// longer knows own nothing, and directories at or below a host module
    /// directory are never handed out for removal.
    fn module_dirs<'a>(&self, ids: impl IntoIterator<Item = &'a str>) -> Result<Vec<PathBuf>> {
        let protected: &[PathBuf] = match self.registry.get(&self.host_module)? {
            Some(host) => &host.dirs,
            None => &[],
        };
        let mut dirs = Vec::new();
        for id in ids {
            if let Some(module) = self.registry.get(id)? {
                dirs.extend(
                    module
                        .dirs
                        .iter()
                        .filter(|dir| !protected.iter().any(|host| reconcile::is_under(dir, host)))
                        .cloned(),
                );
            }
        }
        Ok(dirs)
    }

    fn commit(
        &mut self,
        state: &ToggleState,
        new_path: &[PathBuf],
        permanence: Permanence,
    ) -> Result<()> {
        self.store.save(state)?;
        self.path.apply(new_path)?;
        if permanence == Permanence::Permanent {
            self.path.save_startup(new_path)?;
        }
        info!(
            entries = new_path.len(),
            permanent = permanence == Permanence::Permanent,
            "applied search path"
        );
        Ok(())
    }
}

fn raise(warnings: &mut Vec<Warning>, warning: Warning) {
    warn!("{warning}");
    warnings.push(warning);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live_path::MemoryPath;
    use crate::registry::{Module, Registry};
    use crate::state::MemoryStateStore;

    type Controller = ToggleController<Registry, MemoryStateStore, MemoryPath>;

    fn paths(entries: &[&str]) -> Vec<PathBuf> {
        entries.iter().map(PathBuf::from).collect()
    }

    fn controller(live: &[&str]) -> Controller {
        let registry = Registry::from_modules(vec![
            Module::new("core", "Host Core", "/toolbox/core"),
            Module::new("aero", "Aerospace Toolbox", "/toolbox/aero"),
            Module::new("wavelet", "Wavelet Toolbox", "/toolbox/wavelet"),
        ]);
        ToggleController::new(
            registry,
            MemoryStateStore::new(),
            MemoryPath::new(paths(live)),
            "core",
        )
    }

    fn baseline() -> Vec<PathBuf> {
        paths(&[
            "/toolbox/core",
            "/x",
            "/toolbox/aero",
            "/toolbox/aero/util",
            "/y",
            "/toolbox/wavelet",
            "/z",
        ])
    }

    fn standard() -> Controller {
        let mut ctl = controller(&[]);
        ctl.path_provider_mut().live = baseline();
        ctl
    }

    fn set(ctl: &mut Controller, ids: &[&str], target: TargetState) -> Toggled {
        ctl.set_state(
            &Selection::from_inputs(ids.iter().copied()),
            target,
            Permanence::Temporary,
        )
        .unwrap()
    }

    fn live(ctl: &Controller) -> Vec<PathBuf> {
        ctl.path_provider().live.clone()
    }

    #[test]
    fn disable_then_enable_all_restores_original_order() {
        let mut ctl = controller(&["/x", "/toolbox/aero", "/y", "/toolbox/wavelet", "/z"]);

        set(&mut ctl, &["aero"], TargetState::Disabled);
        assert_eq!(live(&ctl), paths(&["/x", "/y", "/toolbox/wavelet", "/z"]));

        set(&mut ctl, &["wavelet"], TargetState::Disabled);
        assert_eq!(live(&ctl), paths(&["/x", "/y", "/z"]));

        set(&mut ctl, &["all"], TargetState::Enabled);
        assert_eq!(
            live(&ctl),
            paths(&["/x", "/toolbox/aero", "/y", "/toolbox/wavelet", "/z"])
        );
    }

    #[test]
    fn any_toggle_sequence_ends_at_baseline_after_enable_all() {
        let ops: Vec<(&str, TargetState)> = ["aero", "wavelet", "core"]
            .into_iter()
            .flat_map(|id| [(id, TargetState::Disabled), (id, TargetState::Enabled)])
            .collect();

        for len in 0..=4u32 {
            for code in 0..ops.len().pow(len) {
                let mut ctl = standard();
                let mut rest = code;
                for _ in 0..len {
                    let (id, target) = ops[rest % ops.len()];
                    rest /= ops.len();
                    set(&mut ctl, &[id], target);
                }
                set(&mut ctl, &["all"], TargetState::Enabled);
                assert_eq!(live(&ctl), baseline(), "sequence {code} of length {len}");
            }
        }
    }

    #[test]
    fn enabling_one_module_keeps_others_disabled_in_baseline_order() {
        let mut ctl = standard();
        set(&mut ctl, &["wavelet", "aero"], TargetState::Disabled);
        set(&mut ctl, &["aero"], TargetState::Enabled);
        assert_eq!(
            live(&ctl),
            paths(&["/toolbox/core", "/x", "/toolbox/aero", "/toolbox/aero/util", "/y", "/z"])
        );
        let flags = ctl.query(&Selection::from_inputs(["aero", "wavelet"])).unwrap();
        assert!(flags["aero"]);
        assert!(!flags["wavelet"]);
    }

    #[test]
    fn foreign_entries_are_dropped_on_enable_with_warning() {
        let registry = Registry::from_modules(vec![Module::new("bee", "B", "/b")]);
        let mut ctl = ToggleController::new(
            registry,
            MemoryStateStore::new(),
            MemoryPath::new(paths(&["/a", "/b", "/c"])),
            "core",
        );

        set(&mut ctl, &["bee"], TargetState::Disabled);
        assert_eq!(ctl.path_provider().live, paths(&["/a", "/c"]));

        ctl.path_provider_mut().live.push(PathBuf::from("/d"));
        let toggled = set(&mut ctl, &["bee"], TargetState::Enabled);

        assert_eq!(ctl.path_provider().live, paths(&["/a", "/b", "/c"]));
        assert_eq!(
            toggled.warnings,
            vec![Warning::ForeignEntries(paths(&["/d"]))]
        );
    }

    #[test]
    fn disable_keeps_foreign_entries() {
        let mut ctl = standard();
        ctl.path_provider_mut().live.push(PathBuf::from("/extra"));
        let toggled = set(&mut ctl, &["wavelet"], TargetState::Disabled);
        assert!(toggled.warnings.is_empty());
        assert_eq!(live(&ctl).last(), Some(&PathBuf::from("/extra")));
    }

    #[test]
    fn repeated_toggles_are_idempotent() {
        let mut ctl = standard();
        set(&mut ctl, &["aero"], TargetState::Disabled);
        let state = ctl.snapshot().unwrap();
        let path = live(&ctl);

        let again = set(&mut ctl, &["aero"], TargetState::Disabled);
        assert_eq!(
            again.warnings,
            vec![Warning::AlreadyDisabled("aero".into()), Warning::NothingToDo]
        );
        assert_eq!(ctl.snapshot().unwrap(), state);
        assert_eq!(live(&ctl), path);

        let enabled = set(&mut ctl, &["wavelet"], TargetState::Enabled);
        assert_eq!(
            enabled.warnings,
            vec![Warning::AlreadyEnabled("wavelet".into()), Warning::NothingToDo]
        );
        assert_eq!(live(&ctl), path);
    }

    #[test]
    fn host_module_is_never_disabled() {
        let mut ctl = standard();
        let toggled = set(&mut ctl, &["Host Core"], TargetState::Disabled);
        assert_eq!(
            toggled.warnings,
            vec![Warning::ProtectedModule("core".into()), Warning::NothingToDo]
        );
        assert_eq!(live(&ctl), baseline());

        let toggled = set(&mut ctl, &["core", "aero"], TargetState::Disabled);
        assert_eq!(toggled.warnings, vec![Warning::ProtectedModule("core".into())]);

        set(&mut ctl, &["all"], TargetState::Disabled);
        let state = ctl.snapshot().unwrap();
        assert_eq!(state.is_enabled("core"), Some(true));
        assert_eq!(live(&ctl), paths(&["/toolbox/core", "/x", "/y", "/z"]));
    }

    #[test]
    fn module_sharing_a_host_directory_leaves_it_in_place() {
        let registry = Registry::from_modules(vec![
            Module::new("core", "Host Core", "/toolbox/core"),
            Module {
                dirs: vec![PathBuf::from("/toolbox/extras"), PathBuf::from("/toolbox/core")],
                ..Module::new("extras", "Extras", "/toolbox/extras")
            },
        ]);
        let mut ctl = ToggleController::new(
            registry,
            MemoryStateStore::new(),
            MemoryPath::new(paths(&["/toolbox/core", "/toolbox/core/lib", "/toolbox/extras", "/x"])),
            "core",
        );

        set(&mut ctl, &["extras"], TargetState::Disabled);
        assert_eq!(
            ctl.path_provider().live,
            paths(&["/toolbox/core", "/toolbox/core/lib", "/x"])
        );

        ctl.path_provider_mut().live.push(PathBuf::from("/late"));
        let mut snapshot = ctl.snapshot().unwrap();
        snapshot.set_enabled("extras", false);
        ctl.restore(snapshot).unwrap();
        assert_eq!(
            ctl.path_provider().live,
            paths(&["/toolbox/core", "/toolbox/core/lib", "/x"])
        );
    }

    #[test]
    fn empty_live_path_round_trips_through_restore() {
        let mut ctl = controller(&[]);
        let snapshot = ctl.snapshot().unwrap();
        assert!(snapshot.baseline_path.is_empty());

        let warnings = ctl.restore(snapshot.clone()).unwrap();
        assert!(warnings.is_empty());
        assert_eq!(ctl.snapshot().unwrap(), snapshot);
        assert!(live(&ctl).is_empty());
    }

    #[test]
    fn permanence_on_a_flag_query_is_reported() {
        let mut ctl = standard();
        let response = ctl
            .handle(Request::Query {
                selection: Selection::from_inputs(["aero"]),
                permanence: Some(Permanence::Temporary),
            })
            .unwrap();
        let Response::Flags { flags, warnings } = response else {
            panic!("expected flags");
        };
        assert!(flags["aero"]);
        assert_eq!(warnings, vec![Warning::PermanenceIgnored]);

        let quiet = ctl
            .handle(Request::Query {
                selection: Selection::from_inputs(["aero"]),
                permanence: None,
            })
            .unwrap();
        assert!(matches!(quiet, Response::Flags { ref warnings, .. } if warnings.is_empty()));
    }

    #[test]
    fn set_state_returns_prior_snapshot() {
        let mut ctl = standard();
        let before = ctl.snapshot().unwrap();
        let toggled = set(&mut ctl, &["aero"], TargetState::Disabled);
        assert_eq!(toggled.prior, before);
        assert_eq!(toggled.prior.baseline_path, baseline());

        ctl.restore(toggled.prior).unwrap();
        assert_eq!(ctl.snapshot().unwrap(), before);
        assert_eq!(live(&ctl), baseline());
    }

    #[test]
    fn restore_of_fresh_snapshot_changes_nothing() {
        let mut ctl = standard();
        set(&mut ctl, &["wavelet"], TargetState::Disabled);
        let snapshot = ctl.snapshot().unwrap();
        let path = live(&ctl);

        let warnings = ctl.restore(snapshot.clone()).unwrap();
        assert!(warnings.is_empty());
        assert_eq!(ctl.snapshot().unwrap(), snapshot);
        assert_eq!(live(&ctl), path);
    }

    #[test]
    fn restore_rejects_incomplete_snapshots() {
        let mut ctl = standard();
        set(&mut ctl, &["aero"], TargetState::Disabled);
        let before = ctl.snapshot().unwrap();
        let path = live(&ctl);

        let mut missing_module = before.clone();
        missing_module.enabled.remove("wavelet");
        assert!(matches!(
            ctl.restore(missing_module),
            Err(Error::InvalidSnapshot(_))
        ));

        assert_eq!(ctl.snapshot().unwrap(), before);
        assert_eq!(live(&ctl), path);
    }

    #[test]
    fn restore_forces_host_module_enabled() {
        let mut ctl = standard();
        let mut snapshot = ctl.snapshot().unwrap();
        snapshot.set_enabled("core", false);
        let warnings = ctl.restore(snapshot).unwrap();
        assert_eq!(warnings, vec![Warning::ProtectedModule("core".into())]);
        assert_eq!(ctl.snapshot().unwrap().is_enabled("core"), Some(true));
        assert_eq!(live(&ctl), baseline());
    }

    #[test]
    fn unknown_module_fails_before_any_mutation() {
        let mut ctl = standard();
        let err = ctl
            .set_state(
                &Selection::from_inputs(["aero", "signal"]),
                TargetState::Disabled,
                Permanence::Temporary,
            )
            .unwrap_err();
        assert!(matches!(err, Error::UnknownModule(ref name) if name == "signal"));
        assert!(ctl.store().load().unwrap().is_none());
        assert_eq!(live(&ctl), baseline());
    }

    #[test]
    fn empty_selection_is_an_argument_error() {
        let mut ctl = standard();
        let err = ctl.query(&Selection::Modules(Vec::new())).unwrap_err();
        assert!(matches!(err, Error::Argument(_)));
    }

    #[test]
    fn display_name_and_id_resolve_to_same_module() {
        let ctl = standard();
        let ids = ctl
            .resolve_names(&["Wavelet Toolbox".into(), "wavelet".into()])
            .unwrap();
        assert_eq!(ids, vec!["wavelet".to_string()]);
    }

    #[test]
    fn permanent_change_updates_startup_path() {
        let mut ctl = standard();
        ctl.set_state(
            &Selection::from_inputs(["aero"]),
            TargetState::Disabled,
            Permanence::Permanent,
        )
        .unwrap();
        assert_eq!(ctl.path_provider().startup.as_ref(), Some(&live(&ctl)));

        set(&mut ctl, &["aero"], TargetState::Enabled);
        assert_ne!(ctl.path_provider().startup.as_ref(), Some(&live(&ctl)));
    }

    #[test]
    fn handle_dispatches_queries() {
        let mut ctl = standard();
        let response = ctl
            .handle(Request::Query {
                selection: Selection::All,
                permanence: Some(Permanence::Permanent),
            })
            .unwrap();
        let Response::Snapshot {
            snapshot: state,
            warnings,
        } = response
        else {
            panic!("expected snapshot");
        };
        assert_eq!(warnings, vec![Warning::PermanenceIgnored]);
        assert_eq!(state.baseline_path, baseline());
        assert_eq!(state.enabled.len(), 3);

        let names = ctl.handle(Request::ListNames).unwrap();
        assert_eq!(
            names,
            Response::Names(vec![
                ("core".into(), "Host Core".into()),
                ("aero".into(), "Aerospace Toolbox".into()),
                ("wavelet".into(), "Wavelet Toolbox".into()),
            ])
        );

        let prior = ctl
            .handle(Request::SetState {
                selection: Selection::from_inputs(["aero"]),
                target: TargetState::Disabled,
                permanence: Permanence::Temporary,
            })
            .unwrap();
        let Response::Prior { snapshot, .. } = prior else {
            panic!("expected prior snapshot");
        };
        let restored = ctl.handle(Request::Restore { snapshot }).unwrap();
        assert_eq!(restored, Response::Restored { warnings: Vec::new() });
        assert_eq!(live(&ctl), baseline());
    }

    #[test]
    fn newly_installed_modules_start_enabled() {
        let mut ctl = standard();
        set(&mut ctl, &["aero"], TargetState::Disabled);

        let mut state = ctl.snapshot().unwrap();
        state.enabled.remove("wavelet");
        ctl.store = MemoryStateStore::with_state(state);

        let flags = ctl.query(&Selection::from_inputs(["wavelet", "aero"])).unwrap();
        assert!(flags["wavelet"]);
        assert!(!flags["aero"]);
        assert_eq!(
            ctl.store().load().unwrap().unwrap().is_enabled("wavelet"),
            Some(true)
        );
    }
}
