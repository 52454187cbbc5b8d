//! Pure search-path reconciliation.
//!
//! Disabling removes a module's entries from the live path in place.
//! Enabling never re-inserts entries into the live path: it rebuilds the
//! path from the baseline and filters out every module that is still
//! disabled, so the final order only depends on the baseline and the
//! current set of disabled modules, never on the toggle history.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Whether `entry` lives at or below `prefix`, compared component-wise.
pub fn is_under(entry: &Path, prefix: &Path) -> bool {
    entry.starts_with(prefix)
}

fn under_any(entry: &Path, dirs: &[PathBuf]) -> bool {
    dirs.iter().any(|dir| is_under(entry, dir))
}

/// Remove every entry located under one of `module_dirs`, keeping the
/// relative order of what remains.
pub fn disable(current_path: &[PathBuf], module_dirs: &[PathBuf]) -> Vec<PathBuf> {
    current_path
        .iter()
        .filter(|entry| !under_any(entry, module_dirs))
        .cloned()
        .collect()
}

/// Rebuild the path from `baseline_path`, leaving out entries owned by the
/// modules that remain disabled.
pub fn enable(baseline_path: &[PathBuf], excluded_dirs: &[PathBuf]) -> Vec<PathBuf> {
    disable(baseline_path, excluded_dirs)
}

/// Entries of the live path that the baseline never contained, in live
/// order and without repeats.
pub fn foreign_entries(current_path: &[PathBuf], baseline_path: &[PathBuf]) -> Vec<PathBuf> {
    let baseline: HashSet<&PathBuf> = baseline_path.iter().collect();
    let mut seen = HashSet::new();
    current_path
        .iter()
        .filter(|entry| !baseline.contains(entry) && seen.insert(*entry))
        .cloned()
        .collect()
}
