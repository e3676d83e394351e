//! The transactional module state persistor.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fs::File;
use std::fs::create_dir_all;
use std::fs::read_dir;
use std::fs::read_to_string;
use std::fs::remove_dir_all;
use std::fs::rename;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::str::FromStr;

use log::warn;
use modpkg_types::ModuleState;

use crate::Error;
use crate::StateEntry;
use crate::StateFile;

/// The file name extension of module state files.
const STATE_FILE_SUFFIX: &str = ".modulemd";

/// Transactional per-module state storage.
///
/// All reads and writes go through a staging copy of the committed state.
/// [`StatePersistor::save`] atomically publishes the staging layer to disk
/// and makes it the committed state; [`StatePersistor::rollback`] discards
/// it. Either the previous or the new on-disk tree is visible after a crash,
/// never a mix.
#[derive(Debug)]
pub struct StatePersistor {
    state_dir: PathBuf,
    committed: BTreeMap<String, StateEntry>,
    staging: BTreeMap<String, StateEntry>,
    /// Counted stream changes per module within the running transaction.
    change_counts: BTreeMap<String, u32>,
    max_stream_changes: u32,
}

impl StatePersistor {
    /// Loads the persistor from `state_dir`.
    ///
    /// A missing directory is treated as empty state. Files without the
    /// state file suffix are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or one of its files cannot be read,
    /// or if a state file does not parse.
    pub fn load(state_dir: impl Into<PathBuf>, max_stream_changes: u32) -> Result<Self, Error> {
        let state_dir = state_dir.into();
        let mut committed = BTreeMap::new();

        if state_dir.is_dir() {
            let mut paths = Vec::new();
            let entries = read_dir(&state_dir).map_err(|source| Error::IoPath {
                path: state_dir.clone(),
                context: "reading the module state directory",
                source,
            })?;
            for entry in entries {
                let entry = entry.map_err(|source| Error::IoPath {
                    path: state_dir.clone(),
                    context: "reading the module state directory",
                    source,
                })?;
                paths.push(entry.path());
            }
            paths.sort();

            for path in paths {
                let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
                    continue;
                };
                if !file_name.ends_with(STATE_FILE_SUFFIX) {
                    continue;
                }
                let content = read_to_string(&path).map_err(|source| Error::IoPath {
                    path: path.clone(),
                    context: "reading a module state file",
                    source,
                })?;
                let file = StateFile::from_str(&content).map_err(|err| match err {
                    Error::ParseError { message, .. } => Error::ParseError {
                        path: path.clone(),
                        message,
                    },
                    other => other,
                })?;
                if committed.insert(file.name.clone(), file.entry).is_some() {
                    warn!("Duplicate state entry for module '{}'", file.name);
                }
            }
        }

        Ok(Self {
            state_dir,
            staging: committed.clone(),
            committed,
            change_counts: BTreeMap::new(),
            max_stream_changes,
        })
    }

    /// Returns the staged entry of a module, or a pristine one.
    pub fn entry(&self, name: &str) -> StateEntry {
        self.staging.get(name).cloned().unwrap_or_default()
    }

    /// Returns the staged state of a module.
    pub fn state(&self, name: &str) -> ModuleState {
        self.staging
            .get(name)
            .map(|entry| entry.state)
            .unwrap_or_default()
    }

    /// Returns the staged stream of a module, or an empty string.
    pub fn stream(&self, name: &str) -> String {
        self.staging
            .get(name)
            .map(|entry| entry.stream.clone())
            .unwrap_or_default()
    }

    /// Returns the staged installed profiles of a module.
    pub fn profiles(&self, name: &str) -> BTreeSet<String> {
        self.staging
            .get(name)
            .map(|entry| entry.profiles.clone())
            .unwrap_or_default()
    }

    /// Returns the names of all modules with a committed or staged entry.
    pub fn module_names(&self) -> Vec<String> {
        let names: BTreeSet<&String> =
            self.committed.keys().chain(self.staging.keys()).collect();
        names.into_iter().cloned().collect()
    }

    /// Consumes one unit of the stream change budget of a module.
    ///
    /// Called before an effective change is applied, so failing leaves the
    /// staging layer untouched.
    fn count_stream_change(&mut self, name: &str, count: bool) -> Result<(), Error> {
        if !count {
            return Ok(());
        }
        let counter = self.change_counts.entry(name.to_string()).or_default();
        if *counter >= self.max_stream_changes {
            return Err(Error::ModifyLimitExceeded {
                module: name.to_string(),
                limit: self.max_stream_changes,
            });
        }
        *counter += 1;
        Ok(())
    }

    /// Enables `stream` for the module `name`.
    ///
    /// Returns whether the requested change really triggered a change in the
    /// staged state. When `count` is false the change does not count towards
    /// the limit of module state modifications.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EnableMultipleStreams`] if a different stream is
    /// already enabled, or [`Error::ModifyLimitExceeded`] if the change
    /// budget is exhausted. The staged state is unchanged on error.
    pub fn enable(&mut self, name: &str, stream: &str, count: bool) -> Result<bool, Error> {
        let mut entry = self.entry(name);
        if matches!(entry.state, ModuleState::Enabled | ModuleState::Installed) {
            if entry.stream == stream {
                return Ok(false);
            }
            return Err(Error::EnableMultipleStreams {
                module: name.to_string(),
            });
        }

        self.count_stream_change(name, count)?;
        entry.state = ModuleState::Enabled;
        entry.stream = stream.to_string();
        if count {
            entry.stream_changed_by_user = true;
        }
        self.staging.insert(name.to_string(), entry);
        Ok(true)
    }

    /// Disables the module `name`, clearing its stream and profiles.
    ///
    /// Returns whether the staged state changed. When `count` is false the
    /// change does not count towards the limit of module state modifications.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ModifyLimitExceeded`] if the change budget is
    /// exhausted. The staged state is unchanged on error.
    pub fn disable(&mut self, name: &str, count: bool) -> Result<bool, Error> {
        let entry = self.entry(name);
        if entry.state == ModuleState::Disabled {
            return Ok(false);
        }

        self.count_stream_change(name, count)?;
        self.staging.insert(
            name.to_string(),
            StateEntry {
                state: ModuleState::Disabled,
                stream: String::new(),
                profiles: BTreeSet::new(),
                stream_changed_by_user: entry.stream_changed_by_user || count,
            },
        );
        Ok(true)
    }

    /// Resets the module `name` so it is neither enabled nor disabled.
    ///
    /// Returns whether the staged state changed. When `count` is false the
    /// change does not count towards the limit of module state modifications.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ModifyLimitExceeded`] if the change budget is
    /// exhausted. The staged state is unchanged on error.
    pub fn reset(&mut self, name: &str, count: bool) -> Result<bool, Error> {
        let entry = self.entry(name);
        if entry.state == ModuleState::Unknown {
            return Ok(false);
        }

        self.count_stream_change(name, count)?;
        self.staging.insert(
            name.to_string(),
            StateEntry {
                stream_changed_by_user: entry.stream_changed_by_user,
                ..StateEntry::default()
            },
        );
        Ok(true)
    }

    /// Marks the module `name` as following its default stream.
    ///
    /// Does not count towards the change budget; following a default is not
    /// a user decision.
    pub fn set_default(&mut self, name: &str, stream: &str) -> bool {
        let mut entry = self.entry(name);
        if entry.state != ModuleState::Unknown {
            return false;
        }
        entry.state = ModuleState::Default;
        entry.stream = stream.to_string();
        self.staging.insert(name.to_string(), entry);
        true
    }

    /// Rewrites the stream of an enabled module in place, keeping profiles.
    ///
    /// Used for system-initiated stream rewrites (obsoletes). Bypasses the
    /// multiple-streams rule and the change budget; the rewrite is visible
    /// in [`StatePersistor::switched_streams`].
    pub fn switch_stream(&mut self, name: &str, stream: &str) -> bool {
        let mut entry = self.entry(name);
        if !entry.state.has_stream() || entry.stream == stream {
            return false;
        }
        entry.stream = stream.to_string();
        self.staging.insert(name.to_string(), entry);
        true
    }

    /// Adds an installed profile to the module `name`.
    ///
    /// The first installed profile moves an enabled module to
    /// [`ModuleState::Installed`]. Returns whether the profile was newly
    /// added.
    pub fn install_profile(&mut self, name: &str, profile: &str) -> bool {
        let mut entry = self.entry(name);
        if !entry.profiles.insert(profile.to_string()) {
            return false;
        }
        if entry.state == ModuleState::Enabled || entry.state == ModuleState::Default {
            entry.state = ModuleState::Installed;
        }
        self.staging.insert(name.to_string(), entry);
        true
    }

    /// Removes an installed profile from the module `name`.
    ///
    /// Returns whether the profile was present.
    pub fn remove_profile(&mut self, name: &str, profile: &str) -> bool {
        let mut entry = self.entry(name);
        if !entry.profiles.remove(profile) {
            return false;
        }
        self.staging.insert(name.to_string(), entry);
        true
    }

    /// Returns whether there are staged changes that are not committed yet.
    pub fn is_changed(&self) -> bool {
        self.staging != self.committed
    }

    /// Discards all staged changes and reverts to the committed state.
    pub fn rollback(&mut self) {
        self.staging = self.committed.clone();
        self.change_counts.clear();
    }

    /// Commits the staged state to disk.
    ///
    /// The new state is written to a sibling temp directory first, fsynced,
    /// and then swapped into place by rename, so a crash leaves either the
    /// previous or the new tree visible.
    ///
    /// # Errors
    ///
    /// Returns an error if any file or directory operation fails. On error
    /// the staged state stays pending and can be retried or rolled back.
    pub fn save(&mut self) -> Result<(), Error> {
        let temp_dir = sibling_path(&self.state_dir, ".tmp");
        let old_dir = sibling_path(&self.state_dir, ".old");

        for stale in [&temp_dir, &old_dir] {
            if stale.exists() {
                remove_dir_all(stale).map_err(|source| Error::IoPath {
                    path: stale.clone(),
                    context: "removing a stale state directory",
                    source,
                })?;
            }
        }
        create_dir_all(&temp_dir).map_err(|source| Error::IoPath {
            path: temp_dir.clone(),
            context: "creating the module state directory",
            source,
        })?;

        for (name, entry) in &self.staging {
            let file = StateFile {
                name: name.clone(),
                entry: entry.clone(),
            };
            let path = temp_dir.join(format!("{name}{STATE_FILE_SUFFIX}"));
            let mut output = File::create(&path).map_err(|source| Error::IoPath {
                path: path.clone(),
                context: "creating a module state file",
                source,
            })?;
            write!(output, "{file}").map_err(|source| Error::IoPath {
                path: path.clone(),
                context: "writing a module state file",
                source,
            })?;
            output.sync_all().map_err(|source| Error::IoPath {
                path: path.clone(),
                context: "syncing a module state file",
                source,
            })?;
        }

        if self.state_dir.exists() {
            rename(&self.state_dir, &old_dir).map_err(|source| Error::IoPath {
                path: self.state_dir.clone(),
                context: "moving the previous module state aside",
                source,
            })?;
        }
        rename(&temp_dir, &self.state_dir).map_err(|source| Error::IoPath {
            path: temp_dir.clone(),
            context: "publishing the new module state",
            source,
        })?;
        if old_dir.exists() {
            remove_dir_all(&old_dir).map_err(|source| Error::IoPath {
                path: old_dir,
                context: "removing the previous module state",
                source,
            })?;
        }

        self.committed = self.staging.clone();
        self.change_counts.clear();
        Ok(())
    }

    /// Returns the modules whose stream becomes enabled by the staged
    /// changes, with their stream.
    pub fn enabled_streams(&self) -> BTreeMap<String, String> {
        self.diff(|committed, staged| {
            if !staged.state.has_stream() || staged.stream.is_empty() {
                return None;
            }
            if committed.state.has_stream() && committed.stream == staged.stream {
                return None;
            }
            Some(staged.stream.clone())
        })
    }

    /// Returns the modules that become disabled by the staged changes.
    pub fn disabled_modules(&self) -> Vec<String> {
        self.diff(|committed, staged| {
            (staged.state == ModuleState::Disabled && committed.state != ModuleState::Disabled)
                .then_some(())
        })
        .into_keys()
        .collect()
    }

    /// Returns the modules that become reset by the staged changes.
    pub fn reset_modules(&self) -> Vec<String> {
        self.diff(|committed, staged| {
            (staged.state == ModuleState::Unknown && committed.state != ModuleState::Unknown)
                .then_some(())
        })
        .into_keys()
        .collect()
    }

    /// Returns the modules whose stream is switched between two non-empty
    /// streams by the staged changes, as `name -> (old, new)`.
    pub fn switched_streams(&self) -> BTreeMap<String, (String, String)> {
        self.diff(|committed, staged| {
            (!committed.stream.is_empty()
                && !staged.stream.is_empty()
                && committed.stream != staged.stream)
                .then(|| (committed.stream.clone(), staged.stream.clone()))
        })
    }

    /// Returns the profiles that become installed by the staged changes.
    pub fn installed_profiles(&self) -> BTreeMap<String, Vec<String>> {
        self.diff(|committed, staged| {
            let added: Vec<String> = staged
                .profiles
                .difference(&committed.profiles)
                .cloned()
                .collect();
            (!added.is_empty()).then_some(added)
        })
    }

    /// Returns the profiles that become removed by the staged changes.
    pub fn removed_profiles(&self) -> BTreeMap<String, Vec<String>> {
        self.diff(|committed, staged| {
            let removed: Vec<String> = committed
                .profiles
                .difference(&staged.profiles)
                .cloned()
                .collect();
            (!removed.is_empty()).then_some(removed)
        })
    }

    /// Applies `diff` to the committed and staged entry of every known
    /// module and collects the produced values.
    fn diff<T>(&self, diff: impl Fn(&StateEntry, &StateEntry) -> Option<T>) -> BTreeMap<String, T> {
        let pristine = StateEntry::default();
        self.module_names()
            .into_iter()
            .filter_map(|name| {
                let committed = self.committed.get(&name).unwrap_or(&pristine);
                let staged = self.staging.get(&name).unwrap_or(&pristine);
                diff(committed, staged).map(|value| (name, value))
            })
            .collect()
    }
}

/// Returns `path` with `suffix` appended to its file name.
fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "state".to_string());
    name.push_str(suffix);
    path.with_file_name(name)
}
