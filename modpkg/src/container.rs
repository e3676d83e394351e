//! The module package container.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::collections::HashSet;
use std::fmt::Write as _;
use std::fs::read_dir;
use std::fs::read_to_string;
use std::path::PathBuf;
use std::str::FromStr;

use log::debug;
use log::warn;
use modpkg_solve::resolve_active;
use modpkg_state::StatePersistor;
use modpkg_types::DependencyGroup;
use modpkg_types::ModuleErrorType;
use modpkg_types::ModuleId;
use modpkg_types::ModuleName;
use modpkg_types::ModulePackage;
use modpkg_types::ModuleState;
use modpkg_types::Nsvcap;
use modpkg_types::Stream;

use crate::ContainerConfig;
use crate::Defaults;
use crate::Error;
use crate::defaults::merge_defaults;
use crate::failsafe::FailSafe;
use crate::loader::DefaultsDoc;
use crate::loader::ModuleDoc;
use crate::loader::ModuleDocument;
use crate::loader::ObsoletesDoc;
use crate::loader::parse_documents;
use crate::loader::to_yaml;
use crate::platform;

/// The repository id under which fail-safe snapshots are re-added.
const FAIL_SAFE_REPO_ID: &str = "@modulefailsafe";

/// The repository id of the synthesized platform module.
const SYSTEM_REPO_ID: &str = "@system";

/// A reference to a module.
///
/// Operations that act on a module accept either its identity or a package
/// already held by the container. Operations that act on the module as a
/// whole (disable, reset, uninstall) only use the name part of an identity.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ModuleRef<'a> {
    /// A module addressed by name and stream.
    Identity {
        /// The module name.
        name: &'a str,
        /// The stream of the module.
        stream: &'a str,
    },
    /// A module package already held by the container.
    Package(ModuleId),
}

/// A container of module packages.
///
/// Owns the loaded module metadata, the resolved defaults, the state
/// persistor and the set of active module packages computed by the last
/// successful resolution.
///
/// The container is single-threaded and non-reentrant. Mutations stage
/// against the persistor; [`ModuleContainer::save`] is the single atomic
/// publication point and [`ModuleContainer::rollback`] discards everything
/// staged since the last save.
#[derive(Debug)]
pub struct ModuleContainer {
    config: ContainerConfig,
    packages: Vec<ModulePackage>,
    /// Identity tuple to package id; first record of an identity wins.
    index: HashMap<(String, String, u64, String, String), ModuleId>,
    defaults_documents: Vec<DefaultsDoc>,
    defaults: Defaults,
    defaults_problems: Vec<String>,
    obsoletes: Vec<ObsoletesDoc>,
    persistor: StatePersistor,
    fail_safe: FailSafe,
    platform: Option<ModuleId>,
    active: HashSet<ModuleId>,
}

impl ModuleContainer {
    /// Creates a container, loading the persisted module state from the
    /// configured installation root.
    ///
    /// # Errors
    ///
    /// Returns an error if the persisted state cannot be read.
    pub fn new(config: ContainerConfig) -> Result<Self, Error> {
        let persistor = StatePersistor::load(config.state_dir(), config.max_stream_changes)?;
        let fail_safe = FailSafe::new(config.fail_safe_dir());
        Ok(Self {
            config,
            packages: Vec::new(),
            index: HashMap::new(),
            defaults_documents: Vec::new(),
            defaults: Defaults::default(),
            defaults_problems: Vec::new(),
            obsoletes: Vec::new(),
            persistor,
            fail_safe,
            platform: None,
            active: HashSet::new(),
        })
    }

    /// Adds all documents of a modulemd stream to the container.
    ///
    /// `modulemd` documents become module packages, `modulemd-defaults`
    /// documents feed the defaults store and `modulemd-obsoletes` documents
    /// the obsoletes list. Malformed documents are skipped with a warning.
    pub fn add(&mut self, content: &str, repo_id: &str) {
        for document in parse_documents(content) {
            match document {
                ModuleDocument::Module { version, data } => {
                    let yaml = to_yaml(&ModuleDocument::Module {
                        version,
                        data: data.clone(),
                    });
                    self.add_module(data, repo_id, yaml);
                }
                ModuleDocument::Defaults { data, .. } => self.defaults_documents.push(data),
                ModuleDocument::Obsoletes { data, .. } => self.obsoletes.push(data),
            }
        }
    }

    /// Adds one parsed modulemd payload as a module package.
    fn add_module(&mut self, doc: ModuleDoc, repo_id: &str, yaml: String) {
        let name = match ModuleName::from_str(&doc.name) {
            Ok(name) => name,
            Err(error) => {
                warn!("Skipping modulemd document: {error}");
                return;
            }
        };
        let stream = match Stream::from_str(&doc.stream.0) {
            Ok(stream) => stream,
            Err(error) => {
                warn!("Skipping modulemd document for '{name}': {error}");
                return;
            }
        };
        if !self.config.all_arch
            && !doc.arch.is_empty()
            && doc.arch != self.config.arch
            && doc.arch != "noarch"
        {
            debug!(
                "Skipping '{name}:{stream}': architecture '{}' does not match '{}'",
                doc.arch, self.config.arch
            );
            return;
        }

        let identity = (
            name.as_str().to_string(),
            stream.as_str().to_string(),
            doc.version,
            doc.context.clone(),
            doc.arch.clone(),
        );
        if self.index.contains_key(&identity) {
            debug!("Ignoring duplicate module package '{name}:{stream}:{}'", doc.version);
            return;
        }

        let requires: Vec<DependencyGroup> = doc
            .dependencies
            .iter()
            .flat_map(|block| {
                block.requires.iter().map(|(module, streams)| {
                    DependencyGroup::new(
                        module.clone(),
                        streams.iter().map(|stream| stream.0.clone()).collect(),
                    )
                })
            })
            .collect();

        let id = ModuleId(u32::try_from(self.packages.len()).unwrap_or(u32::MAX));
        let package = ModulePackage {
            id,
            name,
            stream,
            version: doc.version,
            context: doc.context,
            arch: doc.arch,
            static_context: doc.static_context,
            summary: doc.summary,
            profiles: doc
                .profiles
                .into_iter()
                .map(|(profile, payload)| (profile, payload.rpms.into_iter().collect()))
                .collect(),
            artifacts: doc.artifacts.rpms.into_iter().collect(),
            requires,
            repo_id: repo_id.to_string(),
            yaml,
        };
        self.index.insert(identity, id);
        self.packages.push(package);
    }

    /// Loads `modulemd-defaults` documents from the configured on-disk
    /// defaults directory.
    ///
    /// A missing directory is fine; only YAML files are considered.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or one of its files cannot be read.
    pub fn add_defaults_from_disk(&mut self) -> Result<(), Error> {
        let dir = self.config.defaults_dir();
        if !dir.is_dir() {
            return Ok(());
        }

        let mut paths = Vec::new();
        let entries = read_dir(&dir).map_err(|source| Error::IoPath {
            path: dir.clone(),
            context: "reading the module defaults directory",
            source,
        })?;
        for entry in entries {
            let entry = entry.map_err(|source| Error::IoPath {
                path: dir.clone(),
                context: "reading the module defaults directory",
                source,
            })?;
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "yaml" || ext == "yml") {
                paths.push(path);
            }
        }
        paths.sort();

        for path in paths {
            let content = read_to_string(&path).map_err(|source| Error::IoPath {
                path: path.clone(),
                context: "reading a module defaults file",
                source,
            })?;
            for document in parse_documents(&content) {
                match document {
                    ModuleDocument::Defaults { data, .. } => self.defaults_documents.push(data),
                    _ => warn!("Ignoring non-defaults document in {path:?}"),
                }
            }
        }
        Ok(())
    }

    /// Merges all collected default documents into the resolved defaults.
    ///
    /// Returns the recorded problems, one line per dropped conflicting
    /// default. The problems also feed the severity of
    /// [`ModuleContainer::resolve_active_module_packages`].
    pub fn resolve_defaults(&mut self) -> Vec<String> {
        let (defaults, problems) = merge_defaults(&self.defaults_documents);
        self.defaults = defaults;
        self.defaults_problems = problems.clone();
        problems
    }

    /// Returns the default stream of `module`, if one is configured.
    pub fn default_stream(&self, module: &str) -> Option<&str> {
        self.defaults.stream(module)
    }

    /// Returns the configured default profiles of `module` for `stream`.
    pub fn default_profiles(&self, module: &str, stream: &str) -> Vec<String> {
        self.defaults.profiles(module, stream)
    }

    /// Synthesizes the platform module of the managed installation.
    ///
    /// The identity is taken from `platform_override` (in `name:stream`
    /// form) or from the first parseable os-release file. At most one
    /// platform module may be added.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Conflict`] if a platform module is already present
    /// or the override is malformed, and [`Error::NoPlatformStream`] if no
    /// os-release file yields a stream.
    pub fn add_platform_package(
        &mut self,
        os_release_paths: &[PathBuf],
        platform_override: Option<&str>,
    ) -> Result<ModuleId, Error> {
        if self.platform.is_some() {
            return Err(Error::Conflict(
                "a platform module is already present".to_string(),
            ));
        }

        let (name, stream) = match platform_override {
            Some(spec) => spec
                .split_once(':')
                .filter(|(name, stream)| !name.is_empty() && !stream.is_empty())
                .map(|(name, stream)| (name.to_string(), stream.to_string()))
                .ok_or_else(|| {
                    Error::Conflict(format!(
                        "invalid platform module '{spec}', expected 'name:stream'"
                    ))
                })?,
            None => (
                platform::PLATFORM_NAME.to_string(),
                platform::platform_stream(os_release_paths)?.ok_or(Error::NoPlatformStream)?,
            ),
        };

        let doc = ModuleDoc {
            name: name.clone(),
            stream: crate::loader::Scalar(stream.clone()),
            static_context: true,
            ..ModuleDoc::default()
        };
        let yaml = to_yaml(&ModuleDocument::Module {
            version: 2,
            data: doc.clone(),
        });
        self.add_module(doc, SYSTEM_REPO_ID, yaml);

        let identity = (name, stream, 0, String::new(), String::new());
        let id = self
            .index
            .get(&identity)
            .copied()
            .ok_or_else(|| Error::Conflict("the platform module could not be created".to_string()))?;
        self.platform = Some(id);
        Ok(id)
    }

    /// Returns whether the container holds no module packages.
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Returns the number of module packages in the container.
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    /// Returns the module package with the given id.
    pub fn package(&self, id: ModuleId) -> Option<&ModulePackage> {
        self.packages.get(id.0 as usize)
    }

    /// Returns all module packages in insertion order.
    pub fn packages(&self) -> &[ModulePackage] {
        &self.packages
    }

    /// Queries module packages by a subject string.
    ///
    /// The subject follows the
    /// `name[:stream[:version[:context]]][::arch][/profile]` grammar; the
    /// profile part is ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the subject does not parse.
    pub fn query(&self, subject: &str) -> Result<Vec<&ModulePackage>, Error> {
        let nsvcap = Nsvcap::from_str(subject)?;
        Ok(self.query_nsvcap(&nsvcap))
    }

    /// Queries module packages by a parsed subject.
    ///
    /// The result preserves the insertion order of packages.
    pub fn query_nsvcap(&self, subject: &Nsvcap) -> Vec<&ModulePackage> {
        self.packages
            .iter()
            .filter(|package| subject.matches(package))
            .collect()
    }

    /// Queries module packages by explicit fields.
    ///
    /// Empty strings and `None` act as wildcards.
    pub fn query_fields(
        &self,
        name: &str,
        stream: &str,
        version: Option<u64>,
        context: &str,
        arch: &str,
    ) -> Vec<&ModulePackage> {
        self.packages
            .iter()
            .filter(|package| {
                (name.is_empty() || package.name.as_str() == name)
                    && (stream.is_empty() || package.stream.as_str() == stream)
                    && version.is_none_or(|version| package.version == version)
                    && (context.is_empty() || package.context == context)
                    && (arch.is_empty() || package.arch == arch)
            })
            .collect()
    }

    /// Enables a module stream.
    ///
    /// Returns whether the requested change really triggered a change in the
    /// persistor. When `count` is false the change does not count towards
    /// the limit of module state modifications.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoModule`] or [`Error::NoStream`] if the reference
    /// does not resolve, and the persistor's errors if a different stream is
    /// already enabled or the change budget is exhausted.
    pub fn enable(&mut self, module: ModuleRef<'_>, count: bool) -> Result<bool, Error> {
        let (name, stream) = self.resolve_identity(&module)?;
        Ok(self.persistor.enable(&name, &stream, count)?)
    }

    /// Unmarks a module from any stream.
    ///
    /// Installed profiles are cleared and show up as removed. When `count`
    /// is false the change does not count towards the limit of module state
    /// modifications.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoModule`] if the reference does not resolve, or the
    /// persistor's error if the change budget is exhausted.
    pub fn disable(&mut self, module: ModuleRef<'_>, count: bool) -> Result<bool, Error> {
        let name = self.resolve_name(&module)?;
        Ok(self.persistor.disable(&name, count)?)
    }

    /// Resets a module so it is neither enabled nor disabled.
    ///
    /// When `count` is false the change does not count towards the limit of
    /// module state modifications.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoModule`] if the reference does not resolve, or the
    /// persistor's error if the change budget is exhausted.
    pub fn reset(&mut self, module: ModuleRef<'_>, count: bool) -> Result<bool, Error> {
        let name = self.resolve_name(&module)?;
        Ok(self.persistor.reset(&name, count)?)
    }

    /// Adds a profile to a module stream, enabling the stream if necessary.
    ///
    /// Returns whether the profile was newly added.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoModule`] or [`Error::NoStream`] if the reference
    /// does not resolve, and the persistor's errors for illegal enablement.
    pub fn install(&mut self, module: ModuleRef<'_>, profile: &str) -> Result<bool, Error> {
        let (name, stream) = self.resolve_identity(&module)?;
        self.persistor.enable(&name, &stream, true)?;
        Ok(self.persistor.install_profile(&name, profile))
    }

    /// Removes a profile from a module.
    ///
    /// Returns whether the profile was present.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoModule`] if the reference does not resolve.
    pub fn uninstall(&mut self, module: ModuleRef<'_>, profile: &str) -> Result<bool, Error> {
        let name = self.resolve_name(&module)?;
        Ok(self.persistor.remove_profile(&name, profile))
    }

    /// Commits all staged module changes to storage.
    ///
    /// Fail-safe snapshots are brought up to date with the committed
    /// enablement in the same step.
    ///
    /// # Errors
    ///
    /// Returns an error if writing the state or the snapshots fails; the
    /// staged changes stay pending in that case.
    pub fn save(&mut self) -> Result<(), Error> {
        self.update_fail_safe_data()?;
        self.persistor.save()?;
        Ok(())
    }

    /// Discards all staged module changes and reverts to the committed
    /// state.
    pub fn rollback(&mut self) {
        self.persistor.rollback();
    }

    /// Returns whether there are staged changes to be saved.
    pub fn is_changed(&self) -> bool {
        self.persistor.is_changed()
    }

    /// Returns whether `stream` of `name` is enabled.
    pub fn is_enabled(&self, name: &str, stream: &str) -> bool {
        matches!(
            self.persistor.state(name),
            ModuleState::Enabled | ModuleState::Installed
        ) && self.persistor.stream(name) == stream
    }

    /// Returns whether the module `name` is disabled.
    pub fn is_disabled(&self, name: &str) -> bool {
        self.persistor.state(name) == ModuleState::Disabled
    }

    /// Returns the state of the module `name`.
    pub fn module_state(&self, name: &str) -> ModuleState {
        self.persistor.state(name)
    }

    /// Returns the enabled stream of the module `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoEnabledStream`] if no stream of the module is
    /// enabled.
    pub fn enabled_stream(&self, name: &str) -> Result<String, Error> {
        let entry = self.persistor.entry(name);
        if matches!(entry.state, ModuleState::Enabled | ModuleState::Installed) {
            Ok(entry.stream)
        } else {
            Err(Error::NoEnabledStream(name.to_string()))
        }
    }

    /// Returns the installed profiles of the module `name`.
    pub fn installed_profiles_of(&self, name: &str) -> Vec<String> {
        self.persistor.profiles(name).into_iter().collect()
    }

    /// Returns the module streams that become enabled by the staged changes.
    pub fn enabled_streams(&self) -> BTreeMap<String, String> {
        self.persistor.enabled_streams()
    }

    /// Returns the modules that become disabled by the staged changes.
    pub fn disabled_modules(&self) -> Vec<String> {
        self.persistor.disabled_modules()
    }

    /// Returns the modules that become reset by the staged changes.
    pub fn reset_modules(&self) -> Vec<String> {
        self.persistor.reset_modules()
    }

    /// Returns the modules whose stream is switched by the staged changes,
    /// as `name -> (old, new)`.
    pub fn switched_streams(&self) -> BTreeMap<String, (String, String)> {
        self.persistor.switched_streams()
    }

    /// Returns the profiles that become installed by the staged changes.
    pub fn installed_profiles(&self) -> BTreeMap<String, Vec<String>> {
        self.persistor.installed_profiles()
    }

    /// Returns the profiles that become removed by the staged changes.
    pub fn removed_profiles(&self) -> BTreeMap<String, Vec<String>> {
        self.persistor.removed_profiles()
    }

    /// Renders a human-readable report of all staged module changes.
    pub fn report(&self) -> String {
        let mut report = String::new();

        let enabled = self.enabled_streams();
        if !enabled.is_empty() {
            report.push_str("Module Enabling:\n");
            for (name, stream) in enabled {
                let _ = writeln!(report, "    {name}:{stream}");
            }
        }
        let switched = self.switched_streams();
        if !switched.is_empty() {
            report.push_str("Module Switching Streams:\n");
            for (name, (old, new)) in switched {
                let _ = writeln!(report, "    {name}:{old} -> {name}:{new}");
            }
        }
        let disabled = self.disabled_modules();
        if !disabled.is_empty() {
            report.push_str("Module Disabling:\n");
            for name in disabled {
                let _ = writeln!(report, "    {name}");
            }
        }
        let reset = self.reset_modules();
        if !reset.is_empty() {
            report.push_str("Module Resetting:\n");
            for name in reset {
                let _ = writeln!(report, "    {name}");
            }
        }
        let installed = self.installed_profiles();
        if !installed.is_empty() {
            report.push_str("Module Installing Profiles:\n");
            for (name, profiles) in installed {
                let _ = writeln!(report, "    {name}/{}", profiles.join(", "));
            }
        }
        let removed = self.removed_profiles();
        if !removed.is_empty() {
            report.push_str("Module Removing Profiles:\n");
            for (name, profiles) in removed {
                let _ = writeln!(report, "    {name}/{}", profiles.join(", "));
            }
        }
        report
    }

    /// Returns the names of all packages installed through module profiles.
    pub fn installed_pkg_names(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        for module in self.persistor.module_names() {
            let entry = self.persistor.entry(&module);
            if entry.profiles.is_empty() || !entry.state.has_stream() {
                continue;
            }
            let candidates = self.query_fields(&module, &entry.stream, None, "", "");
            for package in modpkg_types::latest_modules(&candidates) {
                for profile in &entry.profiles {
                    if let Some(rpms) = package.profile_packages(profile) {
                        names.extend(rpms.iter().cloned());
                    }
                }
            }
        }
        names
    }

    /// Returns the module packages whose artifacts intersect `packages` and
    /// whose stream is not enabled.
    ///
    /// These are the modules a caller must enable before installing the
    /// given RPMs.
    pub fn requires_module_enablement(
        &self,
        packages: &BTreeSet<String>,
    ) -> Vec<&ModulePackage> {
        self.packages
            .iter()
            .filter(|package| {
                !self.is_enabled(package.name.as_str(), package.stream.as_str())
                    && package
                        .artifacts
                        .iter()
                        .any(|artifact| packages.contains(artifact))
            })
            .collect()
    }

    /// Enables the dependency tree of the given seed packages.
    ///
    /// Walks the runtime requirements of the seeds, picking for every
    /// dependency its explicitly requested stream, an already enabled
    /// stream, or the configured default stream, and enables every traversed
    /// stream without counting towards the change budget.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoDefaultStream`] if a dependency has no stream to
    /// follow, [`Error::NoStream`] if the chosen stream has no packages, and
    /// the persistor's errors for illegal enablement.
    pub fn enable_dependency_tree(&mut self, seeds: &[ModuleId]) -> Result<(), Error> {
        let platform_name = self.platform_name();
        let mut queue: Vec<ModuleId> = seeds.to_vec();
        let mut visited: BTreeSet<(String, String)> = BTreeSet::new();

        while let Some(id) = queue.pop() {
            let package = self
                .package(id)
                .ok_or_else(|| Error::NoModule(format!("id {id}")))?
                .clone();
            let (name, stream) = package.name_stream();
            if !visited.insert((name.clone(), stream.clone())) {
                continue;
            }
            self.persistor.enable(&name, &stream, false)?;

            for group in &package.requires {
                let module = group.module().to_string();
                if Some(module.as_str()) == platform_name.as_deref() {
                    continue;
                }
                let dep_stream = if let Some(stream) = group.requested_stream() {
                    stream.to_string()
                } else if self.persistor.state(&module).has_stream() {
                    self.persistor.stream(&module)
                } else if let Some(stream) = self.defaults.stream(&module) {
                    stream.to_string()
                } else {
                    return Err(Error::NoDefaultStream(module));
                };

                let candidates = self.query_fields(&module, &dep_stream, None, "", "");
                let latest = candidates
                    .into_iter()
                    .reduce(|best, candidate| {
                        if best.latest_before(candidate) {
                            candidate
                        } else {
                            best
                        }
                    })
                    .ok_or_else(|| Error::NoStream {
                        module: module.clone(),
                        stream: dep_stream.clone(),
                    })?;
                queue.push(latest.id);
            }
        }
        Ok(())
    }

    /// Resolves the set of active module packages.
    ///
    /// The effective enablement is composed from the persistor (enabled and
    /// installed modules at their stream, disabled modules excluded) and the
    /// resolved defaults. The outcome of the solver is classified; defaults
    /// conflicts recorded by [`ModuleContainer::resolve_defaults`] raise the
    /// severity to at least [`ModuleErrorType::ErrorInDefaults`].
    ///
    /// Never fails: problems are returned, grouped per failed solver pass,
    /// together with the worst severity observed.
    pub fn resolve_active_module_packages(
        &mut self,
        debug_solver: bool,
    ) -> (Vec<Vec<String>>, ModuleErrorType) {
        let mut strict: Vec<(String, String)> = Vec::new();
        let mut favored: Vec<(String, String)> = Vec::new();
        let mut excluded: BTreeSet<String> = BTreeSet::new();
        let mut seen: BTreeSet<String> = BTreeSet::new();

        for package in &self.packages {
            let name = package.name.as_str();
            if !seen.insert(name.to_string()) {
                continue;
            }
            match self.persistor.state(name) {
                ModuleState::Disabled => {
                    excluded.insert(name.to_string());
                }
                ModuleState::Enabled | ModuleState::Installed => {
                    strict.push((name.to_string(), self.persistor.stream(name)));
                }
                ModuleState::Default | ModuleState::Unknown => {
                    if let Some(stream) = self.defaults.stream(name) {
                        favored.push((name.to_string(), stream.to_string()));
                    }
                }
            }
        }
        // The platform module is always part of the solution.
        if let Some(platform) = self.platform.and_then(|id| self.package(id)) {
            let pair = platform.name_stream();
            if !strict.contains(&pair) {
                strict.push(pair);
            }
        }

        let candidates: Vec<&ModulePackage> = self
            .packages
            .iter()
            .filter(|package| !excluded.contains(package.name.as_str()))
            .collect();
        let resolution = resolve_active(
            &candidates,
            &strict,
            &favored,
            debug_solver || self.config.debug_solver,
        );

        // Expand the chosen builds to every package of the same
        // name, stream and version; co-latest contexts are all active.
        let chosen: BTreeSet<(&str, &str, u64)> = resolution
            .active
            .iter()
            .filter_map(|id| self.package(*id))
            .map(|package| {
                (
                    package.name.as_str(),
                    package.stream.as_str(),
                    package.version,
                )
            })
            .collect();
        self.active = self
            .packages
            .iter()
            .filter(|package| {
                chosen.contains(&(
                    package.name.as_str(),
                    package.stream.as_str(),
                    package.version,
                ))
            })
            .map(|package| package.id)
            .collect();

        let mut problems = resolution.problems;
        let mut error = resolution.error;
        if !self.defaults_problems.is_empty() {
            problems.push(self.defaults_problems.clone());
            error = error.max(ModuleErrorType::ErrorInDefaults);
        }
        (problems, error)
    }

    /// Returns whether a module was part of the last successful resolution.
    pub fn is_module_active(&self, module: ModuleRef<'_>) -> bool {
        match module {
            ModuleRef::Package(id) => self.active.contains(&id),
            ModuleRef::Identity { name, stream } => self.packages.iter().any(|package| {
                self.active.contains(&package.id)
                    && package.name.as_str() == name
                    && package.stream.as_str() == stream
            }),
        }
    }

    /// Returns the latest module packages of `packages`, optionally
    /// restricted to active ones.
    pub fn latest_modules<'a>(
        &self,
        packages: &[&'a ModulePackage],
        active_only: bool,
    ) -> Vec<&'a ModulePackage> {
        let latest = modpkg_types::latest_modules(packages);
        if active_only {
            latest
                .into_iter()
                .filter(|package| self.active.contains(&package.id))
                .collect()
        } else {
            latest
        }
    }

    /// Returns the single latest module package of `packages`, optionally
    /// restricted to active ones.
    pub fn latest_module<'a>(
        &self,
        packages: &[&'a ModulePackage],
        active_only: bool,
    ) -> Option<&'a ModulePackage> {
        self.latest_modules(packages, active_only)
            .into_iter()
            .reduce(|best, candidate| {
                if best.latest_before(candidate) {
                    candidate
                } else {
                    best
                }
            })
    }

    /// Groups the latest versions of `packages` per repository and module
    /// name.
    ///
    /// The outermost dimension follows the order in which repositories are
    /// first seen; the module dimension follows the order of first
    /// occurrence within the repository. `filter` restricts the result to
    /// modules in the given state.
    pub fn latest_modules_per_repo<'a>(
        &self,
        filter: Option<ModuleState>,
        packages: &[&'a ModulePackage],
    ) -> Vec<Vec<Vec<&'a ModulePackage>>> {
        let filtered: Vec<&ModulePackage> = packages
            .iter()
            .copied()
            .filter(|package| {
                filter.is_none_or(|state| self.persistor.state(package.name.as_str()) == state)
            })
            .collect();
        let latest = modpkg_types::latest_modules(&filtered);

        let mut result: Vec<Vec<Vec<&ModulePackage>>> = Vec::new();
        let mut repo_index: HashMap<&str, usize> = HashMap::new();
        let mut name_index: HashMap<(usize, &str), usize> = HashMap::new();
        for package in latest {
            let next_repo = result.len();
            let repo_pos = *repo_index
                .entry(package.repo_id.as_str())
                .or_insert(next_repo);
            if repo_pos == result.len() {
                result.push(Vec::new());
            }
            let next_name = result[repo_pos].len();
            let name_pos = *name_index
                .entry((repo_pos, package.name.as_str()))
                .or_insert(next_name);
            if name_pos == result[repo_pos].len() {
                result[repo_pos].push(Vec::new());
            }
            result[repo_pos][name_pos].push(package);
        }
        result
    }

    /// Applies the collected obsoletes to the persisted module state.
    ///
    /// Enabled or installed streams named as obsoleted are switched to their
    /// successor stream, preserving installed profiles. The rewrite is
    /// system-initiated and does not count towards the change budget; it
    /// shows up in [`ModuleContainer::switched_streams`]. Obsoletes whose
    /// successor stream is not loadable are skipped.
    ///
    /// # Errors
    ///
    /// Returns the persistor's errors if a cross-module successor cannot be
    /// enabled.
    pub fn apply_obsoletes(&mut self) -> Result<(), Error> {
        let obsoletes = self.obsoletes.clone();
        for obsolete in &obsoletes {
            let Some(successor) = &obsolete.obsoleted_by else {
                continue;
            };
            let entry = self.persistor.entry(&obsolete.module);
            if !matches!(entry.state, ModuleState::Enabled | ModuleState::Installed)
                || entry.stream != obsolete.stream.0
            {
                continue;
            }
            if self
                .query_fields(&successor.module, &successor.stream.0, None, "", "")
                .is_empty()
            {
                debug!(
                    "Skipping obsolete of '{}:{}': successor '{}:{}' is not available",
                    obsolete.module, obsolete.stream, successor.module, successor.stream
                );
                continue;
            }

            if successor.module == obsolete.module {
                if self
                    .persistor
                    .switch_stream(&obsolete.module, &successor.stream.0)
                {
                    debug!(
                        "Switched '{}' from stream '{}' to '{}'",
                        obsolete.module, obsolete.stream, successor.stream
                    );
                }
            } else {
                let profiles = entry.profiles.clone();
                self.persistor.reset(&obsolete.module, false)?;
                self.persistor
                    .enable(&successor.module, &successor.stream.0, false)?;
                for profile in profiles {
                    self.persistor.install_profile(&successor.module, &profile);
                }
            }
        }
        Ok(())
    }

    /// Loads fail-safe snapshots for enabled streams that have no packages
    /// in the container.
    ///
    /// This keeps enabled module state resolvable when the repositories that
    /// provided the metadata are unavailable.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot directory cannot be read.
    pub fn load_fail_safe_data(&mut self) -> Result<(), Error> {
        for (name, stream, content) in self.fail_safe.load()? {
            let entry = self.persistor.entry(&name);
            if !matches!(entry.state, ModuleState::Enabled | ModuleState::Installed)
                || entry.stream != stream
            {
                continue;
            }
            if !self.query_fields(&name, &stream, None, "", "").is_empty() {
                continue;
            }
            self.add(&content, FAIL_SAFE_REPO_ID);
        }
        Ok(())
    }

    /// Brings the fail-safe snapshots in line with the staged enablement.
    ///
    /// Snapshots are written for enabled streams with loaded metadata and
    /// stale snapshots are removed. Enabled streams without loaded metadata
    /// keep their existing snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if a snapshot cannot be written or removed.
    pub fn update_fail_safe_data(&self) -> Result<(), Error> {
        let mut keep: BTreeMap<String, String> = BTreeMap::new();
        for name in self.persistor.module_names() {
            let entry = self.persistor.entry(&name);
            if matches!(entry.state, ModuleState::Enabled | ModuleState::Installed)
                && !entry.stream.is_empty()
            {
                keep.insert(name, entry.stream);
            }
        }

        for (name, stream) in &keep {
            let mut snapshot = String::new();
            for package in self.query_fields(name, stream, None, "", "") {
                if package.yaml.is_empty() {
                    continue;
                }
                snapshot.push_str("---\n");
                snapshot.push_str(&package.yaml);
            }
            if snapshot.is_empty() {
                continue;
            }
            self.fail_safe.write(name, stream, &snapshot)?;
        }
        self.fail_safe.prune(&keep)
    }

    /// Resolves a module reference to its name and stream.
    fn resolve_identity(&self, module: &ModuleRef<'_>) -> Result<(String, String), Error> {
        match module {
            ModuleRef::Identity { name, stream } => {
                let with_name = self.query_fields(name, "", None, "", "");
                if with_name.is_empty() {
                    return Err(Error::NoModule((*name).to_string()));
                }
                if !with_name
                    .iter()
                    .any(|package| package.stream.as_str() == *stream)
                {
                    return Err(Error::NoStream {
                        module: (*name).to_string(),
                        stream: (*stream).to_string(),
                    });
                }
                Ok(((*name).to_string(), (*stream).to_string()))
            }
            ModuleRef::Package(id) => {
                let package = self
                    .package(*id)
                    .ok_or_else(|| Error::NoModule(format!("id {id}")))?;
                Ok(package.name_stream())
            }
        }
    }

    /// Resolves a module reference to its name, ignoring the stream part.
    fn resolve_name(&self, module: &ModuleRef<'_>) -> Result<String, Error> {
        match module {
            ModuleRef::Identity { name, .. } => {
                if self.query_fields(name, "", None, "", "").is_empty() {
                    return Err(Error::NoModule((*name).to_string()));
                }
                Ok((*name).to_string())
            }
            ModuleRef::Package(id) => Ok(self
                .package(*id)
                .ok_or_else(|| Error::NoModule(format!("id {id}")))?
                .name
                .as_str()
                .to_string()),
        }
    }

    /// Returns the module name of the synthesized platform package, if any.
    fn platform_name(&self) -> Option<String> {
        self.platform
            .and_then(|id| self.package(id))
            .map(|package| package.name.as_str().to_string())
    }
}
