//! Dependency provider for module packages.

use std::collections::HashMap;
use std::fmt::Debug;
use std::fmt::Display;
use std::fmt::Formatter;

use modpkg_types::DependencyGroup;
use modpkg_types::ModuleId;
use modpkg_types::ModulePackage;
use resolvo::Candidates;
use resolvo::Condition;
use resolvo::ConditionId;
use resolvo::ConditionalRequirement;
use resolvo::Dependencies;
use resolvo::DependencyProvider;
use resolvo::HintDependenciesAvailable;
use resolvo::Interner;
use resolvo::KnownDependencies;
use resolvo::NameId;
use resolvo::Requirement;
use resolvo::SolvableId;
use resolvo::SolverCache;
use resolvo::StringId;
use resolvo::VersionSetId;
use resolvo::VersionSetUnionId;
use resolvo::utils::Pool;

use crate::StreamRecord;
use crate::StreamSpec;

/// Dependency provider for module stream resolution.
///
/// Implements the [`DependencyProvider`] trait for use with the [`resolvo`]
/// solver. Every module package becomes a solvable under its module name, so
/// the solver's one-solvable-per-name rule guarantees that at most one
/// build, and thereby at most one stream, of a module is selected.
pub struct ModuleProvider {
    /// Internalized data about the available module packages.
    pub(crate) pool: Pool<StreamSpec, String>,

    /// Cache of candidates per module name.
    pub(crate) records: HashMap<NameId, Candidates>,

    /// Dependency lookup.
    dependencies: HashMap<SolvableId, Vec<DependencyGroup>>,
}

impl ModuleProvider {
    /// Creates a new [`ModuleProvider`] over the given candidate packages.
    pub fn new<'a>(packages: impl IntoIterator<Item = &'a ModulePackage>) -> Self {
        let mut provider = Self {
            pool: Pool::default(),
            records: HashMap::new(),
            dependencies: HashMap::new(),
        };

        for package in packages {
            let name_id = provider
                .pool
                .intern_package_name(package.name.as_str().to_string());
            let solvable = provider
                .pool
                .intern_solvable(name_id, StreamRecord::from(package));
            provider
                .records
                .entry(name_id)
                .or_default()
                .candidates
                .push(solvable);
            provider
                .dependencies
                .insert(solvable, package.requires.clone());
        }

        // All candidates are populated upfront.
        for candidates in provider.records.values_mut() {
            candidates.hint_dependencies_available = HintDependenciesAvailable::All;
        }

        provider
    }

    /// Interns a stream requirement on a module name.
    pub(crate) fn requirement(&self, module: &str, spec: StreamSpec) -> VersionSetId {
        let name_id = self.pool.intern_package_name(module.to_string());
        self.pool.intern_version_set(name_id, spec)
    }

    /// Returns the preferred candidate of `module` matching `spec`, if any.
    pub(crate) fn best_candidate(&self, module: &str, spec: &StreamSpec) -> Option<SolvableId> {
        let name_id = self.pool.intern_package_name(module.to_string());
        let mut candidates: Vec<SolvableId> = self
            .records
            .get(&name_id)?
            .candidates
            .iter()
            .copied()
            .filter(|&solvable| spec.matches(&self.pool.resolve_solvable(solvable).record))
            .collect();
        sort_candidates(&self.pool, &mut candidates);
        candidates.first().copied()
    }

    /// Returns the container id of the package behind a solvable.
    pub(crate) fn module_id(&self, solvable: SolvableId) -> ModuleId {
        self.pool.resolve_solvable(solvable).record.id
    }
}

impl Interner for ModuleProvider {
    fn display_solvable(&self, solvable: SolvableId) -> impl Display + '_ {
        &self.pool.resolve_solvable(solvable).record
    }

    fn display_name(&self, name: NameId) -> impl Display + '_ {
        self.pool.resolve_package_name(name)
    }

    fn display_version_set(&self, version_set: VersionSetId) -> impl Display + '_ {
        self.pool.resolve_version_set(version_set)
    }

    fn display_string(&self, string_id: StringId) -> impl Display + '_ {
        self.pool.resolve_string(string_id)
    }

    fn version_set_name(&self, version_set: VersionSetId) -> NameId {
        self.pool.resolve_version_set_package_name(version_set)
    }

    fn solvable_name(&self, solvable: SolvableId) -> NameId {
        self.pool.resolve_solvable(solvable).name
    }

    fn version_sets_in_union(
        &self,
        version_set_union: VersionSetUnionId,
    ) -> impl Iterator<Item = VersionSetId> {
        self.pool.resolve_version_set_union(version_set_union)
    }

    fn resolve_condition(&self, condition: ConditionId) -> Condition {
        self.pool.resolve_condition(condition).clone()
    }
}

impl DependencyProvider for ModuleProvider {
    async fn filter_candidates(
        &self,
        candidates: &[SolvableId],
        version_set: VersionSetId,
        inverse: bool,
    ) -> Vec<SolvableId> {
        let spec = self.pool.resolve_version_set(version_set);
        candidates
            .iter()
            .copied()
            .filter(|&solvable| {
                spec.matches(&self.pool.resolve_solvable(solvable).record) ^ inverse
            })
            .collect()
    }

    async fn get_candidates(&self, name: NameId) -> Option<Candidates> {
        self.records.get(&name).cloned()
    }

    async fn sort_candidates(&self, _solver: &SolverCache<Self>, solvables: &mut [SolvableId]) {
        sort_candidates(&self.pool, solvables);
    }

    async fn get_dependencies(&self, solvable: SolvableId) -> Dependencies {
        let mut known_dependencies = KnownDependencies::default();

        let candidate = self.pool.resolve_solvable(solvable);
        let Some(groups) = self.dependencies.get(&solvable) else {
            let package_name = self.pool.resolve_package_name(candidate.name);
            let reason = self.pool.intern_string(format!(
                "failed to find dependencies for {package_name} - missing lookup entry",
            ));
            return Dependencies::Unknown(reason);
        };

        // Every dependency group is an independent requirement; its stream
        // alternatives are folded into a single version set.
        for group in groups {
            let dep_version_set = self.requirement(group.module(), StreamSpec::from_group(group));
            known_dependencies
                .requirements
                .push(ConditionalRequirement {
                    condition: None,
                    requirement: Requirement::Single(dep_version_set),
                });
        }

        // Lock the module to this candidate's stream: any other selected
        // build of the same module must belong to the same stream.
        let lock = self
            .pool
            .intern_version_set(candidate.name, StreamSpec::exact(&candidate.record.stream));
        known_dependencies.constrains.push(lock);

        Dependencies::Known(known_dependencies)
    }
}

impl Debug for ModuleProvider {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleProvider").finish_non_exhaustive()
    }
}

/// Core logic behind choosing the right candidate from a set.
///
/// Higher versions sort first; on a version tie the lexicographically
/// greater context wins when both candidates carry a static context.
pub(crate) fn sort_candidates(pool: &Pool<StreamSpec, String>, solvables: &mut [SolvableId]) {
    solvables.sort_by(|&a, &b| {
        let record_a = &pool.resolve_solvable(a).record;
        let record_b = &pool.resolve_solvable(b).record;
        record_b
            .version
            .cmp(&record_a.version)
            .then_with(|| match (record_a.static_context, record_b.static_context) {
                (true, true) => record_b.context.cmp(&record_a.context),
                _ => std::cmp::Ordering::Equal,
            })
    });
}
