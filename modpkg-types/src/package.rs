//! Module package records.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt::Display;
use std::fmt::Formatter;

use crate::DependencyGroup;
use crate::ModuleName;
use crate::Stream;

/// The identifier of a module package inside a container.
///
/// Identifiers are assigned monotonically in insertion order and double as
/// the solver's solvable identity.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ModuleId(
    /// The raw numeric identifier.
    pub u32,
);

impl Display for ModuleId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One module build: an immutable record of its identity, content and
/// dependencies.
///
/// The identity tuple `(name, stream, version, context, arch)` is unique
/// within a container. Records are never mutated after construction.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ModulePackage {
    /// The container-assigned identifier of this record.
    pub id: ModuleId,
    /// The name of the module.
    pub name: ModuleName,
    /// The stream this build belongs to.
    pub stream: Stream,
    /// The version of the build, ordered numerically.
    pub version: u64,
    /// The build context; may be empty.
    pub context: String,
    /// The architecture tag of the build.
    pub arch: String,
    /// Whether the context was assigned statically by the repository.
    ///
    /// Static contexts take part in latest-version tie breaking and must not
    /// be rewritten by the resolver.
    pub static_context: bool,
    /// A one-line summary of the module.
    pub summary: String,
    /// Profiles: named package subsets suitable for an installation role.
    pub profiles: BTreeMap<String, BTreeSet<String>>,
    /// The RPM NEVRAs provided by this build.
    pub artifacts: BTreeSet<String>,
    /// Runtime dependencies on other module streams.
    pub requires: Vec<DependencyGroup>,
    /// The identifier of the repository this record was loaded from.
    pub repo_id: String,
    /// The modulemd document this record was created from.
    ///
    /// Kept verbatim so enabled streams can be snapshotted as fail-safe
    /// data.
    pub yaml: String,
}

impl ModulePackage {
    /// Returns the identity tuple of this record.
    pub fn identity(&self) -> (&str, &str, u64, &str, &str) {
        (
            self.name.as_str(),
            self.stream.as_str(),
            self.version,
            &self.context,
            &self.arch,
        )
    }

    /// Returns the `name:stream` pair of this record.
    pub fn name_stream(&self) -> (String, String) {
        (self.name.as_str().to_string(), self.stream.as_str().to_string())
    }

    /// Returns the package names of a profile, if the profile exists.
    pub fn profile_packages(&self, profile: &str) -> Option<&BTreeSet<String>> {
        self.profiles.get(profile)
    }

    /// Returns whether this record sorts before `other` in latest-version
    /// selection.
    ///
    /// A greater version wins. On a version tie, a lexicographically greater
    /// context wins, but only if both records carry a static context. Records
    /// tying on both counts are co-latest and neither sorts before the other.
    pub fn latest_before(&self, other: &Self) -> bool {
        if self.version != other.version {
            return self.version < other.version;
        }
        if self.static_context && other.static_context {
            return self.context < other.context;
        }
        false
    }
}

impl Display for ModulePackage {
    /// Formats the record as `name:stream:version:context:arch`.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}:{}",
            self.name, self.stream, self.version, self.context, self.arch
        )
    }
}

/// Selects the latest module packages of `packages`.
///
/// Groups the input by `(name, stream, context, arch)` and keeps the maximal
/// elements of each group under [`ModulePackage::latest_before`]. Co-latest
/// records are all retained. The result preserves the input order.
pub fn latest_modules<'a>(packages: &[&'a ModulePackage]) -> Vec<&'a ModulePackage> {
    let mut latest: BTreeMap<(&str, &str, &str, &str), Vec<&ModulePackage>> = BTreeMap::new();
    for &package in packages {
        let key = (
            package.name.as_str(),
            package.stream.as_str(),
            package.context.as_str(),
            package.arch.as_str(),
        );
        let group = latest.entry(key).or_default();
        match group.first() {
            Some(representative) if representative.latest_before(package) => {
                group.clear();
                group.push(package);
            }
            Some(representative) if package.latest_before(representative) => {}
            _ => group.push(package),
        }
    }

    let keep: BTreeSet<ModuleId> = latest
        .into_values()
        .flatten()
        .map(|package| package.id)
        .collect();
    packages
        .iter()
        .copied()
        .filter(|package| keep.contains(&package.id))
        .collect()
}
