//! Types specific to the module stream solver.

use std::collections::BTreeSet;
use std::fmt::Display;
use std::fmt::Formatter;

use modpkg_types::DependencyGroup;
use modpkg_types::ModuleId;
use modpkg_types::ModulePackage;
use resolvo::utils::VersionSet;

/// A module package candidate interned into the solver pool.
///
/// Carries just the fields the solver needs: the identity used for display
/// and ordering, and the container id that links a chosen solvable back to
/// its [`ModulePackage`].
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct StreamRecord {
    /// The container id of the package this candidate stands for.
    pub id: ModuleId,
    /// The module name.
    pub name: String,
    /// The stream of the candidate.
    pub stream: String,
    /// The version of the candidate.
    pub version: u64,
    /// The build context of the candidate.
    pub context: String,
    /// Whether the context was assigned statically by the repository.
    pub static_context: bool,
}

impl From<&ModulePackage> for StreamRecord {
    fn from(package: &ModulePackage) -> Self {
        Self {
            id: package.id,
            name: package.name.as_str().to_string(),
            stream: package.stream.as_str().to_string(),
            version: package.version,
            context: package.context.clone(),
            static_context: package.static_context,
        }
    }
}

impl Display for StreamRecord {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.name, self.stream, self.version, self.context
        )
    }
}

/// Specification of the streams of a module that satisfy a requirement.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum StreamSpec {
    /// Any stream of the module satisfies the requirement.
    Any,
    /// Any of the named streams satisfies the requirement.
    OneOf(BTreeSet<String>),
    /// Any stream except the named ones satisfies the requirement.
    NoneOf(BTreeSet<String>),
}

impl StreamSpec {
    /// Creates a [`StreamSpec`] matching exactly one stream.
    pub fn exact(stream: &str) -> Self {
        Self::OneOf(BTreeSet::from([stream.to_string()]))
    }

    /// Creates a [`StreamSpec`] from the streams of a dependency group.
    ///
    /// Requested streams form a [`StreamSpec::OneOf`]; a group with only
    /// exclusions becomes a [`StreamSpec::NoneOf`]; an empty group matches
    /// any stream.
    pub fn from_group(group: &DependencyGroup) -> Self {
        let requested: BTreeSet<String> =
            group.requested_streams().map(str::to_string).collect();
        if !requested.is_empty() {
            return Self::OneOf(requested);
        }
        let excluded: BTreeSet<String> = group.excluded_streams().map(str::to_string).collect();
        if excluded.is_empty() {
            Self::Any
        } else {
            Self::NoneOf(excluded)
        }
    }

    /// Returns `true` if the given [`StreamRecord`] satisfies this spec.
    pub fn matches(&self, record: &StreamRecord) -> bool {
        match self {
            Self::Any => true,
            Self::OneOf(streams) => streams.contains(&record.stream),
            Self::NoneOf(streams) => !streams.contains(&record.stream),
        }
    }
}

impl VersionSet for StreamSpec {
    type V = StreamRecord;
}

impl Display for StreamSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Any => write!(f, "<any stream>"),
            Self::OneOf(streams) => {
                let streams: Vec<&str> = streams.iter().map(String::as_str).collect();
                write!(f, "{}", streams.join(" or "))
            }
            Self::NoneOf(streams) => {
                let streams: Vec<&str> = streams.iter().map(String::as_str).collect();
                write!(f, "anything but {}", streams.join(" or "))
            }
        }
    }
}
