//! Module stream dependencies.

use std::fmt::Display;
use std::fmt::Formatter;

/// One dependency group of a module package.
///
/// A group names a required module together with the streams that satisfy
/// the requirement. The streams form an "or": any single one of them
/// satisfies the group. An empty stream list means any stream is acceptable.
/// Stream entries prefixed with `-` are exclusions: any stream except the
/// excluded ones is acceptable.
///
/// Groups of one package are independent requirements and are "and-ed" by
/// the resolver.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct DependencyGroup {
    module: String,
    streams: Vec<String>,
}

impl DependencyGroup {
    /// Creates a new [`DependencyGroup`].
    pub fn new(module: impl Into<String>, streams: Vec<String>) -> Self {
        Self {
            module: module.into(),
            streams,
        }
    }

    /// Returns the name of the required module.
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Returns the raw stream entries, including `-` exclusions.
    pub fn streams(&self) -> &[String] {
        &self.streams
    }

    /// Returns the explicitly requested streams (entries without a `-`
    /// prefix).
    pub fn requested_streams(&self) -> impl Iterator<Item = &str> {
        self.streams
            .iter()
            .map(String::as_str)
            .filter(|stream| !stream.starts_with('-'))
    }

    /// Returns the excluded streams (entries with their `-` prefix removed).
    pub fn excluded_streams(&self) -> impl Iterator<Item = &str> {
        self.streams
            .iter()
            .filter_map(|stream| stream.strip_prefix('-'))
    }

    /// Returns the single requested stream, if the group names exactly one.
    pub fn requested_stream(&self) -> Option<&str> {
        let mut requested = self.requested_streams();
        let first = requested.next()?;
        match requested.next() {
            Some(_) => None,
            None => Some(first),
        }
    }

    /// Returns whether `stream` satisfies this group.
    pub fn matches(&self, stream: &str) -> bool {
        let mut requested = self.requested_streams().peekable();
        if requested.peek().is_some() {
            return requested.any(|candidate| candidate == stream);
        }
        !self.excluded_streams().any(|excluded| excluded == stream)
    }
}

impl Display for DependencyGroup {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.streams.is_empty() {
            write!(f, "{}", self.module)
        } else {
            write!(f, "{}:[{}]", self.module, self.streams.join(", "))
        }
    }
}
