//! Validated module and stream names.

use std::fmt::Display;
use std::fmt::Formatter;
use std::str::FromStr;

use winnow::ModalResult;
use winnow::Parser;
use winnow::error::StrContext;
use winnow::error::StrContextValue;
use winnow::token::take_while;

use crate::Error;

/// Returns whether `c` may appear in a module or stream name.
///
/// `:` and `/` delimit fields in module subject strings and whitespace is
/// rejected to keep the on-disk state format unambiguous.
fn is_name_char(c: char) -> bool {
    c != ':' && c != '/' && !c.is_whitespace()
}

/// The name of a module.
///
/// Module names are non-empty and must not contain `:`, `/` or whitespace.
///
/// ## Examples
/// ```
/// use std::str::FromStr;
///
/// use modpkg_types::ModuleName;
///
/// assert!(ModuleName::from_str("base-runtime").is_ok());
/// assert!(ModuleName::from_str("name:stream").is_err());
/// ```
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ModuleName(String);

impl ModuleName {
    /// Creates a new [`ModuleName`] in a Result.
    pub fn new(name: &str) -> Result<Self, Error> {
        Self::from_str(name)
    }

    /// Recognizes a [`ModuleName`] in a string slice.
    pub fn parser(input: &mut &str) -> ModalResult<Self> {
        take_while(1.., is_name_char)
            .context(StrContext::Label("module name"))
            .context(StrContext::Expected(StrContextValue::Description(
                "a non-empty name without ':', '/' or whitespace",
            )))
            .map(|name: &str| Self(name.to_string()))
            .parse_next(input)
    }

    /// Returns a reference to the inner string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ModuleName {
    type Err = Error;

    /// Creates a [`ModuleName`] from a string slice.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parser
            .parse(s)
            .map_err(|_| Error::InvalidModuleName(s.to_string()))
    }
}

impl Display for ModuleName {
    fn fmt(&self, fmt: &mut Formatter) -> std::fmt::Result {
        write!(fmt, "{}", self.as_str())
    }
}

/// The name of one stream of a module.
///
/// A stream identifies a version lineage of a module (e.g. `2.4` in
/// `httpd:2.4`). The same character restrictions as with [`ModuleName`] apply.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Stream(String);

impl Stream {
    /// Creates a new [`Stream`] in a Result.
    pub fn new(stream: &str) -> Result<Self, Error> {
        Self::from_str(stream)
    }

    /// Recognizes a [`Stream`] in a string slice.
    pub fn parser(input: &mut &str) -> ModalResult<Self> {
        take_while(1.., is_name_char)
            .context(StrContext::Label("stream name"))
            .context(StrContext::Expected(StrContextValue::Description(
                "a non-empty stream without ':', '/' or whitespace",
            )))
            .map(|stream: &str| Self(stream.to_string()))
            .parse_next(input)
    }

    /// Returns a reference to the inner string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Stream {
    type Err = Error;

    /// Creates a [`Stream`] from a string slice.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parser
            .parse(s)
            .map_err(|_| Error::InvalidStream(s.to_string()))
    }
}

impl Display for Stream {
    fn fmt(&self, fmt: &mut Formatter) -> std::fmt::Result {
        write!(fmt, "{}", self.as_str())
    }
}
