//! Error handling for module package types.

/// The error that can occur when working with module package types.
#[derive(Debug, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An invalid module name.
    #[error("Invalid module name: {0}")]
    InvalidModuleName(String),

    /// An invalid stream name.
    #[error("Invalid stream name: {0}")]
    InvalidStream(String),

    /// An invalid module version.
    ///
    /// Module versions are 64-bit unsigned integers.
    #[error("Invalid module version: {0}")]
    InvalidVersion(String),

    /// A winnow parser did not accept its input.
    #[error("Parser error: {0}")]
    ParseError(String),
}

impl<'a> From<winnow::error::ParseError<&'a str, winnow::error::ContextError>> for Error {
    /// Converts a [`winnow::error::ParseError`] into an [`Error::ParseError`].
    fn from(value: winnow::error::ParseError<&'a str, winnow::error::ContextError>) -> Self {
        Self::ParseError(value.to_string())
    }
}
