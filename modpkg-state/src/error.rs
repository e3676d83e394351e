//! Error handling for module state persistence.

use std::path::PathBuf;

/// The error that can occur when working with persisted module state.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A second stream of a module was requested to be enabled.
    #[error("Cannot enable multiple streams for module '{module}'")]
    EnableMultipleStreams {
        /// The name of the affected module.
        module: String,
    },

    /// The per-transaction stream change budget of a module is exhausted.
    #[error(
        "Cannot modify the state of module '{module}' more than {limit} times in one transaction"
    )]
    ModifyLimitExceeded {
        /// The name of the affected module.
        module: String,
        /// The configured maximum number of counted stream changes.
        limit: u32,
    },

    /// An I/O error occurred at a path.
    #[error("I/O error at path {path:?} while {context}:\n{source}")]
    IoPath {
        /// The path at which the error occurred.
        path: PathBuf,
        /// The context in which the error occurred.
        ///
        /// This is meant to complete the sentence "I/O error at path while ".
        context: &'static str,
        /// The source error.
        source: std::io::Error,
    },

    /// A winnow parser for a state file didn't work and produced an error.
    #[error("Invalid module state file {path:?}:\n{message}")]
    ParseError {
        /// The path of the state file that failed to parse.
        path: PathBuf,
        /// The formatted parser error.
        message: String,
    },
}
