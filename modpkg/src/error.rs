//! Error handling for the module container.

use std::path::PathBuf;

/// The error that can occur when working with a module container.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The requested module is not known to the container.
    #[error("No such module: {0}")]
    NoModule(String),

    /// The requested stream is not present for the module.
    #[error("No such stream '{stream}' for module '{module}'")]
    NoStream {
        /// The name of the affected module.
        module: String,
        /// The requested stream.
        stream: String,
    },

    /// A dependency needs a stream of a module that has neither an explicit
    /// request nor a configured default.
    #[error("No default stream for module: {0}")]
    NoDefaultStream(String),

    /// No stream of the module is currently enabled.
    #[error("No enabled stream for module: {0}")]
    NoEnabledStream(String),

    /// Two metadata sources disagree irreconcilably.
    #[error("Conflicting module metadata: {0}")]
    Conflict(String),

    /// The platform stream could not be detected from any os-release file.
    #[error("Cannot detect the platform stream of the installation")]
    NoPlatformStream,

    /// A [`modpkg_state::Error`].
    #[error(transparent)]
    State(#[from] modpkg_state::Error),

    /// A [`modpkg_types::Error`].
    #[error(transparent)]
    Types(#[from] modpkg_types::Error),

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

    /// A configuration file did not parse.
    #[error("Invalid configuration file {path:?}:\n{source}")]
    Config {
        /// The path of the configuration file.
        path: PathBuf,
        /// The source error.
        source: toml::de::Error,
    },
}
