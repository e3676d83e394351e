//! Container configuration.

use std::fs::read_to_string;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;

/// Configuration options of a [`crate::ModuleContainer`].
///
/// All options carry defaults, so a configuration file only needs to name
/// the options that differ:
///
/// ```toml
/// install_root = "/mnt/sysimage"
/// arch = "aarch64"
/// max_stream_changes = 4
/// ```
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// The root of the managed installation.
    pub install_root: PathBuf,

    /// The architecture modules are managed for.
    ///
    /// Module packages built for other architectures (except `noarch`) are
    /// skipped unless [`ContainerConfig::all_arch`] is set.
    pub arch: String,

    /// Where module state is persisted, relative to the installation root.
    pub persist_dir: PathBuf,

    /// Whether module packages of all architectures are loaded.
    pub all_arch: bool,

    /// How often the stream of a module may change within one transaction.
    pub max_stream_changes: u32,

    /// Whether solver inputs are logged for debugging.
    pub debug_solver: bool,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            install_root: PathBuf::from("/"),
            arch: std::env::consts::ARCH.to_string(),
            persist_dir: PathBuf::from("/etc/dnf/modules.d"),
            all_arch: false,
            max_stream_changes: 2,
            debug_solver: false,
        }
    }
}

impl ContainerConfig {
    /// Loads the configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or does not parse.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let content = read_to_string(path).map_err(|source| Error::IoPath {
            path: path.to_path_buf(),
            context: "reading a configuration file",
            source,
        })?;
        toml::from_str(&content).map_err(|source| Error::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Returns the directory holding the persisted module state files.
    pub(crate) fn state_dir(&self) -> PathBuf {
        join_root(&self.install_root, &self.persist_dir).join("modules/state")
    }

    /// Returns the directory holding on-disk module default documents.
    pub(crate) fn defaults_dir(&self) -> PathBuf {
        join_root(
            &self.install_root,
            Path::new("etc/dnf/modules.defaults.d"),
        )
    }

    /// Returns the directory holding fail-safe snapshots of enabled streams.
    pub(crate) fn fail_safe_dir(&self) -> PathBuf {
        join_root(
            &self.install_root,
            Path::new("var/lib/dnf/modulefailsafe"),
        )
    }
}

/// Joins `path` below `root`, treating an absolute `path` as relative to it.
fn join_root(root: &Path, path: &Path) -> PathBuf {
    match path.strip_prefix("/") {
        Ok(relative) => root.join(relative),
        Err(_) => root.join(path),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use testresult::TestResult;

    use super::*;

    #[test]
    fn directories_are_anchored_below_the_install_root() {
        let config = ContainerConfig {
            install_root: PathBuf::from("/mnt/sysimage"),
            ..ContainerConfig::default()
        };
        assert_eq!(
            config.state_dir(),
            PathBuf::from("/mnt/sysimage/etc/dnf/modules.d/modules/state")
        );
        assert_eq!(
            config.defaults_dir(),
            PathBuf::from("/mnt/sysimage/etc/dnf/modules.defaults.d")
        );
        assert_eq!(
            config.fail_safe_dir(),
            PathBuf::from("/mnt/sysimage/var/lib/dnf/modulefailsafe")
        );
    }

    #[test]
    fn config_file_overrides_defaults() -> TestResult {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "arch = \"aarch64\"\nmax_stream_changes = 4")?;

        let config = ContainerConfig::from_file(file.path())?;
        assert_eq!(config.arch, "aarch64");
        assert_eq!(config.max_stream_changes, 4);
        assert_eq!(config.install_root, PathBuf::from("/"));
        Ok(())
    }

    #[test]
    fn invalid_config_files_are_rejected() -> TestResult {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "max_stream_changes = \"many\"")?;
        assert!(matches!(
            ContainerConfig::from_file(file.path()),
            Err(Error::Config { .. })
        ));
        Ok(())
    }
}
