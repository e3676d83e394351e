//! Fail-safe snapshots of enabled module streams.
//!
//! The container keeps the modulemd of every enabled stream in a snapshot
//! directory, so module state can still be resolved when the repositories
//! that provided the metadata are unavailable.

use std::collections::BTreeMap;
use std::fs::create_dir_all;
use std::fs::read_dir;
use std::fs::read_to_string;
use std::fs::remove_file;
use std::fs::write;
use std::path::PathBuf;

use crate::Error;

/// The fail-safe snapshot directory.
///
/// One file per enabled stream, named `<module>:<stream>`, holding the
/// verbatim modulemd documents of the stream.
#[derive(Debug)]
pub(crate) struct FailSafe {
    dir: PathBuf,
}

impl FailSafe {
    /// Creates a handle for the snapshot directory at `dir`.
    pub(crate) fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Writes the snapshot for one enabled stream.
    pub(crate) fn write(&self, name: &str, stream: &str, yaml: &str) -> Result<(), Error> {
        create_dir_all(&self.dir).map_err(|source| Error::IoPath {
            path: self.dir.clone(),
            context: "creating the fail-safe directory",
            source,
        })?;
        let path = self.dir.join(format!("{name}:{stream}"));
        write(&path, yaml).map_err(|source| Error::IoPath {
            path,
            context: "writing a fail-safe snapshot",
            source,
        })
    }

    /// Removes all snapshots that do not belong to `keep`.
    ///
    /// `keep` maps module names to their enabled stream.
    pub(crate) fn prune(&self, keep: &BTreeMap<String, String>) -> Result<(), Error> {
        for (name, stream, path) in self.snapshots()? {
            if keep.get(&name).map(String::as_str) != Some(stream.as_str()) {
                remove_file(&path).map_err(|source| Error::IoPath {
                    path,
                    context: "removing a stale fail-safe snapshot",
                    source,
                })?;
            }
        }
        Ok(())
    }

    /// Loads all snapshots as `(module, stream, content)` triples.
    pub(crate) fn load(&self) -> Result<Vec<(String, String, String)>, Error> {
        let mut snapshots = Vec::new();
        for (name, stream, path) in self.snapshots()? {
            let content = read_to_string(&path).map_err(|source| Error::IoPath {
                path,
                context: "reading a fail-safe snapshot",
                source,
            })?;
            snapshots.push((name, stream, content));
        }
        Ok(snapshots)
    }

    /// Lists the snapshot files as `(module, stream, path)` triples.
    ///
    /// Files without a `:` separator in their name are ignored.
    fn snapshots(&self) -> Result<Vec<(String, String, PathBuf)>, Error> {
        let mut snapshots = Vec::new();
        if !self.dir.is_dir() {
            return Ok(snapshots);
        }
        let entries = read_dir(&self.dir).map_err(|source| Error::IoPath {
            path: self.dir.clone(),
            context: "reading the fail-safe directory",
            source,
        })?;
        for entry in entries {
            let entry = entry.map_err(|source| Error::IoPath {
                path: self.dir.clone(),
                context: "reading the fail-safe directory",
                source,
            })?;
            let file_name = entry.file_name();
            let Some((name, stream)) = file_name.to_str().and_then(|name| name.split_once(':'))
            else {
                continue;
            };
            snapshots.push((name.to_string(), stream.to_string(), entry.path()));
        }
        snapshots.sort();
        Ok(snapshots)
    }
}
