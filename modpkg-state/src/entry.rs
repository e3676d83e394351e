//! In-memory and on-disk representation of one module's state.

use std::collections::BTreeSet;
use std::fmt::Display;
use std::fmt::Formatter;
use std::path::PathBuf;
use std::str::FromStr;

use log::warn;
use modpkg_types::ModuleState;
use winnow::Parser;

use crate::Error;
use crate::parser;

/// The state tracked for one module.
///
/// Invariants: a [`ModuleState::Disabled`] entry carries neither a stream nor
/// profiles, and at most one stream is recorded per module.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct StateEntry {
    /// The state of the module.
    pub state: ModuleState,
    /// The stream committed to.
    ///
    /// Only meaningful when [`ModuleState::has_stream`] holds; empty
    /// otherwise.
    pub stream: String,
    /// The installed profiles of the enabled stream.
    pub profiles: BTreeSet<String>,
    /// Whether the stream was last changed by an explicit user action, as
    /// opposed to a system-initiated rewrite.
    pub stream_changed_by_user: bool,
}

/// One on-disk module state file: a module name and its [`StateEntry`].
///
/// The file format is a single-section ini file:
///
/// ```ini
/// [httpd]
/// name = httpd
/// stream = 2.4
/// profiles = default,doc
/// state = enabled
/// stream_changed_by_user = 1
/// ```
///
/// State values are written lowercase and parsed case-insensitively; unknown
/// keys and unknown state values are tolerated so files written by newer
/// tools still load.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StateFile {
    /// The name of the module this file describes.
    pub name: String,
    /// The state of the module.
    pub entry: StateEntry,
}

impl Display for StateFile {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let profiles: Vec<&str> = self.entry.profiles.iter().map(String::as_str).collect();
        writeln!(f, "[{}]", self.name)?;
        writeln!(f, "name = {}", self.name)?;
        writeln!(f, "stream = {}", self.entry.stream)?;
        writeln!(f, "profiles = {}", profiles.join(","))?;
        writeln!(f, "state = {}", self.entry.state)?;
        writeln!(
            f,
            "stream_changed_by_user = {}",
            u8::from(self.entry.stream_changed_by_user)
        )
    }
}

impl FromStr for StateFile {
    type Err = Error;

    /// Parses a [`StateFile`] from the content of a state file.
    ///
    /// # Errors
    ///
    /// Returns an [`Error::ParseError`] without a path if the file is not
    /// valid ini data; callers that read from disk attach the path.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, items) = parser::state_file
            .parse(s)
            .map_err(|err| Error::ParseError {
                path: PathBuf::new(),
                message: err.to_string(),
            })?;

        let state = match items.get("state").map(String::as_str) {
            None | Some("") => ModuleState::Unknown,
            Some(raw) => ModuleState::from_str(raw).unwrap_or_else(|_| {
                warn!("Unknown state '{raw}' for module '{name}', falling back to unknown");
                ModuleState::Unknown
            }),
        };
        let profiles = items
            .get("profiles")
            .map(String::as_str)
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|profile| !profile.is_empty())
            .map(str::to_string)
            .collect();
        let stream_changed_by_user = matches!(
            items.get("stream_changed_by_user").map(String::as_str),
            Some("1" | "true")
        );

        Ok(StateFile {
            name,
            entry: StateEntry {
                state,
                stream: items.get("stream").cloned().unwrap_or_default(),
                profiles,
                stream_changed_by_user,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use testresult::TestResult;

    use super::*;

    fn entry(state: ModuleState, stream: &str, profiles: &[&str], changed: bool) -> StateEntry {
        StateEntry {
            state,
            stream: stream.to_string(),
            profiles: profiles.iter().map(|p| (*p).to_string()).collect(),
            stream_changed_by_user: changed,
        }
    }

    #[rstest]
    #[case(entry(ModuleState::Enabled, "2.4", &["default", "doc"], true))]
    #[case(entry(ModuleState::Disabled, "", &[], false))]
    #[case(entry(ModuleState::Unknown, "", &[], false))]
    #[case(entry(ModuleState::Installed, "f26", &["minimal"], true))]
    fn state_file_round_trips(#[case] entry: StateEntry) -> TestResult {
        let file = StateFile {
            name: "httpd".to_string(),
            entry,
        };
        let parsed = StateFile::from_str(&file.to_string())?;
        assert_eq!(file, parsed);
        Ok(())
    }

    #[test]
    fn unknown_state_values_fall_back_to_unknown() -> TestResult {
        let parsed = StateFile::from_str("[httpd]\nstate = quantum\n")?;
        assert_eq!(parsed.entry.state, ModuleState::Unknown);
        Ok(())
    }

    #[test]
    fn uppercase_state_values_are_accepted() -> TestResult {
        let parsed = StateFile::from_str("[httpd]\nstream = 2.4\nstate = ENABLED\n")?;
        assert_eq!(parsed.entry.state, ModuleState::Enabled);
        Ok(())
    }
}
