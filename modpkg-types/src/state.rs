//! Module state and resolution error classification.

use strum::Display;
use strum::EnumString;

/// The state a module is in, as tracked by the state persistor.
///
/// Members of the ModuleState enum can be created from their lowercase
/// on-disk spelling and format back to it.
///
/// ## Examples
/// ```
/// use std::str::FromStr;
///
/// use modpkg_types::ModuleState;
///
/// assert_eq!(ModuleState::from_str("enabled"), Ok(ModuleState::Enabled));
/// assert_eq!(ModuleState::from_str("ENABLED"), Ok(ModuleState::Enabled));
/// assert_eq!("disabled", format!("{}", ModuleState::Disabled));
/// ```
#[derive(Clone, Copy, Debug, Default, Display, EnumString, Eq, Hash, PartialEq)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ModuleState {
    /// No decision has been recorded for the module.
    #[default]
    Unknown,
    /// One stream of the module has been enabled by the user.
    Enabled,
    /// The module must not be used; no stream may be enabled.
    Disabled,
    /// The module follows its distribution default stream.
    Default,
    /// One stream is enabled and at least one profile has been installed.
    Installed,
}

impl ModuleState {
    /// Returns whether a stream is committed to in this state.
    ///
    /// Only these states carry a meaningful stream value.
    pub fn has_stream(self) -> bool {
        matches!(self, Self::Enabled | Self::Default | Self::Installed)
    }
}

/// Classification of the outcome of module dependency resolution.
///
/// Variants are declared in ascending severity, so the derived ordering can
/// be used to keep the worst outcome observed:
/// `NoError < Info < ErrorInDefaults < ErrorInLatest < Error <
/// CannotResolveModules`.
#[derive(Clone, Copy, Debug, Default, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum ModuleErrorType {
    /// Resolution succeeded without remarks.
    #[default]
    NoError,
    /// Resolution succeeded with informational remarks.
    Info,
    /// A conflict between module default documents was detected.
    ErrorInDefaults,
    /// The latest module versions alone are not resolvable, but an older
    /// candidate produced a solution.
    ErrorInLatest,
    /// Module dependencies could not be resolved.
    Error,
    /// The input is not resolvable at all.
    CannotResolveModules,
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("unknown", ModuleState::Unknown)]
    #[case("enabled", ModuleState::Enabled)]
    #[case("disabled", ModuleState::Disabled)]
    #[case("default", ModuleState::Default)]
    #[case("installed", ModuleState::Installed)]
    #[case("INSTALLED", ModuleState::Installed)]
    fn module_state_round_trip(#[case] input: &str, #[case] state: ModuleState) {
        assert_eq!(ModuleState::from_str(input), Ok(state));
        assert_eq!(input.to_lowercase(), format!("{state}"));
    }

    #[test]
    fn error_type_severity_ordering() {
        assert!(ModuleErrorType::NoError < ModuleErrorType::Info);
        assert!(ModuleErrorType::Info < ModuleErrorType::ErrorInDefaults);
        assert!(ModuleErrorType::ErrorInDefaults < ModuleErrorType::ErrorInLatest);
        assert!(ModuleErrorType::ErrorInLatest < ModuleErrorType::Error);
        assert!(ModuleErrorType::Error < ModuleErrorType::CannotResolveModules);
    }
}
