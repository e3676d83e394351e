//! Two-pass module stream resolution.

use log::debug;
use modpkg_types::ModuleErrorType;
use modpkg_types::ModuleId;
use modpkg_types::ModulePackage;
use modpkg_types::latest_modules;
use resolvo::ConditionalRequirement;
use resolvo::Problem;
use resolvo::Requirement;
use resolvo::UnsolvableOrCancelled;

use crate::ModuleProvider;
use crate::StreamSpec;

/// The outcome of module stream resolution.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Resolution {
    /// The container ids of the packages selected by the last successful
    /// pass. Empty if no pass succeeded.
    pub active: Vec<ModuleId>,
    /// Solver problems, one inner group per failed solve.
    pub problems: Vec<Vec<String>>,
    /// Severity classification of the outcome.
    pub error: ModuleErrorType,
}

/// Resolves the active module packages for the given enablement intent.
///
/// - `candidates` is the pool of selectable packages. Packages of disabled
///   modules must not be part of it.
/// - `strict` locks the named modules to the named streams; a resolution not
///   honoring them fails.
/// - `favored` names defaulted module streams. They are solved for when
///   possible but dropped instead of failing the resolution.
///
/// Resolution runs twice: first over the latest candidates per
/// `(name, stream, context, arch)`, then, if that fails, over all
/// candidates. A first-pass failure classifies as
/// [`ModuleErrorType::ErrorInLatest`], a second-pass failure as
/// [`ModuleErrorType::Error`]. A failure for which the solver cannot name a
/// conflict classifies as [`ModuleErrorType::CannotResolveModules`].
///
/// This function never fails; problems are reported in the returned
/// [`Resolution`].
pub fn resolve_active(
    candidates: &[&ModulePackage],
    strict: &[(String, String)],
    favored: &[(String, String)],
    debug_solver: bool,
) -> Resolution {
    let latest = latest_modules(candidates);

    match solve(&latest, strict, favored, debug_solver) {
        Ok(active) => Resolution {
            active,
            problems: Vec::new(),
            error: ModuleErrorType::NoError,
        },
        Err(latest_problems) => match solve(candidates, strict, favored, debug_solver) {
            Ok(active) => Resolution {
                active,
                problems: vec![latest_problems],
                error: ModuleErrorType::ErrorInLatest,
            },
            Err(problems) => {
                let error = if problems.is_empty() {
                    ModuleErrorType::CannotResolveModules
                } else {
                    ModuleErrorType::Error
                };
                Resolution {
                    active: Vec::new(),
                    problems: vec![latest_problems, problems],
                    error,
                }
            }
        },
    }
}

/// Runs a single solver pass over `candidates`.
///
/// Returns the selected container ids, or the solver's conflict description
/// split into lines.
fn solve(
    candidates: &[&ModulePackage],
    strict: &[(String, String)],
    favored: &[(String, String)],
    debug_solver: bool,
) -> Result<Vec<ModuleId>, Vec<String>> {
    let provider = ModuleProvider::new(candidates.iter().copied());

    let requirements: Vec<ConditionalRequirement> = strict
        .iter()
        .map(|(module, stream)| ConditionalRequirement {
            condition: None,
            requirement: Requirement::Single(
                provider.requirement(module, StreamSpec::exact(stream)),
            ),
        })
        .collect();
    let soft_requirements: Vec<_> = favored
        .iter()
        .filter_map(|(module, stream)| provider.best_candidate(module, &StreamSpec::exact(stream)))
        .collect();

    if debug_solver {
        debug!(
            "solving {} candidates, strict jobs {strict:?}, favored jobs {favored:?}",
            candidates.len()
        );
    }

    let mut solver = resolvo::Solver::new(provider);
    let problem = Problem::new()
        .requirements(requirements)
        .soft_requirements(soft_requirements);

    match solver.solve(problem) {
        Ok(solution) => Ok(solution
            .into_iter()
            .map(|solvable| solver.provider().module_id(solvable))
            .collect()),
        Err(UnsolvableOrCancelled::Unsolvable(conflict)) => Err(conflict
            .display_user_friendly(&solver)
            .to_string()
            .lines()
            .map(str::to_string)
            .collect()),
        // We never cancel a solve; an empty problem list classifies the
        // failure as unexpected.
        Err(UnsolvableOrCancelled::Cancelled(_)) => Err(Vec::new()),
    }
}
