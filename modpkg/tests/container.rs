//! Integration tests for the module container.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fs::create_dir_all;
use std::fs::write;
use std::path::Path;
use std::path::PathBuf;

use modpkg::ContainerConfig;
use modpkg::Error;
use modpkg::ModuleContainer;
use modpkg::ModuleRef;
use modpkg_types::ModuleErrorType;
use modpkg_types::ModuleState;
use pretty_assertions::assert_eq;
use testresult::TestResult;

fn init_logger() {
    let _ = simplelog::SimpleLogger::init(
        simplelog::LevelFilter::Debug,
        simplelog::Config::default(),
    );
}

/// Renders a modulemd document for one module build.
fn modulemd(name: &str, stream: &str, version: u64, requires: &[(&str, &[&str])]) -> String {
    let mut doc = format!(
        r#"---
document: modulemd
version: 2
data:
  name: {name}
  stream: "{stream}"
  version: {version}
  context: deadbeef
  arch: x86_64
  summary: The {name} module
  profiles:
    default:
      rpms:
        - {name}
    doc:
      rpms:
        - {name}-manual
  artifacts:
    rpms:
      - {name}-0:{version}-1.x86_64
"#
    );
    if !requires.is_empty() {
        doc.push_str("  dependencies:\n    - requires:\n");
        for (module, streams) in requires {
            let streams: Vec<String> = streams.iter().map(|s| format!("\"{s}\"")).collect();
            doc.push_str(&format!("        {module}: [{}]\n", streams.join(", ")));
        }
    }
    doc
}

/// Renders a modulemd-defaults document.
fn defaults(module: &str, stream: &str, profiles: &[&str]) -> String {
    format!(
        r#"---
document: modulemd-defaults
version: 1
data:
  module: {module}
  stream: "{stream}"
  profiles:
    "{stream}": [{}]
"#,
        profiles.join(", ")
    )
}

fn config(root: &Path) -> ContainerConfig {
    ContainerConfig {
        install_root: root.to_path_buf(),
        arch: "x86_64".to_string(),
        ..ContainerConfig::default()
    }
}

/// A container seeded with the httpd and base-runtime test modules.
fn container(root: &Path) -> Result<ModuleContainer, Error> {
    init_logger();
    let mut container = ModuleContainer::new(config(root))?;
    container.add(&modulemd("httpd", "2.4", 1, &[]), "repo-a");
    container.add(&modulemd("httpd", "2.2", 1, &[]), "repo-a");
    container.add(&modulemd("base-runtime", "f26", 1, &[]), "repo-b");
    Ok(container)
}

fn identity<'a>(name: &'a str, stream: &'a str) -> ModuleRef<'a> {
    ModuleRef::Identity { name, stream }
}

#[test]
fn enable_save_and_read_back() -> TestResult {
    let root = tempfile::tempdir()?;
    let mut modules = container(root.path())?;

    assert!(modules.enable(identity("httpd", "2.4"), true)?);
    assert!(modules.enable(identity("base-runtime", "f26"), true)?);
    assert_eq!(
        modules.enabled_streams(),
        BTreeMap::from([
            ("httpd".to_string(), "2.4".to_string()),
            ("base-runtime".to_string(), "f26".to_string()),
        ])
    );
    modules.save()?;

    assert!(modules.is_enabled("httpd", "2.4"));
    assert!(!modules.is_enabled("httpd", "2.2"));
    assert!(modules.is_enabled("base-runtime", "f26"));

    // A fresh container over the same root reads the committed state back.
    let reloaded = container(root.path())?;
    assert!(reloaded.is_enabled("httpd", "2.4"));
    assert!(!reloaded.is_enabled("httpd", "2.2"));
    assert!(reloaded.is_enabled("base-runtime", "f26"));
    Ok(())
}

#[test]
fn disable_then_rollback() -> TestResult {
    let root = tempfile::tempdir()?;
    let mut modules = container(root.path())?;
    modules.enable(identity("httpd", "2.4"), true)?;
    modules.enable(identity("base-runtime", "f26"), true)?;
    modules.save()?;

    modules.disable(identity("httpd", ""), true)?;
    modules.disable(identity("base-runtime", ""), true)?;
    for name in modules.disabled_modules() {
        assert!(name == "httpd" || name == "base-runtime");
    }
    assert!(!modules.is_enabled("httpd", "2.4"));
    assert!(!modules.is_enabled("base-runtime", "f26"));

    modules.rollback();
    assert!(modules.is_enabled("httpd", "2.4"));
    assert!(modules.is_enabled("base-runtime", "f26"));
    assert!(!modules.is_changed());
    Ok(())
}

#[test]
fn install_and_uninstall_profiles() -> TestResult {
    let root = tempfile::tempdir()?;
    let mut modules = container(root.path())?;

    assert!(modules.install(identity("httpd", "2.4"), "default")?);
    assert!(modules.install(identity("httpd", "2.4"), "doc")?);
    // A redundant install is a no-op.
    assert!(!modules.install(identity("httpd", "2.4"), "default")?);
    assert_eq!(
        modules.installed_profiles(),
        BTreeMap::from([(
            "httpd".to_string(),
            vec!["default".to_string(), "doc".to_string()]
        )])
    );
    assert_eq!(modules.installed_profiles_of("httpd").len(), 2);
    modules.save()?;

    assert!(modules.uninstall(identity("httpd", "2.4"), "default")?);
    assert!(!modules.installed_profiles_of("httpd").contains(&"default".to_string()));
    assert_eq!(
        modules.removed_profiles(),
        BTreeMap::from([("httpd".to_string(), vec!["default".to_string()])])
    );

    assert!(modules.uninstall(identity("httpd", "2.4"), "doc")?);
    assert_eq!(
        modules.removed_profiles(),
        BTreeMap::from([(
            "httpd".to_string(),
            vec!["default".to_string(), "doc".to_string()]
        )])
    );
    assert!(modules.installed_profiles_of("httpd").is_empty());
    modules.save()?;
    Ok(())
}

#[test]
fn enabling_a_second_stream_is_rejected() -> TestResult {
    let root = tempfile::tempdir()?;
    let mut modules = container(root.path())?;
    modules.enable(identity("httpd", "2.4"), true)?;
    modules.save()?;

    let result = modules.enable(identity("httpd", "2.2"), true);
    assert!(matches!(
        result,
        Err(Error::State(modpkg_state::Error::EnableMultipleStreams { .. }))
    ));
    assert!(!modules.is_changed());
    Ok(())
}

#[test]
fn change_budget_is_enforced() -> TestResult {
    let root = tempfile::tempdir()?;
    let mut modules = container(root.path())?;

    modules.enable(identity("httpd", "2.4"), true)?;
    modules.disable(identity("httpd", ""), true)?;
    let result = modules.enable(identity("httpd", "2.4"), true);
    assert!(matches!(
        result,
        Err(Error::State(modpkg_state::Error::ModifyLimitExceeded {
            limit: 2,
            ..
        }))
    ));
    Ok(())
}

#[test]
fn unknown_modules_and_streams_are_rejected() -> TestResult {
    let root = tempfile::tempdir()?;
    let mut modules = container(root.path())?;

    assert!(matches!(
        modules.enable(identity("no-such-module", "1"), true),
        Err(Error::NoModule(name)) if name == "no-such-module"
    ));
    assert!(matches!(
        modules.enable(identity("httpd", "9.9"), true),
        Err(Error::NoStream { module, stream }) if module == "httpd" && stream == "9.9"
    ));
    Ok(())
}

#[test]
fn resolution_activates_enabled_streams_and_dependencies() -> TestResult {
    let root = tempfile::tempdir()?;
    let mut modules = ModuleContainer::new(config(root.path()))?;
    modules.add(
        &modulemd("httpd", "2.4", 1, &[("platform", &["26"])]),
        "repo-a",
    );
    modules.add(&modulemd("nginx", "1.12", 1, &[("platform", &["26"])]), "repo-a");
    modules.add_platform_package(&[], Some("platform:26"))?;

    modules.enable(identity("httpd", "2.4"), true)?;
    let (problems, error) = modules.resolve_active_module_packages(false);
    assert!(problems.is_empty());
    assert_eq!(error, ModuleErrorType::NoError);

    assert!(modules.is_module_active(identity("httpd", "2.4")));
    assert!(modules.is_module_active(identity("platform", "26")));
    assert!(!modules.is_module_active(identity("nginx", "1.12")));
    Ok(())
}

#[test]
fn unresolvable_requirements_classify_as_error() -> TestResult {
    let root = tempfile::tempdir()?;
    let mut modules = ModuleContainer::new(config(root.path()))?;
    modules.add(
        &modulemd("httpd", "2.4", 1, &[("platform", &["27"])]),
        "repo-a",
    );
    modules.add_platform_package(&[], Some("platform:26"))?;

    modules.enable(identity("httpd", "2.4"), true)?;
    let (problems, error) = modules.resolve_active_module_packages(false);
    assert!(!problems.is_empty());
    assert_eq!(error, ModuleErrorType::Error);
    assert!(!modules.is_module_active(identity("httpd", "2.4")));
    Ok(())
}

#[test]
fn non_latest_candidate_solving_classifies_as_error_in_latest() -> TestResult {
    let root = tempfile::tempdir()?;
    let mut modules = ModuleContainer::new(config(root.path()))?;
    // The newer build requires an unavailable platform, the older one is
    // fine.
    modules.add(
        &modulemd("httpd", "2.4", 2, &[("platform", &["27"])]),
        "repo-a",
    );
    modules.add(
        &modulemd("httpd", "2.4", 1, &[("platform", &["26"])]),
        "repo-a",
    );
    modules.add_platform_package(&[], Some("platform:26"))?;

    modules.enable(identity("httpd", "2.4"), true)?;
    let (problems, error) = modules.resolve_active_module_packages(false);
    assert!(!problems.is_empty());
    assert_eq!(error, ModuleErrorType::ErrorInLatest);
    assert!(modules.is_module_active(identity("httpd", "2.4")));
    Ok(())
}

#[test]
fn disabled_modules_are_excluded_from_resolution() -> TestResult {
    let root = tempfile::tempdir()?;
    let mut modules = ModuleContainer::new(config(root.path()))?;
    modules.add(&modulemd("httpd", "2.4", 1, &[]), "repo-a");
    modules.add(&defaults("httpd", "2.4", &["default"]), "repo-a");
    modules.resolve_defaults();

    modules.disable(identity("httpd", ""), true)?;
    let (_, error) = modules.resolve_active_module_packages(false);
    assert_eq!(error, ModuleErrorType::NoError);
    assert!(!modules.is_module_active(identity("httpd", "2.4")));
    Ok(())
}

#[test]
fn defaulted_streams_are_activated() -> TestResult {
    let root = tempfile::tempdir()?;
    let mut modules = ModuleContainer::new(config(root.path()))?;
    modules.add(&modulemd("nodejs", "8", 1, &[]), "repo-a");
    modules.add(&modulemd("nodejs", "10", 1, &[]), "repo-a");
    modules.add(&defaults("nodejs", "8", &["default"]), "repo-a");

    let problems = modules.resolve_defaults();
    assert!(problems.is_empty());
    assert_eq!(modules.default_stream("nodejs"), Some("8"));
    assert_eq!(
        modules.default_profiles("nodejs", "8"),
        vec!["default".to_string()]
    );

    let (problems, error) = modules.resolve_active_module_packages(false);
    assert!(problems.is_empty());
    assert_eq!(error, ModuleErrorType::NoError);
    assert!(modules.is_module_active(identity("nodejs", "8")));
    assert!(!modules.is_module_active(identity("nodejs", "10")));
    Ok(())
}

#[test]
fn conflicting_defaults_raise_the_severity() -> TestResult {
    let root = tempfile::tempdir()?;
    let mut modules = ModuleContainer::new(config(root.path()))?;
    modules.add(&modulemd("nodejs", "8", 1, &[]), "repo-a");
    modules.add(&defaults("nodejs", "8", &["default"]), "repo-a");
    modules.add(&defaults("nodejs", "10", &["default"]), "repo-b");

    let problems = modules.resolve_defaults();
    assert_eq!(problems.len(), 1);
    assert_eq!(modules.default_stream("nodejs"), None);

    let (problems, error) = modules.resolve_active_module_packages(false);
    assert_eq!(error, ModuleErrorType::ErrorInDefaults);
    assert!(!problems.is_empty());
    Ok(())
}

#[test]
fn defaults_are_loaded_from_disk() -> TestResult {
    let root = tempfile::tempdir()?;
    let defaults_dir = root.path().join("etc/dnf/modules.defaults.d");
    create_dir_all(&defaults_dir)?;
    write(
        defaults_dir.join("nodejs.yaml"),
        defaults("nodejs", "8", &["default"]),
    )?;

    let mut modules = ModuleContainer::new(config(root.path()))?;
    modules.add(&modulemd("nodejs", "8", 1, &[]), "repo-a");
    modules.add_defaults_from_disk()?;
    modules.resolve_defaults();
    assert_eq!(modules.default_stream("nodejs"), Some("8"));
    Ok(())
}

#[test]
fn queries_follow_the_subject_grammar() -> TestResult {
    let root = tempfile::tempdir()?;
    let modules = container(root.path())?;

    assert_eq!(modules.query("httpd")?.len(), 2);
    assert_eq!(modules.query("httpd:2.4")?.len(), 1);
    assert_eq!(modules.query("httpd:2.4:1:deadbeef::x86_64")?.len(), 1);
    // The profile part is ignored for matching.
    assert_eq!(modules.query("httpd:2.4/doc")?.len(), 1);
    assert_eq!(modules.query("httpd:9.9")?.len(), 0);
    assert!(modules.query("httpd:2.4:oops").is_err());

    assert_eq!(modules.query_fields("", "f26", None, "", "").len(), 1);
    assert_eq!(modules.query_fields("httpd", "", Some(1), "", "").len(), 2);
    Ok(())
}

#[test]
fn platform_is_detected_from_os_release() -> TestResult {
    let root = tempfile::tempdir()?;
    let os_release = root.path().join("os-release");
    write(&os_release, "ID=fedora\nVERSION_ID=26\n")?;

    let mut modules = ModuleContainer::new(config(root.path()))?;
    let id = modules.add_platform_package(&[os_release], None)?;
    let platform = modules.package(id).expect("platform package");
    assert_eq!(platform.name.as_str(), "platform");
    assert_eq!(platform.stream.as_str(), "26");
    assert!(platform.static_context);

    // Only one platform module may be added.
    assert!(matches!(
        modules.add_platform_package(&[], Some("platform:27")),
        Err(Error::Conflict(_))
    ));
    Ok(())
}

#[test]
fn missing_platform_stream_is_an_error() -> TestResult {
    let root = tempfile::tempdir()?;
    let mut modules = ModuleContainer::new(config(root.path()))?;
    assert!(matches!(
        modules.add_platform_package(&[PathBuf::from("/no/such/os-release")], None),
        Err(Error::NoPlatformStream)
    ));
    Ok(())
}

#[test]
fn dependency_tree_enablement_follows_requires() -> TestResult {
    let root = tempfile::tempdir()?;
    let mut modules = ModuleContainer::new(config(root.path()))?;
    modules.add(&modulemd("app", "1.0", 1, &[("lib", &["2"])]), "repo-a");
    modules.add(&modulemd("lib", "2", 1, &[("rt", &[])]), "repo-a");
    modules.add(&modulemd("lib", "3", 1, &[]), "repo-a");
    modules.add(&modulemd("rt", "stable", 1, &[]), "repo-a");
    modules.add(&defaults("rt", "stable", &[]), "repo-a");
    modules.resolve_defaults();

    let seed = modules.query("app:1.0")?[0].id;
    modules.enable_dependency_tree(&[seed])?;

    assert!(modules.is_enabled("app", "1.0"));
    assert!(modules.is_enabled("lib", "2"));
    assert!(!modules.is_enabled("lib", "3"));
    // The dependency without an explicit stream follows its default.
    assert!(modules.is_enabled("rt", "stable"));

    // Uncounted enablement keeps the change budget untouched.
    modules.rollback();
    modules.enable(identity("app", "1.0"), true)?;
    Ok(())
}

#[test]
fn dependency_without_default_stream_fails() -> TestResult {
    let root = tempfile::tempdir()?;
    let mut modules = ModuleContainer::new(config(root.path()))?;
    modules.add(&modulemd("app", "1.0", 1, &[("lib", &[])]), "repo-a");
    modules.add(&modulemd("lib", "2", 1, &[]), "repo-a");

    let seed = modules.query("app:1.0")?[0].id;
    assert!(matches!(
        modules.enable_dependency_tree(&[seed]),
        Err(Error::NoDefaultStream(module)) if module == "lib"
    ));
    Ok(())
}

#[test]
fn module_enablement_requirements_follow_artifacts() -> TestResult {
    let root = tempfile::tempdir()?;
    let mut modules = container(root.path())?;

    let wanted = BTreeSet::from(["httpd-0:1-1.x86_64".to_string()]);
    let required: Vec<String> = modules
        .requires_module_enablement(&wanted)
        .iter()
        .map(|package| package.to_string())
        .collect();
    // Both loaded httpd streams provide the artifact and neither is enabled.
    assert_eq!(required.len(), 2);

    modules.enable(identity("httpd", "2.4"), true)?;
    assert_eq!(modules.requires_module_enablement(&wanted).len(), 1);
    Ok(())
}

#[test]
fn obsoletes_switch_streams_and_keep_profiles() -> TestResult {
    let root = tempfile::tempdir()?;
    let mut modules = ModuleContainer::new(config(root.path()))?;
    modules.add(&modulemd("perl", "5.24", 1, &[]), "repo-a");
    modules.add(&modulemd("perl", "5.32", 1, &[]), "repo-a");
    modules.add(
        r#"---
document: modulemd-obsoletes
version: 1
data:
  module: perl
  stream: "5.24"
  message: 5.24 has reached end of life
  obsoleted_by:
    module: perl
    stream: "5.32"
"#,
        "repo-a",
    );

    modules.install(identity("perl", "5.24"), "default")?;
    modules.save()?;

    modules.apply_obsoletes()?;
    assert!(modules.is_enabled("perl", "5.32"));
    assert_eq!(
        modules.switched_streams(),
        BTreeMap::from([(
            "perl".to_string(),
            ("5.24".to_string(), "5.32".to_string())
        )])
    );
    assert_eq!(modules.installed_profiles_of("perl"), vec!["default".to_string()]);

    // The budget is untouched by the system-initiated rewrite.
    modules.rollback();
    modules.reset(identity("perl", ""), true)?;
    modules.enable(identity("perl", "5.32"), true)?;
    Ok(())
}

#[test]
fn fail_safe_snapshots_survive_missing_repositories() -> TestResult {
    let root = tempfile::tempdir()?;
    {
        let mut modules = container(root.path())?;
        modules.enable(identity("httpd", "2.4"), true)?;
        modules.save()?;
    }
    let snapshot = root.path().join("var/lib/dnf/modulefailsafe/httpd:2.4");
    assert!(snapshot.is_file());

    // A container without repository metadata falls back to the snapshot.
    let mut modules = ModuleContainer::new(config(root.path()))?;
    assert!(modules.is_empty());
    modules.load_fail_safe_data()?;
    let packages = modules.query("httpd:2.4")?;
    assert_eq!(packages.len(), 1);
    assert_eq!(packages[0].repo_id, "@modulefailsafe");

    // Disabling the stream removes the stale snapshot on save.
    modules.disable(identity("httpd", ""), true)?;
    modules.save()?;
    assert!(!snapshot.exists());
    Ok(())
}

#[test]
fn report_lists_pending_changes() -> TestResult {
    let root = tempfile::tempdir()?;
    let mut modules = container(root.path())?;
    modules.enable(identity("httpd", "2.4"), true)?;
    modules.install(identity("httpd", "2.4"), "default")?;

    let report = modules.report();
    assert!(report.contains("Module Enabling:"));
    assert!(report.contains("httpd:2.4"));
    assert!(report.contains("Module Installing Profiles:"));
    assert!(report.contains("httpd/default"));

    modules.save()?;
    assert!(modules.report().is_empty());
    Ok(())
}

#[test]
fn installed_pkg_names_union_profile_packages() -> TestResult {
    let root = tempfile::tempdir()?;
    let mut modules = container(root.path())?;
    modules.install(identity("httpd", "2.4"), "default")?;
    modules.install(identity("httpd", "2.4"), "doc")?;

    assert_eq!(
        modules.installed_pkg_names(),
        BTreeSet::from(["httpd".to_string(), "httpd-manual".to_string()])
    );
    Ok(())
}

#[test]
fn latest_modules_are_grouped_per_repo() -> TestResult {
    let root = tempfile::tempdir()?;
    let mut modules = ModuleContainer::new(config(root.path()))?;
    modules.add(&modulemd("httpd", "2.4", 1, &[]), "repo-a");
    modules.add(&modulemd("httpd", "2.4", 2, &[]), "repo-a");
    modules.add(&modulemd("nginx", "1.12", 1, &[]), "repo-a");
    modules.add(&modulemd("nodejs", "8", 1, &[]), "repo-b");

    let packages: Vec<_> = modules.packages().iter().collect();
    let grouped = modules.latest_modules_per_repo(None, &packages);
    assert_eq!(grouped.len(), 2);
    // repo-a: httpd (latest version only) and nginx.
    assert_eq!(grouped[0].len(), 2);
    assert_eq!(grouped[0][0].len(), 1);
    assert_eq!(grouped[0][0][0].version, 2);
    // repo-b: nodejs.
    assert_eq!(grouped[1].len(), 1);
    assert_eq!(grouped[1][0][0].name.as_str(), "nodejs");

    let module_state = modules.module_state("httpd");
    assert_eq!(module_state, ModuleState::Unknown);
    Ok(())
}

#[test]
fn module_state_and_enabled_stream_accessors() -> TestResult {
    let root = tempfile::tempdir()?;
    let mut modules = container(root.path())?;

    assert!(matches!(
        modules.enabled_stream("httpd"),
        Err(Error::NoEnabledStream(_))
    ));
    modules.enable(identity("httpd", "2.4"), true)?;
    assert_eq!(modules.enabled_stream("httpd")?, "2.4");
    assert_eq!(modules.module_state("httpd"), ModuleState::Enabled);

    modules.install(identity("httpd", "2.4"), "default")?;
    assert_eq!(modules.module_state("httpd"), ModuleState::Installed);
    assert!(modules.is_enabled("httpd", "2.4"));

    modules.disable(identity("httpd", ""), false)?;
    assert!(modules.is_disabled("httpd"));
    Ok(())
}
