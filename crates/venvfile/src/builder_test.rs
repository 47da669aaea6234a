// Copyright (c) Contributors to the venvfile project.
// SPDX-License-Identifier: Apache-2.0

use rstest::rstest;
use tempfile::TempDir;

use super::*;
use crate::pyver::ReleaseLevel;
use crate::spec::BuilderParams;

fn interpreter(version: VersionInfo, symlinks_required: bool) -> Interpreter {
    Interpreter::new(PathBuf::from("python3"), version, symlinks_required)
}

fn python312() -> Interpreter {
    interpreter(VersionInfo::full(3, 12, 0, ReleaseLevel::Final, 0), false)
}

fn conf_dir() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let dir = dunce::canonicalize(tmp.path()).unwrap();
    (tmp, dir)
}

fn os_args(args: &[&str]) -> Vec<OsString> {
    args.iter().map(OsString::from).collect()
}

/// Write an executable shell script standing in for a Python interpreter.
#[cfg(unix)]
fn write_script(path: &Path, body: &str) {
    use std::os::unix::fs::PermissionsExt;

    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut perms = std::fs::metadata(path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms).unwrap();
}

/// An environment interpreter that records its arguments in `log` and
/// reports `site_dir` as its site-packages directory.
#[cfg(unix)]
fn env_python_body(log: &Path, site_dir: &Path) -> String {
    format!(
        "echo \"$*\" >> '{}'\nif [ \"$1\" = \"-c\" ]; then echo '[\"{}\"]'; fi",
        log.display(),
        site_dir.display()
    )
}

#[cfg(unix)]
fn logged_calls(log: &Path) -> Vec<String> {
    std::fs::read_to_string(log)
        .unwrap_or_default()
        .lines()
        .map(String::from)
        .collect()
}

#[rstest]
#[case(SymlinkMode::Yes, false, true)]
#[case(SymlinkMode::Yes, true, true)]
#[case(SymlinkMode::No, false, false)]
#[case(SymlinkMode::PlatformDefault, false, false)]
#[case(SymlinkMode::PlatformDefault, true, true)]
fn test_symlink_mode_resolution(
    #[case] mode: SymlinkMode,
    #[case] required: bool,
    #[case] expected: bool,
) {
    let mut spec = EnvironmentSpec::new("venv");
    spec.params.symlinks = mode;
    let version = VersionInfo::full(3, 12, 0, ReleaseLevel::Final, 0);
    let builder = EnvBuilder::new(
        Path::new("/conf/venv.yaml"),
        &spec,
        &interpreter(version, required),
    )
    .unwrap();
    assert_eq!(builder.uses_symlinks(), expected);
}

#[rstest]
fn test_copies_refused_when_symlinks_required() {
    let mut spec = EnvironmentSpec::new("venv");
    spec.params.symlinks = SymlinkMode::No;
    let version = VersionInfo::full(3, 12, 0, ReleaseLevel::Final, 0);
    let err = EnvBuilder::new(
        Path::new("/conf/venv.yaml"),
        &spec,
        &interpreter(version, true),
    )
    .unwrap_err();
    assert!(matches!(err, Error::UseSymlinks));
}

#[rstest]
#[case(VersionInfo::full(3, 8, 10, ReleaseLevel::Final, 0), true, false)]
#[case(VersionInfo::full(3, 9, 0, ReleaseLevel::Alpha, 1), true, false)]
#[case(VersionInfo::full(3, 9, 0, ReleaseLevel::Final, 0), true, true)]
#[case(VersionInfo::full(3, 12, 1, ReleaseLevel::Final, 0), true, true)]
#[case(VersionInfo::full(3, 8, 10, ReleaseLevel::Final, 0), false, true)]
fn test_upgrade_deps_gating(
    #[case] version: VersionInfo,
    #[case] upgrade_deps: bool,
    #[case] accepted: bool,
) {
    let mut spec = EnvironmentSpec::new("venv");
    spec.params.upgrade_deps = upgrade_deps;
    let result = EnvBuilder::new(
        Path::new("/conf/venv.yaml"),
        &spec,
        &interpreter(version, false),
    );
    match result {
        Ok(_) => assert!(accepted),
        Err(Error::UnsupportedArgument(msg)) => {
            assert!(!accepted);
            assert!(msg.contains("'upgrade_deps'"), "{msg}");
        }
        Err(other) => panic!("unexpected error {other:?}"),
    }
}

#[rstest]
fn test_venv_args_defaults() {
    let spec = EnvironmentSpec::new("venv");
    let builder = EnvBuilder::new(Path::new("/conf/venv.yaml"), &spec, &python312()).unwrap();
    assert_eq!(
        builder.venv_args(Path::new("/conf/venv")),
        os_args(&["-m", "venv", "--copies", "/conf/venv"])
    );
}

#[rstest]
fn test_venv_args_all_flags() {
    let mut spec = EnvironmentSpec::new("venv");
    spec.params = BuilderParams {
        system_site_packages: true,
        clear: true,
        symlinks: SymlinkMode::Yes,
        upgrade: true,
        with_pip: false,
        prompt: Some("my env".to_string()),
        upgrade_deps: true,
    };
    let builder = EnvBuilder::new(Path::new("/conf/venv.yaml"), &spec, &python312()).unwrap();
    assert_eq!(
        builder.venv_args(Path::new("/conf/venv")),
        os_args(&[
            "-m",
            "venv",
            "--system-site-packages",
            "--symlinks",
            "--clear",
            "--upgrade",
            "--without-pip",
            "--prompt",
            "my env",
            "--upgrade-deps",
            "/conf/venv",
        ])
    );
}

#[rstest]
fn test_resolve_rel_path_uses_config_directory() {
    let spec = EnvironmentSpec::new("venv");
    let builder = EnvBuilder::new(Path::new("/conf/dir/venv.yaml"), &spec, &python312()).unwrap();
    assert_eq!(builder.resolve_rel_path("../venv"), PathBuf::from("/conf/venv"));
    assert_eq!(builder.resolve_rel_path("/abs/venv"), PathBuf::from("/abs/venv"));
}

#[rstest]
fn test_implicit_requirements_missing_is_skipped() {
    let (_tmp, dir) = conf_dir();
    let spec = EnvironmentSpec::new("venv");
    let builder = EnvBuilder::new(&dir.join("venv.yaml"), &spec, &python312()).unwrap();
    assert!(builder.resolve_requirement_files().unwrap().is_empty());
}

#[rstest]
fn test_implicit_requirements_present() {
    let (_tmp, dir) = conf_dir();
    std::fs::write(dir.join(REQUIREMENTS_TXT), "rich\n").unwrap();
    let spec = EnvironmentSpec::new("venv");
    let builder = EnvBuilder::new(&dir.join("venv.yaml"), &spec, &python312()).unwrap();
    assert_eq!(
        builder.resolve_requirement_files().unwrap(),
        vec![dir.join(REQUIREMENTS_TXT)]
    );
}

#[rstest]
fn test_explicit_empty_requirements() {
    let (_tmp, dir) = conf_dir();
    std::fs::write(dir.join(REQUIREMENTS_TXT), "rich\n").unwrap();
    let mut spec = EnvironmentSpec::new("venv");
    spec.provisioning.requirement_files = Some(Vec::new());
    let builder = EnvBuilder::new(&dir.join("venv.yaml"), &spec, &python312()).unwrap();
    assert!(builder.resolve_requirement_files().unwrap().is_empty());
}

#[rstest]
fn test_explicit_requirements_resolved_in_order() {
    let (_tmp, dir) = conf_dir();
    std::fs::create_dir(dir.join("reqs")).unwrap();
    std::fs::write(dir.join("reqs").join("dev.txt"), "pytest\n").unwrap();
    let absolute = dir.join("base.txt");
    std::fs::write(&absolute, "rich\n").unwrap();

    let mut spec = EnvironmentSpec::new("venv");
    spec.provisioning.requirement_files = Some(vec![
        "reqs/dev.txt".to_string(),
        absolute.to_string_lossy().into_owned(),
    ]);
    let builder = EnvBuilder::new(&dir.join("venv.yaml"), &spec, &python312()).unwrap();
    assert_eq!(
        builder.resolve_requirement_files().unwrap(),
        vec![dir.join("reqs").join("dev.txt"), absolute]
    );
}

#[rstest]
fn test_explicit_requirements_missing_is_fatal() {
    let (_tmp, dir) = conf_dir();
    let mut spec = EnvironmentSpec::new("venv");
    spec.provisioning.requirement_files = Some(vec!["missing.txt".to_string()]);
    let builder = EnvBuilder::new(&dir.join("venv.yaml"), &spec, &python312()).unwrap();
    let err = builder.resolve_requirement_files().unwrap_err();
    match err {
        Error::RequirementsNotFound(path) => assert_eq!(path, dir.join("missing.txt")),
        other => panic!("unexpected error {other:?}"),
    }
}

#[rstest]
#[case(None)]
#[case(Some(Vec::new()))]
fn test_install_pth_without_paths_is_noop(#[case] pth_paths: Option<Vec<String>>) {
    let (_tmp, dir) = conf_dir();
    let mut spec = EnvironmentSpec::new("venv");
    spec.provisioning.pth_paths = pth_paths;
    let builder = EnvBuilder::new(&dir.join("venv.yaml"), &spec, &python312()).unwrap();
    // The interpreter does not exist, so it must not be asked for anything.
    let context = EnvContext::from_env_dir(dir.join("venv"));
    assert_eq!(builder.install_pth(&context).unwrap(), 0);
}

#[cfg(unix)]
#[rstest]
fn test_env_context_layout() {
    let context = EnvContext::from_env_dir("/envs/venv");
    assert_eq!(context.env_exe, PathBuf::from("/envs/venv/bin/python"));
}

#[cfg(unix)]
#[rstest]
#[case("echo '[]'")]
#[case("echo '\"/site\"'")]
#[case("echo 'not json'")]
fn test_find_site_dir_rejects_unexpected_output(#[case] body: &str) {
    let (_tmp, dir) = conf_dir();
    let context = EnvContext::from_env_dir(dir.join("venv"));
    write_script(&context.env_exe, body);
    let err = context.find_site_dir().unwrap_err();
    assert!(matches!(err, Error::SiteDirUnresolved(_)), "got {err:?}");
}

#[cfg(unix)]
#[rstest]
fn test_find_site_dir_takes_first_entry() {
    let (_tmp, dir) = conf_dir();
    let context = EnvContext::from_env_dir(dir.join("venv"));
    write_script(&context.env_exe, "echo '[\"/first\", \"/second\"]'");
    assert_eq!(context.find_site_dir().unwrap(), PathBuf::from("/first"));
}

#[cfg(unix)]
#[rstest]
fn test_post_setup_runs_steps_in_order() {
    let (_tmp, dir) = conf_dir();
    let log = dir.join("calls.log");
    let site = dir.join("venv").join("lib").join("site-packages");
    std::fs::create_dir_all(&site).unwrap();
    std::fs::write(dir.join(REQUIREMENTS_TXT), "rich\n").unwrap();

    let mut spec = EnvironmentSpec::new("venv");
    spec.provisioning.wheel = true;
    spec.provisioning.pth_paths = Some(vec!["src".to_string()]);
    let builder = EnvBuilder::new(&dir.join("venv.yaml"), &spec, &python312()).unwrap();
    let context = EnvContext::from_env_dir(dir.join("venv"));
    write_script(&context.env_exe, &env_python_body(&log, &site));

    builder.post_setup(&context).unwrap();

    let calls = logged_calls(&log);
    assert_eq!(calls.len(), 4, "{calls:?}");
    assert_eq!(calls[0], "-m pip install --upgrade pip");
    assert_eq!(calls[1], "-m pip install wheel");
    assert_eq!(
        calls[2],
        format!("-m pip install -r {}", dir.join(REQUIREMENTS_TXT).display())
    );
    assert!(calls[3].starts_with("-c "), "{}", calls[3]);
    assert_eq!(
        std::fs::read_to_string(site.join("venv.pth")).unwrap(),
        "../../../src\n"
    );
}

#[cfg(unix)]
#[rstest]
fn test_post_setup_without_pip_only_installs_pth() {
    let (_tmp, dir) = conf_dir();
    let log = dir.join("calls.log");
    let site = dir.join("site");
    std::fs::create_dir_all(&site).unwrap();

    let mut spec = EnvironmentSpec::new("venv");
    spec.params.with_pip = false;
    spec.provisioning.wheel = true;
    spec.provisioning.pth_paths = Some(vec!["/opt/lib".to_string()]);
    spec.provisioning.pth_file = Some("extra.pth".to_string());
    let builder = EnvBuilder::new(&dir.join("venv.yaml"), &spec, &python312()).unwrap();
    let context = EnvContext::from_env_dir(dir.join("venv"));
    write_script(&context.env_exe, &env_python_body(&log, &site));

    builder.post_setup(&context).unwrap();

    let calls = logged_calls(&log);
    assert_eq!(calls.len(), 1, "{calls:?}");
    assert!(calls[0].starts_with("-c "));
    assert_eq!(
        std::fs::read_to_string(site.join("extra.pth")).unwrap(),
        "/opt/lib\n"
    );
}

#[cfg(unix)]
#[rstest]
fn test_post_setup_skips_requirements_when_disabled() {
    let (_tmp, dir) = conf_dir();
    let log = dir.join("calls.log");
    std::fs::write(dir.join(REQUIREMENTS_TXT), "rich\n").unwrap();

    let mut spec = EnvironmentSpec::new("venv");
    spec.provisioning.upgrade_pip = false;
    spec.provisioning.install_requirements = false;
    let builder = EnvBuilder::new(&dir.join("venv.yaml"), &spec, &python312()).unwrap();
    let context = EnvContext::from_env_dir(dir.join("venv"));
    write_script(&context.env_exe, &env_python_body(&log, &dir));

    builder.post_setup(&context).unwrap();
    assert!(logged_calls(&log).is_empty());
}

#[cfg(unix)]
#[rstest]
fn test_missing_requirement_file_aborts_provisioning() {
    let (_tmp, dir) = conf_dir();
    let log = dir.join("calls.log");
    let mut spec = EnvironmentSpec::new("venv");
    spec.provisioning.requirement_files = Some(vec!["missing.txt".to_string()]);
    spec.provisioning.pth_paths = Some(vec!["src".to_string()]);
    let builder = EnvBuilder::new(&dir.join("venv.yaml"), &spec, &python312()).unwrap();
    let context = EnvContext::from_env_dir(dir.join("venv"));
    write_script(&context.env_exe, &env_python_body(&log, &dir));

    let err = builder.post_setup(&context).unwrap_err();
    assert!(matches!(err, Error::RequirementsNotFound(_)));
    assert_eq!(logged_calls(&log), vec!["-m pip install --upgrade pip"]);
}

#[cfg(unix)]
#[rstest]
fn test_install_pth_exclusive_refuses_existing_file() {
    let (_tmp, dir) = conf_dir();
    let log = dir.join("calls.log");
    let site = dir.join("site");
    std::fs::create_dir_all(&site).unwrap();
    std::fs::write(site.join("venv.pth"), "existing\n").unwrap();

    let mut spec = EnvironmentSpec::new("venv");
    spec.provisioning.pth_paths = Some(vec!["src".to_string()]);
    let context = EnvContext::from_env_dir(dir.join("venv"));
    write_script(&context.env_exe, &env_python_body(&log, &site));

    let builder = EnvBuilder::new(&dir.join("venv.yaml"), &spec, &python312()).unwrap();
    let err = builder.install_pth(&context).unwrap_err();
    match err {
        Error::PthFileFailed { path, error } => {
            assert_eq!(path, site.join("venv.pth"));
            assert_eq!(error.kind(), std::io::ErrorKind::AlreadyExists);
        }
        other => panic!("unexpected error {other:?}"),
    }

    spec.provisioning.pth_lock_file_exclusive = false;
    let builder = EnvBuilder::new(&dir.join("venv.yaml"), &spec, &python312()).unwrap();
    assert_eq!(builder.install_pth(&context).unwrap(), 1);
    assert_eq!(builder.install_pth(&context).unwrap(), 0);
    assert_eq!(
        std::fs::read_to_string(site.join("venv.pth")).unwrap(),
        "existing\n../src\n"
    );
}

#[cfg(unix)]
#[rstest]
fn test_create_runs_venv_then_provisions() {
    let (_tmp, dir) = conf_dir();
    let venv_log = dir.join("venv.log");
    let env_log = dir.join("env.log");
    let site = dir.join("site");
    std::fs::create_dir_all(&site).unwrap();

    // The bootstrap interpreter installs the environment interpreter into
    // the directory given as its last argument.
    let template = dir.join("template").join("python");
    write_script(&template, &env_python_body(&env_log, &site));
    let bootstrap = dir.join("bootstrap").join("python");
    write_script(
        &bootstrap,
        &format!(
            "echo \"$*\" >> '{}'\nfor last; do :; done\nmkdir -p \"$last/bin\"\ncp '{}' \"$last/bin/python\"",
            venv_log.display(),
            template.display()
        ),
    );

    let mut spec = EnvironmentSpec::new("envs/venv");
    spec.provisioning.upgrade_pip = false;
    spec.provisioning.pth_paths = Some(vec!["src".to_string()]);
    spec.provisioning.pth_file = Some("venv.pth".to_string());
    let python = Interpreter::new(
        bootstrap,
        VersionInfo::full(3, 12, 0, ReleaseLevel::Final, 0),
        false,
    );
    let builder = EnvBuilder::new(&dir.join("venv.yaml"), &spec, &python).unwrap();

    let context = builder.create(&spec.directory).unwrap();

    let env_dir = dir.join("envs").join("venv");
    assert_eq!(context, EnvContext::from_env_dir(&env_dir));
    assert_eq!(
        logged_calls(&venv_log),
        vec![format!("-m venv --copies {}", env_dir.display())]
    );
    assert_eq!(logged_calls(&env_log).len(), 1);
    assert_eq!(
        std::fs::read_to_string(site.join("venv.pth")).unwrap(),
        "../src\n"
    );
}
