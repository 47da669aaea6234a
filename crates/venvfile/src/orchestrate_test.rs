// Copyright (c) Contributors to the venvfile project.
// SPDX-License-Identifier: Apache-2.0

use rstest::{fixture, rstest};
use tempfile::TempDir;

use super::*;
use crate::pyver::ReleaseLevel;

struct Workspace {
    _tmp: TempDir,
    dir: PathBuf,
}

impl Workspace {
    fn write_config(&self, name: &str, yaml: &str) -> PathBuf {
        let path = self.dir.join(name);
        std::fs::write(&path, yaml).unwrap();
        path
    }
}

#[fixture]
fn workspace() -> Workspace {
    let tmp = TempDir::new().unwrap();
    let dir = dunce::canonicalize(tmp.path()).unwrap();
    Workspace { _tmp: tmp, dir }
}

/// An interpreter that is never executed by the code under test.
fn unused_interpreter(symlinks_required: bool) -> Interpreter {
    Interpreter::new(
        PathBuf::from("/nonexistent/python3"),
        VersionInfo::full(3, 11, 4, ReleaseLevel::Final, 0),
        symlinks_required,
    )
}

#[rstest]
fn test_incompatible_file_is_skipped(workspace: Workspace) {
    let path = workspace.write_config(
        "future.yaml",
        "min_version: \"3.12\"\nvenv_configs:\n  - directory: venv\n",
    );
    let report = build_from_files(&[&path], &unused_interpreter(false)).unwrap();
    assert!(report.built.is_empty());
    assert_eq!(report.skipped_files, vec![path]);
    assert!(report.skipped_environments.is_empty());
}

#[rstest]
fn test_incompatible_environments_are_recorded(workspace: Workspace) {
    let path = workspace.write_config(
        "envs.yaml",
        r#"
venv_configs:
  - directory: old
    max_version: "3.10"
  - directory: new
    min_version: "3.13"
"#,
    );
    let report = build_from_files(&[&path], &unused_interpreter(false)).unwrap();
    assert!(report.built.is_empty());
    assert_eq!(
        report.skipped_environments,
        vec![
            SkippedEnvironment {
                conf_path: path.clone(),
                index: 0,
                directory: "old".to_string(),
            },
            SkippedEnvironment {
                conf_path: path,
                index: 1,
                directory: "new".to_string(),
            },
        ]
    );
}

#[rstest]
fn test_skipped_file_does_not_stop_later_files(workspace: Workspace) {
    let skipped = workspace.write_config("a.yaml", "max_version: \"3.11\"\n");
    let empty = workspace.write_config("b.yaml", "venv_configs: []\n");
    let report = build_from_files(&[&skipped, &empty], &unused_interpreter(false)).unwrap();
    assert_eq!(report.skipped_files, vec![skipped]);
}

#[rstest]
fn test_invalid_config_aborts(workspace: Workspace) {
    let broken = workspace.write_config("a.yaml", "venv_configs:\n  - bogus: 1\n");
    let never_read = workspace.dir.join("missing.yaml");
    let err = build_from_files(&[&broken, &never_read], &unused_interpreter(false)).unwrap_err();
    assert!(matches!(err, Error::InvalidYaml { .. }), "got {err:?}");
}

#[rstest]
fn test_missing_config_aborts(workspace: Workspace) {
    let err = build_from_files(
        &[workspace.dir.join("missing.yaml")],
        &unused_interpreter(false),
    )
    .unwrap_err();
    assert!(matches!(err, Error::ReadFailed { .. }));
}

#[rstest]
fn test_plan_describes_each_environment(workspace: Workspace) {
    let path = workspace.write_config(
        "plan.yaml",
        r#"
venv_configs:
  - directory: venv
    symlinks: true
  - directory: old
    max_version: "3.10"
    symlinks: false
"#,
    );
    let skipped = workspace.write_config("skipped.yaml", "min_version: \"4\"\n");

    let plan = plan_from_files(&[&path, &skipped], &unused_interpreter(true)).unwrap();

    assert_eq!(plan.len(), 2);
    assert_eq!(
        plan[0],
        PlannedFile::Load {
            path: path.clone(),
            environments: vec![
                PlannedEnvironment {
                    index: 0,
                    directory: "venv".to_string(),
                    env_dir: workspace.dir.join("venv"),
                    command: Some(format!(
                        "/nonexistent/python3 -m venv --symlinks {}",
                        workspace.dir.join("venv").display()
                    )),
                },
                PlannedEnvironment {
                    index: 1,
                    directory: "old".to_string(),
                    env_dir: workspace.dir.join("old"),
                    command: None,
                },
            ],
        }
    );
    match &plan[1] {
        PlannedFile::Skipped { path, reason } => {
            assert_eq!(path, &skipped);
            assert!(reason.starts_with("The minimum required Python version"));
        }
        other => panic!("expected a skipped file, got {other:?}"),
    }
    assert!(!workspace.dir.join("venv").exists());
}

#[rstest]
fn test_plan_surfaces_unsupported_settings(workspace: Workspace) {
    let path = workspace.write_config(
        "plan.yaml",
        "venv_configs:\n  - directory: venv\n    symlinks: false\n",
    );
    let err = plan_from_files(&[&path], &unused_interpreter(true)).unwrap_err();
    assert!(matches!(err, Error::UseSymlinks));
}

#[cfg(unix)]
#[rstest]
fn test_build_from_files_creates_in_order(workspace: Workspace) {
    use std::os::unix::fs::PermissionsExt;

    let log = workspace.dir.join("venv.log");
    let bootstrap = workspace.dir.join("python");
    std::fs::write(
        &bootstrap,
        format!(
            "#!/bin/sh\nfor last; do :; done\necho \"$last\" >> '{}'\n",
            log.display()
        ),
    )
    .unwrap();
    let mut perms = std::fs::metadata(&bootstrap).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&bootstrap, perms).unwrap();

    // Without pip and .pth paths, nothing runs inside the new environments.
    let first = workspace.write_config(
        "first.yaml",
        "venv_configs:\n  - directory: one\n    with_pip: false\n  - directory: skipped\n    min_version: \"3.12\"\n",
    );
    let second = workspace.write_config(
        "second.yaml",
        "venv_configs:\n  - directory: two\n    with_pip: false\n",
    );
    let interpreter = Interpreter::new(
        bootstrap,
        VersionInfo::full(3, 11, 4, ReleaseLevel::Final, 0),
        false,
    );

    let report = build_from_files(&[&first, &second], &interpreter).unwrap();

    let one = workspace.dir.join("one");
    let two = workspace.dir.join("two");
    assert_eq!(
        report.built,
        vec![EnvContext::from_env_dir(&one), EnvContext::from_env_dir(&two)]
    );
    assert_eq!(report.skipped_environments.len(), 1);
    assert_eq!(
        std::fs::read_to_string(&log).unwrap(),
        format!("{}\n{}\n", one.display(), two.display())
    );
}
