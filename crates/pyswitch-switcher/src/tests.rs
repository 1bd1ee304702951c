use super::*;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use pyswitch_core::{BackupRecord, CandidateBinaries, EnvironmentDescriptor, LinkRole};
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

static TEST_ROOT_COUNTER: AtomicU64 = AtomicU64::new(0);

fn test_root() -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    let mut path = std::env::temp_dir();
    path.push(format!(
        "pyswitch-switcher-tests-{}-{}-{}",
        std::process::id(),
        nanos,
        TEST_ROOT_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    fs::create_dir_all(&path).expect("must create test root");
    path
}

fn test_layout(root: &Path) -> SwitchLayout {
    SwitchLayout::new(root.join("conda"), root.join("bin")).with_state_files(
        root.join("tmp/python_symlinks_backup.txt"),
        root.join("tmp/rollback_python.sh"),
        root.join("tmp/test_version.py"),
    )
}

fn write_executable(path: &Path) {
    fs::create_dir_all(path.parent().expect("parent")).expect("must create parent");
    fs::write(path, "#!/bin/sh\nexit 0\n").expect("must write executable");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).expect("must chmod");
    }
}

fn command_line(command: &Command) -> Vec<String> {
    std::iter::once(command.get_program())
        .chain(command.get_args())
        .map(|part| part.to_string_lossy().into_owned())
        .collect()
}

fn ok_output(stdout: &str) -> CommandOutput {
    CommandOutput {
        success: true,
        code: Some(0),
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

fn env_310() -> EnvironmentDescriptor {
    EnvironmentDescriptor::new("newCondaEnvironment", "3.10").expect("valid env")
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) {
    fs::create_dir_all(link.parent().expect("parent")).expect("must create link dir");
    std::os::unix::fs::symlink(target, link).expect("must create symlink");
}

#[cfg(unix)]
#[test]
fn snapshot_records_resolved_targets_and_blanks_missing_links() {
    let root = test_root();
    let layout = test_layout(&root);
    let real = root.join("system/python3.8");
    write_executable(&real);
    symlink(&real, &layout.link_path(LinkRole::Python3));
    symlink(
        &root.join("system/gone"),
        &layout.link_path(LinkRole::Python),
    );

    let record = snapshot_links(&layout);
    let canonical = fs::canonicalize(&real).expect("canonical");
    assert_eq!(record.target(LinkRole::Python3), Some(canonical.as_path()));
    assert_eq!(record.target(LinkRole::Python), None, "dangling link is blank");
    assert_eq!(record.target(LinkRole::Jupyter), None, "missing link is blank");

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn backup_record_write_overwrites_and_reads_back() {
    let root = test_root();
    let layout = test_layout(&root);
    assert!(read_backup_record(&layout).expect("must read").is_none());

    fs::create_dir_all(layout.backup_path().parent().expect("parent")).expect("mkdir");
    fs::write(layout.backup_path(), "python=/stale\npython3=/stale\njupyter=/stale\n")
        .expect("seed stale record");

    let mut record = BackupRecord::new();
    record.set(LinkRole::Python, Some(PathBuf::from("/usr/bin/python3.8")));
    write_backup_record(&layout, &record).expect("must write");

    let raw = fs::read_to_string(layout.backup_path()).expect("must read raw");
    assert_eq!(raw, "python=/usr/bin/python3.8\npython3=\njupyter=\n");
    let read = read_backup_record(&layout)
        .expect("must read")
        .expect("record should exist");
    assert_eq!(read, record);

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn verify_fails_with_distinct_code_when_environment_missing() {
    let root = test_root();
    let layout = test_layout(&root);
    let env = env_310();

    let err = verify_environment(
        &layout,
        &env,
        &CandidateBinaries::for_environment(&env),
        "jupyter",
    )
    .expect_err("missing env must fail");
    let switch_err = err.downcast_ref::<SwitchError>().expect("typed error");
    assert!(matches!(switch_err, SwitchError::EnvironmentMissing { .. }));
    assert_eq!(switch_err.exit_code(), 3);

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn verify_fails_with_distinct_code_when_no_candidate_is_executable() {
    let root = test_root();
    let layout = test_layout(&root);
    let env = env_310();
    let bin_dir = layout.env_bin_dir(&env);
    fs::create_dir_all(&bin_dir).expect("mkdir");
    fs::write(bin_dir.join("python"), "not executable").expect("write plain file");

    let err = verify_environment(
        &layout,
        &env,
        &CandidateBinaries::for_environment(&env),
        "jupyter",
    )
    .expect_err("no executable candidate must fail");
    let switch_err = err.downcast_ref::<SwitchError>().expect("typed error");
    assert_eq!(switch_err.exit_code(), 4);
    assert!(switch_err.to_string().contains("python, python3, python3.10"));

    let _ = fs::remove_dir_all(&root);
}

#[cfg(unix)]
#[test]
fn verify_selects_first_executable_candidate_in_order() {
    let root = test_root();
    let layout = test_layout(&root);
    let env = env_310();
    let bin_dir = layout.env_bin_dir(&env);
    fs::create_dir_all(&bin_dir).expect("mkdir");
    fs::write(bin_dir.join("python3"), "not executable").expect("write plain file");
    write_executable(&bin_dir.join("python3.10"));

    let verified = verify_environment(
        &layout,
        &env,
        &CandidateBinaries::for_environment(&env),
        "jupyter",
    )
    .expect("must verify");
    assert_eq!(verified.interpreter, bin_dir.join("python3.10"));
    assert_eq!(verified.launcher, None);
    assert_eq!(verified.warnings.len(), 1);
    assert!(verified.warnings[0].contains("jupyter not found"));

    write_executable(&bin_dir.join("python"));
    write_executable(&bin_dir.join("jupyter"));
    let verified = verify_environment(
        &layout,
        &env,
        &CandidateBinaries::for_environment(&env),
        "jupyter",
    )
    .expect("must verify");
    assert_eq!(verified.interpreter, bin_dir.join("python"));
    assert_eq!(verified.launcher, Some(bin_dir.join("jupyter")));
    assert!(verified.warnings.is_empty());

    let _ = fs::remove_dir_all(&root);
}

#[cfg(unix)]
#[test]
fn rewire_replaces_existing_symlink_and_creates_missing_link() {
    let root = test_root();
    let layout = test_layout(&root);
    let old = root.join("system/python3.8");
    let new = root.join("conda/envs/x/bin/python3.10");
    write_executable(&old);
    write_executable(&new);
    let python = layout.link_path(LinkRole::Python);
    symlink(&old, &python);

    let previous = rewire_link(
        &mut DirectLinkOps,
        &python,
        &new,
        OverwritePolicy::RefuseNonSymlink,
    )
    .expect("must rewire");
    assert_eq!(previous, LinkState::Symlink { target: old.clone() });
    assert_eq!(fs::read_link(&python).expect("link"), new);

    let python3 = layout.link_path(LinkRole::Python3);
    let previous = rewire_link(
        &mut DirectLinkOps,
        &python3,
        &new,
        OverwritePolicy::RefuseNonSymlink,
    )
    .expect("must create");
    assert_eq!(previous, LinkState::Missing);
    assert_eq!(fs::read_link(&python3).expect("link"), new);

    let again = rewire_link(
        &mut DirectLinkOps,
        &python3,
        &new,
        OverwritePolicy::RefuseNonSymlink,
    )
    .expect("second rewire is idempotent");
    assert_eq!(again, LinkState::Symlink { target: new.clone() });

    let leftovers = fs::read_dir(layout.link_dir())
        .expect("read link dir")
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with('.'))
        .count();
    assert_eq!(leftovers, 0, "staging links must not be left behind");

    let _ = fs::remove_dir_all(&root);
}

#[cfg(unix)]
#[test]
fn rewire_refuses_regular_file_unless_forced() {
    let root = test_root();
    let layout = test_layout(&root);
    let new = root.join("conda/envs/x/bin/python3.10");
    write_executable(&new);
    let python = layout.link_path(LinkRole::Python);
    fs::create_dir_all(layout.link_dir()).expect("mkdir");
    fs::write(&python, "real binary").expect("seed real file");

    let err = rewire_link(
        &mut DirectLinkOps,
        &python,
        &new,
        OverwritePolicy::RefuseNonSymlink,
    )
    .expect_err("regular file must be protected");
    let switch_err = err.downcast_ref::<SwitchError>().expect("typed error");
    assert_eq!(switch_err.exit_code(), 5);
    assert_eq!(
        fs::read_to_string(&python).expect("file untouched"),
        "real binary"
    );

    let previous = rewire_link(&mut DirectLinkOps, &python, &new, OverwritePolicy::Force)
        .expect("forced rewire must replace file");
    assert_eq!(previous, LinkState::File);
    assert_eq!(fs::read_link(&python).expect("link"), new);

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn rewire_never_replaces_directory() {
    let root = test_root();
    let layout = test_layout(&root);
    let python = layout.link_path(LinkRole::Python);
    fs::create_dir_all(&python).expect("seed directory");

    let err = rewire_link(
        &mut DirectLinkOps,
        &python,
        Path::new("/nowhere/python"),
        OverwritePolicy::Force,
    )
    .expect_err("directory must never be replaced");
    assert!(matches!(
        err.downcast_ref::<SwitchError>(),
        Some(SwitchError::LinkConflict { .. })
    ));

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn elevated_link_ops_route_writes_through_sudo() {
    let root = test_root();
    let link_dir = root.join("missing-bin");
    let mut seen = Vec::new();
    let mut run = |command: &mut Command, _context: &str| -> Result<CommandOutput> {
        seen.push(command_line(command));
        Ok(ok_output(""))
    };

    {
        let mut ops = ElevatedLinkOps::new("/usr/bin/sudo", &mut run);
        rewire_link(
            &mut ops,
            &link_dir.join("python"),
            Path::new("/opt/conda/envs/x/bin/python"),
            OverwritePolicy::RefuseNonSymlink,
        )
        .expect("must rewire through sudo");
    }

    let link_dir_str = link_dir.display().to_string();
    let link_str = link_dir.join("python").display().to_string();
    assert_eq!(
        seen,
        vec![
            vec![
                "/usr/bin/sudo".to_string(),
                "mkdir".to_string(),
                "-p".to_string(),
                link_dir_str,
            ],
            vec![
                "/usr/bin/sudo".to_string(),
                "ln".to_string(),
                "-sfn".to_string(),
                "/opt/conda/envs/x/bin/python".to_string(),
                link_str,
            ],
        ]
    );

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn elevated_link_ops_surface_sudo_failures() {
    let mut run = |_command: &mut Command, _context: &str| -> Result<CommandOutput> {
        Ok(CommandOutput {
            success: false,
            code: Some(1),
            stdout: String::new(),
            stderr: "sudo: a password is required".to_string(),
        })
    };
    let mut ops = ElevatedLinkOps::new("sudo", &mut run);
    let err = ops
        .remove(Path::new("/usr/local/bin/python"))
        .expect_err("failed sudo must error");
    assert!(err.to_string().contains("password is required"));
}

#[test]
fn package_manager_builds_create_and_install_commands() {
    let env = env_310();
    let direct = PackageManager::new("conda", Elevation::Direct);
    assert_eq!(
        command_line(&direct.create_command(&env)),
        vec![
            "conda",
            "create",
            "--name",
            "newCondaEnvironment",
            "python=3.10",
            "--yes"
        ]
    );

    let elevated = PackageManager::new("conda", Elevation::Sudo(PathBuf::from("/usr/bin/sudo")));
    let packages = vec!["jupyter".to_string(), "numpy".to_string()];
    assert_eq!(
        command_line(&elevated.install_command(&env, &packages)),
        vec![
            "/usr/bin/sudo",
            "conda",
            "install",
            "--name",
            "newCondaEnvironment",
            "--yes",
            "jupyter",
            "numpy"
        ]
    );
    assert_eq!(command_line(&direct.list_command()), vec!["conda", "env", "list"]);
}

#[test]
fn package_manager_failure_propagates_tool_exit_status() {
    let env = env_310();
    let manager = PackageManager::new("conda", Elevation::Direct);
    let mut run = |_command: &mut Command, _context: &str| -> Result<CommandOutput> {
        Ok(CommandOutput {
            success: false,
            code: Some(17),
            stdout: String::new(),
            stderr: "PackagesNotFoundError".to_string(),
        })
    };

    let err = manager
        .create_environment(&env, &mut run)
        .expect_err("failed create must be fatal");
    let switch_err = err.downcast_ref::<SwitchError>().expect("typed error");
    assert_eq!(switch_err.exit_code(), 17);
    assert!(switch_err.to_string().contains("PackagesNotFoundError"));
}

#[test]
fn package_manager_list_is_best_effort() {
    let manager = PackageManager::new("conda", Elevation::Direct);
    let mut failing = |_command: &mut Command, _context: &str| -> Result<CommandOutput> {
        Err(anyhow::anyhow!("conda missing"))
    };
    assert_eq!(manager.list_environments(&mut failing), None);

    let mut listing = |_command: &mut Command, _context: &str| -> Result<CommandOutput> {
        Ok(ok_output("base * /opt/conda\n"))
    };
    assert_eq!(
        manager.list_environments(&mut listing).as_deref(),
        Some("base * /opt/conda\n")
    );
}

#[test]
fn external_tool_exit_code_falls_back_to_one_for_signals() {
    let err = SwitchError::ExternalTool {
        context: "create".to_string(),
        code: None,
        stderr: String::new(),
    };
    assert_eq!(err.exit_code(), 1);
}

#[test]
fn elevation_is_direct_for_writable_directory() {
    let root = test_root();
    assert_eq!(
        Elevation::detect_with(&root.join("not/yet/created"), None),
        Elevation::Direct
    );
    let leftovers = fs::read_dir(&root).expect("read root").count();
    assert_eq!(leftovers, 0, "write probe must clean up");

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn elevation_wraps_commands_with_sudo() {
    let elevation = Elevation::Sudo(PathBuf::from("/usr/bin/sudo"));
    assert!(elevation.is_elevated());
    assert_eq!(
        command_line(&elevation.command("conda")),
        vec!["/usr/bin/sudo", "conda"]
    );
    assert_eq!(command_line(&Elevation::Direct.command("conda")), vec!["conda"]);
}

#[cfg(unix)]
#[test]
fn find_on_path_skips_non_executables() {
    let root = test_root();
    let first = root.join("first");
    let second = root.join("second");
    fs::create_dir_all(&first).expect("mkdir");
    fs::write(first.join("sudo"), "plain").expect("plain file");
    write_executable(&second.join("sudo"));

    let path_var = std::env::join_paths([&first, &second]).expect("join paths");
    assert_eq!(
        find_on_path("sudo", &path_var),
        Some(second.join("sudo"))
    );
    assert_eq!(find_on_path("missing", OsStr::new("")), None);

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn restore_plan_prefers_recorded_python3_then_python_then_fallback() {
    let mut record = BackupRecord::new();
    record.set(LinkRole::Python, Some(PathBuf::from("/usr/bin/python2.7")));
    record.set(LinkRole::Python3, Some(PathBuf::from("/usr/bin/python3.8")));
    record.set(LinkRole::Jupyter, Some(PathBuf::from("/opt/conda/bin/jupyter")));
    let fallback = Path::new("/opt/conda/bin/python3.7");

    let all_usable = plan_restore(Some(&record), fallback, |_| true);
    assert_eq!(
        all_usable.interpreter,
        Some((
            RestoreSource::RecordedPython3,
            PathBuf::from("/usr/bin/python3.8")
        ))
    );
    assert_eq!(
        all_usable.launcher,
        Some(PathBuf::from("/opt/conda/bin/jupyter"))
    );

    let python3_gone = plan_restore(Some(&record), fallback, |path| {
        path != Path::new("/usr/bin/python3.8")
    });
    assert_eq!(
        python3_gone.interpreter,
        Some((
            RestoreSource::RecordedPython,
            PathBuf::from("/usr/bin/python2.7")
        ))
    );

    let only_fallback = plan_restore(Some(&record), fallback, |path| path == fallback);
    assert_eq!(
        only_fallback.interpreter,
        Some((RestoreSource::Fallback, fallback.to_path_buf()))
    );
    assert_eq!(only_fallback.launcher, None);

    let missing_record = plan_restore(None, fallback, |path| path == fallback);
    assert_eq!(
        missing_record.interpreter,
        Some((RestoreSource::Fallback, fallback.to_path_buf()))
    );

    let nothing = plan_restore(None, fallback, |_| false);
    assert_eq!(nothing.interpreter, None);
    assert_eq!(nothing.launcher, None);
}

#[cfg(unix)]
#[test]
fn apply_restore_relinks_recorded_targets_and_leaves_rest_absent() {
    let root = test_root();
    let layout = test_layout(&root);
    let original = root.join("system/python3.8");
    let env_python = root.join("conda/envs/x/bin/python3.10");
    let env_jupyter = root.join("conda/envs/x/bin/jupyter");
    write_executable(&original);
    write_executable(&env_python);
    write_executable(&env_jupyter);
    symlink(&env_python, &layout.link_path(LinkRole::Python));
    symlink(&env_python, &layout.link_path(LinkRole::Python3));
    symlink(&env_jupyter, &layout.link_path(LinkRole::Jupyter));

    let mut record = BackupRecord::new();
    record.set(LinkRole::Python3, Some(original.clone()));
    let plan = plan_restore(Some(&record), Path::new("/nonexistent/python3.7"), is_executable);

    let outcome =
        apply_restore(&mut DirectLinkOps, &layout, &plan).expect("restore must succeed");
    assert_eq!(outcome.removed, LinkRole::ALL.to_vec());
    assert_eq!(
        fs::read_link(layout.link_path(LinkRole::Python)).expect("link"),
        original
    );
    assert_eq!(
        fs::read_link(layout.link_path(LinkRole::Python3)).expect("link"),
        original
    );
    assert_eq!(
        inspect_link(&layout.link_path(LinkRole::Jupyter)).expect("inspect"),
        LinkState::Missing,
        "jupyter had no recorded target and stays absent"
    );

    let _ = fs::remove_dir_all(&root);
}

#[cfg(unix)]
#[test]
fn rollback_script_is_executable_and_embeds_escaped_paths() {
    use std::os::unix::fs::PermissionsExt;

    let root = test_root();
    let layout = SwitchLayout::new(root.join("conda"), root.join("it's bin")).with_state_files(
        root.join("tmp/backup.txt"),
        root.join("tmp/rollback_python.sh"),
        root.join("tmp/test_version.py"),
    );

    let path = write_rollback_script(&layout, Path::new("/opt/conda/bin/python3.7"))
        .expect("must write script");
    let mode = fs::metadata(&path).expect("metadata").permissions().mode();
    assert_eq!(mode & 0o777, 0o755);

    let script = fs::read_to_string(&path).expect("read script");
    assert!(script.starts_with("#!/bin/sh\n"));
    assert!(script.contains("FALLBACK_PYTHON='/opt/conda/bin/python3.7'"));
    assert!(script.contains(&format!("BACKUP_FILE='{}'", root.join("tmp/backup.txt").display())));
    assert!(script.contains("it'\"'\"'s bin"));
    let python3_check = script
        .find("[ -x \"$ORIG_PYTHON3\" ]")
        .expect("python3 check");
    let python_check = script.find("[ -x \"$ORIG_PYTHON\" ]").expect("python check");
    let fallback_check = script
        .find("[ -x \"$FALLBACK_PYTHON\" ]")
        .expect("fallback check");
    assert!(python3_check < python_check && python_check < fallback_check);

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn smoke_test_runs_script_with_given_interpreter_and_parses_rows() {
    let root = test_root();
    let layout = test_layout(&root);
    let imports = vec!["numpy".to_string(), "pandas".to_string()];
    let link = layout.link_path(LinkRole::Python);
    let mut seen = Vec::new();
    let mut run = |command: &mut Command, _context: &str| -> Result<CommandOutput> {
        seen.push(command_line(command));
        Ok(CommandOutput {
            success: false,
            code: Some(1),
            stdout: "interpreter\t3.10.14\t/x/python3.10\nok\tnumpy\t1.26.4\nfail\tpandas\tImportError: boom\n"
                .to_string(),
            stderr: String::new(),
        })
    };

    let (report, output) =
        run_smoke_test(&layout, &link, &imports, &mut run).expect("must run smoke test");
    assert!(!output.success);
    assert_eq!(report.interpreter_version.as_deref(), Some("3.10.14"));
    assert_eq!(report.checks.len(), 2);
    assert_eq!(report.failed().count(), 1);
    assert_eq!(
        seen,
        vec![vec![
            link.display().to_string(),
            layout.smoke_test_path().display().to_string()
        ]]
    );
    let script = fs::read_to_string(layout.smoke_test_path()).expect("script written");
    assert!(script.contains(r#"["numpy","pandas"]"#));

    let _ = fs::remove_dir_all(&root);
}

#[cfg(unix)]
#[test]
fn status_reports_links_and_versions_without_mutation() {
    let root = test_root();
    let layout = test_layout(&root);
    let env_python = root.join("conda/envs/x/bin/python3.10");
    write_executable(&env_python);
    symlink(&env_python, &layout.link_path(LinkRole::Python));

    let mut run = |command: &mut Command, _context: &str| -> Result<CommandOutput> {
        assert_eq!(command.get_args().collect::<Vec<_>>(), vec![OsStr::new("--version")]);
        Ok(CommandOutput {
            success: true,
            code: Some(0),
            stdout: String::new(),
            stderr: "Python 3.10.14\n".to_string(),
        })
    };
    let report = collect_status(&layout, &mut run);

    let canonical = fs::canonicalize(&env_python).expect("canonical");
    assert_eq!(
        report.link(LinkRole::Python).and_then(|l| l.resolved.clone()),
        Some(canonical)
    );
    assert_eq!(
        report.link(LinkRole::Jupyter).and_then(|l| l.resolved.clone()),
        None
    );
    assert_eq!(report.python_version.as_deref(), Some("Python 3.10.14"));
    assert_eq!(report.launcher_version, None);

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn phase_outcome_collapses_empty_warnings() {
    assert_eq!(PhaseOutcome::from_warnings(Vec::new()), PhaseOutcome::Completed);
    let warned = PhaseOutcome::from_warnings(vec!["jupyter missing".to_string()]);
    assert_eq!(warned.warnings(), ["jupyter missing".to_string()]);
}

#[cfg(unix)]
#[test]
fn link_conflicts_are_reported_before_any_link_changes() {
    let root = test_root();
    let layout = test_layout(&root);
    let old = root.join("system/python3.7");
    write_executable(&old);
    let python = layout.link_path(LinkRole::Python);
    let python3 = layout.link_path(LinkRole::Python3);
    symlink(&old, &python);
    fs::write(&python3, "real binary").expect("seed real file");

    let err = check_link_conflicts(
        [python.as_path(), python3.as_path()],
        OverwritePolicy::RefuseNonSymlink,
    )
    .expect_err("regular file must be reported");
    match err.downcast_ref::<SwitchError>() {
        Some(SwitchError::LinkConflict { path }) => assert_eq!(path, &python3),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(fs::read_link(&python).expect("link"), old);

    check_link_conflicts(
        [python.as_path(), python3.as_path()],
        OverwritePolicy::Force,
    )
    .expect("force accepts regular files");

    let _ = fs::remove_dir_all(&root);
}

#[cfg(unix)]
#[test]
fn apply_restore_skips_regular_file_and_restores_remaining_links() {
    let root = test_root();
    let layout = test_layout(&root);
    let original = root.join("orig/python3.9");
    let original_jupyter = root.join("orig/jupyter");
    let env_python = root.join("conda/envs/x/bin/python3.10");
    let env_jupyter = root.join("conda/envs/x/bin/jupyter");
    for path in [&original, &original_jupyter, &env_python, &env_jupyter] {
        write_executable(path);
    }
    fs::create_dir_all(layout.link_dir()).expect("mkdir");
    fs::write(layout.link_path(LinkRole::Python), "real binary").expect("seed real file");
    symlink(&env_python, &layout.link_path(LinkRole::Python3));
    symlink(&env_jupyter, &layout.link_path(LinkRole::Jupyter));

    let mut record = BackupRecord::new();
    record.set(LinkRole::Python3, Some(original.clone()));
    record.set(LinkRole::Jupyter, Some(original_jupyter.clone()));
    let plan = plan_restore(Some(&record), Path::new("/nonexistent/python3.7"), is_executable);

    let outcome =
        apply_restore(&mut DirectLinkOps, &layout, &plan).expect("restore must succeed");
    assert_eq!(outcome.skipped, vec![(LinkRole::Python, LinkState::File)]);
    assert_eq!(outcome.removed, vec![LinkRole::Python3, LinkRole::Jupyter]);
    assert_eq!(
        fs::read_to_string(layout.link_path(LinkRole::Python)).expect("file untouched"),
        "real binary"
    );
    assert_eq!(
        fs::read_link(layout.link_path(LinkRole::Python3)).expect("link"),
        original
    );
    assert_eq!(
        fs::read_link(layout.link_path(LinkRole::Jupyter)).expect("link"),
        original_jupyter
    );

    let _ = fs::remove_dir_all(&root);
}

/// Writes `record` (unless `None`), generates the script and runs it with
/// `sh`, the way a user would after a switch.
#[cfg(unix)]
fn run_generated_rollback(
    layout: &SwitchLayout,
    record: Option<&BackupRecord>,
    fallback: &Path,
) -> std::process::Output {
    if let Some(record) = record {
        write_backup_record(layout, record).expect("must write record");
    }
    let script = write_rollback_script(layout, fallback).expect("must write script");
    let output = Command::new("sh")
        .arg(&script)
        .output()
        .expect("must run rollback script");
    assert!(
        output.status.success(),
        "rollback script failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    output
}

/// Env links as left by a switch: all three point into the new environment.
#[cfg(unix)]
fn seed_switched_links(root: &Path, layout: &SwitchLayout) {
    let env_python = root.join("conda/envs/x/bin/python3.10");
    let env_jupyter = root.join("conda/envs/x/bin/jupyter");
    write_executable(&env_python);
    write_executable(&env_jupyter);
    symlink(&env_python, &layout.link_path(LinkRole::Python));
    symlink(&env_python, &layout.link_path(LinkRole::Python3));
    symlink(&env_jupyter, &layout.link_path(LinkRole::Jupyter));
}

#[cfg(unix)]
#[test]
fn rollback_script_restores_recorded_python3_and_jupyter() {
    let root = test_root();
    let layout = test_layout(&root);
    seed_switched_links(&root, &layout);
    let original = root.join("orig/python3.9");
    let original_python = root.join("orig/python2.7");
    let original_jupyter = root.join("orig/jupyter");
    for path in [&original, &original_python, &original_jupyter] {
        write_executable(path);
    }
    let mut record = BackupRecord::new();
    record.set(LinkRole::Python, Some(original_python));
    record.set(LinkRole::Python3, Some(original.clone()));
    record.set(LinkRole::Jupyter, Some(original_jupyter.clone()));

    run_generated_rollback(&layout, Some(&record), &root.join("conda/bin/python3.7"));

    for role in [LinkRole::Python, LinkRole::Python3] {
        assert_eq!(fs::read_link(layout.link_path(role)).expect("link"), original);
    }
    assert_eq!(
        fs::read_link(layout.link_path(LinkRole::Jupyter)).expect("link"),
        original_jupyter
    );

    let _ = fs::remove_dir_all(&root);
}

#[cfg(unix)]
#[test]
fn rollback_script_falls_through_to_recorded_python_then_fallback() {
    let root = test_root();
    let layout = test_layout(&root);
    seed_switched_links(&root, &layout);
    let original_python = root.join("orig/python2.7");
    let fallback = root.join("conda/bin/python3.7");
    write_executable(&original_python);
    write_executable(&fallback);
    let mut record = BackupRecord::new();
    record.set(LinkRole::Python, Some(original_python.clone()));
    record.set(LinkRole::Python3, Some(root.join("orig/removed-python3")));

    run_generated_rollback(&layout, Some(&record), &fallback);
    assert_eq!(
        fs::read_link(layout.link_path(LinkRole::Python3)).expect("link"),
        original_python
    );
    assert_eq!(
        inspect_link(&layout.link_path(LinkRole::Jupyter)).expect("inspect"),
        LinkState::Missing,
        "jupyter had no recorded target and stays absent"
    );

    fs::remove_file(&original_python).expect("remove recorded python");
    run_generated_rollback(&layout, None, &fallback);
    for role in [LinkRole::Python, LinkRole::Python3] {
        assert_eq!(fs::read_link(layout.link_path(role)).expect("link"), fallback);
    }

    let _ = fs::remove_dir_all(&root);
}

#[cfg(unix)]
#[test]
fn rollback_script_without_record_or_fallback_leaves_links_absent() {
    let root = test_root();
    let layout = test_layout(&root);
    seed_switched_links(&root, &layout);

    let output = run_generated_rollback(&layout, None, &root.join("conda/bin/python3.7"));

    for role in LinkRole::ALL {
        assert_eq!(
            inspect_link(&layout.link_path(role)).expect("inspect"),
            LinkState::Missing
        );
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("not found"), "{stderr}");
    assert!(stderr.contains("no usable interpreter"), "{stderr}");

    let _ = fs::remove_dir_all(&root);
}

#[cfg(unix)]
#[test]
fn rollback_script_leaves_regular_file_in_place_like_apply_restore() {
    let root = test_root();
    let layout = test_layout(&root);
    let original = root.join("orig/python3.9");
    write_executable(&original);
    fs::create_dir_all(layout.link_dir()).expect("mkdir");
    fs::write(layout.link_path(LinkRole::Python), "real binary").expect("seed real file");
    let mut record = BackupRecord::new();
    record.set(LinkRole::Python3, Some(original.clone()));

    let output = run_generated_rollback(&layout, Some(&record), &root.join("conda/bin/python3.7"));

    assert_eq!(
        fs::read_to_string(layout.link_path(LinkRole::Python)).expect("file untouched"),
        "real binary"
    );
    assert_eq!(
        fs::read_link(layout.link_path(LinkRole::Python3)).expect("link"),
        original
    );
    assert!(String::from_utf8_lossy(&output.stderr).contains("is not a symlink"));

    let _ = fs::remove_dir_all(&root);
}
