use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::Result;
use pyswitch_core::{BackupRecord, CandidateBinaries, LinkRole, SmokeReport, SwitchConfig};
use pyswitch_switcher::{
    check_link_conflicts, collect_status, inspect_link, probe_version, resolve_link_target,
    rewire_link, run_smoke_test, snapshot_links, verify_environment, write_backup_record,
    write_rollback_script, CommandOutput, DirectLinkOps, Elevation, ElevatedLinkOps, LinkOps,
    LinkState, OverwritePolicy, PackageManager, PhaseOutcome, StatusReport, SwitchLayout,
    VerifiedEnvironment,
};

use crate::render::{TerminalProgress, TerminalRenderer};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum SwitchPhase {
    Snapshot,
    Create,
    Install,
    Verify,
    Rewire,
    PostVerify,
    RollbackScript,
    Summary,
}

impl SwitchPhase {
    pub(crate) const ALL: [SwitchPhase; 8] = [
        SwitchPhase::Snapshot,
        SwitchPhase::Create,
        SwitchPhase::Install,
        SwitchPhase::Verify,
        SwitchPhase::Rewire,
        SwitchPhase::PostVerify,
        SwitchPhase::RollbackScript,
        SwitchPhase::Summary,
    ];

    pub(crate) fn label(self) -> &'static str {
        match self {
            Self::Snapshot => "snapshot",
            Self::Create => "create",
            Self::Install => "install",
            Self::Verify => "verify",
            Self::Rewire => "rewire",
            Self::PostVerify => "post-verify",
            Self::RollbackScript => "rollback-script",
            Self::Summary => "summary",
        }
    }

    fn title(self) -> &'static str {
        match self {
            Self::Snapshot => "Snapshot current links",
            Self::Create => "Create environment",
            Self::Install => "Install packages",
            Self::Verify => "Verify environment",
            Self::Rewire => "Rewire global links",
            Self::PostVerify => "Post-switch checks",
            Self::RollbackScript => "Write rollback script",
            Self::Summary => "Summary",
        }
    }
}

/// Everything a switch needs, resolved up front so phases never consult
/// process-global state.
pub(crate) struct SwitchContext<'a> {
    pub(crate) config: &'a SwitchConfig,
    pub(crate) layout: SwitchLayout,
    pub(crate) package_manager: PackageManager,
    pub(crate) link_elevation: Elevation,
    pub(crate) overwrite: OverwritePolicy,
}

impl SwitchContext<'_> {
    pub(crate) fn candidates(&self) -> CandidateBinaries {
        CandidateBinaries::for_environment(&self.config.environment)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LinkChange {
    pub(crate) role: LinkRole,
    pub(crate) target: PathBuf,
    pub(crate) previous: LinkState,
}

#[derive(Debug)]
pub(crate) struct SwitchReport {
    pub(crate) backup: BackupRecord,
    pub(crate) verified: VerifiedEnvironment,
    pub(crate) changes: Vec<LinkChange>,
    pub(crate) smoke: Option<SmokeReport>,
    pub(crate) rollback_script: PathBuf,
    pub(crate) status: StatusReport,
    pub(crate) warnings: Vec<String>,
}

/// Runs the eight phases in order. The first fatal error stops the run.
/// Link conflicts are detected before the package manager runs and again
/// before the first link is written, so a refused run leaves every link as
/// it was.
pub(crate) fn run_switch<RunCommand>(
    ctx: &SwitchContext<'_>,
    renderer: TerminalRenderer,
    run: &mut RunCommand,
) -> Result<SwitchReport>
where
    RunCommand: FnMut(&mut Command, &str) -> Result<CommandOutput>,
{
    let mut progress = renderer.start_progress("switch", SwitchPhase::ALL.len() as u64);
    match run_phases(ctx, &mut progress, run) {
        Ok(report) => {
            progress.finish_success();
            Ok(report)
        }
        Err(err) => {
            progress.finish_abandon();
            Err(err)
        }
    }
}

fn run_phases<RunCommand>(
    ctx: &SwitchContext<'_>,
    progress: &mut TerminalProgress,
    run: &mut RunCommand,
) -> Result<SwitchReport>
where
    RunCommand: FnMut(&mut Command, &str) -> Result<CommandOutput>,
{
    let mut warnings = Vec::new();
    let environment = &ctx.config.environment;

    enter_phase(progress, SwitchPhase::Snapshot);
    let backup = snapshot_links(&ctx.layout);
    let backup_path = write_backup_record(&ctx.layout, &backup)?;
    for role in LinkRole::ALL {
        progress.status("info", &describe_recorded(role, backup.target(role)));
    }
    progress.status(
        "ok",
        &format!("backup record written to {}", backup_path.display()),
    );

    let interpreter_links =
        [LinkRole::Python, LinkRole::Python3].map(|role| ctx.layout.link_path(role));
    check_link_conflicts(interpreter_links.iter().map(PathBuf::as_path), ctx.overwrite)?;

    enter_phase(progress, SwitchPhase::Create);
    ctx.package_manager.create_environment(environment, run)?;
    ctx.package_manager.list_environments(run);
    progress.status(
        "ok",
        &format!(
            "created environment '{}' with python {}",
            environment.name, environment.python_version
        ),
    );

    enter_phase(progress, SwitchPhase::Install);
    ctx.package_manager
        .install_packages(environment, &ctx.config.packages, run)?;
    progress.status(
        "ok",
        &format!("installed {}", ctx.config.packages.join(" ")),
    );

    enter_phase(progress, SwitchPhase::Verify);
    let verified = verify_environment(
        &ctx.layout,
        environment,
        &ctx.candidates(),
        &ctx.config.launcher,
    )?;
    progress.status(
        "ok",
        &format!("interpreter: {}", verified.interpreter.display()),
    );
    if let Some(launcher) = &verified.launcher {
        progress.status("ok", &format!("launcher: {}", launcher.display()));
    }
    report_outcome(
        progress,
        &PhaseOutcome::from_warnings(verified.warnings.clone()),
        &mut warnings,
    );
    let planned = planned_links(&verified);
    let planned_paths = planned
        .iter()
        .map(|(role, _)| ctx.layout.link_path(*role))
        .collect::<Vec<_>>();
    check_link_conflicts(planned_paths.iter().map(PathBuf::as_path), ctx.overwrite)?;

    enter_phase(progress, SwitchPhase::Rewire);
    let changes = with_link_ops(&ctx.link_elevation, run, |ops| {
        rewire_links(ops, &ctx.layout, &planned, ctx.overwrite)
    })?;
    for change in &changes {
        progress.status(
            "ok",
            &format!(
                "{} -> {} (was {})",
                ctx.layout.link_path(change.role).display(),
                change.target.display(),
                describe_state(&change.previous)
            ),
        );
    }

    enter_phase(progress, SwitchPhase::PostVerify);
    let (smoke, outcome) = post_switch_checks(ctx, &verified, progress, run);
    report_outcome(progress, &outcome, &mut warnings);

    enter_phase(progress, SwitchPhase::RollbackScript);
    let rollback_script = write_rollback_script(&ctx.layout, &ctx.config.fallback_interpreter)?;
    progress.status(
        "ok",
        &format!("rollback script written to {}", rollback_script.display()),
    );

    enter_phase(progress, SwitchPhase::Summary);
    let status = collect_status(&ctx.layout, run);
    for line in format_status_lines(&status) {
        progress.println(&line);
    }
    progress.set(SwitchPhase::ALL.len() as u64, "done");

    Ok(SwitchReport {
        backup,
        verified,
        changes,
        smoke,
        rollback_script,
        status,
        warnings,
    })
}

fn enter_phase(progress: &mut TerminalProgress, phase: SwitchPhase) {
    let index = SwitchPhase::ALL
        .iter()
        .position(|candidate| *candidate == phase)
        .unwrap_or_default();
    progress.set(index as u64, phase.label());
    progress.section(phase.title());
    tracing::debug!(phase = phase.label(), "entering phase");
}

fn report_outcome(progress: &TerminalProgress, outcome: &PhaseOutcome, sink: &mut Vec<String>) {
    for warning in outcome.warnings() {
        progress.status("warn", warning);
        sink.push(warning.clone());
    }
}

/// Runs `f` with link operations matching `elevation`.
pub(crate) fn with_link_ops<RunCommand, T, F>(
    elevation: &Elevation,
    run: &mut RunCommand,
    f: F,
) -> Result<T>
where
    RunCommand: FnMut(&mut Command, &str) -> Result<CommandOutput>,
    F: FnOnce(&mut dyn LinkOps) -> Result<T>,
{
    match elevation {
        Elevation::Direct => f(&mut DirectLinkOps),
        Elevation::Sudo(sudo) => f(&mut ElevatedLinkOps::new(sudo.clone(), run)),
    }
}

/// The links a switch will write, in order. `jupyter` is only included when
/// the launcher was found.
fn planned_links(verified: &VerifiedEnvironment) -> Vec<(LinkRole, PathBuf)> {
    let mut planned = vec![
        (LinkRole::Python, verified.interpreter.clone()),
        (LinkRole::Python3, verified.interpreter.clone()),
    ];
    if let Some(launcher) = &verified.launcher {
        planned.push((LinkRole::Jupyter, launcher.clone()));
    }
    planned
}

fn rewire_links(
    ops: &mut dyn LinkOps,
    layout: &SwitchLayout,
    planned: &[(LinkRole, PathBuf)],
    overwrite: OverwritePolicy,
) -> Result<Vec<LinkChange>> {
    let mut changes = Vec::new();
    for (role, target) in planned {
        let previous = rewire_link(ops, &layout.link_path(*role), target, overwrite)?;
        changes.push(LinkChange {
            role: *role,
            target: target.clone(),
            previous,
        });
    }
    Ok(changes)
}

/// Best-effort checks after rewiring. Nothing here fails the run.
fn post_switch_checks<RunCommand>(
    ctx: &SwitchContext<'_>,
    verified: &VerifiedEnvironment,
    progress: &TerminalProgress,
    run: &mut RunCommand,
) -> (Option<SmokeReport>, PhaseOutcome)
where
    RunCommand: FnMut(&mut Command, &str) -> Result<CommandOutput>,
{
    let mut warnings = Vec::new();
    let env_dir = resolve_link_target(&verified.env_dir).unwrap_or_else(|| verified.env_dir.clone());

    for role in LinkRole::ALL {
        let link = ctx.layout.link_path(role);
        match resolve_link_target(&link) {
            Some(resolved) => {
                progress.status("info", &format!("{} -> {}", link.display(), resolved.display()));
                let expected_in_env = role.is_interpreter() || verified.launcher.is_some();
                if expected_in_env && !resolved.starts_with(&env_dir) {
                    warnings.push(format!(
                        "{} resolves outside {}: {}",
                        link.display(),
                        env_dir.display(),
                        resolved.display()
                    ));
                }
            }
            None => progress.status("info", &format!("{} -> (unresolved)", link.display())),
        }
    }

    match probe_version(&verified.interpreter, run) {
        Some(version) => progress.status("ok", &format!("interpreter reports {version}")),
        None => warnings.push(format!(
            "could not read version from {}",
            verified.interpreter.display()
        )),
    }
    if let Some(launcher) = &verified.launcher {
        match probe_version(launcher, run) {
            Some(version) => progress.status("ok", &format!("launcher reports {version}")),
            None => warnings.push(format!(
                "could not read version from {}",
                launcher.display()
            )),
        }
    }

    let python_link = ctx.layout.link_path(LinkRole::Python);
    let smoke = match run_smoke_test(&ctx.layout, &python_link, &ctx.config.smoke_imports, run) {
        Ok((report, output)) => {
            for line in format_smoke_lines(&report) {
                progress.println(&line);
            }
            warnings.extend(smoke_warnings(&report, &ctx.config.smoke_imports, &output));
            Some(report)
        }
        Err(err) => {
            warnings.push(format!("import smoke test did not run: {err:#}"));
            None
        }
    };

    (smoke, PhaseOutcome::from_warnings(warnings))
}

pub(crate) fn smoke_warnings(
    report: &SmokeReport,
    requested: &[String],
    output: &CommandOutput,
) -> Vec<String> {
    let mut warnings = report
        .failed()
        .map(|check| format!("import {} failed", check.module))
        .collect::<Vec<_>>();
    let unreported = report.unreported(requested);
    if !unreported.is_empty() {
        warnings.push(format!(
            "import smoke test did not report: {}",
            unreported.join(", ")
        ));
    }
    if !output.success && report.checks.is_empty() {
        let detail = output.stderr.trim();
        warnings.push(format!(
            "import smoke test exited with status {}{}",
            output
                .code
                .map(|code| code.to_string())
                .unwrap_or_else(|| "signal".to_string()),
            if detail.is_empty() {
                String::new()
            } else {
                format!(": {detail}")
            }
        ));
    }
    warnings
}

pub(crate) fn format_smoke_lines(report: &SmokeReport) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(version) = &report.interpreter_version {
        lines.push(format!("python {version}"));
    }
    for check in &report.checks {
        match &check.status {
            pyswitch_core::ImportStatus::Imported { version } => {
                lines.push(format!("  {:<12} {}", check.module, version));
            }
            pyswitch_core::ImportStatus::Failed { reason } => {
                lines.push(format!("  {:<12} FAILED ({reason})", check.module));
            }
        }
    }
    lines
}

pub(crate) fn format_status_lines(status: &StatusReport) -> Vec<String> {
    let mut lines = Vec::new();
    for link in &status.links {
        let resolved = link
            .resolved
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "(missing)".to_string());
        lines.push(format!(
            "{:<8} {} -> {}",
            link.role.as_str(),
            link.path.display(),
            resolved
        ));
    }
    lines.push(format!(
        "python version:  {}",
        status.python_version.as_deref().unwrap_or("(unavailable)")
    ));
    lines.push(format!(
        "jupyter version: {}",
        status.launcher_version.as_deref().unwrap_or("(unavailable)")
    ));
    lines
}

/// Dry-run preview: what would be created and which links would move.
pub(crate) fn render_switch_plan(ctx: &SwitchContext<'_>) -> Result<Vec<String>> {
    let environment = &ctx.config.environment;
    let bin_dir = ctx.layout.env_bin_dir(environment);
    let mut lines = vec![
        format!(
            "environment: {} (python {})",
            environment.name, environment.python_version
        ),
        format!("location:    {}", ctx.layout.env_dir(environment).display()),
        format!(
            "candidates:  {} (first executable wins)",
            ctx.candidates().names().join(", ")
        ),
        format!("packages:    {}", ctx.config.packages.join(" ")),
    ];

    for role in LinkRole::ALL {
        let link = ctx.layout.link_path(role);
        let state = inspect_link(&link)?;
        let target = if role.is_interpreter() {
            format!("{}/<first candidate>", bin_dir.display())
        } else {
            format!(
                "{} (only if present)",
                bin_dir.join(&ctx.config.launcher).display()
            )
        };
        let blocked = matches!(state, LinkState::Directory)
            || (matches!(state, LinkState::File) && ctx.overwrite == OverwritePolicy::RefuseNonSymlink);
        lines.push(format!(
            "link:        {} ({}) -> {}{}",
            link.display(),
            describe_state(&state),
            target,
            if blocked { " [blocked: pass --force]" } else { "" }
        ));
    }

    lines.push(format!("backup:      {}", ctx.layout.backup_path().display()));
    lines.push(format!(
        "rollback:    {}",
        ctx.layout.rollback_script_path().display()
    ));
    if ctx.link_elevation.is_elevated() {
        lines.push("links will be written through sudo".to_string());
    }
    Ok(lines)
}

fn describe_recorded(role: LinkRole, target: Option<&Path>) -> String {
    match target {
        Some(target) => format!("recorded {} -> {}", role.as_str(), target.display()),
        None => format!("recorded {} -> (none)", role.as_str()),
    }
}

pub(crate) fn describe_state(state: &LinkState) -> String {
    match state {
        LinkState::Missing => "missing".to_string(),
        LinkState::Symlink { target } => format!("symlink to {}", target.display()),
        LinkState::File => "regular file".to_string(),
        LinkState::Directory => "directory".to_string(),
    }
}
