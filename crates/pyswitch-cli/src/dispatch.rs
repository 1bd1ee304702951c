use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use pyswitch_core::{
    env_overrides_from, ConfigOverrides, LinkRole, SwitchConfig, SwitchConfigFile,
    CONFIG_PATH_ENV,
};
use pyswitch_switcher::{
    apply_restore, collect_status, find_on_path, is_executable, plan_restore, read_backup_record,
    run_command, Elevation, OverwritePolicy, PackageManager, RestoreOutcome, RestorePlan,
    SwitchLayout,
};

use crate::completion::write_completions_script;
use crate::render::{OutputStyle, TerminalRenderer};
use crate::switch_flow::{
    describe_state, format_status_lines, render_switch_plan, run_switch, with_link_ops,
    SwitchContext, SwitchReport,
};
use crate::{Cli, Commands, SwitchArgs};

pub(crate) fn run_cli(cli: Cli, style: OutputStyle) -> Result<()> {
    let renderer = TerminalRenderer::from_style(style);
    let config_path = cli.config;
    match cli.command {
        None => run_switch_command(config_path.as_deref(), &cli.switch, renderer),
        Some(Commands::Switch(args)) => run_switch_command(config_path.as_deref(), &args, renderer),
        Some(Commands::Rollback) => {
            let config = load_config(config_path.as_deref(), ConfigOverrides::default())?;
            run_rollback_command(&config, renderer)
        }
        Some(Commands::Status { json }) => {
            let config = load_config(config_path.as_deref(), ConfigOverrides::default())?;
            run_status_command(&config, json, renderer)
        }
        Some(Commands::Completions { shell }) => {
            let mut stdout = std::io::stdout();
            write_completions_script(shell, &mut stdout)
        }
    }
}

/// Loads the optional TOML file (`--config`, else `PYSWITCH_CONFIG`) and
/// layers environment and command-line overrides on top.
pub(crate) fn load_config(
    config_path: Option<&Path>,
    cli_overrides: ConfigOverrides,
) -> Result<SwitchConfig> {
    let config_path = config_path.map(Path::to_path_buf).or_else(|| {
        std::env::var_os(CONFIG_PATH_ENV)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
    });
    let file = match &config_path {
        Some(path) => SwitchConfigFile::load(path)?,
        None => SwitchConfigFile::default(),
    };
    let env = env_overrides_from(|key| std::env::var(key).ok());
    SwitchConfig::resolve(file, env, cli_overrides).context("invalid pyswitch configuration")
}

/// Detects elevation for the install root and the link directory and, when
/// the package manager must run through sudo, pins it to an absolute path so
/// sudo's restricted PATH cannot hide it.
pub(crate) fn build_context(config: &SwitchConfig, force: bool) -> SwitchContext<'_> {
    let layout = SwitchLayout::from_config(config);
    let path_var = std::env::var_os("PATH");
    let root_elevation = Elevation::detect_with(layout.envs_dir().as_path(), path_var.as_deref());
    let link_elevation = Elevation::detect_with(layout.link_dir(), path_var.as_deref());

    let program = if root_elevation.is_elevated() && !config.package_manager.contains('/') {
        path_var
            .as_deref()
            .and_then(|value| find_on_path(&config.package_manager, value))
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| config.package_manager.clone())
    } else {
        config.package_manager.clone()
    };
    tracing::debug!(
        program = %program,
        root_elevated = root_elevation.is_elevated(),
        links_elevated = link_elevation.is_elevated(),
        "resolved switch context"
    );

    SwitchContext {
        config,
        layout,
        package_manager: PackageManager::new(program, root_elevation),
        link_elevation,
        overwrite: if force {
            OverwritePolicy::Force
        } else {
            OverwritePolicy::RefuseNonSymlink
        },
    }
}

fn run_switch_command(
    config_path: Option<&Path>,
    args: &SwitchArgs,
    renderer: TerminalRenderer,
) -> Result<()> {
    let config = load_config(config_path, args.overrides())?;
    let ctx = build_context(&config, args.force);

    if args.dry_run {
        renderer.print_section("Planned switch");
        renderer.print_lines(&render_switch_plan(&ctx)?);
        renderer.print_status("info", "dry run: nothing was changed");
        return Ok(());
    }

    let mut run = run_command;
    let report = run_switch(&ctx, renderer, &mut run)?;
    renderer.print_lines(&summary_lines(&ctx, &report));
    Ok(())
}

pub(crate) fn summary_lines(ctx: &SwitchContext<'_>, report: &SwitchReport) -> Vec<String> {
    let environment = &ctx.config.environment;
    let mut lines = vec![format!(
        "switched to '{}' (python {}) using {}",
        environment.name,
        environment.python_version,
        report.verified.interpreter.display()
    )];
    lines.push(format!(
        "rewired {} link(s); previous python3: {}",
        report.changes.len(),
        report
            .backup
            .target(LinkRole::Python3)
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "(none)".to_string())
    ));
    if let Some(smoke) = &report.smoke {
        let failed = smoke.failed().count();
        lines.push(format!(
            "import smoke test: {} of {} module(s) imported",
            smoke.checks.len() - failed,
            ctx.config.smoke_imports.len()
        ));
    }
    if let Some(version) = &report.status.python_version {
        lines.push(format!("global python reports {version}"));
    }
    if !report.warnings.is_empty() {
        lines.push(format!("{} warning(s) reported above", report.warnings.len()));
    }
    lines.push(format!(
        "to undo: pyswitch rollback  (or: sh {})",
        report.rollback_script.display()
    ));
    lines
}

fn run_rollback_command(config: &SwitchConfig, renderer: TerminalRenderer) -> Result<()> {
    let layout = SwitchLayout::from_config(config);
    let record = match read_backup_record(&layout) {
        Ok(record) => record,
        Err(err) => {
            renderer.print_status(
                "warn",
                &format!("ignoring unreadable backup record: {err:#}"),
            );
            None
        }
    };
    if record.is_none() {
        renderer.print_status(
            "warn",
            &format!("no backup record at {}", layout.backup_path().display()),
        );
    }

    let plan = plan_restore(record.as_ref(), &config.fallback_interpreter, is_executable);
    let elevation = Elevation::detect(layout.link_dir());
    let mut run = run_command;
    let outcome = with_link_ops(&elevation, &mut run, |ops| {
        apply_restore(ops, &layout, &plan)
    })?;

    renderer.print_section("Rollback");
    for (role, state) in &outcome.skipped {
        renderer.print_status(
            "warn",
            &format!(
                "{} is a {}, not a symlink; left in place",
                layout.link_path(*role).display(),
                describe_state(state)
            ),
        );
    }
    renderer.print_lines(&rollback_lines(&layout, &plan, &outcome));
    let status = collect_status(&layout, &mut run);
    renderer.print_lines(&format_status_lines(&status));
    Ok(())
}

pub(crate) fn rollback_lines(
    layout: &SwitchLayout,
    plan: &RestorePlan,
    outcome: &RestoreOutcome,
) -> Vec<String> {
    let mut lines = Vec::new();
    if !outcome.removed.is_empty() {
        lines.push(format!(
            "removed: {}",
            outcome
                .removed
                .iter()
                .map(LinkRole::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        ));
    }
    for (role, target) in &outcome.relinked {
        lines.push(format!("{} restored to {}", role.as_str(), target.display()));
    }
    match &plan.interpreter {
        Some((source, _)) => lines.push(format!("interpreter source: {}", source.as_str())),
        None => lines.push(format!(
            "no usable interpreter recorded or at the fallback; {} and {} left absent",
            layout.link_path(LinkRole::Python).display(),
            layout.link_path(LinkRole::Python3).display()
        )),
    }
    lines
}

fn run_status_command(config: &SwitchConfig, json: bool, renderer: TerminalRenderer) -> Result<()> {
    let layout = SwitchLayout::from_config(config);
    let mut run = run_command;
    let status = collect_status(&layout, &mut run);
    if json {
        let rendered =
            serde_json::to_string_pretty(&status).context("failed to serialize status report")?;
        println!("{rendered}");
        return Ok(());
    }
    if renderer.style() == OutputStyle::Rich {
        renderer.print_section("Interpreter links");
    }
    renderer.print_lines(&format_status_lines(&status));
    Ok(())
}
