mod completion;
mod dispatch;
mod logging;
mod render;
mod switch_flow;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};
use pyswitch_core::ConfigOverrides;
use pyswitch_switcher::SwitchError;

use crate::render::{render_status_line, resolve_output_style};

#[derive(Parser, Debug)]
#[command(name = "pyswitch")]
#[command(
    about = "Switch the notebook interpreter to a fresh conda environment",
    long_about = None
)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    /// TOML file overriding the built-in paths and package lists.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, short, global = true)]
    verbose: bool,
    /// Disable color and progress output.
    #[arg(long, global = true)]
    plain: bool,
    #[command(flatten)]
    switch: SwitchArgs,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
struct SwitchArgs {
    /// Interpreter version for the new environment [default: 3.8].
    version: Option<String>,
    /// Name of the environment to create [default: newCondaEnvironment].
    #[arg(long)]
    env_name: Option<String>,
    /// Replace regular files that sit where a link should go.
    #[arg(long)]
    force: bool,
    /// Print the planned changes without touching anything.
    #[arg(long)]
    dry_run: bool,
}

impl SwitchArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            python_version: self.version.clone(),
            env_name: self.env_name.clone(),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the environment and repoint python/python3/jupyter at it.
    Switch(SwitchArgs),
    /// Restore the links captured before the last switch.
    Rollback,
    /// Show where the global links point and what they report.
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Print a shell completion script.
    Completions {
        #[arg(value_enum)]
        shell: CliCompletionShell,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliCompletionShell {
    Bash,
    Zsh,
    Fish,
    Powershell,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_cli_logger(cli.verbose);
    let style = resolve_output_style(cli.plain);

    match dispatch::run_cli(cli, style) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", render_status_line(style, "fail", &format!("{err:#}")));
            ExitCode::from(exit_code_for(&err))
        }
    }
}

fn exit_code_for(err: &anyhow::Error) -> u8 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<SwitchError>())
        .map(SwitchError::exit_code)
        .unwrap_or(1)
}
