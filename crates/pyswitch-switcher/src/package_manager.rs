use std::process::Command;

use anyhow::Result;
use pyswitch_core::EnvironmentDescriptor;
use tracing::{debug, warn};

use crate::process::{require_success, CommandOutput};
use crate::Elevation;

/// Drives the conda-compatible CLI that materializes environments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageManager {
    program: String,
    elevation: Elevation,
}

impl PackageManager {
    pub fn new(program: impl Into<String>, elevation: Elevation) -> Self {
        Self {
            program: program.into(),
            elevation,
        }
    }

    pub fn create_command(&self, environment: &EnvironmentDescriptor) -> Command {
        let mut command = self.elevation.command(&self.program);
        command
            .arg("create")
            .arg("--name")
            .arg(&environment.name)
            .arg(environment.interpreter_pin())
            .arg("--yes");
        command
    }

    pub fn install_command(&self, environment: &EnvironmentDescriptor, packages: &[String]) -> Command {
        let mut command = self.elevation.command(&self.program);
        command
            .arg("install")
            .arg("--name")
            .arg(&environment.name)
            .arg("--yes")
            .args(packages);
        command
    }

    pub fn list_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.arg("env").arg("list");
        command
    }

    pub fn create_environment<RunCommand>(
        &self,
        environment: &EnvironmentDescriptor,
        run: &mut RunCommand,
    ) -> Result<CommandOutput>
    where
        RunCommand: FnMut(&mut Command, &str) -> Result<CommandOutput>,
    {
        let context_message = format!(
            "failed to create environment '{}' with python {}",
            environment.name, environment.python_version
        );
        let output = run(&mut self.create_command(environment), &context_message)?;
        require_success(output, &context_message)
    }

    pub fn install_packages<RunCommand>(
        &self,
        environment: &EnvironmentDescriptor,
        packages: &[String],
        run: &mut RunCommand,
    ) -> Result<CommandOutput>
    where
        RunCommand: FnMut(&mut Command, &str) -> Result<CommandOutput>,
    {
        let context_message = format!(
            "failed to install {} package(s) into '{}'",
            packages.len(),
            environment.name
        );
        let output = run(
            &mut self.install_command(environment, packages),
            &context_message,
        )?;
        require_success(output, &context_message)
    }

    /// Best-effort `env list`; failures are logged and yield `None`.
    pub fn list_environments<RunCommand>(&self, run: &mut RunCommand) -> Option<String>
    where
        RunCommand: FnMut(&mut Command, &str) -> Result<CommandOutput>,
    {
        match run(&mut self.list_command(), "list environments") {
            Ok(output) if output.success => {
                debug!(environments = %output.stdout.trim(), "environment list");
                Some(output.stdout)
            }
            Ok(output) => {
                warn!(code = ?output.code, "environment list exited unsuccessfully");
                None
            }
            Err(err) => {
                warn!(error = %err, "environment list failed");
                None
            }
        }
    }
}
