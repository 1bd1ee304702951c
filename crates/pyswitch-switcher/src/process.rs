use std::process::Command;

use anyhow::{Context, Result};
use tracing::debug;

use crate::SwitchError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// stdout, or stderr when stdout is empty. Older interpreters print
    /// `--version` to stderr.
    pub fn first_line(&self) -> Option<String> {
        [&self.stdout, &self.stderr]
            .into_iter()
            .flat_map(|stream| stream.lines())
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
    }
}

/// Runs `command` to completion and captures its output. A non-zero exit is
/// not an error here; see [`require_success`].
pub fn run_command(command: &mut Command, context_message: &str) -> Result<CommandOutput> {
    debug!(command = %describe_command(command), "{context_message}");
    let output = command
        .output()
        .with_context(|| format!("{context_message}: command failed to start"))?;

    let captured = CommandOutput {
        success: output.status.success(),
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };
    debug!(
        success = captured.success,
        code = ?captured.code,
        stdout = %captured.stdout.trim(),
        stderr = %captured.stderr.trim(),
        "{context_message}: finished"
    );
    Ok(captured)
}

pub fn require_success(output: CommandOutput, context_message: &str) -> Result<CommandOutput> {
    if output.success {
        return Ok(output);
    }

    Err(SwitchError::ExternalTool {
        context: context_message.to_string(),
        code: output.code,
        stderr: output.stderr.trim().to_string(),
    }
    .into())
}

pub fn describe_command(command: &Command) -> String {
    std::iter::once(command.get_program())
        .chain(command.get_args())
        .map(|part| part.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}
