use std::path::PathBuf;

use thiserror::Error;

pub const EXIT_ENVIRONMENT_MISSING: u8 = 3;
pub const EXIT_NO_INTERPRETER: u8 = 4;
pub const EXIT_LINK_CONFLICT: u8 = 5;

/// Failures that stop a switch outright. Each maps to a process exit code.
#[derive(Debug, Error)]
pub enum SwitchError {
    #[error("environment directory was not created: {}", .path.display())]
    EnvironmentMissing { path: PathBuf },

    #[error(
        "no executable interpreter found in {} (tried: {})",
        .bin_dir.display(),
        .candidates.join(", ")
    )]
    NoInterpreter {
        bin_dir: PathBuf,
        candidates: Vec<String>,
    },

    #[error(
        "refusing to replace non-symlink {}; pass --force to overwrite it",
        .path.display()
    )]
    LinkConflict { path: PathBuf },

    #[error("{context}: exit status {} stderr='{stderr}'", display_code(.code))]
    ExternalTool {
        context: String,
        code: Option<i32>,
        stderr: String,
    },
}

impl SwitchError {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::EnvironmentMissing { .. } => EXIT_ENVIRONMENT_MISSING,
            Self::NoInterpreter { .. } => EXIT_NO_INTERPRETER,
            Self::LinkConflict { .. } => EXIT_LINK_CONFLICT,
            Self::ExternalTool { code, .. } => match code {
                Some(code) if (1..=255).contains(code) => *code as u8,
                _ => 1,
            },
        }
    }
}

fn display_code(code: &Option<i32>) -> String {
    match code {
        Some(value) => value.to_string(),
        None => "signal".to_string(),
    }
}
