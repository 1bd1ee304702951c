use std::path::PathBuf;

use anyhow::Result;
use pyswitch_core::{CandidateBinaries, EnvironmentDescriptor};
use tracing::debug;

use crate::fs_utils::is_executable;
use crate::{SwitchError, SwitchLayout};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedEnvironment {
    pub env_dir: PathBuf,
    pub interpreter: PathBuf,
    pub launcher: Option<PathBuf>,
    pub warnings: Vec<String>,
}

/// Confirms the environment exists and picks the first executable candidate
/// interpreter. A missing launcher is a warning, not a failure.
pub fn verify_environment(
    layout: &SwitchLayout,
    environment: &EnvironmentDescriptor,
    candidates: &CandidateBinaries,
    launcher_name: &str,
) -> Result<VerifiedEnvironment> {
    let env_dir = layout.env_dir(environment);
    if !env_dir.is_dir() {
        return Err(SwitchError::EnvironmentMissing { path: env_dir }.into());
    }

    let bin_dir = layout.env_bin_dir(environment);
    let interpreter = layout
        .candidate_paths(environment, candidates)
        .into_iter()
        .inspect(|candidate| debug!(candidate = %candidate.display(), "probing interpreter"))
        .find(|candidate| is_executable(candidate))
        .ok_or_else(|| SwitchError::NoInterpreter {
            bin_dir: bin_dir.clone(),
            candidates: candidates.names().to_vec(),
        })?;

    let launcher_path = bin_dir.join(launcher_name);
    let mut warnings = Vec::new();
    let launcher = if is_executable(&launcher_path) {
        Some(launcher_path)
    } else {
        warnings.push(format!(
            "{launcher_name} not found in {}; leaving the global {launcher_name} link unchanged",
            bin_dir.display()
        ));
        None
    };

    Ok(VerifiedEnvironment {
        env_dir,
        interpreter,
        launcher,
        warnings,
    })
}
