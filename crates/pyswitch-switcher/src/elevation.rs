use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::fs_utils::{existing_ancestor, is_executable};

/// How commands that touch a shared location are launched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Elevation {
    Direct,
    Sudo(PathBuf),
}

impl Elevation {
    /// `Direct` when `dir` (or its nearest existing ancestor) is writable by
    /// the current user, `Sudo` when it is not and `sudo` is on `PATH`.
    pub fn detect(dir: &Path) -> Self {
        Self::detect_with(dir, std::env::var_os("PATH").as_deref())
    }

    pub fn detect_with(dir: &Path, path_var: Option<&OsStr>) -> Self {
        if is_writable_dir(dir) {
            return Self::Direct;
        }
        match path_var.and_then(|value| find_on_path("sudo", value)) {
            Some(sudo) => {
                debug!(dir = %dir.display(), sudo = %sudo.display(), "using sudo for writes");
                Self::Sudo(sudo)
            }
            None => {
                debug!(dir = %dir.display(), "directory not writable and sudo unavailable");
                Self::Direct
            }
        }
    }

    pub fn is_elevated(&self) -> bool {
        matches!(self, Self::Sudo(_))
    }

    pub fn command(&self, program: impl AsRef<OsStr>) -> Command {
        match self {
            Self::Direct => Command::new(program),
            Self::Sudo(sudo) => {
                let mut command = Command::new(sudo);
                command.arg(program);
                command
            }
        }
    }
}

pub fn find_on_path(program: &str, path_var: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(path_var)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
}

fn is_writable_dir(dir: &Path) -> bool {
    let Some(existing) = existing_ancestor(dir) else {
        return false;
    };
    let mut probe_name = OsString::from(".pyswitch-write-probe-");
    probe_name.push(std::process::id().to_string());
    let probe = existing.join(probe_name);

    match fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&probe)
    {
        Ok(_) => {
            let _ = fs::remove_file(&probe);
            true
        }
        Err(_) => false,
    }
}
