use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{anyhow, Context, Result};
use tracing::debug;

use crate::fs_utils::remove_file_if_exists;
use crate::process::{require_success, CommandOutput};
use crate::SwitchError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkState {
    Missing,
    Symlink { target: PathBuf },
    File,
    Directory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverwritePolicy {
    /// Only missing paths and existing symlinks may be replaced.
    RefuseNonSymlink,
    /// Regular files in the way are replaced too.
    Force,
}

pub fn inspect_link(path: &Path) -> Result<LinkState> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(LinkState::Missing),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to inspect {}", path.display()));
        }
    };

    if metadata.file_type().is_symlink() {
        let target = fs::read_link(path)
            .with_context(|| format!("failed to read symlink {}", path.display()))?;
        return Ok(LinkState::Symlink { target });
    }
    if metadata.is_dir() {
        return Ok(LinkState::Directory);
    }
    Ok(LinkState::File)
}

/// Filesystem writes needed to rewire links. Implemented directly and
/// through `sudo`.
pub trait LinkOps {
    /// Points `path` at `target`, replacing whatever entry is there.
    fn install_symlink(&mut self, target: &Path, path: &Path) -> Result<()>;
    fn remove(&mut self, path: &Path) -> Result<()>;
    fn ensure_dir(&mut self, dir: &Path) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DirectLinkOps;

impl LinkOps for DirectLinkOps {
    fn install_symlink(&mut self, target: &Path, path: &Path) -> Result<()> {
        let staging = staging_link_path(path)?;
        remove_file_if_exists(&staging).with_context(|| {
            format!("failed to clear stale staging link {}", staging.display())
        })?;
        create_symlink(target, &staging)?;
        if let Err(err) = fs::rename(&staging, path) {
            let _ = fs::remove_file(&staging);
            return Err(err).with_context(|| {
                format!(
                    "failed to move link into place {} -> {}",
                    path.display(),
                    target.display()
                )
            });
        }
        Ok(())
    }

    fn remove(&mut self, path: &Path) -> Result<()> {
        remove_file_if_exists(path)
            .with_context(|| format!("failed to remove {}", path.display()))
    }

    fn ensure_dir(&mut self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))
    }
}

/// Runs `ln`/`rm`/`mkdir` through `sudo` using the injected runner.
pub struct ElevatedLinkOps<'a, RunCommand> {
    sudo: PathBuf,
    run: &'a mut RunCommand,
}

impl<'a, RunCommand> ElevatedLinkOps<'a, RunCommand>
where
    RunCommand: FnMut(&mut Command, &str) -> Result<CommandOutput>,
{
    pub fn new(sudo: impl Into<PathBuf>, run: &'a mut RunCommand) -> Self {
        Self {
            sudo: sudo.into(),
            run,
        }
    }

    fn exec(&mut self, args: &[OsString], context_message: &str) -> Result<()> {
        let mut command = Command::new(&self.sudo);
        command.args(args);
        let output = (self.run)(&mut command, context_message)?;
        require_success(output, context_message)?;
        Ok(())
    }
}

impl<RunCommand> LinkOps for ElevatedLinkOps<'_, RunCommand>
where
    RunCommand: FnMut(&mut Command, &str) -> Result<CommandOutput>,
{
    fn install_symlink(&mut self, target: &Path, path: &Path) -> Result<()> {
        self.exec(
            &[
                "ln".into(),
                "-sfn".into(),
                target.as_os_str().to_owned(),
                path.as_os_str().to_owned(),
            ],
            &format!("failed to link {} -> {}", path.display(), target.display()),
        )
    }

    fn remove(&mut self, path: &Path) -> Result<()> {
        self.exec(
            &["rm".into(), "-f".into(), path.as_os_str().to_owned()],
            &format!("failed to remove {}", path.display()),
        )
    }

    fn ensure_dir(&mut self, dir: &Path) -> Result<()> {
        self.exec(
            &["mkdir".into(), "-p".into(), dir.as_os_str().to_owned()],
            &format!("failed to create {}", dir.display()),
        )
    }
}

/// Points the link at `path` to `target` and returns what was there before.
///
/// A symlink or missing entry is always replaced. A regular file is only
/// replaced under [`OverwritePolicy::Force`]; a directory never is.
pub fn rewire_link(
    ops: &mut dyn LinkOps,
    path: &Path,
    target: &Path,
    policy: OverwritePolicy,
) -> Result<LinkState> {
    let previous = check_replaceable(path, policy)?;

    if let Some(parent) = path.parent() {
        if !parent.exists() {
            ops.ensure_dir(parent)?;
        }
    }

    debug!(link = %path.display(), target = %target.display(), ?previous, "rewiring link");
    ops.install_symlink(target, path)?;
    Ok(previous)
}

/// Inspects `path` and fails with [`SwitchError::LinkConflict`] when
/// `policy` does not allow replacing what is there.
pub fn check_replaceable(path: &Path, policy: OverwritePolicy) -> Result<LinkState> {
    let state = inspect_link(path)?;
    match (&state, policy) {
        (LinkState::Directory, _) | (LinkState::File, OverwritePolicy::RefuseNonSymlink) => {
            Err(SwitchError::LinkConflict {
                path: path.to_path_buf(),
            }
            .into())
        }
        _ => Ok(state),
    }
}

/// Checks every path up front so a conflict on one link is reported before
/// any other link is touched.
pub fn check_link_conflicts<'a, I>(paths: I, policy: OverwritePolicy) -> Result<()>
where
    I: IntoIterator<Item = &'a Path>,
{
    for path in paths {
        check_replaceable(path, policy)?;
    }
    Ok(())
}

/// Removes `path` only if it is a symlink. Returns whether anything was
/// removed.
pub fn remove_symlink_if_present(ops: &mut dyn LinkOps, path: &Path) -> Result<bool> {
    match inspect_link(path)? {
        LinkState::Symlink { .. } => {
            ops.remove(path)?;
            Ok(true)
        }
        _ => Ok(false),
    }
}

fn staging_link_path(path: &Path) -> Result<PathBuf> {
    let file_name = path
        .file_name()
        .ok_or_else(|| anyhow!("link path has no file name: {}", path.display()))?;
    let mut staging_name = OsString::from(".");
    staging_name.push(file_name);
    staging_name.push(format!(".pyswitch-{}", std::process::id()));
    Ok(path.with_file_name(staging_name))
}

fn create_symlink(target: &Path, link: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(target, link).with_context(|| {
            format!(
                "failed to create symlink {} -> {}",
                link.display(),
                target.display()
            )
        })
    }

    #[cfg(not(unix))]
    {
        Err(anyhow!(
            "symlink rewiring is only supported on unix hosts: {} -> {}",
            link.display(),
            target.display()
        ))
    }
}
