use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use pyswitch_core::{BackupRecord, LinkRole};
use tracing::{debug, warn};

use crate::links::{
    inspect_link, remove_symlink_if_present, rewire_link, LinkOps, LinkState, OverwritePolicy,
};
use crate::SwitchLayout;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreSource {
    RecordedPython3,
    RecordedPython,
    Fallback,
}

impl RestoreSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RecordedPython3 => "recorded python3",
            Self::RecordedPython => "recorded python",
            Self::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestorePlan {
    pub interpreter: Option<(RestoreSource, PathBuf)>,
    pub launcher: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreOutcome {
    pub removed: Vec<LinkRole>,
    pub relinked: Vec<(LinkRole, PathBuf)>,
    /// Roles left alone because something other than a symlink sits at the
    /// link path.
    pub skipped: Vec<(LinkRole, LinkState)>,
}

/// Chooses restore targets: recorded `python3`, then recorded `python`, then
/// `fallback`, each only if `is_usable` accepts it. The launcher is restored
/// only from its own recorded target.
pub fn plan_restore<F>(record: Option<&BackupRecord>, fallback: &Path, is_usable: F) -> RestorePlan
where
    F: Fn(&Path) -> bool,
{
    let recorded = |role: LinkRole| {
        record
            .and_then(|record| record.target(role))
            .filter(|path| is_usable(*path))
            .map(Path::to_path_buf)
    };

    let interpreter = recorded(LinkRole::Python3)
        .map(|path| (RestoreSource::RecordedPython3, path))
        .or_else(|| recorded(LinkRole::Python).map(|path| (RestoreSource::RecordedPython, path)))
        .or_else(|| {
            is_usable(fallback).then(|| (RestoreSource::Fallback, fallback.to_path_buf()))
        });

    RestorePlan {
        interpreter,
        launcher: recorded(LinkRole::Jupyter),
    }
}

/// Removes the global symlinks, then relinks whatever `plan` names. Links
/// with no usable target stay absent.
///
/// A regular file or directory at a link path is never removed or replaced.
/// That role is reported in [`RestoreOutcome::skipped`] and the remaining
/// roles are still restored.
pub fn apply_restore(
    ops: &mut dyn LinkOps,
    layout: &SwitchLayout,
    plan: &RestorePlan,
) -> Result<RestoreOutcome> {
    let mut skipped = Vec::new();
    for role in LinkRole::ALL {
        let state = inspect_link(&layout.link_path(role))?;
        if matches!(state, LinkState::File | LinkState::Directory) {
            warn!(role = role.as_str(), ?state, "leaving non-symlink in place");
            skipped.push((role, state));
        }
    }
    let is_skipped = |role: LinkRole| skipped.iter().any(|(skipped, _)| *skipped == role);

    let mut removed = Vec::new();
    for role in LinkRole::ALL.into_iter().filter(|role| !is_skipped(*role)) {
        if remove_symlink_if_present(ops, &layout.link_path(role))? {
            removed.push(role);
        }
    }

    let mut targets = Vec::new();
    if let Some((source, target)) = &plan.interpreter {
        debug!(source = source.as_str(), target = %target.display(), "restoring interpreter links");
        targets.push((LinkRole::Python, target));
        targets.push((LinkRole::Python3, target));
    }
    if let Some(target) = &plan.launcher {
        targets.push((LinkRole::Jupyter, target));
    }

    let mut relinked = Vec::new();
    for (role, target) in targets.into_iter().filter(|(role, _)| !is_skipped(*role)) {
        rewire_link(
            ops,
            &layout.link_path(role),
            target,
            OverwritePolicy::RefuseNonSymlink,
        )?;
        relinked.push((role, target.clone()));
    }

    Ok(RestoreOutcome {
        removed,
        relinked,
        skipped,
    })
}

/// Standalone POSIX shell equivalent of [`plan_restore`] + [`apply_restore`].
pub fn render_rollback_script(layout: &SwitchLayout, fallback: &Path) -> String {
    let backup = escape_single_quote_shell(&layout.backup_path().display().to_string());
    let link_dir = escape_single_quote_shell(&layout.link_dir().display().to_string());
    let fallback = escape_single_quote_shell(&fallback.display().to_string());

    format!(
        r#"#!/bin/sh
# Restores the interpreter links recorded before the last pyswitch run.
set -u

BACKUP_FILE='{backup}'
LINK_DIR='{link_dir}'
FALLBACK_PYTHON='{fallback}'

SUDO=""
if [ "$(id -u)" -ne 0 ] && [ ! -w "$LINK_DIR" ] && command -v sudo >/dev/null 2>&1; then
    SUDO="sudo"
fi

# Only symlinks are ever removed or created; anything else is left in place.
relink() {{
    if [ -e "$2" ] && [ ! -L "$2" ]; then
        echo "warning: $2 is not a symlink; leaving it in place" >&2
        return 1
    fi
    $SUDO ln -sn "$1" "$2"
}}

for role in python python3 jupyter; do
    if [ -L "$LINK_DIR/$role" ]; then
        $SUDO rm -f "$LINK_DIR/$role"
    fi
done

ORIG_PYTHON=""
ORIG_PYTHON3=""
ORIG_JUPYTER=""
if [ -f "$BACKUP_FILE" ]; then
    while IFS='=' read -r key value || [ -n "$key" ]; do
        case "$key" in
            python) ORIG_PYTHON="$value" ;;
            python3) ORIG_PYTHON3="$value" ;;
            jupyter) ORIG_JUPYTER="$value" ;;
        esac
    done < "$BACKUP_FILE"
else
    echo "warning: backup record $BACKUP_FILE not found" >&2
fi

TARGET=""
if [ -n "$ORIG_PYTHON3" ] && [ -x "$ORIG_PYTHON3" ]; then
    TARGET="$ORIG_PYTHON3"
elif [ -n "$ORIG_PYTHON" ] && [ -x "$ORIG_PYTHON" ]; then
    TARGET="$ORIG_PYTHON"
elif [ -x "$FALLBACK_PYTHON" ]; then
    echo "warning: recorded interpreters unusable; using fallback $FALLBACK_PYTHON" >&2
    TARGET="$FALLBACK_PYTHON"
fi

if [ -n "$TARGET" ]; then
    for role in python python3; do
        relink "$TARGET" "$LINK_DIR/$role" && echo "$role -> $TARGET"
    done
else
    echo "warning: no usable interpreter found; python links left absent" >&2
fi

if [ -n "$ORIG_JUPYTER" ] && [ -x "$ORIG_JUPYTER" ]; then
    relink "$ORIG_JUPYTER" "$LINK_DIR/jupyter" && echo "jupyter -> $ORIG_JUPYTER"
fi

"$LINK_DIR/python" --version 2>&1 || echo "python: not available"
"$LINK_DIR/jupyter" --version 2>&1 || echo "jupyter: not available"
exit 0
"#
    )
}

pub fn write_rollback_script(layout: &SwitchLayout, fallback: &Path) -> Result<PathBuf> {
    let path = layout.rollback_script_path().to_path_buf();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(&path, render_rollback_script(layout, fallback).as_bytes())
        .with_context(|| format!("failed writing rollback script: {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut permissions = fs::metadata(&path)
            .with_context(|| format!("failed to inspect rollback script: {}", path.display()))?
            .permissions();
        permissions.set_mode(0o755);
        fs::set_permissions(&path, permissions).with_context(|| {
            format!(
                "failed setting rollback script permissions: {}",
                path.display()
            )
        })?;
    }

    Ok(path)
}

fn escape_single_quote_shell(value: &str) -> String {
    value.replace('\'', "'\"'\"'")
}
