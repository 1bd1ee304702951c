use std::fs;
use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use pyswitch_core::{BackupRecord, LinkRole};
use tracing::debug;

use crate::fs_utils::resolve_link_target;
use crate::SwitchLayout;

/// Resolves every global link to its real path. Links that are missing or
/// dangling are recorded as empty.
pub fn snapshot_links(layout: &SwitchLayout) -> BackupRecord {
    let mut record = BackupRecord::new();
    for role in LinkRole::ALL {
        let link = layout.link_path(role);
        let resolved = resolve_link_target(&link);
        debug!(role = role.as_str(), link = %link.display(), resolved = ?resolved, "snapshot");
        record.set(role, resolved);
    }
    record
}

pub fn write_backup_record(layout: &SwitchLayout, record: &BackupRecord) -> Result<PathBuf> {
    let path = layout.backup_path().to_path_buf();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let payload = record.serialize()?;
    fs::write(&path, payload.as_bytes())
        .with_context(|| format!("failed to write backup record: {}", path.display()))?;
    Ok(path)
}

pub fn read_backup_record(layout: &SwitchLayout) -> Result<Option<BackupRecord>> {
    let path = layout.backup_path();
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read backup record: {}", path.display()));
        }
    };

    Ok(Some(BackupRecord::parse(&raw)))
}
