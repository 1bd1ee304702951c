use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkRole {
    Python,
    Python3,
    Jupyter,
}

impl LinkRole {
    pub const ALL: [LinkRole; 3] = [LinkRole::Python, LinkRole::Python3, LinkRole::Jupyter];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::Python3 => "python3",
            Self::Jupyter => "jupyter",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "python" => Ok(Self::Python),
            "python3" => Ok(Self::Python3),
            "jupyter" => Ok(Self::Jupyter),
            _ => Err(anyhow!("invalid link role: {value}")),
        }
    }

    pub fn is_interpreter(&self) -> bool {
        matches!(self, Self::Python | Self::Python3)
    }
}

/// Pre-switch snapshot of where each global link resolved.
///
/// Serialized as one `role=path` row per role in [`LinkRole::ALL`] order. A
/// role whose link was missing or unresolvable keeps an empty path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackupRecord {
    targets: BTreeMap<LinkRole, PathBuf>,
}

impl BackupRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, role: LinkRole, target: Option<PathBuf>) {
        match target {
            Some(target) if !target.as_os_str().is_empty() => {
                self.targets.insert(role, target);
            }
            _ => {
                self.targets.remove(&role);
            }
        }
    }

    pub fn target(&self, role: LinkRole) -> Option<&Path> {
        self.targets.get(&role).map(PathBuf::as_path)
    }

    pub fn serialize(&self) -> Result<String> {
        let mut payload = String::new();
        for role in LinkRole::ALL {
            let value = match self.target(role) {
                Some(path) => path
                    .to_str()
                    .ok_or_else(|| {
                        anyhow!(
                            "backup target for {} is not valid UTF-8: {}",
                            role.as_str(),
                            path.display()
                        )
                    })?
                    .to_string(),
                None => String::new(),
            };
            if value.contains('\n') || value.contains('\r') {
                return Err(anyhow!(
                    "backup target for {} must not contain newlines",
                    role.as_str()
                ));
            }
            payload.push_str(&format!("{}={}\n", role.as_str(), value));
        }
        Ok(payload)
    }

    /// Reads rows the way the rollback script's `IFS='=' read -r key value`
    /// loop does: keys and values are taken verbatim, a row without `=` is a
    /// key with an empty value, and unknown keys are ignored. Later rows win.
    pub fn parse(raw: &str) -> Self {
        let mut record = Self::new();
        for line in raw.lines() {
            let (key, value) = line.split_once('=').unwrap_or((line, ""));
            let Ok(role) = LinkRole::parse(key) else {
                continue;
            };
            record.set(role, (!value.is_empty()).then(|| PathBuf::from(value)));
        }
        record
    }
}
