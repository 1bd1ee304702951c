use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::Result;
use pyswitch_core::LinkRole;
use serde::Serialize;

use crate::fs_utils::resolve_link_target;
use crate::process::CommandOutput;
use crate::SwitchLayout;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkStatus {
    pub role: LinkRole,
    pub path: PathBuf,
    pub resolved: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub links: Vec<LinkStatus>,
    pub python_version: Option<String>,
    pub launcher_version: Option<String>,
}

impl StatusReport {
    pub fn link(&self, role: LinkRole) -> Option<&LinkStatus> {
        self.links.iter().find(|link| link.role == role)
    }
}

/// `<binary> --version`, first non-empty output line. Failures yield `None`.
pub fn probe_version<RunCommand>(binary: &Path, run: &mut RunCommand) -> Option<String>
where
    RunCommand: FnMut(&mut Command, &str) -> Result<CommandOutput>,
{
    let mut command = Command::new(binary);
    command.arg("--version");
    let context_message = format!("probe version of {}", binary.display());
    match run(&mut command, &context_message) {
        Ok(output) if output.success => output.first_line(),
        _ => None,
    }
}

/// Read-only view of the global links and the versions they report.
pub fn collect_status<RunCommand>(layout: &SwitchLayout, run: &mut RunCommand) -> StatusReport
where
    RunCommand: FnMut(&mut Command, &str) -> Result<CommandOutput>,
{
    let links = LinkRole::ALL
        .iter()
        .map(|role| {
            let path = layout.link_path(*role);
            let resolved = resolve_link_target(&path);
            LinkStatus {
                role: *role,
                path,
                resolved,
            }
        })
        .collect::<Vec<_>>();

    let python_version = links
        .iter()
        .find(|link| link.role == LinkRole::Python)
        .and_then(|link| link.resolved.as_ref().map(|_| link.path.clone()))
        .and_then(|path| probe_version(&path, run));
    let launcher_version = links
        .iter()
        .find(|link| link.role == LinkRole::Jupyter)
        .and_then(|link| link.resolved.as_ref().map(|_| link.path.clone()))
        .and_then(|path| probe_version(&path, run));

    StatusReport {
        links,
        python_version,
        launcher_version,
    }
}
