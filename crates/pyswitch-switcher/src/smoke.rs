use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};
use pyswitch_core::{parse_smoke_output, render_smoke_test_script, SmokeReport};

use crate::process::CommandOutput;
use crate::SwitchLayout;

pub fn write_smoke_test_script(layout: &SwitchLayout, imports: &[String]) -> Result<PathBuf> {
    let path = layout.smoke_test_path().to_path_buf();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let script = render_smoke_test_script(imports)?;
    fs::write(&path, script.as_bytes())
        .with_context(|| format!("failed to write smoke test script: {}", path.display()))?;
    Ok(path)
}

/// Writes the import script and runs it with `interpreter`, which should be
/// the rewired global link rather than the environment binary.
///
/// A non-zero exit still yields whatever rows were printed before it.
pub fn run_smoke_test<RunCommand>(
    layout: &SwitchLayout,
    interpreter: &Path,
    imports: &[String],
    run: &mut RunCommand,
) -> Result<(SmokeReport, CommandOutput)>
where
    RunCommand: FnMut(&mut Command, &str) -> Result<CommandOutput>,
{
    let script = write_smoke_test_script(layout, imports)?;
    let mut command = Command::new(interpreter);
    command.arg(&script);
    let output = run(&mut command, "run import smoke test")?;
    Ok((parse_smoke_output(&output.stdout), output))
}
