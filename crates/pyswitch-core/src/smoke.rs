use anyhow::{Context, Result};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ImportStatus {
    Imported { version: String },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportCheck {
    pub module: String,
    #[serde(flatten)]
    pub status: ImportStatus,
}

impl ImportCheck {
    pub fn is_ok(&self) -> bool {
        matches!(self.status, ImportStatus::Imported { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SmokeReport {
    pub interpreter_version: Option<String>,
    pub executable: Option<String>,
    pub checks: Vec<ImportCheck>,
}

impl SmokeReport {
    pub fn failed(&self) -> impl Iterator<Item = &ImportCheck> {
        self.checks.iter().filter(|check| !check.is_ok())
    }

    /// Requested modules the script never reported on, e.g. because the
    /// interpreter died mid-run.
    pub fn unreported<'a>(&self, requested: &'a [String]) -> Vec<&'a str> {
        requested
            .iter()
            .filter(|module| !self.checks.iter().any(|check| &check.module == *module))
            .map(String::as_str)
            .collect()
    }
}

/// Python source that imports each module independently and prints one
/// tab-separated row per module.
pub fn render_smoke_test_script(imports: &[String]) -> Result<String> {
    let modules =
        serde_json::to_string(imports).context("failed to encode smoke test module list")?;
    Ok(format!(
        r#"import importlib
import sys

print("interpreter\t" + sys.version.split()[0] + "\t" + sys.executable)

for name in {modules}:
    try:
        module = importlib.import_module(name)
        version = getattr(module, "__version__", "unknown")
        print("ok\t" + name + "\t" + str(version))
    except BaseException as exc:
        reason = (type(exc).__name__ + ": " + str(exc)).replace("\n", " ").replace("\t", " ")
        print("fail\t" + name + "\t" + reason)
"#
    ))
}

pub fn parse_smoke_output(stdout: &str) -> SmokeReport {
    let mut report = SmokeReport::default();
    for line in stdout.lines() {
        let mut fields = line.splitn(3, '\t');
        let (Some(kind), Some(first)) = (fields.next(), fields.next()) else {
            continue;
        };
        let rest = fields.next().unwrap_or_default().trim().to_string();
        match kind {
            "interpreter" => {
                report.interpreter_version = Some(first.trim().to_string());
                report.executable = (!rest.is_empty()).then_some(rest);
            }
            "ok" => report.checks.push(ImportCheck {
                module: first.trim().to_string(),
                status: ImportStatus::Imported { version: rest },
            }),
            "fail" => report.checks.push(ImportCheck {
                module: first.trim().to_string(),
                status: ImportStatus::Failed { reason: rest },
            }),
            _ => {}
        }
    }
    report
}
