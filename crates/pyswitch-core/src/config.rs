use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::EnvironmentDescriptor;

pub const DEFAULT_PYTHON_VERSION: &str = "3.8";
pub const DEFAULT_ENV_NAME: &str = "newCondaEnvironment";
pub const DEFAULT_INSTALL_ROOT: &str = "/opt/conda";
pub const DEFAULT_LINK_DIR: &str = "/usr/local/bin";
pub const DEFAULT_BACKUP_PATH: &str = "/tmp/python_symlinks_backup.txt";
pub const DEFAULT_ROLLBACK_SCRIPT_PATH: &str = "/tmp/rollback_python.sh";
pub const DEFAULT_SMOKE_TEST_PATH: &str = "/tmp/test_version.py";
pub const DEFAULT_FALLBACK_INTERPRETER: &str = "/opt/conda/bin/python3.7";
pub const DEFAULT_PACKAGE_MANAGER: &str = "conda";
pub const DEFAULT_LAUNCHER: &str = "jupyter";

pub const PYTHON_VERSION_ENV: &str = "PYSWITCH_PYTHON_VERSION";
pub const ENV_NAME_ENV: &str = "PYSWITCH_ENV_NAME";
pub const CONFIG_PATH_ENV: &str = "PYSWITCH_CONFIG";

const DEFAULT_PACKAGES: [&str; 8] = [
    "jupyter",
    "notebook",
    "ipykernel",
    "numpy",
    "pandas",
    "matplotlib",
    "scipy",
    "scikit-learn",
];

const DEFAULT_SMOKE_IMPORTS: [&str; 6] = [
    "numpy",
    "pandas",
    "matplotlib",
    "scipy",
    "sklearn",
    "IPython",
];

/// On-disk TOML shape. Every key is optional and falls back to the built-in
/// default during [`SwitchConfig::resolve`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SwitchConfigFile {
    pub python_version: Option<String>,
    pub env_name: Option<String>,
    pub install_root: Option<PathBuf>,
    pub link_dir: Option<PathBuf>,
    pub backup_path: Option<PathBuf>,
    pub rollback_script_path: Option<PathBuf>,
    pub smoke_test_path: Option<PathBuf>,
    pub fallback_interpreter: Option<PathBuf>,
    pub package_manager: Option<String>,
    pub packages: Option<Vec<String>>,
    pub smoke_imports: Option<Vec<String>>,
    pub launcher: Option<String>,
}

impl SwitchConfigFile {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        toml::from_str(input).context("failed to parse pyswitch config")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::from_toml_str(&raw)
            .with_context(|| format!("failed to load config file: {}", path.display()))
    }
}

/// Per-layer overrides for the two values a caller may set outside the
/// config file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub python_version: Option<String>,
    pub env_name: Option<String>,
}

/// Reads overrides through `lookup`, treating empty values as unset.
pub fn env_overrides_from<F>(lookup: F) -> ConfigOverrides
where
    F: Fn(&str) -> Option<String>,
{
    let read = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
    ConfigOverrides {
        python_version: read(PYTHON_VERSION_ENV),
        env_name: read(ENV_NAME_ENV),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwitchConfig {
    pub environment: EnvironmentDescriptor,
    pub install_root: PathBuf,
    pub link_dir: PathBuf,
    pub backup_path: PathBuf,
    pub rollback_script_path: PathBuf,
    pub smoke_test_path: PathBuf,
    pub fallback_interpreter: PathBuf,
    pub package_manager: String,
    pub packages: Vec<String>,
    pub smoke_imports: Vec<String>,
    pub launcher: String,
}

impl Default for SwitchConfig {
    fn default() -> Self {
        Self {
            environment: EnvironmentDescriptor {
                name: DEFAULT_ENV_NAME.to_string(),
                python_version: DEFAULT_PYTHON_VERSION.to_string(),
            },
            install_root: PathBuf::from(DEFAULT_INSTALL_ROOT),
            link_dir: PathBuf::from(DEFAULT_LINK_DIR),
            backup_path: PathBuf::from(DEFAULT_BACKUP_PATH),
            rollback_script_path: PathBuf::from(DEFAULT_ROLLBACK_SCRIPT_PATH),
            smoke_test_path: PathBuf::from(DEFAULT_SMOKE_TEST_PATH),
            fallback_interpreter: PathBuf::from(DEFAULT_FALLBACK_INTERPRETER),
            package_manager: DEFAULT_PACKAGE_MANAGER.to_string(),
            packages: DEFAULT_PACKAGES.iter().map(|v| v.to_string()).collect(),
            smoke_imports: DEFAULT_SMOKE_IMPORTS.iter().map(|v| v.to_string()).collect(),
            launcher: DEFAULT_LAUNCHER.to_string(),
        }
    }
}

impl SwitchConfig {
    /// Merges layers with precedence `cli` > `env` > `file` > defaults, then
    /// validates the result.
    pub fn resolve(
        file: SwitchConfigFile,
        env: ConfigOverrides,
        cli: ConfigOverrides,
    ) -> Result<Self> {
        let defaults = Self::default();

        let python_version = cli
            .python_version
            .or(env.python_version)
            .or(file.python_version)
            .unwrap_or(defaults.environment.python_version);
        let env_name = cli
            .env_name
            .or(env.env_name)
            .or(file.env_name)
            .unwrap_or(defaults.environment.name);
        let environment = EnvironmentDescriptor::new(env_name, python_version)?;

        let config = Self {
            environment,
            install_root: file.install_root.unwrap_or(defaults.install_root),
            link_dir: file.link_dir.unwrap_or(defaults.link_dir),
            backup_path: file.backup_path.unwrap_or(defaults.backup_path),
            rollback_script_path: file
                .rollback_script_path
                .unwrap_or(defaults.rollback_script_path),
            smoke_test_path: file.smoke_test_path.unwrap_or(defaults.smoke_test_path),
            fallback_interpreter: file
                .fallback_interpreter
                .unwrap_or(defaults.fallback_interpreter),
            package_manager: file.package_manager.unwrap_or(defaults.package_manager),
            packages: file.packages.unwrap_or(defaults.packages),
            smoke_imports: file.smoke_imports.unwrap_or(defaults.smoke_imports),
            launcher: file.launcher.unwrap_or(defaults.launcher),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for (field, path) in [
            ("install_root", &self.install_root),
            ("link_dir", &self.link_dir),
            ("backup_path", &self.backup_path),
            ("rollback_script_path", &self.rollback_script_path),
            ("smoke_test_path", &self.smoke_test_path),
            ("fallback_interpreter", &self.fallback_interpreter),
        ] {
            if !path.is_absolute() {
                return Err(anyhow!(
                    "config field '{field}' must be an absolute path: {}",
                    path.display()
                ));
            }
        }

        if self.package_manager.trim().is_empty() {
            return Err(anyhow!("config field 'package_manager' must not be empty"));
        }
        if self.packages.is_empty() {
            return Err(anyhow!("config field 'packages' must list at least one package"));
        }
        if let Some(blank) = self.packages.iter().find(|pkg| pkg.trim().is_empty()) {
            return Err(anyhow!("config field 'packages' contains a blank entry: '{blank}'"));
        }
        if self
            .smoke_imports
            .iter()
            .any(|module| module.trim().is_empty() || module.contains(char::is_whitespace))
        {
            return Err(anyhow!(
                "config field 'smoke_imports' entries must be non-empty module names"
            ));
        }
        if self.launcher.trim().is_empty() || self.launcher.contains('/') {
            return Err(anyhow!(
                "config field 'launcher' must be a bare binary name: '{}'",
                self.launcher
            ));
        }
        Ok(())
    }
}
