use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use serde::Serialize;

/// A named conda environment pinned to an interpreter version.
///
/// The directory is derived by convention (`<root>/envs/<name>`); the
/// descriptor itself never touches the filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvironmentDescriptor {
    pub name: String,
    pub python_version: String,
}

impl EnvironmentDescriptor {
    pub fn new(name: impl Into<String>, python_version: impl Into<String>) -> Result<Self> {
        let descriptor = Self {
            name: name.into(),
            python_version: python_version.into(),
        };
        validate_env_name(&descriptor.name)?;
        validate_python_version(&descriptor.python_version)?;
        Ok(descriptor)
    }

    pub fn env_dir(&self, install_root: &Path) -> PathBuf {
        install_root.join("envs").join(&self.name)
    }

    pub fn bin_dir(&self, install_root: &Path) -> PathBuf {
        self.env_dir(install_root).join("bin")
    }

    pub fn major_version(&self) -> &str {
        self.python_version
            .split('.')
            .next()
            .unwrap_or(&self.python_version)
    }

    /// Version pin handed to the package manager, e.g. `python=3.10`.
    pub fn interpreter_pin(&self) -> String {
        format!("python={}", self.python_version)
    }
}

fn validate_env_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(anyhow!("environment name must not be empty"));
    }
    if name.starts_with('-') {
        return Err(anyhow!("environment name must not start with '-': {name}"));
    }
    if name.chars().any(|ch| ch == '/' || ch == '\\' || ch.is_whitespace()) {
        return Err(anyhow!(
            "environment name contains invalid character(s): {name}"
        ));
    }
    if name == "." || name == ".." {
        return Err(anyhow!("environment name must not be a path component: {name}"));
    }
    Ok(())
}

fn validate_python_version(version: &str) -> Result<()> {
    if version.is_empty() {
        return Err(anyhow!("python version must not be empty"));
    }
    for token in version.split('.') {
        if token.is_empty() || !token.chars().all(|ch| ch.is_ascii_digit()) {
            return Err(anyhow!(
                "python version must be dotted numeric (e.g. 3.10): {version}"
            ));
        }
    }
    Ok(())
}
