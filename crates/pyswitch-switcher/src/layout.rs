use std::path::{Path, PathBuf};

use pyswitch_core::{CandidateBinaries, EnvironmentDescriptor, LinkRole, SwitchConfig};

/// Every path a switch reads or writes, derived from one [`SwitchConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchLayout {
    install_root: PathBuf,
    link_dir: PathBuf,
    backup_path: PathBuf,
    rollback_script_path: PathBuf,
    smoke_test_path: PathBuf,
}

impl SwitchLayout {
    pub fn new(install_root: impl Into<PathBuf>, link_dir: impl Into<PathBuf>) -> Self {
        let defaults = SwitchConfig::default();
        Self {
            install_root: install_root.into(),
            link_dir: link_dir.into(),
            backup_path: defaults.backup_path,
            rollback_script_path: defaults.rollback_script_path,
            smoke_test_path: defaults.smoke_test_path,
        }
    }

    pub fn from_config(config: &SwitchConfig) -> Self {
        Self {
            install_root: config.install_root.clone(),
            link_dir: config.link_dir.clone(),
            backup_path: config.backup_path.clone(),
            rollback_script_path: config.rollback_script_path.clone(),
            smoke_test_path: config.smoke_test_path.clone(),
        }
    }

    pub fn with_state_files(
        mut self,
        backup_path: impl Into<PathBuf>,
        rollback_script_path: impl Into<PathBuf>,
        smoke_test_path: impl Into<PathBuf>,
    ) -> Self {
        self.backup_path = backup_path.into();
        self.rollback_script_path = rollback_script_path.into();
        self.smoke_test_path = smoke_test_path.into();
        self
    }

    pub fn envs_dir(&self) -> PathBuf {
        self.install_root.join("envs")
    }

    pub fn env_dir(&self, environment: &EnvironmentDescriptor) -> PathBuf {
        environment.env_dir(&self.install_root)
    }

    pub fn env_bin_dir(&self, environment: &EnvironmentDescriptor) -> PathBuf {
        environment.bin_dir(&self.install_root)
    }

    pub fn candidate_paths(
        &self,
        environment: &EnvironmentDescriptor,
        candidates: &CandidateBinaries,
    ) -> Vec<PathBuf> {
        candidates.paths_in(&self.env_bin_dir(environment))
    }

    pub fn link_dir(&self) -> &Path {
        &self.link_dir
    }

    pub fn link_path(&self, role: LinkRole) -> PathBuf {
        self.link_dir.join(role.as_str())
    }

    pub fn backup_path(&self) -> &Path {
        &self.backup_path
    }

    pub fn rollback_script_path(&self) -> &Path {
        &self.rollback_script_path
    }

    pub fn smoke_test_path(&self) -> &Path {
        &self.smoke_test_path
    }
}
