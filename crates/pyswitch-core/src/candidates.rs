use std::path::{Path, PathBuf};

use crate::EnvironmentDescriptor;

/// Ordered interpreter binary names probed inside an environment's `bin/`.
/// The first executable entry wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateBinaries {
    names: Vec<String>,
}

impl CandidateBinaries {
    /// `python`, `python<major>`, `python<version>`, in that order.
    pub fn for_environment(environment: &EnvironmentDescriptor) -> Self {
        Self::from_names([
            "python".to_string(),
            format!("python{}", environment.major_version()),
            format!("python{}", environment.python_version),
        ])
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ordered: Vec<String> = Vec::new();
        for name in names {
            let name = name.into();
            if name.trim().is_empty() || ordered.contains(&name) {
                continue;
            }
            ordered.push(name);
        }
        Self { names: ordered }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn paths_in(&self, bin_dir: &Path) -> Vec<PathBuf> {
        self.names.iter().map(|name| bin_dir.join(name)).collect()
    }
}
