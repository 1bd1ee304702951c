mod backup;
mod candidates;
mod config;
mod environment;
mod smoke;

pub use backup::{BackupRecord, LinkRole};
pub use candidates::CandidateBinaries;
pub use config::{
    env_overrides_from, ConfigOverrides, SwitchConfig, SwitchConfigFile, CONFIG_PATH_ENV,
    DEFAULT_ENV_NAME, DEFAULT_FALLBACK_INTERPRETER, DEFAULT_INSTALL_ROOT, DEFAULT_PYTHON_VERSION,
    ENV_NAME_ENV, PYTHON_VERSION_ENV,
};
pub use environment::EnvironmentDescriptor;
pub use smoke::{parse_smoke_output, render_smoke_test_script, ImportCheck, ImportStatus, SmokeReport};
