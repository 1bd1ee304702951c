mod backup;
mod elevation;
mod error;
mod fs_utils;
mod layout;
mod links;
mod outcome;
mod package_manager;
mod process;
mod rollback;
mod smoke;
mod status;
mod verify;

pub use backup::{read_backup_record, snapshot_links, write_backup_record};
pub use elevation::{find_on_path, Elevation};
pub use error::SwitchError;
pub use fs_utils::{is_executable, resolve_link_target};
pub use layout::SwitchLayout;
pub use links::{
    check_link_conflicts, check_replaceable, inspect_link, remove_symlink_if_present,
    rewire_link, DirectLinkOps, ElevatedLinkOps, LinkOps, LinkState, OverwritePolicy,
};
pub use outcome::PhaseOutcome;
pub use package_manager::PackageManager;
pub use process::{describe_command, require_success, run_command, CommandOutput};
pub use rollback::{
    apply_restore, plan_restore, render_rollback_script, write_rollback_script, RestoreOutcome,
    RestorePlan, RestoreSource,
};
pub use smoke::{run_smoke_test, write_smoke_test_script};
pub use status::{collect_status, probe_version, LinkStatus, StatusReport};
pub use verify::{verify_environment, VerifiedEnvironment};

#[cfg(test)]
mod tests;
