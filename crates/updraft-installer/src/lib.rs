mod apply;
mod context;
mod fs_utils;
mod interop;
mod layout;
mod lifecycle;
mod package;
mod pins;
mod reaper;
mod selfupdate;
mod shortcuts;
mod tray;
mod uninstall;
mod versions;

pub use apply::{
    ApplyOutcome, Progress, UpdateManager, PROGRESS_DONE, PROGRESS_HOOKS, PROGRESS_INSTALLED,
    PROGRESS_MANIFEST, PROGRESS_RESOLVED, PROGRESS_SHORTCUTS,
};
pub use context::UpdateContext;
pub use fs_utils::{
    delete_dir_with_retries, remove_file_if_exists, schedule_delete_on_reboot, DeleteOutcome,
    DirRemover, FsDirRemover, RetryPolicy,
};
pub use interop::{
    NoVersionResources, PackageExtractor, PlatformCapabilities, ProcessLauncher, ShellFolders,
    ShellLinks, ShellTrayState, SystemProcessLauncher, TomlShellLinks, TrayState, VersionResource,
    VersionResourceReader, ZipPackageExtractor,
};
pub use layout::{
    dead_sentinel_path, default_app_root, installing_marker_path, package_metadata_path,
    AppLayout, DEAD_SENTINEL, INSTALLING_MARKER, PACKAGES_DIR, UPDATER_BINARY_NAME,
    VERSION_DIR_PREFIX,
};
pub use lifecycle::{
    lifecycle_aware_executables, list_executables, read_installed_metadata, FirstRunHandle,
    FirstRunLaunch, HookKind, HookOutcome, HookRunner, HookStatus,
};
pub use package::{flatten_lib_tree, install_package};
pub use pins::{PinFixReport, PinnedShortcutFixer};
pub use reaper::{cleanup_dead_versions, prune_package_cache, CleanupOptions, CleanupReport};
pub use selfupdate::{
    finish_apply_arguments, handoff_compatible, replace_bootstrap_from_running,
    update_bootstrap_updater, SelfUpdateOutcome,
    FINISH_APPLY_COMMAND, HANDOFF_PROTOCOL_REQ,
};
pub use shortcuts::ShortcutManager;
pub use tray::{icon_stream_paths, prune_icon_streams};
pub use uninstall::UninstallReport;
pub use versions::{
    current_version_dir, mark_dead, parse_version_dir_name, scan_version_dirs,
    version_dir_state, VersionDirState, VersionedDir,
};
