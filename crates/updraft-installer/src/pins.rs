use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::interop::{PlatformCapabilities, ShellLinks};
use crate::layout::AppLayout;
use crate::versions::parse_version_dir_name;

const LINK_EXTENSION: &str = "lnk";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PinFixReport {
    pub rewritten: usize,
    pub unpinned: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy)]
enum PinMode<'a> {
    Retarget(&'a Path),
    Unpin,
}

/// Repairs OS-cached pinned shortcuts that still point at an older version directory.
#[derive(Clone)]
pub struct PinnedShortcutFixer {
    layout: AppLayout,
    search_roots: Vec<PathBuf>,
    links: Arc<dyn ShellLinks>,
    capabilities: PlatformCapabilities,
    enabled: bool,
}

impl PinnedShortcutFixer {
    pub fn new(
        layout: AppLayout,
        search_roots: Vec<PathBuf>,
        links: Arc<dyn ShellLinks>,
        capabilities: PlatformCapabilities,
        enabled: bool,
    ) -> Self {
        Self {
            layout,
            search_roots,
            links,
            capabilities,
            enabled,
        }
    }

    /// Points this app's pins at `new_version_dir`, or unpins them when that
    /// directory no longer exists.
    pub fn fix_pinned_shortcuts(&self, new_version_dir: &Path) -> PinFixReport {
        if new_version_dir.exists() {
            self.scan(PinMode::Retarget(new_version_dir))
        } else {
            self.scan(PinMode::Unpin)
        }
    }

    pub fn unpin_app_shortcuts(&self) -> PinFixReport {
        self.scan(PinMode::Unpin)
    }

    fn scan(&self, mode: PinMode<'_>) -> PinFixReport {
        let mut report = PinFixReport::default();
        if !self.enabled || !self.capabilities.supports_pinned_shortcuts {
            debug!("pinned shortcut repair is unavailable; skipping");
            return report;
        }

        for root in &self.search_roots {
            if !root.exists() {
                continue;
            }
            for entry in WalkDir::new(root).follow_links(false) {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(err) => {
                        warn!(root = %root.display(), error = %err, "failed to walk shortcut folder");
                        report.failed += 1;
                        continue;
                    }
                };
                let path = entry.path();
                if !entry.file_type().is_file()
                    || path.extension().and_then(|ext| ext.to_str()) != Some(LINK_EXTENSION)
                {
                    continue;
                }
                self.fix_one(path, mode, &mut report);
            }
        }

        if report != PinFixReport::default() {
            info!(
                rewritten = report.rewritten,
                unpinned = report.unpinned,
                skipped = report.skipped,
                failed = report.failed,
                "pinned shortcut scan finished"
            );
        }
        report
    }

    fn fix_one(&self, link: &Path, mode: PinMode<'_>, report: &mut PinFixReport) {
        let record = match self.links.load(link) {
            Ok(record) => record,
            Err(err) => {
                warn!(link = %link.display(), error = %format!("{err:#}"), "failed to parse shortcut");
                report.failed += 1;
                return;
            }
        };
        if !record.working_directory.starts_with(self.layout.root()) {
            report.skipped += 1;
            return;
        }

        match mode {
            PinMode::Unpin => match self.links.unpin(link) {
                Ok(()) => {
                    debug!(link = %link.display(), "unpinned shortcut");
                    report.unpinned += 1;
                }
                Err(err) => {
                    warn!(link = %link.display(), error = %format!("{err:#}"), "failed to unpin shortcut");
                    report.failed += 1;
                }
            },
            PinMode::Retarget(new_version_dir) => {
                let Some(new_name) = new_version_dir.file_name() else {
                    report.failed += 1;
                    return;
                };
                let root = self.layout.root();
                let mut updated = record.clone();
                updated.target = retarget_path(&record.target, root, new_name);
                updated.working_directory =
                    retarget_path(&record.working_directory, root, new_name);
                updated.icon_path = retarget_path(&record.icon_path, root, new_name);
                if updated == record {
                    report.skipped += 1;
                    return;
                }
                match self.links.save(link, &updated) {
                    Ok(()) => {
                        debug!(link = %link.display(), "rewrote pinned shortcut");
                        report.rewritten += 1;
                    }
                    Err(err) => {
                        warn!(link = %link.display(), error = %format!("{err:#}"), "failed to rewrite shortcut");
                        report.failed += 1;
                    }
                }
            }
        }
    }
}

/// Replaces the `app-<version>` segment directly under `root` with `new_name`.
pub(crate) fn retarget_path(path: &Path, root: &Path, new_name: &std::ffi::OsStr) -> PathBuf {
    let Ok(relative) = path.strip_prefix(root) else {
        return path.to_path_buf();
    };
    let mut components = relative.components();
    let Some(Component::Normal(first)) = components.next() else {
        return path.to_path_buf();
    };
    if first == new_name || first.to_str().and_then(parse_version_dir_name).is_none() {
        return path.to_path_buf();
    }
    let rest = components.as_path();
    if rest.as_os_str().is_empty() {
        root.join(new_name)
    } else {
        root.join(new_name).join(rest)
    }
}
