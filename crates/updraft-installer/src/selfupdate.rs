use anyhow::{Context, Result};
use semver::VersionReq;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};
use updraft_core::{PackageMetadata, ReleaseVersion};

use crate::context::UpdateContext;
use crate::layout::UPDATER_BINARY_NAME;

/// Handoff protocol versions this updater can delegate `finish-apply` to.
pub const HANDOFF_PROTOCOL_REQ: &str = "^1";

pub const FINISH_APPLY_COMMAND: &str = "finish-apply";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelfUpdateOutcome {
    /// The new updater was started and will finish the apply.
    Delegated,
    /// The bootstrap updater binary was replaced in place.
    Replaced,
    /// The package carries no updater binary.
    NoUpdater,
}

pub fn handoff_compatible(metadata: Option<&PackageMetadata>) -> bool {
    let Some(protocol) = metadata.and_then(|metadata| metadata.updater_protocol.as_ref()) else {
        return false;
    };
    VersionReq::parse(HANDOFF_PROTOCOL_REQ)
        .map(|req| req.matches(protocol))
        .unwrap_or(false)
}

pub fn finish_apply_arguments(
    root: &Path,
    version: &ReleaseVersion,
    first_install: bool,
    silent: bool,
) -> Vec<String> {
    let mut args = vec![
        FINISH_APPLY_COMMAND.to_string(),
        "--root".to_string(),
        root.display().to_string(),
        "--version".to_string(),
        version.to_string(),
    ];
    if first_install {
        args.push("--first-install".to_string());
    }
    if silent {
        args.push("--silent".to_string());
    }
    args
}

/// Brings the bootstrap updater up to the version shipped in `new_version_dir`.
///
/// When this process is the bootstrap updater and the new one speaks a
/// compatible handoff protocol, the new binary is started with
/// `finish-apply` and takes over. Otherwise the binary is copied in place.
pub async fn update_bootstrap_updater(
    ctx: &UpdateContext,
    new_version_dir: &Path,
    version: &ReleaseVersion,
    metadata: Option<&PackageMetadata>,
    first_install: bool,
    silent: bool,
) -> Result<SelfUpdateOutcome> {
    let new_updater = new_version_dir.join(UPDATER_BINARY_NAME);
    if !new_updater.is_file() {
        debug!(dir = %new_version_dir.display(), "package does not ship an updater binary");
        return Ok(SelfUpdateOutcome::NoUpdater);
    }

    let bootstrap = ctx.layout.updater_path();
    let running_bootstrap = ctx
        .running_executable
        .as_deref()
        .is_some_and(|running| same_path(running, &bootstrap));

    if running_bootstrap && handoff_compatible(metadata) {
        let args = finish_apply_arguments(ctx.layout.root(), version, first_install, silent);
        ctx.launcher
            .spawn_detached(&new_updater, &args, ctx.layout.root())
            .await
            .with_context(|| format!("failed to hand off to {}", new_updater.display()))?;
        info!(updater = %new_updater.display(), "handed off remaining apply steps to new updater");
        return Ok(SelfUpdateOutcome::Delegated);
    }

    replace_updater(&new_updater, &bootstrap)?;
    info!(updater = %bootstrap.display(), "replaced bootstrap updater");
    Ok(SelfUpdateOutcome::Replaced)
}

/// Second half of a handoff: when this process is the updater shipped in
/// `version_dir`, copy it over the bootstrap updater.
///
/// The bootstrap may still be running for a moment after spawning us, so
/// the copy is retried on the configured delete schedule. Returns whether
/// the bootstrap was replaced.
pub async fn replace_bootstrap_from_running(
    ctx: &UpdateContext,
    version_dir: &Path,
) -> Result<bool> {
    let Some(running) = ctx.running_executable.as_deref() else {
        return Ok(false);
    };
    let bootstrap = ctx.layout.updater_path();
    let shipped = version_dir.join(UPDATER_BINARY_NAME);
    if same_path(running, &bootstrap) || !same_path(running, &shipped) {
        return Ok(false);
    }

    let policy = ctx.retry_policy();
    let mut attempt = 1;
    loop {
        match replace_updater(running, &bootstrap) {
            Ok(()) => {
                info!(updater = %bootstrap.display(), attempt, "replaced bootstrap updater after handoff");
                return Ok(true);
            }
            Err(err) if attempt < policy.attempts => {
                debug!(attempt, error = %format!("{err:#}"), "bootstrap updater still busy");
                attempt += 1;
                tokio::time::sleep(policy.interval).await;
            }
            Err(err) => {
                warn!(updater = %bootstrap.display(), attempts = attempt, "giving up on replacing bootstrap updater");
                return Err(err);
            }
        }
    }
}

fn replace_updater(source: &Path, bootstrap: &Path) -> Result<()> {
    let staged = bootstrap.with_extension("new");
    fs::copy(source, &staged).with_context(|| {
        format!(
            "failed to stage updater {} at {}",
            source.display(),
            staged.display()
        )
    })?;
    fs::rename(&staged, bootstrap)
        .with_context(|| format!("failed to replace updater: {}", bootstrap.display()))
}

fn same_path(left: &Path, right: &Path) -> bool {
    if left == right {
        return true;
    }
    match (fs::canonicalize(left), fs::canonicalize(right)) {
        (Ok(left), Ok(right)) => left == right,
        _ => false,
    }
}
