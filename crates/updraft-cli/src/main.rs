use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod completion;
mod dispatch;
mod render;

#[derive(Parser, Debug)]
#[command(name = "updraft")]
#[command(about = "Applies, repairs and removes self-updating desktop app installs", long_about = None)]
struct Cli {
    /// App root; defaults to the directory holding this binary.
    #[arg(long, global = true)]
    root: Option<PathBuf>,
    /// Resolve the app root from the per-user location for this app id.
    #[arg(long, global = true, conflicts_with = "root")]
    app_id: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Apply {
        #[arg(long)]
        package_dir: Option<PathBuf>,
        #[arg(long)]
        silent: bool,
        #[arg(long)]
        first_install: bool,
    },
    /// Post-install steps run by a freshly installed updater after a handoff.
    FinishApply {
        #[arg(long)]
        version: String,
        #[arg(long)]
        first_install: bool,
        #[arg(long)]
        silent: bool,
    },
    Uninstall,
    Shortcut {
        #[command(subcommand)]
        action: ShortcutCommands,
    },
    Current,
    Doctor,
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand, Debug)]
enum ShortcutCommands {
    Create {
        exe: String,
        #[arg(long, default_value = "desktop,start-menu")]
        locations: String,
        #[arg(long)]
        update_only: bool,
        #[arg(long = "args", allow_hyphen_values = true)]
        extra_args: Option<String>,
        #[arg(long)]
        icon: Option<PathBuf>,
    },
    Remove {
        exe: String,
        #[arg(long, default_value = "desktop,start-menu")]
        locations: String,
    },
    List {
        exe: String,
        #[arg(long, default_value = "desktop,start-menu")]
        locations: String,
        #[arg(long = "args", allow_hyphen_values = true)]
        extra_args: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();
    dispatch::run_cli(cli).await
}

fn log_filter(updraft_log: Option<&str>, rust_log: Option<&str>) -> EnvFilter {
    updraft_log
        .and_then(|directive| EnvFilter::try_new(directive).ok())
        .or_else(|| rust_log.and_then(|directive| EnvFilter::try_new(directive).ok()))
        .unwrap_or_else(|| EnvFilter::new("info"))
}

fn init_tracing() {
    let updraft_log = std::env::var("UPDRAFT_LOG").ok();
    let rust_log = std::env::var("RUST_LOG").ok();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(log_filter(updraft_log.as_deref(), rust_log.as_deref()))
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests;
