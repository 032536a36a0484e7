//! Expose files and block devices as entries of a read-only FUSE directory.
use std::path::PathBuf;

use clap::Parser;
use tracing::error;

mod app_config;
mod daemon;
mod trc;

use crate::app_config::{Config, SourceConfig};
use crate::trc::Trc;

#[derive(Parser)]
#[command(
    version,
    about = "Expose files and block devices as a read-only directory."
)]
struct Args {
    #[arg(
        short,
        long,
        value_parser,
        help = "Optional path to an exposefs config TOML."
    )]
    config_path: Option<PathBuf>,

    /// Where to mount the filesystem. Overrides the config file.
    #[arg(short, long, env = "EXPOSEFS_MOUNT_POINT")]
    mount_point: Option<PathBuf>,

    /// Appended to names derived from source paths, e.g. ".iso". Overrides the config file.
    #[arg(long)]
    name_suffix: Option<String>,

    /// Files or block devices to expose, listed after those from the config file.
    sources: Vec<PathBuf>,
}

impl Args {
    fn apply_to(self, mut config: Config) -> Config {
        if let Some(mount_point) = self.mount_point {
            config.mount_point = mount_point;
        }
        if let Some(name_suffix) = self.name_suffix {
            config.name_suffix = name_suffix;
        }
        config
            .sources
            .extend(self.sources.into_iter().map(|path| SourceConfig { path, name: None }));
        config
    }
}

/// Main entry point for the application.
fn main() {
    let args = Args::parse();

    // Load config first so a broken file is reported before anything is mounted.
    // Errors use eprintln since tracing isn't initialized yet.
    let config = Config::load_or_default(args.config_path.as_deref()).unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {e}");
        std::process::exit(1);
    });
    let config = args.apply_to(config);
    if let Err(error_messages) = config.validate() {
        eprintln!("Configuration is invalid.");
        for msg in &error_messages {
            eprintln!(" - {msg}");
        }
        std::process::exit(1);
    }

    if let Err(e) = Trc::default().init() {
        eprintln!(
            "Failed to initialize logging. Without logging, we can't provide any useful error \
             messages, so we have to exit: {e}"
        );
        std::process::exit(1);
    }

    if let Err(e) = daemon::spawn(config) {
        error!("exposefs failed: {e}");
        std::process::exit(1);
    }
}
