//! xdocc - compile a metadata-named directory tree into a rendered site.

mod build;
mod cache;
mod cli;
mod compiler;
mod config;
mod deps;
mod descriptor;
mod handlers;
mod logger;
mod render;
mod site;
mod utils;
mod watch;

use anyhow::Result;
use build::{BuildState, build_site};
use clap::Parser;
use cli::Cli;
use config::SiteConfig;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let state = BuildState::new(&config);

    if cli.is_watch() {
        // The initial build may fail on a bad tree; stay alive and rebuild
        // once the offending files change
        if let Err(e) = build_site(&config, &state, config.clean) {
            log!("error"; "{e:#}");
        }
        // Watch mode runs until the process is killed
        let stop = AtomicBool::new(false);
        watch::watch_blocking(
            &config.source,
            Duration::from_millis(config.debounce_ms),
            &stop,
            |changed| {
                log!("watch"; "{} path(s) changed, rebuilding", changed.len());
                if let Err(e) = build_site(&config, &state, false) {
                    log!("error"; "{e:#}");
                }
            },
        )
    } else {
        build_site(&config, &state, config.clean).map(|_| ())
    }
}

/// Load configuration from `<root>/xdocc.toml` when present, then apply
/// CLI overrides.
fn load_config(cli: &Cli) -> Result<SiteConfig> {
    let root = cli.root.as_deref().unwrap_or(Path::new("./"));
    let config_path = root.join(&cli.config);

    let mut config = if config_path.exists() {
        SiteConfig::from_path(&config_path)?
    } else {
        SiteConfig::default()
    };
    config.update_with_cli(cli);
    Ok(config)
}
