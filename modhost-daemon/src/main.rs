//! # modhost-daemon
//!
//! Hosts `.smx` plugins and exposes the administrative console on stdin.
//!
//! The daemon is responsible for:
//! - Loading every plugin from the configured plugins directory
//! - Driving the per-tick callback that runs deferred plugin commands
//! - Reading `plugins ...`, `changelevel` and `quit` lines from stdin
//!
//! ## Configuration
//!
//! The daemon reads configuration from `$XDG_CONFIG_HOME/modhost/config.toml`,
//! or from the path given as the first argument.
//!
//! ## Running
//!
//! ```bash
//! cargo run --bin modhost-daemon
//!
//! # With an explicit configuration file
//! cargo run --bin modhost-daemon -- ./config.toml
//! ```

use anyhow::Result;
use modhost_daemon::config::Config;
use modhost_daemon::natives::{register_core_natives, LogListener};
use modhost_daemon::shell::{dispatch, Directive};
use plugin_sys::{PluginRegistry, StaticHost};
use script_runtime::ImageCompiler;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let started = Instant::now();

    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(&path)?,
        None => Config::load_default()?,
    };

    FmtSubscriber::builder()
        .with_max_level(config.log_level())
        .with_target(true)
        .init();

    info!("Starting modhost-daemon v{}", env!("CARGO_PKG_VERSION"));
    info!("Plugins directory: {}", config.host.plugins_dir.display());

    let host = StaticHost::new(config.host.extensions.iter().cloned());
    let mut registry = PluginRegistry::new(
        config.host.plugins_dir.clone(),
        Box::new(ImageCompiler),
        Box::new(host),
    );
    registry.set_policy(config.load_policy());
    registry.add_listener(Box::new(LogListener));
    register_core_natives(&mut registry, started);

    match registry.load_all() {
        Ok(running) => info!("{} plugin(s) running", running),
        Err(e) => error!("Plugin scan failed: {}", e),
    }

    info!("Daemon startup complete");

    let mut ticker = tokio::time::interval(config.tick_interval());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = ticker.tick() => registry.on_tick(),
            line = lines.next_line() => {
                let Some(line) = line? else {
                    info!("Standard input closed");
                    break;
                };
                match dispatch(&mut registry, &line) {
                    Directive::Output(output) => {
                        for line in output {
                            println!("{}", line);
                        }
                    }
                    Directive::Quit => break,
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    info!("Shutting down...");
    registry.unload_all();
    info!("Daemon stopped");
    Ok(())
}
