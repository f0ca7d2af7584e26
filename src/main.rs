//! tmibot - Twitch chat bot runtime.
//!
//! Boots from a TOML config (first argument, default `tmibot.toml`), loads
//! the configured plugins, connects every server and runs the scheduler
//! until Ctrl-C or a plugin asks to stop.

use std::rc::Rc;

use anyhow::{Context as _, bail};
use tracing::{error, info, warn};

use tmibot::clock::{Clock, SystemClock};
use tmibot::collab::{MemoryStorage, Storage};
use tmibot::config::{Config, validate};
use tmibot::network::{Connector, TcpConnector};
use tmibot::plugin::PluginRegistry;
use tmibot::plugins::builtin_factories;
use tmibot::scheduler::Scheduler;
use tmibot::session::ServerSession;
use tmibot::telemetry;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "tmibot.toml".to_string());

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config {config_path}"))?;

    telemetry::init(config.bot.log_level);

    if let Err(errors) = validate(&config) {
        for e in &errors {
            error!(path = %config_path, error = %e, "Invalid configuration");
        }
        bail!("{} configuration error(s) in {config_path}", errors.len());
    }

    info!(
        path = %config_path,
        servers = config.servers.len(),
        plugins = config.bot.plugins.len(),
        "Starting tmibot"
    );

    // Storage must be reachable before any plugin runs
    let storage = MemoryStorage::new();
    if !storage.is_available() {
        bail!("storage backend is unavailable");
    }

    let clock: Rc<dyn Clock> = Rc::new(SystemClock);
    let mut registry = PluginRegistry::new(
        &config.bot.plugins_dir,
        builtin_factories(),
        clock.clone(),
        Box::new(storage),
    );

    if config.relay.enabled {
        warn!("Relay enabled but no relay backend is linked; events stay local");
    }

    let report = registry.load_plugins(&config.bot.plugins, true)?;
    for (plugin, e) in &report.failed {
        error!(plugin = %plugin, error = %e, code = e.error_code(), "Plugin failed to load");
    }
    if report.loaded.is_empty() {
        bail!("none of the configured plugins could be loaded");
    }
    info!(loaded = ?report.loaded, "Plugins loaded");

    // Connect servers; a failed server is skipped, not fatal
    let connector: Rc<dyn Connector> = Rc::new(TcpConnector);
    let mut sessions = Vec::new();
    for server in &config.servers {
        let mut session = ServerSession::new(server.clone(), connector.clone(), clock.clone());
        match session.load().await {
            Ok(()) => sessions.push(session),
            Err(e) => {
                warn!(server = %server.name, error = %e, code = e.error_code(), "Server skipped")
            }
        }
    }
    if sessions.is_empty() {
        registry.unload_all();
        bail!("no server could be connected");
    }

    let mut scheduler = Scheduler::new(registry, sessions);

    // Ctrl-C stops the loop after the current tick
    let stop = scheduler.stop_token();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl-C, shutting down");
                stop.cancel();
            }
            Err(e) => error!(error = %e, "Failed to listen for Ctrl-C"),
        }
    });

    scheduler.run().await;
    info!("tmibot stopped");
    Ok(())
}
