//! Shared integration test infrastructure.
//!
//! Provides a scripted Twitch IRC server on a loopback port and helpers to
//! build a bot wired to it.

#![allow(dead_code)]

pub mod server;

pub use server::FakeTwitch;

use std::fs;
use std::rc::Rc;
use std::time::Duration;

use tempfile::TempDir;
use tmibot::clock::{Clock, SystemClock};
use tmibot::collab::MemoryStorage;
use tmibot::config::ServerConfig;
use tmibot::network::{Connector, TcpConnector};
use tmibot::plugin::{PluginFactories, PluginRegistry};
use tmibot::scheduler::Scheduler;
use tmibot::session::ServerSession;

pub const BOT_NICK: &str = "tmibot";
pub const CHANNEL: &str = "#chan";

/// Server entry pointing at the fake server, flood limit off so every
/// queued line goes out on the next tick.
pub fn server_config(port: u16) -> ServerConfig {
    ServerConfig {
        name: "fake".to_owned(),
        address: "127.0.0.1".to_owned(),
        port,
        nick: BOT_NICK.to_owned(),
        password: Some("oauth:secret".to_owned()),
        realname: "tmibot test".to_owned(),
        channels: vec![CHANNEL.to_owned()],
        flood_limit: false,
        twitch: true,
    }
}

/// Write `<dir>/<name>/plugin.toml`.
pub fn write_manifest(dir: &TempDir, name: &str, body: &str) {
    let path = dir.path().join(name);
    fs::create_dir_all(&path).expect("plugin dir");
    fs::write(path.join("plugin.toml"), body).expect("manifest");
}

/// A registry over `dir` with a wall clock and in-memory storage.
pub fn registry(dir: &TempDir, factories: PluginFactories) -> PluginRegistry {
    let clock: Rc<dyn Clock> = Rc::new(SystemClock);
    PluginRegistry::new(dir.path(), factories, clock, Box::new(MemoryStorage::new()))
}

/// Connect one session to `fake` and wrap it in a scheduler.
pub async fn connect(fake: &FakeTwitch, registry: PluginRegistry) -> anyhow::Result<Scheduler> {
    let connector: Rc<dyn Connector> = Rc::new(TcpConnector);
    let clock: Rc<dyn Clock> = Rc::new(SystemClock);
    let mut session = ServerSession::new(server_config(fake.port()), connector, clock);
    session.load().await?;
    Ok(Scheduler::new(registry, vec![session]))
}

/// Tick the scheduler until the fake server has received a line starting
/// with `prefix`. Every line received on the way is returned, the match
/// last.
pub async fn tick_until(
    scheduler: &mut Scheduler,
    fake: &mut FakeTwitch,
    prefix: &str,
) -> anyhow::Result<Vec<String>> {
    let mut seen = Vec::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        scheduler.tick().await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        while let Some(line) = fake.try_recv() {
            let done = line.starts_with(prefix);
            seen.push(line);
            if done {
                return Ok(seen);
            }
        }
    }
    anyhow::bail!("no line starting with {prefix:?} within 5s; got {seen:?}")
}
