//! Connection - one socket to one chat server.
//!
//! ```text
//!   Disconnected ──connect()──▶ Connecting ──ok──▶ Connected
//!        ▲                          │                  │
//!        └────────── fail ──────────┘   write failure  │
//!                                   ◀──(reconnect)─────┘
//! ```
//!
//! A connection frames inbound bytes into CRLF lines, keeps an outbound
//! FIFO plus a set of lines timed to a unix second, and tracks which
//! channels the bot is in and who else is there. Nothing here blocks: a
//! read with no data yields no lines, and a queued line that cannot be
//! written stays queued.

use std::collections::{BTreeMap, VecDeque};
use std::io;
use std::rc::Rc;

use tmibot_proto::{command, irc_to_lower};
use tracing::{debug, info, warn};

use super::limit::FloodLimiter;
use super::transport::{Connector, Transport};
use crate::clock::Clock;
use crate::error::ConnectionError;

/// Bytes taken from the socket per read.
pub const READ_CHUNK: usize = 4096;

/// Unterminated inbound data beyond this is discarded.
const MAX_PARTIAL_LINE: usize = 64 * 1024;

/// Seconds between reconnect attempts while disconnected.
const RECONNECT_BACKOFF: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Channel key: no `#`, case-folded.
fn channel_key(channel: &str) -> String {
    irc_to_lower(channel.trim_start_matches('#'))
}

pub struct Connection {
    name: String,
    address: String,
    port: u16,
    state: ConnectionState,
    connector: Rc<dyn Connector>,
    transport: Option<Box<dyn Transport>>,
    clock: Rc<dyn Clock>,
    inbound: Vec<u8>,
    /// Lines written straight after every successful connect.
    greeting: Vec<String>,
    queue: VecDeque<String>,
    timed: Vec<(i64, String)>,
    limiter: FloodLimiter,
    /// Channel key → folded nick → mode flags (`o`, `v`).
    channels: BTreeMap<String, BTreeMap<String, String>>,
    connect_attempts: u64,
    last_attempt: Option<i64>,
}

impl Connection {
    pub fn new(
        name: impl Into<String>,
        address: impl Into<String>,
        port: u16,
        connector: Rc<dyn Connector>,
        clock: Rc<dyn Clock>,
    ) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            port,
            state: ConnectionState::Disconnected,
            connector,
            transport: None,
            clock,
            inbound: Vec::new(),
            greeting: Vec::new(),
            queue: VecDeque::new(),
            timed: Vec::new(),
            limiter: FloodLimiter::default(),
            channels: BTreeMap::new(),
            connect_attempts: 0,
            last_attempt: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    /// Connects attempted so far, including the first.
    pub fn connect_attempts(&self) -> u64 {
        self.connect_attempts
    }

    pub fn set_flood_limit(&mut self, enabled: bool) {
        self.limiter.set_enabled(enabled);
    }

    pub fn flood_limited(&self) -> bool {
        self.limiter.is_enabled()
    }

    /// Lines (`CAP`, `PASS`, `NICK`, `USER`) written right after each
    /// connect, ahead of anything queued.
    pub fn set_greeting(&mut self, lines: Vec<String>) {
        self.greeting = lines;
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Open the socket. Channel and user state is reset; queued output is
    /// kept.
    pub async fn connect(&mut self) -> Result<(), ConnectionError> {
        self.state = ConnectionState::Connecting;
        self.transport = None;
        self.inbound.clear();
        self.channels.clear();
        self.connect_attempts += 1;
        self.last_attempt = Some(self.clock.now());

        let connector = self.connector.clone();
        let mut transport = match connector.connect(&self.address, self.port).await {
            Ok(transport) => transport,
            Err(e) => {
                warn!(server = %self.name, address = %self.address, port = self.port, error = %e, "Connect failed");
                self.state = ConnectionState::Disconnected;
                return Err(e.into());
            }
        };

        for line in &self.greeting {
            if let Err(e) = transport.write(format!("{line}\r\n").as_bytes()) {
                warn!(server = %self.name, error = %e, "Greeting write failed");
                self.state = ConnectionState::Disconnected;
                return Err(e.into());
            }
        }

        self.transport = Some(transport);
        self.state = ConnectionState::Connected;
        info!(server = %self.name, address = %self.address, port = self.port, "Connected");
        Ok(())
    }

    /// One immediate reconnect attempt. Failures are logged, not returned.
    pub async fn reconnect(&mut self) {
        info!(server = %self.name, "Reconnecting");
        if let Err(e) = self.connect().await {
            debug!(server = %self.name, error = %e, code = e.error_code(), "Reconnect failed");
        }
    }

    /// Retry a dropped connection once the backoff has passed.
    pub async fn maintain(&mut self) {
        if self.is_connected() {
            return;
        }
        let now = self.clock.now();
        if self
            .last_attempt
            .is_some_and(|last| now - last < RECONNECT_BACKOFF)
        {
            return;
        }
        self.reconnect().await;
    }

    /// Write any final lines and drop the socket.
    pub fn disconnect(&mut self, farewell: Option<&str>) {
        if let (Some(transport), Some(line)) = (self.transport.as_mut(), farewell)
            && let Err(e) = transport.write(format!("{line}\r\n").as_bytes())
        {
            debug!(server = %self.name, error = %e, "Farewell not written");
        }
        self.transport = None;
        self.state = ConnectionState::Disconnected;
        info!(server = %self.name, "Disconnected");
    }

    fn drop_transport(&mut self) {
        self.transport = None;
        self.state = ConnectionState::Disconnected;
    }

    // ========================================================================
    // Inbound
    // ========================================================================

    /// One bounded non-blocking read. Returns the complete lines received
    /// so far; a partial line is kept for the next call.
    pub fn read(&mut self) -> Result<Vec<String>, ConnectionError> {
        let transport = self.transport.as_mut().ok_or(ConnectionError::NotConnected)?;
        let mut buf = [0u8; READ_CHUNK];
        match transport.try_read(&mut buf) {
            Ok(0) => {
                self.drop_transport();
                return Err(ConnectionError::Closed);
            }
            Ok(n) => self.inbound.extend_from_slice(&buf[..n]),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => {
                self.drop_transport();
                return Err(e.into());
            }
        }
        Ok(self.take_lines())
    }

    fn take_lines(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(pos) = self.inbound[start..].windows(2).position(|w| w == b"\r\n") {
            let end = start + pos;
            if end > start {
                lines.push(String::from_utf8_lossy(&self.inbound[start..end]).into_owned());
            }
            start = end + 2;
        }
        self.inbound.drain(..start);

        if self.inbound.len() > MAX_PARTIAL_LINE {
            warn!(server = %self.name, bytes = self.inbound.len(), "Discarding oversized partial line");
            self.inbound.clear();
        }
        lines
    }

    // ========================================================================
    // Outbound
    // ========================================================================

    /// Queue a line. With `at`, the line is written at that unix second
    /// regardless of the FIFO; otherwise it joins the FIFO tail.
    pub fn send(&mut self, line: impl Into<String>, at: Option<i64>) {
        let line = line.into();
        match at {
            Some(at) => self.timed.push((at, line)),
            None => self.queue.push_back(line),
        }
    }

    /// Lines waiting in the FIFO.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Lines waiting for their second.
    pub fn timed(&self) -> usize {
        self.timed.len()
    }

    fn write_line(&mut self, line: &str) -> io::Result<()> {
        let transport = self
            .transport
            .as_mut()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?;
        transport.write(format!("{line}\r\n").as_bytes())
    }

    /// Flush due output; called once per tick. Timed lines go out once
    /// their second has come. The FIFO drains fully, or one line per
    /// flood interval when limited. A failed write leaves the line queued
    /// and triggers one reconnect. Returns the number of lines written.
    pub async fn process_buffer(&mut self) -> usize {
        if !self.is_connected() {
            return 0;
        }
        let now = self.clock.now();
        let mut written = 0;

        let mut i = 0;
        while i < self.timed.len() {
            if self.timed[i].0 > now {
                i += 1;
                continue;
            }
            let line = self.timed[i].1.clone();
            if let Err(e) = self.write_line(&line) {
                self.write_failed(e).await;
                return written;
            }
            self.timed.remove(i);
            self.limiter.record(now);
            written += 1;
        }

        while let Some(line) = self.queue.front().cloned() {
            if !self.limiter.check(now) {
                break;
            }
            if let Err(e) = self.write_line(&line) {
                self.write_failed(e).await;
                return written;
            }
            self.queue.pop_front();
            self.limiter.record(now);
            written += 1;
        }
        written
    }

    async fn write_failed(&mut self, error: io::Error) {
        warn!(server = %self.name, error = %error, "Write failed; message kept for retry");
        self.drop_transport();
        self.reconnect().await;
    }

    // ========================================================================
    // Presence
    // ========================================================================

    /// JOIN every channel not already joined. Returns the channels a JOIN
    /// was sent for, `#`-prefixed and case-folded.
    pub fn join_channels<S: AsRef<str>>(&mut self, channels: &[S]) -> Vec<String> {
        let mut fresh: Vec<String> = Vec::new();
        for channel in channels {
            let key = channel_key(channel.as_ref());
            if key.is_empty() || self.channels.contains_key(&key) || fresh.contains(&key) {
                continue;
            }
            fresh.push(key);
        }
        if fresh.is_empty() {
            return fresh;
        }

        for key in &fresh {
            self.channels.entry(key.clone()).or_default();
        }
        let names: Vec<String> = fresh.iter().map(|k| format!("#{k}")).collect();
        self.send(command::join(&names), None);
        names
    }

    pub fn part_channel(&mut self, channel: &str) {
        let key = channel_key(channel);
        if self.channels.remove(&key).is_some() {
            self.send(command::part(&format!("#{key}")), None);
        }
    }

    /// Record a channel as joined without sending anything.
    pub fn mark_joined(&mut self, channel: &str) {
        self.channels.entry(channel_key(channel)).or_default();
    }

    /// Forget a channel without sending anything.
    pub fn forget_channel(&mut self, channel: &str) {
        self.channels.remove(&channel_key(channel));
    }

    pub fn is_joined(&self, channel: &str) -> bool {
        self.channels.contains_key(&channel_key(channel))
    }

    /// Joined channels, `#`-less and case-folded.
    pub fn channels(&self) -> impl Iterator<Item = &str> {
        self.channels.keys().map(String::as_str)
    }

    /// Merge a NAMES list (`@op +voiced plain`) into the channel's users.
    pub fn set_channel_users(&mut self, channel: &str, names: &str) {
        let users = self.channels.entry(channel_key(channel)).or_default();
        for entry in names.split_whitespace() {
            let (mode, nick) = match entry.as_bytes()[0] {
                b'@' => ("o", &entry[1..]),
                b'+' => ("v", &entry[1..]),
                _ => ("", entry),
            };
            if nick.is_empty() {
                continue;
            }
            users.insert(irc_to_lower(nick), mode.to_owned());
        }
    }

    pub fn user_joined(&mut self, channel: &str, nick: &str) {
        self.channels
            .entry(channel_key(channel))
            .or_default()
            .entry(irc_to_lower(nick))
            .or_default();
    }

    pub fn user_parted(&mut self, channel: &str, nick: &str) {
        if let Some(users) = self.channels.get_mut(&channel_key(channel)) {
            users.remove(&irc_to_lower(nick));
        }
    }

    pub fn add_user_mode(&mut self, channel: &str, nick: &str, mode: char) {
        let flags = self
            .channels
            .entry(channel_key(channel))
            .or_default()
            .entry(irc_to_lower(nick))
            .or_default();
        if !flags.contains(mode) {
            flags.push(mode);
        }
    }

    pub fn remove_user_mode(&mut self, channel: &str, nick: &str, mode: char) {
        if let Some(flags) = self
            .channels
            .get_mut(&channel_key(channel))
            .and_then(|users| users.get_mut(&irc_to_lower(nick)))
        {
            flags.retain(|c| c != mode);
        }
    }

    pub fn users(&self, channel: &str) -> Option<&BTreeMap<String, String>> {
        self.channels.get(&channel_key(channel))
    }

    /// Mode flags of `nick` in `channel`, if present there.
    pub fn user_mode(&self, channel: &str, nick: &str) -> Option<&str> {
        self.users(channel)?
            .get(&irc_to_lower(nick))
            .map(String::as_str)
    }
}
