//! Scripted Twitch IRC server.
//!
//! Listens on an ephemeral loopback port and accepts any number of
//! connections, one at a time; a new connection replaces the previous one.
//! Lines the bot writes are collected in order, and the test pushes lines
//! back with [`FakeTwitch::send`].

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::TcpListener;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;

enum Script {
    Line(String),
    Hangup,
}

type Client = (Lines<BufReader<OwnedReadHalf>>, OwnedWriteHalf);

/// A fake server handle. Dropping it stops the server task.
pub struct FakeTwitch {
    port: u16,
    connections: Arc<AtomicUsize>,
    script: mpsc::UnboundedSender<Script>,
    received: mpsc::UnboundedReceiver<String>,
}

impl FakeTwitch {
    pub async fn spawn() -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        let connections = Arc::new(AtomicUsize::new(0));
        let (script, mut script_rx) = mpsc::unbounded_channel();
        let (received_tx, received) = mpsc::unbounded_channel();

        let counter = connections.clone();
        tokio::spawn(async move {
            let mut client: Option<Client> = None;
            loop {
                tokio::select! {
                    accepted = listener.accept() => {
                        if let Ok((stream, _)) = accepted {
                            counter.fetch_add(1, Ordering::SeqCst);
                            let (read, write) = stream.into_split();
                            client = Some((BufReader::new(read).lines(), write));
                        }
                    }
                    line = next_line(&mut client) => match line {
                        Some(line) => {
                            let _ = received_tx.send(line);
                        }
                        None => client = None,
                    },
                    cmd = script_rx.recv() => match cmd {
                        Some(Script::Line(line)) => {
                            if let Some((_, write)) = client.as_mut() {
                                let _ = write.write_all(format!("{line}\r\n").as_bytes()).await;
                            }
                        }
                        Some(Script::Hangup) => client = None,
                        None => break,
                    },
                }
            }
        });

        Ok(Self {
            port,
            connections,
            script,
            received,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Connections accepted so far.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Write one line to the connected bot.
    pub fn send(&self, line: &str) {
        let _ = self.script.send(Script::Line(line.to_owned()));
    }

    /// Close the current connection.
    pub fn hangup(&self) {
        let _ = self.script.send(Script::Hangup);
    }

    /// Next line received from the bot, if one has arrived.
    pub fn try_recv(&mut self) -> Option<String> {
        self.received.try_recv().ok()
    }
}

async fn next_line(client: &mut Option<Client>) -> Option<String> {
    match client {
        Some((lines, _)) => lines.next_line().await.ok().flatten(),
        None => std::future::pending().await,
    }
}
