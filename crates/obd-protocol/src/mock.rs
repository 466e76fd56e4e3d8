//! Mock ELM327 adapter for testing.
//!
//! Listens on a loopback port, answers each `\r`-terminated command from a
//! script and records every command it receives. Replies can be split into
//! fragments written with a pause in between, so tests can exercise response
//! reassembly over a real socket.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// What the adapter does after receiving a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Write each fragment in turn
    Fragments(Vec<String>),
    /// Write each fragment, then close the connection
    Truncated(Vec<String>),
    /// Close the connection without answering
    Hangup,
}

impl Reply {
    /// Reply written in a single piece
    pub fn text(text: impl Into<String>) -> Self {
        Reply::Fragments(vec![text.into()])
    }

    /// Reply written as separate fragments
    pub fn fragments<I, T>(fragments: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Reply::Fragments(fragments.into_iter().map(Into::into).collect())
    }
}

/// Scripted replies keyed by command text
#[derive(Debug, Clone)]
pub struct AdapterScript {
    /// Replies used on every matching command
    standing: HashMap<String, Reply>,
    /// One-shot replies, consumed before the standing reply
    queued: HashMap<String, VecDeque<Reply>>,
    /// Reply for commands with no script entry
    fallback: Reply,
    /// Pause between fragments of one reply
    fragment_gap: Duration,
}

impl AdapterScript {
    /// Script that answers everything with `NO DATA`
    pub fn new() -> Self {
        Self {
            standing: HashMap::new(),
            queued: HashMap::new(),
            fallback: Reply::text("NO DATA\r\n\r\n>"),
            fragment_gap: Duration::from_millis(10),
        }
    }

    /// Answer `command` with `reply` every time
    #[must_use]
    pub fn on(mut self, command: &str, reply: Reply) -> Self {
        self.standing.insert(command.to_string(), reply);
        self
    }

    /// Answer the next occurrence of `command` with `reply`
    #[must_use]
    pub fn once(mut self, command: &str, reply: Reply) -> Self {
        self.queued
            .entry(command.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    #[must_use]
    pub fn fallback(mut self, reply: Reply) -> Self {
        self.fallback = reply;
        self
    }

    #[must_use]
    pub fn fragment_gap(mut self, gap: Duration) -> Self {
        self.fragment_gap = gap;
        self
    }

    fn next_reply(&mut self, command: &str) -> Reply {
        if let Some(reply) = self.queued.get_mut(command).and_then(VecDeque::pop_front) {
            return reply;
        }
        self.standing.get(command).unwrap_or(&self.fallback).clone()
    }
}

impl Default for AdapterScript {
    fn default() -> Self {
        Self::new()
    }
}

/// Loopback adapter serving a single client connection
pub struct MockAdapter {
    addr: SocketAddr,
    received: Arc<Mutex<Vec<String>>>,
    task: JoinHandle<()>,
}

impl MockAdapter {
    /// Bind to an ephemeral loopback port and start serving `script`
    pub async fn start(script: AdapterScript) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let received = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&received);

        let task = tokio::spawn(async move {
            match listener.accept().await {
                Ok((socket, peer)) => {
                    debug!("Mock adapter accepted {}", peer);
                    if let Err(e) = serve(socket, script, log).await {
                        debug!("Mock adapter connection ended: {}", e);
                    }
                }
                Err(e) => warn!("Mock adapter accept failed: {}", e),
            }
        });

        Ok(Self {
            addr,
            received,
            task,
        })
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Commands received so far, without the trailing carriage return
    pub fn received(&self) -> Vec<String> {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Drop for MockAdapter {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(
    mut socket: TcpStream,
    mut script: AdapterScript,
    log: Arc<Mutex<Vec<String>>>,
) -> std::io::Result<()> {
    let mut pending = String::new();
    let mut buf = [0u8; 256];

    loop {
        let n = socket.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        pending.push_str(&String::from_utf8_lossy(&buf[..n]));

        while let Some(end) = pending.find('\r') {
            let command = pending[..end].trim().to_string();
            pending.drain(..=end);
            if command.is_empty() {
                continue;
            }

            log.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(command.clone());

            let (fragments, hang_up) = match script.next_reply(&command) {
                Reply::Fragments(fragments) => (fragments, false),
                Reply::Truncated(fragments) => (fragments, true),
                Reply::Hangup => (Vec::new(), true),
            };

            for (i, fragment) in fragments.iter().enumerate() {
                if i > 0 {
                    tokio::time::sleep(script.fragment_gap).await;
                }
                socket.write_all(fragment.as_bytes()).await?;
                socket.flush().await?;
            }

            if hang_up {
                debug!("Mock adapter hanging up after {:?}", command);
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queued_reply_precedes_standing() {
        let mut script = AdapterScript::new()
            .on("010C", Reply::text("41 0C 00 00\r\n>"))
            .once("010C", Reply::Hangup);

        assert_eq!(script.next_reply("010C"), Reply::Hangup);
        assert_eq!(script.next_reply("010C"), Reply::text("41 0C 00 00\r\n>"));
        assert_eq!(script.next_reply("0999"), Reply::text("NO DATA\r\n\r\n>"));
    }

    #[tokio::test]
    async fn test_records_commands() {
        let adapter = MockAdapter::start(AdapterScript::new()).await.unwrap();
        let mut socket = TcpStream::connect(adapter.addr).await.unwrap();
        socket.write_all(b"ATZ\rATE0\r").await.unwrap();

        let mut response = String::new();
        while response.matches('>').count() < 2 {
            let mut buf = [0u8; 64];
            let n = socket.read(&mut buf).await.unwrap();
            assert!(n > 0);
            response.push_str(&String::from_utf8_lossy(&buf[..n]));
        }
        assert_eq!(adapter.received(), vec!["ATZ", "ATE0"]);
    }
}
