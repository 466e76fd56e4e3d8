//! OBD-II Client for ELM327 Adapters
//!
//! Transport session over a single byte stream (a TCP socket in production).
//! Commands go out as ASCII terminated by a carriage return. Responses are
//! accumulated across reads until the adapter prints its `>` prompt.
//!
//! Any I/O failure releases the stream; later calls return
//! [`ObdError::NotConnected`]. Reads have no timeout, so a silent adapter
//! stalls the caller.

use crate::error::ObdError;
use crate::protocol::HANDSHAKE;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

/// Size of a single socket read
pub const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Pause between writing a command and reading the answer
pub const DEFAULT_RESPONSE_DELAY: Duration = Duration::from_millis(100);

/// Printed by the adapter once it is ready for the next command
pub const PROMPT: char = '>';

/// Emitted while the adapter auto-detects the vehicle protocol
const SEARCHING_NOISE: &str = "SEARCHING...\r\n";

/// OBD-II client for communicating with ELM327-compatible adapters
pub struct ObdClient<S = TcpStream> {
    /// Open stream, `None` once released
    stream: Option<S>,
    /// Peer description for logs (e.g., "192.168.0.10:35000")
    peer: String,
    /// Bytes requested per read
    buffer_size: usize,
    /// Delay between send and receive in `send_and_receive`
    response_delay: Duration,
}

impl ObdClient<TcpStream> {
    /// Open a TCP connection to the adapter. Does not retry.
    pub async fn connect(host: &str, port: u16) -> Result<Self, ObdError> {
        let peer = format!("{}:{}", host, port);
        info!("Connecting to OBD adapter at {}", peer);

        let stream = TcpStream::connect((host, port)).await.map_err(|e| {
            warn!("Connection to {} failed: {}", peer, e);
            ObdError::Connection(format!("{}: {}", peer, e))
        })?;
        stream.set_nodelay(true)?;

        info!("Connected to OBD adapter at {}", peer);
        Ok(Self::from_stream(stream, peer))
    }
}

impl<S> ObdClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap an already open stream
    pub fn from_stream(stream: S, peer: impl Into<String>) -> Self {
        Self {
            stream: Some(stream),
            peer: peer.into(),
            buffer_size: DEFAULT_BUFFER_SIZE,
            response_delay: DEFAULT_RESPONSE_DELAY,
        }
    }

    /// Set the per-read buffer size
    #[must_use]
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size.max(1);
        self
    }

    /// Set the delay used by `send_and_receive`
    #[must_use]
    pub fn with_response_delay(mut self, delay: Duration) -> Self {
        self.response_delay = delay;
        self
    }

    /// Check if the stream is still held
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Write `command` followed by a carriage return
    pub async fn send(&mut self, command: &str) -> Result<(), ObdError> {
        debug!("Sending {:?}", command);
        let mut frame = Vec::with_capacity(command.len() + 1);
        frame.extend_from_slice(command.as_bytes());
        frame.push(b'\r');

        let stream = self.stream.as_mut().ok_or(ObdError::NotConnected)?;
        let written = write_frame(stream, &frame).await;
        written.map_err(|e| self.fail(e))
    }

    /// Single low-level read. Returns `None` once the adapter closed the stream.
    pub async fn read_raw(&mut self) -> Result<Option<String>, ObdError> {
        let mut buf = vec![0u8; self.buffer_size];
        let stream = self.stream.as_mut().ok_or(ObdError::NotConnected)?;
        let read = stream.read(&mut buf).await;

        match read {
            Ok(0) => Ok(None),
            Ok(n) => {
                let chunk = String::from_utf8_lossy(&buf[..n]).into_owned();
                debug!("Read {} bytes: {:?}", n, chunk);
                Ok(Some(chunk))
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Accumulate reads until the trimmed text ends with the prompt
    pub async fn receive_until_prompt(&mut self) -> Result<String, ObdError> {
        let mut response = String::new();

        while !response.trim().ends_with(PROMPT) {
            match self.read_raw().await? {
                Some(chunk) => response.push_str(&chunk),
                None => {
                    warn!("Adapter at {} closed the connection mid-response", self.peer);
                    self.stream = None;
                    return Err(ObdError::ConnectionClosed);
                }
            }
        }

        Ok(response)
    }

    /// Send a command, give the adapter time to answer, then read the
    /// complete response with `SEARCHING...` noise removed
    pub async fn send_and_receive(&mut self, command: &str) -> Result<String, ObdError> {
        self.send(command).await?;
        tokio::time::sleep(self.response_delay).await;

        let response = self.receive_until_prompt().await?;
        debug!("Received {:?} for {}", response, command);
        Ok(response.replace(SEARCHING_NOISE, ""))
    }

    /// Run the fixed initialization handshake
    ///
    /// Response text is ignored; only transport failures count.
    pub async fn initialize(&mut self) -> Result<(), ObdError> {
        info!("Initializing OBD adapter on {}", self.peer);

        for command in HANDSHAKE {
            let response = self.send_and_receive(command.to_elm_command()).await?;
            debug!("{:?} answered {:?}", command, response.trim());
        }

        info!("OBD adapter initialized successfully");
        Ok(())
    }

    /// Shut down and release the stream
    pub async fn disconnect(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            info!("Disconnecting OBD client from {}", self.peer);
            if let Err(e) = stream.shutdown().await {
                debug!("Shutdown of {} failed: {}", self.peer, e);
            }
        }
    }

    /// Release the stream after an I/O failure
    fn fail(&mut self, err: std::io::Error) -> ObdError {
        warn!("I/O error on {}: {}", self.peer, err);
        self.stream = None;
        err.into()
    }
}

async fn write_frame<S>(stream: &mut S, frame: &[u8]) -> std::io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(frame).await?;
    stream.flush().await
}
