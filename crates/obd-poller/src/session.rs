//! Polling session
//!
//! Consumer-facing entry point: connect, run the handshake, start the poll
//! task, then hand out drain-read snapshots until shutdown or failure.

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::poller::{PollHandle, Poller};
use crate::store::{ConnectionState, ReadingStore, Snapshot};
use obd_protocol::{parameter_table, ObdClient, Parameter};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{info, warn};

/// One adapter connection and its background poll task
pub struct ObdSession {
    config: SessionConfig,
    parameters: Vec<Parameter>,
    store: Arc<ReadingStore>,
    poll: Option<PollHandle>,
}

impl ObdSession {
    /// Create an idle session polling the full parameter table
    pub fn new(config: SessionConfig) -> Self {
        let parameters = parameter_table();
        let store = Arc::new(ReadingStore::new(&parameters));
        Self {
            config,
            parameters,
            store,
            poll: None,
        }
    }

    /// Shared store the poll task writes into
    pub fn store(&self) -> Arc<ReadingStore> {
        Arc::clone(&self.store)
    }

    pub fn state(&self) -> ConnectionState {
        self.store.state()
    }

    /// Connect and start polling. Returns `false` on any failure.
    ///
    /// `adapter_reachable` is the caller's check that a compatible adapter
    /// network is up; nothing is attempted when it is `false`.
    pub async fn init(&mut self, adapter_reachable: bool) -> bool {
        match self.start(adapter_reachable).await {
            Ok(()) => true,
            Err(e) => {
                warn!("OBD session init failed: {}", e);
                false
            }
        }
    }

    /// Like [`ObdSession::init`], reporting why startup failed
    pub async fn start(&mut self, adapter_reachable: bool) -> Result<(), SessionError> {
        self.ensure_idle()?;
        if !adapter_reachable {
            return Err(SessionError::Unreachable);
        }

        self.store.set_state(ConnectionState::Connecting);
        let client = match ObdClient::connect(&self.config.host, self.config.port).await {
            Ok(client) => client,
            Err(e) => {
                self.store.set_state(ConnectionState::Failed);
                return Err(e.into());
            }
        };

        let client = client
            .with_buffer_size(self.config.read_buffer_size)
            .with_response_delay(self.config.response_delay());
        self.launch(client).await
    }

    /// Start polling over an already open client
    pub async fn start_with<S>(&mut self, client: ObdClient<S>) -> Result<(), SessionError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        self.ensure_idle()?;
        self.store.set_state(ConnectionState::Connecting);
        self.launch(client).await
    }

    async fn launch<S>(&mut self, mut client: ObdClient<S>) -> Result<(), SessionError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        // A restarted session must not serve the previous VIN
        self.store.clear();
        self.store.set_state(ConnectionState::Initializing);
        if let Err(e) = client.initialize().await {
            client.disconnect().await;
            self.store.set_state(ConnectionState::Failed);
            return Err(e.into());
        }

        self.store.set_state(ConnectionState::Polling);
        let poller = Poller::new(self.parameters.clone(), self.config.sweep_interval());
        info!("Polling {} parameters from {}", poller.parameter_count(), client.peer());
        self.poll = Some(PollHandle::spawn(poller, client, self.store()));
        Ok(())
    }

    fn ensure_idle(&self) -> Result<(), SessionError> {
        let state = self.store.state();
        if self.poll.is_some() || state != ConnectionState::Disconnected {
            return Err(SessionError::InvalidState(state));
        }
        Ok(())
    }

    /// Drain-read the store, `None` when not connected
    pub fn read_snapshot(&self) -> Option<Snapshot> {
        self.store.read_and_reset()
    }

    /// Stop the poll task and wait for it to release the connection
    ///
    /// Returns the transport error if polling had already failed; the state
    /// then stays `Failed`.
    pub async fn shutdown(&mut self) -> Result<(), SessionError> {
        match self.poll.take() {
            Some(handle) => handle.stop().await,
            None => Ok(()),
        }
    }
}
