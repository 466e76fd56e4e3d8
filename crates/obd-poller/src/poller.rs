//! Polling Loop
//!
//! Reads the VIN once, then sweeps every polled parameter in table order,
//! one request in flight at a time, pausing between sweeps. A transport
//! failure ends the loop for good; there is no retry.

use crate::error::SessionError;
use crate::store::{ConnectionState, ReadingStore};
use obd_protocol::{
    decode_current_data, decode_vin, ObdClient, ObdError, Parameter, Vin, FINAL_FRAME_MARKER,
    VIN_COMMAND, VIN_RESPONSE_HEADER,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Sweeps the parameter table against one adapter
#[derive(Debug, Clone)]
pub struct Poller {
    /// Parameters in sweep order
    parameters: Vec<Parameter>,
    /// Pause after each full sweep
    sweep_interval: Duration,
}

impl Poller {
    pub fn new(parameters: Vec<Parameter>, sweep_interval: Duration) -> Self {
        Self {
            parameters,
            sweep_interval,
        }
    }

    /// Number of parameters per sweep
    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    /// Poll until `stop` is set (or its sender dropped) or the transport fails
    ///
    /// The stop signal is checked after the VIN, after every command and
    /// during the pause between sweeps. It cannot interrupt a pending read.
    pub async fn run<S>(
        &self,
        client: &mut ObdClient<S>,
        store: &ReadingStore,
        stop: &mut watch::Receiver<bool>,
    ) -> Result<(), ObdError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        info!("Starting OBD polling with {} parameters", self.parameters.len());

        let vin = retrieve_vin(client).await?;
        info!("Vehicle VIN: {}", vin);
        store.write_vin(vin);

        while !stop_requested(stop) {
            for param in &self.parameters {
                let response = client.send_and_receive(&param.command).await?;
                let reading = decode_current_data(&response);

                if reading.is_unsupported() {
                    debug!("{} not decodable, keeping previous value", param.command);
                } else {
                    store.write(param.key, reading);
                }

                if stop_requested(stop) {
                    return Ok(());
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.sweep_interval) => {}
                _ = stop.changed() => {}
            }
        }

        Ok(())
    }

    /// Run the loop, then release the client and record the final state
    pub async fn run_to_completion<S>(
        self,
        mut client: ObdClient<S>,
        store: Arc<ReadingStore>,
        mut stop: watch::Receiver<bool>,
    ) -> Result<(), ObdError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let result = self.run(&mut client, &store, &mut stop).await;
        client.disconnect().await;

        match &result {
            Ok(()) => {
                info!("OBD polling stopped");
                store.set_state(ConnectionState::Disconnected);
            }
            Err(e) => {
                error!("OBD polling failed: {}", e);
                store.set_state(ConnectionState::Failed);
            }
        }
        result
    }
}

fn stop_requested(stop: &watch::Receiver<bool>) -> bool {
    *stop.borrow() || stop.has_changed().is_err()
}

/// Request the VIN and collect every frame of the answer
///
/// A positive answer that lacks the final frame is completed with raw reads,
/// not new commands, until the final frame shows up or the stream ends.
pub async fn retrieve_vin<S>(client: &mut ObdClient<S>) -> Result<Vin, ObdError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let mut response = client.send_and_receive(VIN_COMMAND).await?;

    if response.starts_with(VIN_RESPONSE_HEADER) {
        while !response.contains(FINAL_FRAME_MARKER) {
            match client.read_raw().await? {
                Some(chunk) => response.push_str(&chunk),
                None => {
                    warn!("Stream ended before the final VIN frame");
                    break;
                }
            }
        }
    }

    Ok(decode_vin(&response))
}

/// Handle to a spawned poll task
pub struct PollHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<Result<(), ObdError>>,
}

impl PollHandle {
    /// Spawn `poller` on the current runtime
    pub fn spawn<S>(poller: Poller, client: ObdClient<S>, store: Arc<ReadingStore>) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (stop, stop_rx) = watch::channel(false);
        let task = tokio::spawn(poller.run_to_completion(client, store, stop_rx));
        Self { stop, task }
    }

    /// Whether the task has already ended (stopped or failed)
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signal the task to stop and wait for it
    ///
    /// Returns the transport error if the task had already failed.
    pub async fn stop(self) -> Result<(), SessionError> {
        // Fails only if the task already exited
        let _ = self.stop.send(true);
        match self.task.await {
            Ok(result) => result.map_err(SessionError::from),
            Err(e) => Err(SessionError::Task(e.to_string())),
        }
    }
}
