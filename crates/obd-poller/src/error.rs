//! Session Error Types

use crate::store::ConnectionState;
use obd_protocol::ObdError;
use thiserror::Error;

/// Errors raised while starting or stopping a polling session
#[derive(Debug, Error)]
pub enum SessionError {
    /// The injected reachability check said no
    #[error("OBD adapter network is not reachable")]
    Unreachable,

    /// `start` called on a session that already left `Disconnected`
    #[error("Session cannot start from state {0:?}")]
    InvalidState(ConnectionState),

    /// Transport failure during connect or handshake
    #[error(transparent)]
    Obd(#[from] ObdError),

    /// Poll task panicked or was aborted
    #[error("Poll task ended abnormally: {0}")]
    Task(String),
}
