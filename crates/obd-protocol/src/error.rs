//! OBD-II Error Types

use thiserror::Error;

/// Errors that can occur while talking to the adapter
#[derive(Debug, Error)]
pub enum ObdError {
    /// Socket connect, write or read failure
    #[error("Connection error: {0}")]
    Connection(String),

    /// Adapter closed the stream before the prompt arrived
    #[error("Connection closed by adapter")]
    ConnectionClosed,

    /// Session was never opened or has already been released
    #[error("OBD adapter not connected")]
    NotConnected,

    /// Invalid response from adapter
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<std::io::Error> for ObdError {
    fn from(err: std::io::Error) -> Self {
        ObdError::Connection(err.to_string())
    }
}
