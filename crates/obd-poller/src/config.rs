//! Session configuration

use obd_protocol::{DEFAULT_BUFFER_SIZE, DEFAULT_RESPONSE_DELAY};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for connecting to and polling the adapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Adapter address (OBDLink MX Wi-Fi default: 192.168.0.10)
    pub host: String,
    /// Adapter TCP port
    pub port: u16,
    /// Pause between sending a command and reading its response (ms)
    pub response_delay_ms: u64,
    /// Pause between two parameter sweeps (ms)
    pub sweep_interval_ms: u64,
    /// Bytes requested per socket read
    pub read_buffer_size: usize,
}

impl SessionConfig {
    pub fn response_delay(&self) -> Duration {
        Duration::from_millis(self.response_delay_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: "192.168.0.10".to_string(),
            port: 35000,
            response_delay_ms: DEFAULT_RESPONSE_DELAY.as_millis() as u64,
            sweep_interval_ms: 100,
            read_buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}
