//! OBD-II Protocol Implementation
//!
//! This crate provides async communication with ELM327-compatible OBD-II
//! adapters reachable over TCP (Wi-Fi dongles). It covers the transport
//! session, the fixed initialization handshake and the decoding of mode 01
//! and VIN responses.

mod client;
mod error;
pub mod mock;
mod pid;
mod protocol;
mod vin;

pub use client::{ObdClient, DEFAULT_BUFFER_SIZE, DEFAULT_RESPONSE_DELAY, PROMPT};
pub use error::ObdError;
pub use pid::{
    decode_current_data, lookup_pid, parameter_table, Formula, Parameter, PidSpec, Reading,
    NO_READING, PID_TABLE, UNSUPPORTED,
};
pub use protocol::{ElmCommand, HANDSHAKE};
pub use vin::{
    decode_vin, Vin, FINAL_FRAME_MARKER, VIN_COMMAND, VIN_KEY, VIN_LENGTH, VIN_RESPONSE_HEADER,
};

/// OBD-II mode constants
pub mod mode {
    /// Current data
    pub const CURRENT_DATA: u8 = 0x01;
    /// Vehicle information
    pub const VEHICLE_INFO: u8 = 0x09;
    /// Added to the mode byte in a positive response
    pub const POSITIVE_RESPONSE_OFFSET: u8 = 0x40;

    /// Format a 4-character request code, e.g. `010C`
    pub fn request(mode: u8, pid: u8) -> String {
        format!("{:02X}{:02X}", mode, pid)
    }

    /// Header a positive response to `mode` starts with, e.g. `41`
    pub fn response_header(mode: u8) -> String {
        format!("{:02X}", mode + POSITIVE_RESPONSE_OFFSET)
    }
}
