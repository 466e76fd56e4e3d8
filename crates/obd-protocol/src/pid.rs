//! OBD-II PID Definitions and Response Parsing
//!
//! Mode 01 responses are decoded through a declarative table. All formulas
//! use integer arithmetic that truncates toward zero, so `(0x7F - 128) * 100
//! / 128` yields `0`, not `-1`.

use crate::mode;
use std::fmt;
use tracing::debug;

/// Legacy encoding of "no valid reading"
pub const NO_READING: &str = "-255";

/// Legacy encoding of "PID not recognized by the decoder"
pub const UNSUPPORTED: &str = "ERROR";

/// Header of a positive mode 01 response
const CURRENT_DATA_HEADER: &str = "41";

/// Shortest normalized frame that can carry a PID code
const MIN_FRAME_LEN: usize = 6;

/// Decoded value of a single mode 01 response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Reading {
    /// Value in engineering units
    Value(i64),
    /// Computed value fell outside the PID's valid range
    OutOfRange,
    /// Missing, malformed or negative response
    #[default]
    NoReading,
    /// PID not known to the decoder
    Unsupported,
}

impl Reading {
    /// Whether this reading should leave a stored value untouched
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Reading::Unsupported)
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reading::Value(v) => write!(f, "{}", v),
            Reading::OutOfRange | Reading::NoReading => f.write_str(NO_READING),
            Reading::Unsupported => f.write_str(UNSUPPORTED),
        }
    }
}

/// Transform applied to the raw data bytes of a PID
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Formula {
    /// A * 100 / 255
    Percent,
    /// (A - 128) * 100 / 128
    SignedPercent,
    /// A - 40
    Temperature,
    /// A, or 256A + B for two-byte PIDs
    Raw,
    /// (256A + B) / divisor
    Scaled(i64),
}

impl Formula {
    /// Apply the formula to the big-endian data bytes
    pub fn apply(self, raw: i64) -> i64 {
        match self {
            Formula::Percent => raw * 100 / 255,
            Formula::SignedPercent => (raw - 128) * 100 / 128,
            Formula::Temperature => raw - 40,
            Formula::Raw => raw,
            Formula::Scaled(divisor) => raw / divisor,
        }
    }
}

/// Decoding rule for one PID
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PidSpec {
    /// Two hex digits as they appear in the response, e.g. `0C`
    pub code: &'static str,
    pub name: &'static str,
    /// Number of data bytes following the PID
    pub byte_width: usize,
    pub formula: Formula,
    /// Inclusive bounds; values outside become [`Reading::OutOfRange`]
    pub valid_range: Option<(i64, i64)>,
}

impl PidSpec {
    const fn new(
        code: &'static str,
        name: &'static str,
        byte_width: usize,
        formula: Formula,
    ) -> Self {
        Self {
            code,
            name,
            byte_width,
            formula,
            valid_range: None,
        }
    }

    const fn bounded(mut self, min: i64, max: i64) -> Self {
        self.valid_range = Some((min, max));
        self
    }

    /// Apply the formula and the range check
    pub fn evaluate(&self, raw: i64) -> Reading {
        let value = self.formula.apply(raw);
        match self.valid_range {
            Some((min, max)) if value < min || value > max => Reading::OutOfRange,
            _ => Reading::Value(value),
        }
    }
}

/// Every PID the decoder understands
pub const PID_TABLE: [PidSpec; 16] = [
    PidSpec::new("04", "Engine load", 1, Formula::Percent),
    PidSpec::new("06", "Short term fuel trim bank 1", 1, Formula::SignedPercent),
    PidSpec::new("07", "Long term fuel trim bank 1", 1, Formula::SignedPercent),
    PidSpec::new("0C", "Engine RPM", 2, Formula::Scaled(4)).bounded(0, 16383),
    PidSpec::new("0D", "Vehicle speed", 1, Formula::Raw).bounded(0, 255),
    PidSpec::new("0F", "Intake air temperature", 1, Formula::Temperature),
    PidSpec::new("10", "MAF air flow rate", 2, Formula::Scaled(100)).bounded(0, 655),
    PidSpec::new("11", "Throttle position", 1, Formula::Percent),
    PidSpec::new("1F", "Run time since engine start", 2, Formula::Raw),
    PidSpec::new("21", "Distance travelled with MIL on", 2, Formula::Raw),
    PidSpec::new("2C", "Commanded EGR", 1, Formula::Percent),
    PidSpec::new("2D", "EGR error", 1, Formula::SignedPercent),
    PidSpec::new("33", "Barometric pressure", 1, Formula::Raw),
    PidSpec::new("45", "Relative throttle position", 1, Formula::Percent),
    PidSpec::new("46", "Ambient air temperature", 1, Formula::Temperature),
    PidSpec::new("5E", "Engine fuel rate", 2, Formula::Scaled(20)).bounded(0, 3212),
];

/// Find the decoding rule for a two-digit PID code
pub fn lookup_pid(code: &str) -> Option<&'static PidSpec> {
    PID_TABLE.iter().find(|spec| spec.code == code)
}

/// Decode a raw mode 01 response into a [`Reading`]
///
/// CR, LF, spaces and the prompt are stripped first, so `"41 0C 1F 40\r\n>"`
/// and `"410C1F40"` decode identically.
pub fn decode_current_data(raw: &str) -> Reading {
    let normalized: String = raw
        .chars()
        .filter(|c| !matches!(c, '\r' | '\n' | ' ' | '>'))
        .collect();
    let frame = normalized.trim();

    if !frame.starts_with(CURRENT_DATA_HEADER) || frame.len() < MIN_FRAME_LEN {
        return Reading::NoReading;
    }

    let Some(spec) = frame.get(2..4).and_then(lookup_pid) else {
        return Reading::Unsupported;
    };

    match frame.get(4..4 + spec.byte_width * 2).and_then(parse_hex) {
        Some(raw) => spec.evaluate(raw),
        None => {
            debug!("Malformed {} frame (PID {}): {:?}", spec.name, spec.code, frame);
            Reading::NoReading
        }
    }
}

fn parse_hex(digits: &str) -> Option<i64> {
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    i64::from_str_radix(digits, 16).ok()
}

/// A polled parameter: request code plus the key it is published under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub command: String,
    pub key: &'static str,
}

/// PIDs polled on every sweep, in sweep order
const POLLED_PIDS: [(u8, &str); 12] = [
    (0x10, "fr"),
    (0x04, "el"),
    (0x06, "stfb"),
    (0x07, "ltfb"),
    (0x0C, "rpm"),
    (0x0D, "spd"),
    (0x11, "tp"),
    (0x1F, "rt"),
    (0x21, "dis"),
    (0x45, "rtp"),
    (0x46, "ot"),
    (0x5E, "efr"),
];

/// Build the table of polled parameters
pub fn parameter_table() -> Vec<Parameter> {
    POLLED_PIDS
        .iter()
        .map(|&(pid, key)| Parameter {
            command: mode::request(mode::CURRENT_DATA, pid),
            key,
        })
        .collect()
}
