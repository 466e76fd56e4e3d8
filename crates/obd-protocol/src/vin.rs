//! VIN Response Decoding
//!
//! The VIN (mode 09, PID 02) arrives in one of two layouts depending on the
//! vehicle bus. CAN adapters print numbered lines (`0: `, `1: `, `2: `);
//! older protocols repeat a `49 02 nn` header in front of every four bytes.
//! Decoded VINs are masked: only the first ten characters are kept and the
//! serial number is replaced with zeros.

use crate::error::ObdError;
use std::fmt;

/// Snapshot key the VIN is published under
pub const VIN_KEY: &str = "vin";

/// Request code for the VIN
pub const VIN_COMMAND: &str = "0902";

/// Prefix of a positive VIN response
pub const VIN_RESPONSE_HEADER: &str = "49";

/// Header of the last frame of a long-form VIN response
pub const FINAL_FRAME_MARKER: &str = "49 02 05";

pub const VIN_LENGTH: usize = 17;

/// Characters kept ahead of the mask
const VISIBLE_CHARS: usize = 10;

/// Adapter status texts that are passed through untouched
const ADAPTER_MESSAGES: [&str; 3] = ["STOPPED", "NO DATA", "ERROR"];

const SHORT_FORM_MARKERS: [&str; 3] = ["0: ", "1: ", "2: "];

/// `49 02 01` plus 17 bytes, space separated
const SHORT_FORM_MAX_LEN: usize = 59;

const LONG_FORM_MIN_TOKENS: usize = 36;

/// Token positions holding VIN characters in a long-form response
const LONG_FORM_CHAR_TOKENS: [usize; VIN_LENGTH] = [
    6, 10, 11, 12, 13, 17, 18, 19, 20, 24, 25, 26, 27, 31, 32, 33, 34,
];

/// Outcome of decoding a VIN response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Vin {
    /// Masked 17-character VIN
    Decoded(String),
    /// Raw adapter text containing `STOPPED`, `NO DATA` or `ERROR`
    AdapterMessage(String),
    /// Not a VIN response
    Unrecognized,
    /// Decoding failed; holds the failure message
    Undecodable(String),
}

impl Vin {
    /// The masked VIN, if decoding succeeded
    pub fn as_decoded(&self) -> Option<&str> {
        match self {
            Vin::Decoded(vin) => Some(vin),
            _ => None,
        }
    }
}

impl fmt::Display for Vin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Vin::Decoded(text) | Vin::AdapterMessage(text) | Vin::Undecodable(text) => {
                f.write_str(text)
            }
            Vin::Unrecognized => f.write_str(crate::pid::UNSUPPORTED),
        }
    }
}

/// Decode the accumulated response to a `0902` request
///
/// Never fails: problems surface as [`Vin::AdapterMessage`],
/// [`Vin::Unrecognized`] or [`Vin::Undecodable`].
pub fn decode_vin(raw: &str) -> Vin {
    if ADAPTER_MESSAGES.iter().any(|msg| raw.contains(msg)) {
        return Vin::AdapterMessage(raw.to_string());
    }

    let joined = raw.replace("\r\n", "");
    let result = match joined.find(SHORT_FORM_MARKERS[0]) {
        Some(start) => decode_short_form(&joined[start..]).map(Vin::Decoded),
        None => decode_long_form(&joined),
    };

    result.unwrap_or_else(|err| Vin::Undecodable(err.to_string()))
}

fn decode_short_form(text: &str) -> Result<String, ObdError> {
    let mut body = text.to_string();
    for marker in SHORT_FORM_MARKERS {
        body = body.replace(marker, "");
    }
    let body: String = body.trim().chars().take(SHORT_FORM_MAX_LEN).collect();

    let decoded = body
        .split(' ')
        .map(hex_char)
        .collect::<Result<String, _>>()?;

    let count = decoded.chars().count();
    let vin: String = if count > VIN_LENGTH {
        decoded.chars().skip(count - VIN_LENGTH).collect()
    } else {
        decoded
    };

    mask(&vin)
}

fn decode_long_form(text: &str) -> Result<Vin, ObdError> {
    let tokens: Vec<&str> = text.split(' ').collect();

    if tokens.len() < LONG_FORM_MIN_TOKENS || tokens[0].trim() != VIN_RESPONSE_HEADER {
        return Ok(Vin::Unrecognized);
    }
    if tokens[1] != "02" {
        return Ok(Vin::Unrecognized);
    }

    let vin = LONG_FORM_CHAR_TOKENS
        .iter()
        .map(|&i| hex_char(tokens[i]))
        .collect::<Result<String, _>>()?;

    mask(&vin).map(Vin::Decoded)
}

fn hex_char(token: &str) -> Result<char, ObdError> {
    let digits = token.trim();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ObdError::InvalidResponse(format!(
            "{:?} is not a hex byte",
            token
        )));
    }
    u32::from_str_radix(digits, 16)
        .ok()
        .and_then(char::from_u32)
        .ok_or_else(|| ObdError::InvalidResponse(format!("{:?} is not a character code", token)))
}

fn mask(vin: &str) -> Result<String, ObdError> {
    if vin.chars().count() < VISIBLE_CHARS {
        return Err(ObdError::InvalidResponse(format!(
            "VIN {:?} is shorter than {} characters",
            vin, VISIBLE_CHARS
        )));
    }
    let mut masked: String = vin.chars().take(VISIBLE_CHARS).collect();
    masked.extend(std::iter::repeat('0').take(VIN_LENGTH - VISIBLE_CHARS));
    Ok(masked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const VIN: &str = "1D4GP00R55B123456";

    fn hex(s: &str) -> Vec<String> {
        s.bytes().map(|b| format!("{:02X}", b)).collect()
    }

    /// Multi-line CAN layout, as printed with linefeeds on
    fn short_form(vin: &str) -> String {
        let mut bytes = vec!["49".to_string(), "02".to_string(), "01".to_string()];
        bytes.extend(hex(vin));
        format!(
            "014 \r\n0: {} \r\n1: {} \r\n2: {} \r\n\r\n>",
            bytes[0..6].join(" "),
            bytes[6..13].join(" "),
            bytes[13..20].join(" ")
        )
    }

    /// Legacy layout with a header in front of every four bytes
    fn long_form(vin: &str) -> String {
        let bytes = hex(vin);
        let mut text = format!("49 02 01 00 00 00 {} \r\n", bytes[0]);
        for (i, chunk) in bytes[1..].chunks(4).enumerate() {
            text.push_str(&format!("49 02 {:02X} {} \r\n", i + 2, chunk.join(" ")));
        }
        text.push_str("\r\n>");
        text
    }

    #[test]
    fn test_request_codes_match_mode() {
        assert_eq!(crate::mode::request(crate::mode::VEHICLE_INFO, 0x02), VIN_COMMAND);
        assert_eq!(
            crate::mode::response_header(crate::mode::VEHICLE_INFO),
            VIN_RESPONSE_HEADER
        );
    }

    #[test]
    fn test_short_form() {
        let vin = decode_vin(&short_form(VIN));
        assert_eq!(vin, Vin::Decoded("1D4GP00R550000000".to_string()));
    }

    #[test]
    fn test_long_form() {
        let raw = long_form(VIN);
        assert!(raw.contains(FINAL_FRAME_MARKER));
        assert_eq!(decode_vin(&raw).as_decoded(), Some("1D4GP00R550000000"));
    }

    #[test]
    fn test_adapter_messages_pass_through() {
        for raw in ["NO DATA\r\n\r\n>", "STOPPED\r\n>", "CAN ERROR\r\n>"] {
            let vin = decode_vin(raw);
            assert_eq!(vin, Vin::AdapterMessage(raw.to_string()));
            assert_eq!(vin.to_string(), raw);
        }
    }

    #[test]
    fn test_long_form_needs_36_tokens() {
        let vin = decode_vin("49 02 01 00 00 00 31 \r\n>");
        assert_eq!(vin, Vin::Unrecognized);
        assert_eq!(vin.to_string(), "ERROR");
    }

    #[test]
    fn test_long_form_needs_vin_header() {
        let raw = long_form(VIN).replacen("49", "48", 1);
        assert_eq!(decode_vin(&raw), Vin::Unrecognized);
    }

    #[test]
    fn test_long_form_needs_pid_02() {
        let raw = long_form(VIN).replace("49 02", "49 04");
        assert_eq!(decode_vin(&raw), Vin::Unrecognized);
    }

    #[test]
    fn test_bad_hex_is_reported() {
        let raw = short_form(VIN).replace("44", "G4");
        match decode_vin(&raw) {
            Vin::Undecodable(msg) => assert!(msg.contains("G4"), "{}", msg),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_short_vin_is_reported() {
        match decode_vin("0: 31 32 33") {
            Vin::Undecodable(msg) => assert!(msg.contains("shorter"), "{}", msg),
            other => panic!("unexpected {:?}", other),
        }
    }

    proptest! {
        #[test]
        fn masking_keeps_first_ten(vin in "[A-HJ-NPR-Z0-9]{17}") {
            for raw in [short_form(&vin), long_form(&vin)] {
                let decoded = decode_vin(&raw);
                let text = decoded.as_decoded().expect("decoded");
                prop_assert_eq!(text.len(), VIN_LENGTH);
                prop_assert_eq!(&text[..10], &vin[..10]);
                prop_assert_eq!(&text[10..], "0000000");
            }
        }

        #[test]
        fn short_form_keeps_trailing_seventeen(
            prefix in "[A-Z]{1,3}",
            vin in "[A-HJ-NPR-Z0-9]{17}",
        ) {
            let bytes: Vec<String> = hex(&prefix).into_iter().chain(hex(&vin)).collect();
            let raw = format!("0: {}", bytes.join(" "));
            let decoded = decode_vin(&raw);
            prop_assert_eq!(
                decoded.as_decoded().map(|v| v[..10].to_string()),
                Some(vin[..10].to_string())
            );
        }
    }
}
