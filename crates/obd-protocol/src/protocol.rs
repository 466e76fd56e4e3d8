//! ELM327 Adapter Commands

/// AT commands sent to the adapter during initialization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElmCommand {
    /// Full adapter reset
    Reset,
    /// Stop echoing commands back
    EchoOff,
    /// Terminate response lines with CR LF
    LinefeedsOn,
    /// Let the adapter detect the vehicle protocol
    AutoProtocol,
}

impl ElmCommand {
    /// Get the command text as sent on the wire (without the trailing CR)
    pub fn to_elm_command(&self) -> &'static str {
        match self {
            ElmCommand::Reset => "ATZ",
            ElmCommand::EchoOff => "ATE0",
            ElmCommand::LinefeedsOn => "ATL1",
            ElmCommand::AutoProtocol => "ATSP00",
        }
    }
}

/// Handshake sent once after connecting. Order matters.
pub const HANDSHAKE: [ElmCommand; 4] = [
    ElmCommand::Reset,
    ElmCommand::EchoOff,
    ElmCommand::LinefeedsOn,
    ElmCommand::AutoProtocol,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_order() {
        let commands: Vec<_> = HANDSHAKE.iter().map(|c| c.to_elm_command()).collect();
        assert_eq!(commands, vec!["ATZ", "ATE0", "ATL1", "ATSP00"]);
    }
}
