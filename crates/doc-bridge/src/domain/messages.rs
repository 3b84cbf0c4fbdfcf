//! Host control messages.
//!
//! The host boundary is a single channel carrying one opaque string at a
//! time.  Exactly two sentinel values are reserved; *everything* else is
//! passthrough payload for the server.
//!
//! This conflation is deliberate: a malformed command is indistinguishable
//! from legitimate protocol data and is forwarded rather than rejected, so
//! the bridge never has to understand the server's protocol.

/// Sentinel the host sends once its scripting side has fully started and
/// wants the bridge connection established.
pub const OPEN_SENTINEL: &str = "HULLO";

/// Sentinel the host sends when its document window is going away.
pub const CLOSE_SENTINEL: &str = "BYE";

/// One classified host control message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCommand {
    /// Establish the bridge connection and send the initial document URL.
    Open,
    /// Signal session teardown (closes the notification pipe only).
    Close,
    /// Anything else: forwarded verbatim to the server.
    Passthrough(String),
}

impl HostCommand {
    /// Classifies one raw host message.
    pub fn parse(raw: &str) -> Self {
        match raw {
            OPEN_SENTINEL => HostCommand::Open,
            CLOSE_SENTINEL => HostCommand::Close,
            other => HostCommand::Passthrough(other.to_string()),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_sentinel_parses_to_open() {
        assert_eq!(HostCommand::parse("HULLO"), HostCommand::Open);
    }

    #[test]
    fn test_close_sentinel_parses_to_close() {
        assert_eq!(HostCommand::parse("BYE"), HostCommand::Close);
    }

    #[test]
    fn test_arbitrary_message_is_passthrough() {
        assert_eq!(
            HostCommand::parse("load url=file:///doc.odt"),
            HostCommand::Passthrough("load url=file:///doc.odt".to_string())
        );
    }

    #[test]
    fn test_sentinels_are_case_sensitive() {
        // "hullo" is not the sentinel; like any unrecognized message it is
        // forwarded rather than rejected.
        assert_eq!(
            HostCommand::parse("hullo"),
            HostCommand::Passthrough("hullo".to_string())
        );
    }

    #[test]
    fn test_empty_message_is_passthrough() {
        assert_eq!(
            HostCommand::parse(""),
            HostCommand::Passthrough(String::new())
        );
    }
}
