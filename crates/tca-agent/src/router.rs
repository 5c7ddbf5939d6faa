//! Command action names and the dispatch table keyed on them.

use std::fmt;

/// Action name used for unsolicited listener deliveries pushed to the
/// Test Manager.
pub const RESPONSE_ON_RECEIVE: &str = "onReceive";

/// Commands the agent accepts from the Test Manager.
///
/// Wire names are fixed protocol identifiers; anything else is logged and
/// dropped without a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    SendCommand,
    RegisterListener,
    UnregisterListener,
    RpcClient,
    RpcServer,
    Publisher,
    Subscriber,
}

impl Action {
    /// Parse a wire action name. Exact match, case-sensitive.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "sendCommand" => Some(Self::SendCommand),
            "registerListener" => Some(Self::RegisterListener),
            "unregisterListener" => Some(Self::UnregisterListener),
            "rpcClient" => Some(Self::RpcClient),
            "rpcServer" => Some(Self::RpcServer),
            "publisher" => Some(Self::Publisher),
            "subscriber" => Some(Self::Subscriber),
            _ => None,
        }
    }

    /// Wire name of this action, echoed back in responses.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SendCommand => "sendCommand",
            Self::RegisterListener => "registerListener",
            Self::UnregisterListener => "unregisterListener",
            Self::RpcClient => "rpcClient",
            Self::RpcServer => "rpcServer",
            Self::Publisher => "publisher",
            Self::Subscriber => "subscriber",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Action; 7] = [
        Action::SendCommand,
        Action::RegisterListener,
        Action::UnregisterListener,
        Action::RpcClient,
        Action::RpcServer,
        Action::Publisher,
        Action::Subscriber,
    ];

    #[test]
    fn test_wire_names_round_trip() {
        for action in ALL {
            assert_eq!(Action::parse(action.as_str()), Some(action));
        }
    }

    #[test]
    fn test_unknown_and_miscased_names_rejected() {
        assert_eq!(Action::parse("teleport"), None);
        assert_eq!(Action::parse("SENDCOMMAND"), None);
        assert_eq!(Action::parse("sendcommand"), None);
        assert_eq!(Action::parse(""), None);
    }
}
