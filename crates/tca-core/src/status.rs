//! Status model reported to the Test Manager for every handled command.
//!
//! Every synchronous command result is a [`Status`]: a numeric code, a
//! human-readable message, and an (always empty today) details array. The
//! numeric values are fixed by the conformance protocol and must not be
//! renumbered.

use serde::{Deserialize, Serialize};

/// Numeric result code carried in a [`Status`].
///
/// Serialized as a bare number on the wire (e.g. `"code": 5`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u32", try_from = "u32")]
pub enum StatusCode {
    /// The command succeeded.
    Ok,
    /// The command's data document could not be parsed into the shape
    /// the action requires.
    InvalidFormat,
    /// No registry entry exists for the given URI, or the request named
    /// an unrecognized payload format.
    NotFound,
    /// A conflicting registration already exists (one RPC server per URI).
    AlreadyExists,
    /// An opaque transport failure.
    Internal,
    /// The transport refused or could not reach the substrate.
    Unavailable,
}

impl From<StatusCode> for u32 {
    fn from(code: StatusCode) -> Self {
        match code {
            StatusCode::Ok => 0,
            StatusCode::InvalidFormat => 3,
            StatusCode::NotFound => 5,
            StatusCode::AlreadyExists => 6,
            StatusCode::Internal => 13,
            StatusCode::Unavailable => 14,
        }
    }
}

impl TryFrom<u32> for StatusCode {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(StatusCode::Ok),
            3 => Ok(StatusCode::InvalidFormat),
            5 => Ok(StatusCode::NotFound),
            6 => Ok(StatusCode::AlreadyExists),
            13 => Ok(StatusCode::Internal),
            14 => Ok(StatusCode::Unavailable),
            other => Err(format!("unknown status code {other}")),
        }
    }
}

/// Outcome of a handled command, serialized into the response envelope as
/// `{"message": ..., "code": ..., "details": []}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Status {
    /// Human-readable description; empty on success.
    pub message: String,
    /// Numeric result code.
    pub code: StatusCode,
    /// Structured error details. Always empty at this layer, kept for
    /// wire compatibility.
    #[serde(default)]
    pub details: Vec<serde_json::Value>,
}

impl Status {
    /// Build a status with the given code and message.
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code,
            details: Vec::new(),
        }
    }

    /// A successful status with an empty message.
    pub fn ok() -> Self {
        Self::new(StatusCode::Ok, "")
    }

    /// Returns `true` if the code is [`StatusCode::Ok`].
    pub fn is_ok(&self) -> bool {
        self.code == StatusCode::Ok
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_serializes_as_number() {
        let status = Status::new(StatusCode::NotFound, "no handles registered");
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["code"], 5);
        assert_eq!(json["message"], "no handles registered");
        assert_eq!(json["details"], serde_json::json!([]));
    }

    #[test]
    fn test_code_round_trip() {
        for code in [
            StatusCode::Ok,
            StatusCode::InvalidFormat,
            StatusCode::NotFound,
            StatusCode::AlreadyExists,
            StatusCode::Internal,
            StatusCode::Unavailable,
        ] {
            let n = u32::from(code);
            assert_eq!(StatusCode::try_from(n).unwrap(), code);
        }
    }

    #[test]
    fn test_unknown_code_rejected() {
        assert!(StatusCode::try_from(42).is_err());
    }

    #[test]
    fn test_ok_is_ok() {
        assert!(Status::ok().is_ok());
        assert!(!Status::new(StatusCode::AlreadyExists, "dup").is_ok());
    }
}
