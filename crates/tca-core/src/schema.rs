//! Message schema shared between the Test Manager wire protocol and the
//! messaging transport.
//!
//! A [`Uri`] is deliberately opaque: the registry and the transport treat
//! it as an exact-match byte string. No wildcard or prefix semantics exist
//! anywhere in the agent.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical addressing identifier for a message source or sink.
///
/// Used in its exact serialized form as the registry key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uri(String);

impl Uri {
    /// Wrap a canonical URI string.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The exact key form of this URI.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Uri {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Enumerated encoding describing how payload bytes are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PayloadFormat {
    /// No format declared; accepted as-is.
    #[default]
    Unspecified,
    /// UTF-8 text.
    Text,
    /// JSON document.
    Json,
    /// Raw bytes.
    Raw,
}

impl PayloadFormat {
    /// Parse a wire-level format name. Returns `None` for unrecognized
    /// names — the caller decides whether that is an error.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "UNSPECIFIED" => Some(Self::Unspecified),
            "TEXT" => Some(Self::Text),
            "JSON" => Some(Self::Json),
            "RAW" => Some(Self::Raw),
            _ => None,
        }
    }

    /// Resolve an optional wire field: a *missing* format defaults to
    /// [`PayloadFormat::Unspecified`]; a *present but unrecognized* name
    /// is rejected with `None`.
    pub fn from_wire(field: Option<&str>) -> Option<Self> {
        match field {
            None => Some(Self::Unspecified),
            Some(name) => Self::parse(name),
        }
    }

    /// Wire-level name of this format.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unspecified => "UNSPECIFIED",
            Self::Text => "TEXT",
            Self::Json => "JSON",
            Self::Raw => "RAW",
        }
    }
}

/// Priority class attached to RPC invocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Priority {
    Cs0,
    #[default]
    Cs1,
    Cs2,
    Cs3,
    /// Fixed class used for every RPC-client invocation issued by the agent.
    Cs4,
    Cs5,
    Cs6,
}

impl Priority {
    /// Wire-level name of this priority class.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cs0 => "CS0",
            Self::Cs1 => "CS1",
            Self::Cs2 => "CS2",
            Self::Cs3 => "CS3",
            Self::Cs4 => "CS4",
            Self::Cs5 => "CS5",
            Self::Cs6 => "CS6",
        }
    }
}

/// Addressing and delivery attributes of a transport message.
///
/// All fields are optional on the wire; unknown combinations are passed
/// through to the transport unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageAttributes {
    /// Message identifier assigned by the sender, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Message kind (publish, request, response, ...), if declared.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Origin URI.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Uri>,
    /// Destination URI.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sink: Option<Uri>,
    /// Declared payload format name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Declared priority class name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    /// Time-to-live in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
}

/// A complete transport message: attributes plus an optional payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Message {
    pub attributes: MessageAttributes,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
}

impl Message {
    /// Build a delivery message addressed to `sink`, as constructed by a
    /// transport when it hands a payload to a listener or subscriber.
    pub fn delivery(sink: &Uri, format: PayloadFormat, payload: impl Into<String>) -> Self {
        Self {
            attributes: MessageAttributes {
                sink: Some(sink.clone()),
                format: Some(format.as_str().to_string()),
                ..MessageAttributes::default()
            },
            payload: Some(payload.into()),
        }
    }
}

// ── Command data payload shapes ──────────────────────────────────────────────

/// Data payload carrying only a target URI (`registerListener`,
/// `unregisterListener`, `subscriber`).
#[derive(Debug, Clone, Deserialize)]
pub struct UriTarget {
    pub uri: Uri,
}

/// Attribute block carried by RPC commands; only the format matters here.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FormatAttributes {
    pub format: Option<String>,
}

/// Data payload of the `rpcClient` and `rpcServer` commands.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcEndpointData {
    pub uri: Uri,
    #[serde(default)]
    pub attributes: FormatAttributes,
    #[serde(default)]
    pub payload: Option<String>,
}

/// Attribute block of the `publisher` command: the sink URI is required,
/// the format is optional.
#[derive(Debug, Clone, Deserialize)]
pub struct PublishAttributes {
    #[serde(default)]
    pub format: Option<String>,
    pub sink: Uri,
}

/// Data payload of the `publisher` command.
#[derive(Debug, Clone, Deserialize)]
pub struct PublishData {
    pub attributes: PublishAttributes,
    #[serde(default)]
    pub payload: Option<String>,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
