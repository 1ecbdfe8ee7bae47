//! Bus message envelopes.
//!
//! Three shapes travel over the transport:
//!
//! ```json
//! {"id": 3, "path": "/org/opensuse/YaST/Installer",
//!  "interface": "org.opensuse.YaST.Installer", "method": "GetStatus", "args": []}
//! {"id": 3, "reply": [0]}
//! {"path": "/org/opensuse/YaST/Installer",
//!  "interface": "org.opensuse.YaST.Installer", "signal": "StatusChanged", "args": [3]}
//! ```
//!
//! A failed call is answered with `{"id": 3, "error": {"name": ..., "message": ...}}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Method call addressed to an object/interface pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    /// Request ID for correlating the reply
    pub id: u32,
    pub path: String,
    pub interface: String,
    pub method: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

/// Reply to a [`Call`]; exactly one of `reply` and `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
}

impl Reply {
    pub fn success(id: u32, reply: Vec<Value>) -> Self {
        Self {
            id,
            reply: Some(reply),
            error: None,
        }
    }

    pub fn failure(id: u32, name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id,
            reply: None,
            error: Some(ErrorPayload {
                name: name.into(),
                message: message.into(),
            }),
        }
    }
}

/// Remote error details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub name: String,
    pub message: String,
}

/// Broadcast notification emitted by an object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub path: String,
    pub interface: String,
    pub signal: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

/// Discriminated union of bus messages.
///
/// Uses serde's `untagged`, so variant order matters: a call needs
/// `id` and `method`, a reply needs `id`, a signal has no `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    Call(Call),
    Reply(Reply),
    Signal(Signal),
}
