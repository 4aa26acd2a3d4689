use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::DecodeError;

/// Identifier of a connected WebSocket client. Supplied by the client in
/// the connection path, not generated server-side.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ClientId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for ClientId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Message sent by a WebSocket client, forwarded to the broker topic.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClientMessage {
    pub action: String,
    #[serde(default)]
    pub payload: Map<String, Value>,
}

impl ClientMessage {
    /// Serialize to the outbound wire format published to the topic.
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Instruction received via the broker, destined for one client session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub client_id: ClientId,
    pub command: String,
    #[serde(default)]
    pub data: Map<String, Value>,
}

/// Frame pushed to a session's outbound channel: a `Command` with the
/// routing id stripped.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommandFrame {
    pub command: String,
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl From<Command> for CommandFrame {
    fn from(cmd: Command) -> Self {
        Self {
            command: cmd.command,
            data: cmd.data,
        }
    }
}

/// Delivery wrapper added by the topic-to-queue path. Only the `Message`
/// field is consumed; all other wrapper fields are ignored.
#[derive(Debug, Deserialize)]
pub struct Notification {
    #[serde(rename = "Message")]
    pub message: String,
}

impl Notification {
    /// Decode the nested envelope: outer wrapper first, then the inner
    /// string as a `Command`.
    pub fn decode(raw: &str) -> Result<Command, DecodeError> {
        let outer: Notification = serde_json::from_str(raw).map_err(DecodeError::Envelope)?;
        serde_json::from_str(&outer.message).map_err(DecodeError::Command)
    }
}
