//! Defines the message protocol between the session client and the remote counterpart.
//!
//! Records are JSON objects discriminated by a `type` field.

use crate::scenario::ScenarioDescriptor;
use serde::{Deserialize, Serialize};

/// Records sent from the session client to the counterpart.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientRecord {
    /// Sent exactly once, immediately after the transport opens.
    Init {
        role: String,
        scenario: ScenarioDescriptor,
    },
    /// One caller turn.
    Message { text: String },
}

/// Records sent from the counterpart to the session client.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerRecord {
    /// Informational acknowledgement of the connection.
    Connected,
    /// One counterpart turn.
    Message { text: String },
    /// The counterpart could not handle the last request.
    Error { error: String },
    /// The counterpart has ended the session.
    End,
}

impl ClientRecord {
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl ServerRecord {
    pub fn decode(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}
