//! Wire types exchanged between the gateway and its WebSocket clients.
//!
//! Inbound control messages are tagged JSON (`{"type": "..."}`); outbound
//! messages mirror the same tagging convention.

use serde::{Deserialize, Serialize};

/// Inbound control message, decoded from a text frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Sent at any point to request a config update. The fields are
    /// accepted and acknowledged but not yet applied to the running
    /// session; wiring them into `Session` is reserved for a later change.
    Config {
        language: Option<String>,
        translate: Option<bool>,
    },
    /// Submit all buffered audio regardless of the readiness predicate.
    Flush,
    /// Clear all session state, including acoustic and token context.
    Reset,
}

/// Outbound message, encoded as a text frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Connected {
        user_id: u64,
        message: String,
        format: String,
        sample_rate: u32,
    },
    Transcription {
        text: String,
        user_id: u64,
    },
    FlushComplete {
        text: String,
        user_id: u64,
    },
    Reset {
        status: String,
    },
    ConfigUpdated {
        status: String,
    },
    Error {
        message: String,
    },
}

impl ServerMessage {
    pub fn ok_reset() -> Self {
        ServerMessage::Reset {
            status: "ok".to_string(),
        }
    }

    pub fn ok_config_updated() -> Self {
        ServerMessage::ConfigUpdated {
            status: "ok".to_string(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }
}
