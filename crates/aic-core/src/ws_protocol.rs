use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const DEFAULT_MAX_FRAME_BYTES: usize = 256 * 1024;

/// Messages pushed by the backend over the live channel.
///
/// Tags outside the known set decode to [`IncomingMessage::Unknown`] so a newer
/// backend never breaks an older client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum IncomingMessage {
    #[serde(rename = "ErrorWSMessage")]
    Error { error: String },
    #[serde(rename = "NotificationWSMessage")]
    Notification { title: String, message: String },
    #[serde(rename = "DebugJSONWSMessage")]
    DebugEcho {
        message: String,
        #[serde(default)]
        object: Value,
    },
    #[serde(rename = "ProjectOpenedWSMessage")]
    ProjectOpened { name: String, path: String },
    #[serde(rename = "AnalysisUpdatedWSMessage")]
    AnalysisUpdate(AnalysisUpdatePayload),
    #[serde(other)]
    Unknown,
}

impl IncomingMessage {
    pub fn kind_label(&self) -> &'static str {
        match self {
            IncomingMessage::Error { .. } => "error",
            IncomingMessage::Notification { .. } => "notification",
            IncomingMessage::DebugEcho { .. } => "debug_echo",
            IncomingMessage::ProjectOpened { .. } => "project_opened",
            IncomingMessage::AnalysisUpdate(_) => "analysis_update",
            IncomingMessage::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AnalysisUpdatePayload {
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub relevant_material_ids: Vec<String>,
    #[serde(default)]
    pub next_step: Option<String>,
    #[serde(default)]
    pub thinking_process: Option<String>,
}

/// Messages the client sends to the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum OutgoingMessage {
    #[serde(rename = "SetChatIdWSMessage")]
    SetActiveSession { chat_id: String },
}

impl OutgoingMessage {
    pub fn set_active_session(chat_id: impl Into<String>) -> Self {
        OutgoingMessage::SetActiveSession {
            chat_id: chat_id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("frame exceeds max size: {size} > {max}")]
    OversizedFrame { size: usize, max: usize },
    #[error("frame encode failed: {0}")]
    Encode(String),
    #[error("frame decode failed: {0}")]
    Decode(String),
}

pub fn decode_incoming(frame: &str) -> Result<IncomingMessage, ProtocolError> {
    decode_incoming_with_limit(frame, DEFAULT_MAX_FRAME_BYTES)
}

pub fn decode_incoming_with_limit(
    frame: &str,
    max_frame_bytes: usize,
) -> Result<IncomingMessage, ProtocolError> {
    let raw = frame.trim_end_matches(['\n', '\r']);
    if raw.len() > max_frame_bytes {
        return Err(ProtocolError::OversizedFrame {
            size: raw.len(),
            max: max_frame_bytes,
        });
    }
    serde_json::from_str(raw).map_err(|err| ProtocolError::Decode(err.to_string()))
}

pub fn encode_outgoing(message: &OutgoingMessage) -> Result<String, ProtocolError> {
    let encoded =
        serde_json::to_string(message).map_err(|err| ProtocolError::Encode(err.to_string()))?;
    if encoded.len() > DEFAULT_MAX_FRAME_BYTES {
        return Err(ProtocolError::OversizedFrame {
            size: encoded.len(),
            max: DEFAULT_MAX_FRAME_BYTES,
        });
    }
    Ok(encoded)
}
