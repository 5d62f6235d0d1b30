//! API request and response types.

use serde::Serialize;
use uuid::Uuid;

use crate::agent::TurnLogEntry;
use crate::tools::ToolInfo;

/// Response to a chat message.
#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    /// Session the message was added to (new sessions get a fresh id)
    pub session_id: Uuid,

    /// Final answer shown in the chat panel
    pub reply: String,

    /// Tool used for this answer, if any
    pub tool: Option<String>,

    /// Path of the uploaded file, relative to the workspace
    pub uploaded_path: Option<String>,

    /// Execution log of the turn
    pub log: Vec<TurnLogEntry>,
}

/// Registered tools.
#[derive(Debug, Clone, Serialize)]
pub struct ToolsResponse {
    pub model: String,
    pub tools: Vec<ToolInfo>,
}

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service version
    pub version: String,

    /// Open chat sessions
    pub sessions: usize,
}
