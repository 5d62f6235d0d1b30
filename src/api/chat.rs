//! Chat endpoint: one user message (plus optional upload) per request.

use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use super::routes::AppState;
use super::types::ChatReply;

/// Question asked on the user's behalf when a file arrives without a message.
const DEFAULT_FILE_QUESTION: &str = "What is in this file?";

/// An uploaded file as received from the form.
struct Upload {
    file_name: String,
    data: Vec<u8>,
}

/// Handle a chat message.
///
/// Multipart fields: `message` (text), `session_id` (optional UUID),
/// `file` (optional upload, saved under the uploads directory).
pub async fn post_chat(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<ChatReply>, (StatusCode, String)> {
    let mut message = String::new();
    let mut session_id = None;
    let mut upload = None;

    while let Some(field) = multipart.next_field().await.map_err(bad_request)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "message" => message = field.text().await.map_err(bad_request)?,
            "session_id" => {
                let raw = field.text().await.map_err(bad_request)?;
                let raw = raw.trim();
                if !raw.is_empty() {
                    let id = Uuid::parse_str(raw).map_err(|_| {
                        (StatusCode::BAD_REQUEST, format!("invalid session_id: {}", raw))
                    })?;
                    session_id = Some(id);
                }
            }
            "file" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let data = field.bytes().await.map_err(bad_request)?;
                // Browsers send an empty part when no file was picked.
                if !file_name.is_empty() || !data.is_empty() {
                    upload = Some(Upload {
                        file_name,
                        data: data.to_vec(),
                    });
                }
            }
            other => tracing::debug!(field = other, "Ignoring unknown form field"),
        }
    }

    let mut input = message.trim().to_string();
    let mut uploaded_path = None;

    if let Some(upload) = upload {
        let rel_path = save_upload(&state, &upload).await.map_err(|e| {
            tracing::error!(error = %e, "Error processing uploaded file");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error processing uploaded file: {}", e),
            )
        })?;
        input = with_upload_note(&input, &upload_name(&rel_path), &rel_path);
        uploaded_path = Some(rel_path);
    }

    if input.is_empty() {
        tracing::warn!("Empty chat input received");
        return Err((
            StatusCode::BAD_REQUEST,
            "Please enter a query, or upload a file and optionally add a query.".to_string(),
        ));
    }

    let (session_id, handle) = state.session(session_id).await;
    let mut conversation = handle.lock().await;

    tracing::info!(session_id = %session_id, input_len = input.len(), "Chat message received");

    let turn = state
        .agent
        .respond(&mut conversation, &input)
        .await
        .map_err(|e| {
            tracing::error!(session_id = %session_id, error = %e, "Agent request failed");
            (StatusCode::BAD_GATEWAY, format!("Error: {}", e))
        })?;

    Ok(Json(ChatReply {
        session_id,
        reply: turn.answer,
        tool: turn.tool,
        uploaded_path,
        log: turn.log,
    }))
}

/// Forget a session's conversation.
pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    if state.drop_session(&id).await {
        tracing::info!(session_id = %id, "Session cleared");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err((StatusCode::NOT_FOUND, "session not found".to_string()))
    }
}

/// Write the upload into the uploads directory; returns its workspace-relative path.
async fn save_upload(state: &AppState, upload: &Upload) -> std::io::Result<String> {
    let safe_name = sanitize_filename(&upload.file_name);
    let dir = state.config.uploads_path();
    tokio::fs::create_dir_all(&dir).await?;
    tokio::fs::write(dir.join(&safe_name), &upload.data).await?;

    let rel_path = format!("{}/{}", state.config.uploads_dir.trim_end_matches('/'), safe_name);
    tracing::info!(path = %rel_path, bytes = upload.data.len(), "File uploaded");
    Ok(rel_path)
}

fn upload_name(rel_path: &str) -> String {
    rel_path.rsplit('/').next().unwrap_or(rel_path).to_string()
}

/// Keep only characters that are safe in a file name.
pub fn sanitize_filename(original: &str) -> String {
    // Browsers may send a full client-side path.
    let base = original.rsplit(['/', '\\']).next().unwrap_or(original);
    let safe: String = base
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    let safe = safe.trim_matches('.');
    if safe.is_empty() {
        "uploaded_file".to_string()
    } else {
        safe.to_string()
    }
}

/// Prefix the user's message with a note pointing at the uploaded file.
pub fn with_upload_note(message: &str, file_name: &str, rel_path: &str) -> String {
    let note = format!("(User uploaded file '{}' to path '{}')", file_name, rel_path);
    if message.is_empty() {
        format!("{}\n{}", note, DEFAULT_FILE_QUESTION)
    } else {
        format!("{}\n{}", note, message)
    }
}

fn bad_request<E: std::fmt::Display>(e: E) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, e.to_string())
}
