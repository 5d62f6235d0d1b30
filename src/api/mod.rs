//! HTTP API and browser chat UI.
//!
//! Routes:
//! - `GET /` - chat page
//! - `GET /api/health` - liveness
//! - `GET /api/tools` - registered tools
//! - `POST /api/chat` - multipart chat message with optional file upload
//! - `DELETE /api/sessions/:id` - forget a conversation

mod chat;
mod routes;
pub mod types;

pub use chat::{sanitize_filename, with_upload_note};
pub use routes::{router, serve, AppState};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::agent::Agent;
    use crate::config::Config;
    use crate::llm::{ChatMessage, ChatResponse, LlmClient, LlmError, Role, ToolDefinition};
    use crate::tools::ToolRegistry;

    const BOUNDARY: &str = "XtoolpilotBoundaryX";

    /// Answers with the number of user turns and the latest user message.
    struct EchoLlm;

    #[async_trait]
    impl LlmClient for EchoLlm {
        async fn chat_completion(
            &self,
            _model: &str,
            messages: &[ChatMessage],
            _tools: Option<&[ToolDefinition]>,
        ) -> Result<ChatResponse, LlmError> {
            let users: Vec<&ChatMessage> = messages.iter().filter(|m| m.role == Role::User).collect();
            let last = users.last().and_then(|m| m.content.clone()).unwrap_or_default();
            if last.contains("explode") {
                return Err(LlmError::Api {
                    status: 500,
                    body: "boom".to_string(),
                });
            }
            Ok(ChatResponse {
                content: Some(format!("turns={} last={}", users.len(), last)),
                tool_calls: None,
            })
        }
    }

    fn app() -> (axum::Router, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = Config::new("test-key".into(), "test-model".into(), dir.path().to_path_buf());
        let agent = Agent::with_parts(
            Arc::new(EchoLlm),
            Arc::new(ToolRegistry::with_defaults(&config.tools)),
            config.llm.model.clone(),
            config.workspace_path.clone(),
        );
        let state = Arc::new(AppState::new(config, Arc::new(agent)));
        (router(state), dir)
    }

    fn multipart(fields: &[(&str, &str)], file: Option<(&str, &[u8])>) -> Request<Body> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                    BOUNDARY, name, value
                )
                .as_bytes(),
            );
        }
        if let Some((file_name, data)) = file {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                    BOUNDARY, file_name
                )
                .as_bytes(),
            );
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

        Request::builder()
            .method("POST")
            .uri("/api/chat")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn text_body(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn health_and_tools() {
        let (app, _dir) = app();

        let response = app
            .clone()
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ok");

        let response = app
            .oneshot(Request::get("/api/tools").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = json_body(response).await;
        let names: Vec<&str> = body["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["calculator", "file_reader", "weather_fetcher"]);
        assert_eq!(body["model"], "test-model");
    }

    #[tokio::test]
    async fn index_serves_chat_page() {
        let (app, _dir) = app();
        let response = app
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(text_body(response).await.contains("/api/chat"));
    }

    #[tokio::test]
    async fn chat_keeps_history_per_session() {
        let (app, _dir) = app();

        let response = app
            .clone()
            .oneshot(multipart(&[("message", "hello")], None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let first = json_body(response).await;
        assert_eq!(first["reply"], "turns=1 last=hello");
        let session_id = first["session_id"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(multipart(&[("message", "again"), ("session_id", session_id.as_str())], None))
            .await
            .unwrap();
        let second = json_body(response).await;
        assert_eq!(second["reply"], "turns=2 last=again");
        assert_eq!(second["session_id"], session_id.as_str());

        // A different browser starts from scratch.
        let response = app
            .clone()
            .oneshot(multipart(&[("message", "fresh")], None))
            .await
            .unwrap();
        assert_eq!(json_body(response).await["reply"], "turns=1 last=fresh");

        let response = app
            .clone()
            .oneshot(
                Request::delete(format!("/api/sessions/{}", session_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(
                Request::delete(format!("/api/sessions/{}", session_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn upload_is_saved_and_referenced() {
        let (app, dir) = app();

        let response = app
            .oneshot(multipart(&[("message", "")], Some(("my notes.txt", b"remember the milk".as_slice()))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;

        assert_eq!(body["uploaded_path"], "uploads/mynotes.txt");
        assert_eq!(
            body["reply"],
            "turns=1 last=(User uploaded file 'mynotes.txt' to path 'uploads/mynotes.txt')\nWhat is in this file?"
        );
        let saved = std::fs::read_to_string(dir.path().join("uploads/mynotes.txt")).unwrap();
        assert_eq!(saved, "remember the milk");
    }

    #[tokio::test]
    async fn empty_request_is_rejected() {
        let (app, _dir) = app();
        let response = app
            .oneshot(multipart(&[("message", "   ")], None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(text_body(response).await.starts_with("Please enter a query"));
    }

    #[tokio::test]
    async fn bad_session_id_is_rejected() {
        let (app, _dir) = app();
        let response = app
            .oneshot(multipart(&[("message", "hi"), ("session_id", "not-a-uuid")], None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn model_errors_are_shown_not_fatal() {
        let (app, _dir) = app();
        let response = app
            .clone()
            .oneshot(multipart(&[("message", "please explode")], None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert!(text_body(response).await.contains("HTTP 500"));

        let response = app
            .oneshot(multipart(&[("message", "still there?")], None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    fn state_with(configure: impl FnOnce(&mut Config)) -> (AppState, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = Config::new("test-key".into(), "test-model".into(), dir.path().to_path_buf());
        configure(&mut config);
        let agent = Agent::with_parts(
            Arc::new(EchoLlm),
            Arc::new(ToolRegistry::with_defaults(&config.tools)),
            config.llm.model.clone(),
            config.workspace_path.clone(),
        );
        (AppState::new(config, Arc::new(agent)), dir)
    }

    #[tokio::test]
    async fn full_session_store_drops_least_recently_used() {
        let (state, _dir) = state_with(|c| c.max_sessions = 2);

        let (first, _) = state.session(None).await;
        let (second, _) = state.session(None).await;
        // Touch the first so the second becomes the oldest.
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let (again, _) = state.session(Some(first)).await;
        assert_eq!(again, first);

        let (third, _) = state.session(None).await;
        assert_eq!(state.session_count().await, 2);
        assert!(!state.drop_session(&second).await);
        assert!(state.drop_session(&first).await);
        assert!(state.drop_session(&third).await);
    }

    #[tokio::test]
    async fn idle_sessions_are_dropped_when_a_new_one_starts() {
        let (state, _dir) = state_with(|c| c.session_idle_secs = 0);

        let (old, handle) = state.session(None).await;
        handle.lock().await.push(crate::llm::ChatMessage::user("hello"));
        let (new, fresh) = state.session(None).await;

        assert_ne!(old, new);
        assert_eq!(state.session_count().await, 1);
        assert!(!state.drop_session(&old).await);
        assert_eq!(fresh.lock().await.user_turns(), 0);
    }
}
