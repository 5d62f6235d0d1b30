//! Router, shared state and server startup.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{DefaultBodyLimit, State},
    response::Html,
    routing::{delete, get, post},
    Json, Router,
};
use tokio::sync::{Mutex, RwLock};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::agent::{Agent, Conversation};
use crate::config::Config;

use super::chat;
use super::types::{HealthResponse, ToolsResponse};

const INDEX_HTML: &str = include_str!("../../static/index.html");

/// Per-browser conversation. Requests on the same session run one at a time.
pub type SessionHandle = Arc<Mutex<Conversation>>;

struct SessionEntry {
    handle: SessionHandle,
    last_used: Instant,
}

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub agent: Arc<Agent>,
    sessions: RwLock<HashMap<Uuid, SessionEntry>>,
}

impl AppState {
    pub fn new(config: Config, agent: Arc<Agent>) -> Self {
        Self {
            config,
            agent,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Fetch an existing session, or start a new one (with a fresh id when none was given).
    ///
    /// Starting a session first drops idle ones, then the least recently used
    /// while the store is full.
    pub async fn session(&self, id: Option<Uuid>) -> (Uuid, SessionHandle) {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;

        if let Some(id) = id {
            if let Some(entry) = sessions.get_mut(&id) {
                entry.last_used = now;
                return (id, entry.handle.clone());
            }
        }

        self.evict(&mut sessions, now);

        let id = id.unwrap_or_else(Uuid::new_v4);
        tracing::info!(session_id = %id, "Starting chat session");
        let handle = Arc::new(Mutex::new(self.agent.new_conversation()));
        sessions.insert(
            id,
            SessionEntry {
                handle: handle.clone(),
                last_used: now,
            },
        );
        (id, handle)
    }

    fn evict(&self, sessions: &mut HashMap<Uuid, SessionEntry>, now: Instant) {
        let idle = Duration::from_secs(self.config.session_idle_secs);
        let before = sessions.len();
        sessions.retain(|_, entry| now.duration_since(entry.last_used) < idle);

        let capacity = self.config.max_sessions.max(1);
        while sessions.len() >= capacity {
            let Some(oldest) = sessions
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(id, _)| *id)
            else {
                break;
            };
            sessions.remove(&oldest);
        }

        let dropped = before - sessions.len();
        if dropped > 0 {
            tracing::info!(dropped, remaining = sessions.len(), "Evicted chat sessions");
        }
    }

    /// Forget a session. Returns whether it existed.
    pub async fn drop_session(&self, id: &Uuid) -> bool {
        self.sessions.write().await.remove(id).is_some()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

/// Build the HTTP router.
pub fn router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.max_upload_bytes;

    Router::new()
        .route("/", get(index))
        .route("/api/health", get(health))
        .route("/api/tools", get(list_tools))
        .route("/api/chat", post(chat::post_chat))
        .route("/api/sessions/:id", delete(chat::delete_session))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server and run until Ctrl-C.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let agent = Arc::new(Agent::new(&config)?);
    tracing::info!(tools = ?agent.tools().names(), "AI agent initialized");

    let uploads = config.uploads_path();
    tokio::fs::create_dir_all(&uploads).await?;
    tracing::info!(path = %uploads.display(), "Upload directory ready");

    let addr = format!("{}:{}", config.host, config.port);
    let state = Arc::new(AppState::new(config, agent));
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Chat UI listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
    }
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        sessions: state.session_count().await,
    })
}

async fn list_tools(State(state): State<Arc<AppState>>) -> Json<ToolsResponse> {
    Json(ToolsResponse {
        model: state.agent.model().to_string(),
        tools: state.agent.tools().list_tools(),
    })
}
