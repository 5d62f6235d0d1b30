//! # toolpilot
//!
//! A small tool-calling assistant.
//!
//! This library provides:
//! - A registry of local tools (calculator, weather fetcher, file reader)
//! - A client for OpenAI-compatible chat-completion endpoints (Together AI by default)
//! - The dispatch loop that lets the model call a tool and explain the result
//! - An HTTP chat UI with file upload; the `toolpilot-cli` binary offers a console loop
//!
//! ## Architecture
//!
//! 1. The user's message is appended to the conversation
//! 2. The model sees the conversation plus the tool schemas
//! 3. If it requests a tool, the tool runs and its output is appended
//! 4. The model is asked once more and its text is the answer
//!
//! ## Example
//!
//! ```rust,ignore
//! use toolpilot::{agent::Agent, config::Config};
//!
//! let config = Config::from_env()?;
//! let agent = Agent::new(&config)?;
//! let mut conversation = agent.new_conversation();
//! let turn = agent.respond(&mut conversation, "What is 15 * 24 / 3?").await?;
//! println!("{}", turn.answer);
//! ```

pub mod agent;
pub mod api;
pub mod config;
pub mod llm;
pub mod tools;

pub use config::Config;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins; otherwise the config's `LOG_LEVEL` applies. With
/// `to_stderr` the output stays out of an interactive console's way.
pub fn init_tracing(default_filter: &str, to_stderr: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let registry = tracing_subscriber::registry().with(filter);
    if to_stderr {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
