//! Agent module - the dispatch loop between the model and the tools.
//!
//! For each user message:
//! 1. Append it to the conversation (system prompt lists the tools)
//! 2. Ask the model, offering the tool schemas
//! 3. If it requests a tool, execute it and append the result
//! 4. Ask the model once more for the final answer

mod agent_loop;
mod conversation;
mod prompt;

pub use agent_loop::{Agent, AgentError, LogEntryType, Turn, TurnLogEntry};
pub use conversation::Conversation;
pub use prompt::build_system_prompt;
