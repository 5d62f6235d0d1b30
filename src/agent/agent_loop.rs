//! Core dispatch loop.
//!
//! One user turn walks AwaitingModel -> ToolCallRequested -> ExecutingTool ->
//! AwaitingModel -> Done. A tool call costs exactly one tool execution and
//! one follow-up model query; the follow-up is sent without tool schemas so
//! it has to answer in text.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::config::Config;
use crate::llm::{ChatCompletionsClient, ChatMessage, LlmClient, LlmError, ToolCall};
use crate::tools::ToolRegistry;

use super::conversation::Conversation;
use super::prompt::build_system_prompt;

/// Tool message sent for calls beyond the first one in a reply.
const SKIPPED_CALL: &str = "Skipped: only one tool call is executed per request.";

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Model(#[from] LlmError),

    #[error("the model returned an empty response")]
    EmptyResponse,
}

/// Result of one user turn.
#[derive(Debug, Clone, Serialize)]
pub struct Turn {
    /// Final natural-language answer
    pub answer: String,

    /// Name of the tool that ran, if any
    pub tool: Option<String>,

    /// What happened during the turn
    pub log: Vec<TurnLogEntry>,
}

/// A single entry in a turn's execution log.
#[derive(Debug, Clone, Serialize)]
pub struct TurnLogEntry {
    /// Timestamp (RFC 3339)
    pub timestamp: String,

    pub entry_type: LogEntryType,

    pub content: String,
}

/// Types of log entries.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogEntryType {
    /// Tool is being called
    ToolCall,
    /// Tool returned a result
    ToolResult,
    /// Model produced the final answer
    Response,
}

/// The tool-calling assistant.
pub struct Agent {
    llm: Arc<dyn LlmClient>,
    tools: Arc<ToolRegistry>,
    model: String,
    workspace: PathBuf,
}

impl Agent {
    /// Create an agent talking to the configured endpoint with the built-in tools.
    pub fn new(config: &Config) -> Result<Self, LlmError> {
        let llm = Arc::new(ChatCompletionsClient::new(&config.llm)?);
        let tools = Arc::new(ToolRegistry::with_defaults(&config.tools));
        Ok(Self::with_parts(
            llm,
            tools,
            config.llm.model.clone(),
            config.workspace_path.clone(),
        ))
    }

    /// Assemble an agent from explicit parts.
    pub fn with_parts(
        llm: Arc<dyn LlmClient>,
        tools: Arc<ToolRegistry>,
        model: String,
        workspace: PathBuf,
    ) -> Self {
        Self {
            llm,
            tools,
            model,
            workspace,
        }
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Fresh conversation primed with the system prompt.
    pub fn new_conversation(&self) -> Conversation {
        Conversation::new(build_system_prompt(&self.tools))
    }

    /// Answer one user message, extending `conversation`.
    ///
    /// On error the conversation is left as it was before the call.
    pub async fn respond(
        &self,
        conversation: &mut Conversation,
        user_input: &str,
    ) -> Result<Turn, AgentError> {
        let checkpoint = conversation.len();
        let result = self.run_turn(conversation, user_input).await;
        if let Err(e) = &result {
            tracing::warn!(error = %e, "Turn failed, rolling back conversation");
            conversation.truncate(checkpoint);
        }
        result
    }

    async fn run_turn(
        &self,
        conversation: &mut Conversation,
        user_input: &str,
    ) -> Result<Turn, AgentError> {
        tracing::info!(input_len = user_input.len(), "Processing user request");
        let mut log = Vec::new();

        conversation.push(ChatMessage::user(user_input));

        let tool_schemas = self.tools.get_tool_schemas();
        let response = self
            .llm
            .chat_completion(&self.model, conversation.messages(), Some(&tool_schemas))
            .await?;

        let Some(tool_calls) = response.tool_calls.filter(|calls| !calls.is_empty()) else {
            // No tool requested - the reply is the final answer.
            let answer = non_empty(response.content)?;
            return Ok(self.finish(conversation, answer, None, log));
        };

        conversation.push(ChatMessage {
            role: crate::llm::Role::Assistant,
            content: response.content.clone(),
            tool_calls: Some(tool_calls.clone()),
            tool_call_id: None,
        });

        let (first, rest) = tool_calls
            .split_first()
            .ok_or(AgentError::EmptyResponse)?;

        log.push(entry(
            LogEntryType::ToolCall,
            format!(
                "Calling tool: {} with args: {}",
                first.function.name, first.function.arguments
            ),
        ));

        let result = self.execute_tool_call(first).await;
        log.push(entry(LogEntryType::ToolResult, truncate_for_log(&result, 1000)));
        conversation.push(ChatMessage::tool(first.id.clone(), result.clone()));

        for skipped in rest {
            tracing::debug!(tool = %skipped.function.name, "Skipping extra tool call");
            conversation.push(ChatMessage::tool(skipped.id.clone(), SKIPPED_CALL));
        }

        // Follow-up without tools: the model must now answer in text.
        let follow_up = self
            .llm
            .chat_completion(&self.model, conversation.messages(), None)
            .await?;
        let answer = if follow_up.has_tool_calls() && blank(&follow_up.content) {
            // Asked for another tool instead of answering; nothing more runs
            // this turn, so report what the tool returned.
            tracing::warn!("Follow-up requested another tool call; answering with the tool result");
            result
        } else {
            non_empty(follow_up.content)?
        };

        Ok(self.finish(conversation, answer, Some(first.function.name.clone()), log))
    }

    fn finish(
        &self,
        conversation: &mut Conversation,
        answer: String,
        tool: Option<String>,
        mut log: Vec<TurnLogEntry>,
    ) -> Turn {
        log.push(entry(LogEntryType::Response, truncate_for_log(&answer, 2000)));
        conversation.push(ChatMessage::assistant(answer.clone()));
        tracing::info!(tool = ?tool, answer_len = answer.len(), "Turn complete");
        Turn { answer, tool, log }
    }

    /// Execute a single tool call; failures become the result text.
    async fn execute_tool_call(&self, tool_call: &ToolCall) -> String {
        let name = &tool_call.function.name;
        let raw_args = tool_call.function.arguments.trim();
        let args: serde_json::Value = if raw_args.is_empty() {
            serde_json::Value::Object(Default::default())
        } else {
            match serde_json::from_str(raw_args) {
                Ok(args) => args,
                Err(e) => {
                    tracing::warn!(tool = %name, error = %e, "Tool arguments are not valid JSON");
                    return format!("Error: arguments for {} are not valid JSON: {}", name, e);
                }
            }
        };

        tracing::info!(tool = %name, args = %args, "Executing tool");
        let output = self.tools.run(name, args, &self.workspace).await;
        tracing::debug!(tool = %name, result = %truncate_for_log(&output, 100), "Tool finished");
        output
    }
}

fn blank(content: &Option<String>) -> bool {
    content.as_deref().map_or(true, |c| c.trim().is_empty())
}

fn non_empty(content: Option<String>) -> Result<String, AgentError> {
    content
        .filter(|c| !c.trim().is_empty())
        .ok_or(AgentError::EmptyResponse)
}

fn entry(entry_type: LogEntryType, content: String) -> TurnLogEntry {
    TurnLogEntry {
        timestamp: chrono::Utc::now().to_rfc3339(),
        entry_type,
        content,
    }
}

/// Truncate a string for logging purposes.
fn truncate_for_log(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... [truncated]", &s[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use crate::llm::{ChatResponse, FunctionCall, Role, ToolDefinition};
    use crate::tools::Tool;

    /// Replays canned responses and records what it was asked.
    struct ScriptedLlm {
        replies: Mutex<VecDeque<Result<ChatResponse, LlmError>>>,
        calls: Mutex<Vec<(usize, bool)>>,
    }

    impl ScriptedLlm {
        fn new(replies: Vec<Result<ChatResponse, LlmError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        /// (message count, tools offered) per request.
        fn requests(&self) -> Vec<(usize, bool)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn chat_completion(
            &self,
            _model: &str,
            messages: &[ChatMessage],
            tools: Option<&[ToolDefinition]>,
        ) -> Result<ChatResponse, LlmError> {
            self.calls
                .lock()
                .unwrap()
                .push((messages.len(), tools.is_some()));
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected extra model query")
        }
    }

    struct Counter(Arc<AtomicUsize>);

    #[async_trait]
    impl Tool for Counter {
        fn name(&self) -> &str {
            "counter"
        }

        fn description(&self) -> &str {
            "Counts invocations."
        }

        fn parameters_schema(&self) -> Value {
            json!({"type": "object", "properties": {}, "required": []})
        }

        async fn execute(&self, _args: Value, _workspace: &Path) -> anyhow::Result<String> {
            let n = self.0.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(format!("count={}", n))
        }
    }

    fn text(content: &str) -> Result<ChatResponse, LlmError> {
        Ok(ChatResponse {
            content: Some(content.to_string()),
            tool_calls: None,
        })
    }

    fn call(id: &str, name: &str, arguments: &str) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            call_type: "function".to_string(),
            function: FunctionCall {
                name: name.to_string(),
                arguments: arguments.to_string(),
            },
        }
    }

    fn calls(calls: Vec<ToolCall>) -> Result<ChatResponse, LlmError> {
        Ok(ChatResponse {
            content: None,
            tool_calls: Some(calls),
        })
    }

    fn agent_with(llm: Arc<ScriptedLlm>) -> (Agent, Arc<AtomicUsize>, tempfile::TempDir) {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut tools = ToolRegistry::with_defaults(&Default::default());
        tools.register(Box::new(Counter(counter.clone()))).unwrap();
        let dir = tempfile::tempdir().expect("tempdir");
        let agent = Agent::with_parts(llm, Arc::new(tools), "test-model".into(), dir.path().to_path_buf());
        (agent, counter, dir)
    }

    fn roles(conversation: &Conversation) -> Vec<Role> {
        conversation.messages().iter().map(|m| m.role).collect()
    }

    #[tokio::test]
    async fn plain_answer_needs_one_query() {
        let llm = ScriptedLlm::new(vec![text("Hello!")]);
        let (agent, counter, _dir) = agent_with(llm.clone());
        let mut conversation = agent.new_conversation();

        let turn = agent.respond(&mut conversation, "hi").await.unwrap();

        assert_eq!(turn.answer, "Hello!");
        assert_eq!(turn.tool, None);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(llm.requests(), vec![(2, true)]);
        assert_eq!(roles(&conversation), vec![Role::System, Role::User, Role::Assistant]);
    }

    #[tokio::test]
    async fn tool_call_runs_once_then_queries_once_more() {
        let llm = ScriptedLlm::new(vec![
            calls(vec![call("call_1", "counter", "{}")]),
            text("The counter says 1."),
        ]);
        let (agent, counter, _dir) = agent_with(llm.clone());
        let mut conversation = agent.new_conversation();

        let turn = agent.respond(&mut conversation, "count please").await.unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(llm.requests(), vec![(2, true), (4, false)]);
        assert_eq!(turn.answer, "The counter says 1.");
        assert_eq!(turn.tool.as_deref(), Some("counter"));
        assert_eq!(
            roles(&conversation),
            vec![Role::System, Role::User, Role::Assistant, Role::Tool, Role::Assistant]
        );
        let tool_msg = &conversation.messages()[3];
        assert_eq!(tool_msg.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(tool_msg.content.as_deref(), Some("count=1"));

        let kinds: Vec<LogEntryType> = turn.log.iter().map(|e| e.entry_type).collect();
        assert_eq!(
            kinds,
            vec![LogEntryType::ToolCall, LogEntryType::ToolResult, LogEntryType::Response]
        );
    }

    #[tokio::test]
    async fn extra_tool_calls_in_one_reply_are_skipped() {
        let llm = ScriptedLlm::new(vec![
            calls(vec![
                call("a", "counter", "{}"),
                call("b", "counter", "{}"),
                call("c", "calculator", r#"{"expression":"1+1"}"#),
            ]),
            text("done"),
        ]);
        let (agent, counter, _dir) = agent_with(llm.clone());
        let mut conversation = agent.new_conversation();

        agent.respond(&mut conversation, "go").await.unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(llm.requests().len(), 2);
        let skipped: Vec<_> = conversation
            .messages()
            .iter()
            .filter(|m| m.content.as_deref() == Some(SKIPPED_CALL))
            .filter_map(|m| m.tool_call_id.clone())
            .collect();
        assert_eq!(skipped, vec!["b".to_string(), "c".to_string()]);
    }

    #[tokio::test]
    async fn tool_errors_are_fed_back_as_text() {
        let llm = ScriptedLlm::new(vec![
            calls(vec![call("x", "calculator", r#"{"expression":"1/0"}"#)]),
            text("You cannot divide by zero."),
        ]);
        let (agent, _counter, _dir) = agent_with(llm);
        let mut conversation = agent.new_conversation();

        let turn = agent.respond(&mut conversation, "what is 1/0").await.unwrap();

        assert_eq!(turn.answer, "You cannot divide by zero.");
        assert_eq!(
            conversation.messages()[3].content.as_deref(),
            Some("Error: Cannot divide by zero.")
        );
    }

    #[tokio::test]
    async fn unknown_tool_and_bad_arguments_become_error_text() {
        let llm = ScriptedLlm::new(vec![
            calls(vec![call("x", "teleporter", "{}")]),
            text("No such tool."),
            calls(vec![call("y", "calculator", "{not json")]),
            text("Bad args."),
        ]);
        let (agent, _counter, _dir) = agent_with(llm);
        let mut conversation = agent.new_conversation();

        agent.respond(&mut conversation, "beam me up").await.unwrap();
        assert_eq!(
            conversation.messages()[3].content.as_deref(),
            Some("Error: tool 'teleporter' not found")
        );

        agent.respond(&mut conversation, "compute").await.unwrap();
        let last_tool = conversation
            .messages()
            .iter()
            .rev()
            .find(|m| m.role == Role::Tool)
            .unwrap();
        assert!(last_tool
            .content
            .as_deref()
            .unwrap()
            .starts_with("Error: arguments for calculator are not valid JSON"));
        assert_eq!(conversation.user_turns(), 2);
    }

    #[tokio::test]
    async fn model_failure_rolls_back_the_turn() {
        let llm = ScriptedLlm::new(vec![
            text("first answer"),
            calls(vec![call("x", "counter", "{}")]),
            Err(LlmError::Auth(401)),
        ]);
        let (agent, counter, _dir) = agent_with(llm);
        let mut conversation = agent.new_conversation();

        agent.respond(&mut conversation, "one").await.unwrap();
        let before = conversation.len();

        let err = agent.respond(&mut conversation, "two").await.unwrap_err();
        assert!(matches!(err, AgentError::Model(LlmError::Auth(401))));
        assert_eq!(conversation.len(), before);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_follow_up_is_an_error() {
        let llm = ScriptedLlm::new(vec![
            calls(vec![call("x", "counter", "{}")]),
            text("   "),
        ]);
        let (agent, _counter, _dir) = agent_with(llm);
        let mut conversation = agent.new_conversation();

        let err = agent.respond(&mut conversation, "hi").await.unwrap_err();
        assert!(matches!(err, AgentError::EmptyResponse));
        assert_eq!(conversation.len(), 1);
    }

    #[tokio::test]
    async fn tool_call_in_follow_up_answers_with_tool_result() {
        let llm = ScriptedLlm::new(vec![
            calls(vec![call("x", "calculator", r#"{"expression":"3*3"}"#)]),
            calls(vec![call("y", "calculator", r#"{"expression":"3*3"}"#)]),
        ]);
        let (agent, counter, _dir) = agent_with(llm.clone());
        let mut conversation = agent.new_conversation();

        let turn = agent.respond(&mut conversation, "what is 3*3").await.unwrap();

        assert_eq!(turn.answer, "9");
        assert_eq!(turn.tool.as_deref(), Some("calculator"));
        assert_eq!(llm.requests(), vec![(2, true), (4, false)]);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(conversation.messages().last().unwrap().content.as_deref(), Some("9"));
    }

    #[tokio::test]
    async fn json_instruction_in_follow_up_is_returned_as_text() {
        let instruction = r#"{"tool": "calculator", "parameters": {"expression": "3*3"}}"#;
        let llm = ScriptedLlm::new(vec![
            calls(vec![call("x", "calculator", r#"{"expression":"3*3"}"#)]),
            text(instruction),
        ]);
        let (agent, _counter, _dir) = agent_with(llm);
        let mut conversation = agent.new_conversation();

        let turn = agent.respond(&mut conversation, "what is 3*3").await.unwrap();

        assert_eq!(turn.answer, instruction);
        assert_eq!(conversation.user_turns(), 1);
    }

    #[test]
    fn truncate_for_log_respects_char_boundaries() {
        assert_eq!(truncate_for_log("short", 10), "short");
        assert_eq!(truncate_for_log("ééé", 3), "é... [truncated]");
    }
}
