//! Parsing of JSON tool instructions embedded in plain model text.
//!
//! Models without native function calling are prompted to reply with
//! `{"tool": "<name>", "parameters": {...}}`. They often wrap it in a
//! Markdown fence or add chatter around it, so parsing is lenient.

use serde_json::{Map, Value};

/// Sentinel tool name meaning "answer directly".
pub const NO_TOOL_NEEDED: &str = "no_tool_needed";

/// A tool instruction recovered from model text.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolInstruction {
    /// The model asked for a tool.
    Call { tool: String, parameters: Value },
    /// The model explicitly declined to use a tool.
    NoTool { answer: Option<String> },
}

/// Try to read a tool instruction out of `raw`.
///
/// Returns `None` when the text holds no JSON object with a string `tool` key,
/// in which case the text is an ordinary answer.
pub fn parse_tool_instruction(raw: &str) -> Option<ToolInstruction> {
    let cleaned = strip_code_fence(raw.trim());

    let value = match serde_json::from_str::<Value>(cleaned) {
        Ok(value) => value,
        Err(e) => {
            let embedded = embedded_object(raw)?;
            tracing::debug!(error = %e, "Direct JSON parse failed, trying embedded object");
            serde_json::from_str::<Value>(embedded).ok()?
        }
    };

    let object = value.as_object()?;
    let tool = object.get("tool")?.as_str()?.trim();

    let parameters = match object.get("parameters") {
        Some(Value::Object(map)) => Value::Object(map.clone()),
        Some(other) => {
            tracing::warn!(parameters = %other, "Non-object tool parameters, using empty object");
            Value::Object(Map::new())
        }
        None => Value::Object(Map::new()),
    };

    if tool.is_empty() || tool == NO_TOOL_NEEDED {
        let answer = parameters
            .get("answer")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        return Some(ToolInstruction::NoTool { answer });
    }

    Some(ToolInstruction::Call {
        tool: tool.to_string(),
        parameters,
    })
}

fn strip_code_fence(text: &str) -> &str {
    let mut text = text;
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest.trim();
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest.trim();
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest.trim();
    }
    text
}

/// Outermost `{ ... }` span of the text, if any.
fn embedded_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}
