//! System prompt template for the assistant.

use crate::llm::NO_TOOL_NEEDED;
use crate::tools::ToolRegistry;

/// Build the system prompt with tool names, descriptions and parameter schemas.
pub fn build_system_prompt(tools: &ToolRegistry) -> String {
    let tool_descriptions = tools
        .get_tool_schemas()
        .iter()
        .map(|t| {
            format!(
                "- **{}**: {}\n  Parameters: {}",
                t.function.name, t.function.description, t.function.parameters
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let tool_names = tools.names().join(", ");

    format!(
        r#"You are a helpful AI assistant. You have access to several tools and must decide, for each user request, whether one of them is needed.

## Available Tools

{tool_descriptions}

## Rules

1. **Use a tool when it helps** - arithmetic goes to the calculator, weather questions to the weather fetcher, questions about a file to the file reader.
2. **One tool per request** - request at most one tool call, then wait for its result.
3. **Explain results** - once a tool result arrives, answer the user in plain language. If the result starts with "Error:", explain what went wrong.
4. **Answer directly otherwise** - if no tool is appropriate, just reply in plain text.

## Tool Call Format

Prefer the native function-calling interface. If it is unavailable, respond ONLY with a JSON object and no surrounding text:
{{"tool": "<one of: {tool_names}>", "parameters": {{ ...arguments... }}}}
To decline all tools in that format, use {{"tool": "{no_tool}", "parameters": {{"answer": "<your reply>"}}}}."#,
        tool_descriptions = tool_descriptions,
        tool_names = tool_names,
        no_tool = NO_TOOL_NEEDED,
    )
}
