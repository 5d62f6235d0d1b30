//! Tool system.
//!
//! Tools are local functions the model may ask to run. Each implements
//! [`Tool`] and is registered once, at startup, in a [`ToolRegistry`].
//!
//! Built-in tools:
//! - `calculator`: evaluate arithmetic expressions
//! - `file_reader`: extract text from workspace files (plain text, PDF)
//! - `weather_fetcher`: current weather for a city

mod calculator;
mod file_reader;
mod weather;

use std::path::Path;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::ToolsConfig;
use crate::llm::{FunctionDefinition, ToolDefinition};

pub use calculator::{evaluate, format_number, CalcError, Calculator};
pub use file_reader::{FileReader, MAX_CHARS_RETURN, MAX_FILE_SIZE_BYTES};
pub use weather::{summarize_weather, WeatherFetcher};

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("tool '{0}' not found")]
    NotFound(String),

    #[error("Missing '{0}' argument")]
    MissingArgument(String),
}

/// A locally executed function the model can request.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name used in function calling.
    fn name(&self) -> &str;

    /// Description shown to the model.
    fn description(&self) -> &str;

    /// JSON Schema of the accepted arguments.
    fn parameters_schema(&self) -> Value;

    /// Run the tool. Errors become the tool's result text upstream.
    async fn execute(&self, args: Value, workspace: &Path) -> anyhow::Result<String>;
}

/// Name and description of a registered tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
}

/// Registry of available tools, in registration order.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Registry holding the built-in tools.
    pub fn with_defaults(config: &ToolsConfig) -> Self {
        let mut registry = Self::new();
        let builtins: Vec<Box<dyn Tool>> = vec![
            Box::new(Calculator),
            Box::new(FileReader),
            Box::new(WeatherFetcher::new(config)),
        ];
        for tool in builtins {
            // Built-in names are distinct.
            if let Err(e) = registry.register(tool) {
                tracing::error!("{}", e);
            }
        }
        tracing::debug!(tools = ?registry.names(), "Tools loaded");
        registry
    }

    /// Add a tool. Fails if the name is taken.
    pub fn register(&mut self, tool: Box<dyn Tool>) -> Result<(), ToolError> {
        if self.tools.iter().any(|t| t.name() == tool.name()) {
            return Err(ToolError::AlreadyRegistered(tool.name().to_string()));
        }
        self.tools.push(tool);
        Ok(())
    }

    /// Find a tool by name.
    pub fn lookup(&self, name: &str) -> Result<&dyn Tool, ToolError> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
            .ok_or_else(|| ToolError::NotFound(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn list_tools(&self) -> Vec<ToolInfo> {
        self.tools
            .iter()
            .map(|t| ToolInfo {
                name: t.name().to_string(),
                description: t.description().to_string(),
            })
            .collect()
    }

    /// Tool definitions in the chat-completions `tools` format.
    pub fn get_tool_schemas(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition {
                tool_type: "function".to_string(),
                function: FunctionDefinition {
                    name: t.name().to_string(),
                    description: t.description().to_string(),
                    parameters: t.parameters_schema(),
                },
            })
            .collect()
    }

    /// Look up and run a tool.
    pub async fn execute(&self, name: &str, args: Value, workspace: &Path) -> anyhow::Result<String> {
        let tool = self.lookup(name)?;
        tool.execute(args, workspace).await
    }

    /// Run a tool, folding every failure into `Error: ...` result text.
    pub async fn run(&self, name: &str, args: Value, workspace: &Path) -> String {
        match self.execute(name, args, workspace).await {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(tool = name, error = %e, "Tool execution failed");
                format!("Error: {}", e)
            }
        }
    }
}

/// Fetch a required string argument.
pub(crate) fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::MissingArgument(key.to_string()))
}

/// Build a one-property string schema; every built-in tool takes a single string.
pub(crate) fn single_string_schema(key: &str, description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            key: {
                "type": "string",
                "description": description
            }
        },
        "required": [key]
    })
}
