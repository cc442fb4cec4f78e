//! Tool trait — the abstraction over agent capabilities.
//!
//! Tools are what give the model the ability to act: look up data, run
//! long-lived jobs, and so on. Heavyweight implementations live in external
//! collaborators; this trait is the narrow interface the dispatcher consumes.

use crate::error::ToolError;
use crate::provider::ToolDefinition;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The result of a tool execution.
///
/// `output` is the short human-readable summary that becomes the tool
/// message content; `data` is the optional structured payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the tool executed successfully
    pub success: bool,

    /// The output content
    pub output: String,

    /// Optional structured data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            data: None,
        }
    }
}

/// The core Tool trait.
///
/// Each tool implements this trait and is registered in the ToolRegistry,
/// which the dispatcher consults when the model issues a call.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "get_weather").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments.
    async fn execute(
        &self,
        arguments: serde_json::Value,
    ) -> std::result::Result<ToolResult, ToolError>;

    /// Whether this tool produces incremental output while running.
    fn is_streaming(&self) -> bool {
        false
    }

    /// Execute the tool, pushing partial output chunks as they are produced.
    ///
    /// The returned result's `output` must equal the concatenation of the
    /// pushed chunks. Default implementation runs `execute()` and pushes the
    /// whole output as one chunk.
    async fn execute_streaming(
        &self,
        arguments: serde_json::Value,
        chunks: tokio::sync::mpsc::Sender<String>,
    ) -> std::result::Result<ToolResult, ToolError> {
        let result = self.execute(arguments).await?;
        let _ = chunks.send(result.output.clone()).await;
        Ok(result)
    }

    /// Convert this tool into a ToolDefinition for sending to the model.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A registry of available tools.
///
/// The dispatcher uses this to:
/// 1. Get tool definitions to send to the model
/// 2. Look up tools when the model requests them
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Get all tool definitions (for sending to the model).
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
