//! Tool invocation requests as seen by the permission engine.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::{is_file_operation_tool, is_shell_tool};
use crate::mcp;

/// Identifier of a single agent tool call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One tool call the agent wants to perform.
///
/// Created once per call and never mutated afterwards; all fields are
/// exposed through accessors only.
#[derive(Clone, Debug)]
pub struct ToolInvocationRequest {
    id: RequestId,
    tool_name: String,
    input: Value,
    rule_content: Option<String>,
    is_file_operation: bool,
}

impl ToolInvocationRequest {
    pub fn builder(tool_name: impl Into<String>) -> ToolInvocationRequestBuilder {
        ToolInvocationRequestBuilder::new(tool_name)
    }

    /// Build a request from a raw tool call, deriving the rule content and
    /// the file-operation flag from the tool's known input shape.
    pub fn from_tool_call(tool_name: impl Into<String>, input: Value) -> Self {
        let tool_name = tool_name.into();
        let rule_content = derive_rule_content(&tool_name, &input);
        let is_file_operation = is_file_operation_tool(&tool_name);
        Self {
            id: RequestId::new(),
            tool_name,
            input,
            rule_content,
            is_file_operation,
        }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    pub fn input(&self) -> &Value {
        &self.input
    }

    pub fn rule_content(&self) -> Option<&str> {
        self.rule_content.as_deref()
    }

    pub fn is_file_operation(&self) -> bool {
        self.is_file_operation
    }

    pub fn is_shell(&self) -> bool {
        is_shell_tool(&self.tool_name)
    }

    /// `(server, tool)` when this targets an MCP server tool.
    pub fn mcp_target(&self) -> Option<(&str, &str)> {
        mcp::parse_mcp_name(&self.tool_name)
    }
}

fn derive_rule_content(tool_name: &str, input: &Value) -> Option<String> {
    let field = |name: &str| input.get(name).and_then(Value::as_str).map(str::to_string);
    match tool_name {
        "Bash" => field("command"),
        "Read" | "Write" | "Edit" | "MultiEdit" => field("file_path"),
        "NotebookEdit" => field("notebook_path"),
        "Glob" | "Grep" => field("path"),
        "WebFetch" => input
            .get("url")
            .and_then(Value::as_str)
            .and_then(|u| url::Url::parse(u).ok())
            .and_then(|u| u.host_str().map(|h| format!("domain:{}", h))),
        _ => None,
    }
}

#[derive(Debug)]
pub struct ToolInvocationRequestBuilder {
    tool_name: String,
    input: Value,
    rule_content: Option<String>,
    is_file_operation: Option<bool>,
}

impl ToolInvocationRequestBuilder {
    fn new(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            input: Value::Object(Default::default()),
            rule_content: None,
            is_file_operation: None,
        }
    }

    pub fn input(mut self, input: Value) -> Self {
        self.input = input;
        self
    }

    pub fn rule_content(mut self, content: impl Into<String>) -> Self {
        self.rule_content = Some(content.into());
        self
    }

    /// Overrides the flag derived from the tool name.
    pub fn file_operation(mut self, is_file_operation: bool) -> Self {
        self.is_file_operation = Some(is_file_operation);
        self
    }

    pub fn build(self) -> ToolInvocationRequest {
        let is_file_operation = self
            .is_file_operation
            .unwrap_or_else(|| is_file_operation_tool(&self.tool_name));
        ToolInvocationRequest {
            id: RequestId::new(),
            tool_name: self.tool_name,
            input: self.input,
            rule_content: self.rule_content,
            is_file_operation,
        }
    }
}
