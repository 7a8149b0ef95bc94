//! Tool System
//!
//! Tools are declared once in a [`ToolRegistry`], advertised to the provider
//! as [`ToolDescriptor`]s and dispatched by name when the model asks for them.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::{AgentError, Result};

/// Tool call request from the LLM
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call ID, unique within the assistant turn that issued it
    pub id: String,

    /// Tool identifier
    pub name: String,

    /// Fully assembled JSON arguments
    #[serde(default)]
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Parse a raw JSON argument string as sent on the wire.
    ///
    /// An empty string means "no arguments" and decodes to `{}`.
    pub fn from_raw_arguments(
        id: impl Into<String>,
        name: impl Into<String>,
        raw: &str,
    ) -> Result<Self> {
        let name = name.into();
        let arguments = if raw.trim().is_empty() {
            Value::Object(Map::new())
        } else {
            serde_json::from_str(raw)
                .map_err(|e| AgentError::invalid_arguments(&name, format!("malformed JSON: {e}")))?
        };
        Ok(Self::new(id, name, arguments))
    }

    /// Decode the arguments into a typed record.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        T::deserialize(&self.arguments)
            .map_err(|e| AgentError::invalid_arguments(&self.name, e.to_string()))
    }
}

/// Result from tool execution
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    /// The request this result answers
    pub tool_call_id: String,

    /// Tool that was called
    pub name: String,

    /// Serialized return value
    pub content: String,
}

/// Parameter definition for tool schema
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Parameter name
    pub name: String,

    /// JSON Schema type (string, number, boolean, object, array)
    #[serde(rename = "type")]
    pub param_type: String,

    /// Human-readable description
    pub description: String,

    /// Whether this parameter is required
    #[serde(default)]
    pub required: bool,

    /// Enum of allowed values
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
}

impl ParameterSchema {
    /// A required string parameter
    pub fn required_string(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            param_type: "string".into(),
            description: description.into(),
            required: true,
            enum_values: None,
        }
    }
}

/// Tool definition schema
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Unique tool identifier
    pub name: String,

    /// Human-readable description (shown to LLM)
    pub description: String,

    /// Parameter definitions
    pub parameters: Vec<ParameterSchema>,
}

impl ToolSchema {
    /// Render the parameter list as a JSON-schema object
    pub fn parameters_json_schema(&self) -> Value {
        let mut properties = Map::new();
        for param in &self.parameters {
            let mut prop = json!({
                "type": param.param_type,
                "description": param.description,
            });
            if let Some(values) = &param.enum_values {
                prop["enum"] = Value::Array(values.clone());
            }
            properties.insert(param.name.clone(), prop);
        }

        let required: Vec<&str> = self
            .parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// The descriptor advertised to the completion provider
    pub fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            kind: "function".into(),
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters_json_schema(),
        }
    }
}

/// Tool descriptor exported to the completion provider
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Always `"function"`
    #[serde(rename = "type")]
    pub kind: String,

    pub name: String,

    pub description: String,

    /// JSON-schema shaped parameter object
    pub parameters: Value,
}

/// Tool trait - implement to add new capabilities
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool's schema for LLM function calling
    fn schema(&self) -> ToolSchema;

    /// Execute the tool, returning the serialized result content
    async fn execute(&self, call: &ToolCall) -> Result<String>;

    /// Validate arguments before execution
    fn validate(&self, call: &ToolCall) -> Result<()> {
        let schema = self.schema();

        let Some(args) = call.arguments.as_object() else {
            return Err(AgentError::invalid_arguments(
                &call.name,
                "arguments must be a JSON object",
            ));
        };

        for param in &schema.parameters {
            if param.required && args.get(&param.name).is_none_or(Value::is_null) {
                return Err(AgentError::invalid_arguments(
                    &call.name,
                    format!("missing required parameter: {}", param.name),
                ));
            }
        }

        Ok(())
    }
}

/// Registry for available tools; also the dispatcher
#[derive(Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a new tool
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.register_arc(Arc::new(tool));
    }

    /// Register a shared tool
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let schema = tool.schema();
        if self.tools.insert(schema.name.clone(), tool).is_some() {
            tracing::warn!(tool = %schema.name, "Replacing already registered tool");
        }
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Dispatch a tool call to its tool and package the result
    pub async fn dispatch(&self, call: &ToolCall) -> Result<ToolResult> {
        let tool = self
            .get(&call.name)
            .ok_or_else(|| AgentError::UnsupportedTool(call.name.clone()))?;

        tool.validate(call)?;

        tracing::debug!(tool = %call.name, id = %call.id, "Dispatching tool call");
        let content = tool.execute(call).await?;

        Ok(ToolResult {
            tool_call_id: call.id.clone(),
            name: call.name.clone(),
            content,
        })
    }

    /// Descriptors for every registered tool, sorted by name
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        let mut descriptors: Vec<_> = self.tools.values().map(|t| t.schema().descriptor()).collect();
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        descriptors
    }

    /// Get tool names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[derive(Debug, Deserialize)]
    struct EchoArgs {
        text: String,
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: "echo".into(),
                description: "Echo the input back".into(),
                parameters: vec![ParameterSchema::required_string("text", "Text to echo")],
            }
        }

        async fn execute(&self, call: &ToolCall) -> Result<String> {
            let args: EchoArgs = call.decode()?;
            Ok(args.text)
        }
    }

    #[test]
    fn test_tool_registry() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);

        assert_eq!(registry.len(), 1);
        assert!(registry.get("echo").is_some());
        assert!(registry.get("unknown").is_none());
        assert_eq!(registry.names(), vec!["echo"]);
    }

    #[test]
    fn test_descriptor_schema() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);

        let descriptors = registry.descriptors();
        assert_eq!(descriptors.len(), 1);
        let value = serde_json::to_value(&descriptors[0]).unwrap();
        assert_eq!(value["type"], "function");
        assert_eq!(value["name"], "echo");
        assert_eq!(value["parameters"]["type"], "object");
        assert_eq!(value["parameters"]["properties"]["text"]["type"], "string");
        assert_eq!(value["parameters"]["required"], json!(["text"]));
    }

    #[tokio::test]
    async fn test_dispatch_success() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);

        let call = ToolCall::new("c1", "echo", json!({"text": "hi"}));
        let result = registry.dispatch(&call).await.unwrap();
        assert_eq!(result.tool_call_id, "c1");
        assert_eq!(result.name, "echo");
        assert_eq!(result.content, "hi");
    }

    #[tokio::test]
    async fn test_dispatch_unknown_tool() {
        let registry = ToolRegistry::new();
        let call = ToolCall::new("c1", "unknown", json!({}));
        let err = registry.dispatch(&call).await.unwrap_err();
        assert!(matches!(err, AgentError::UnsupportedTool(name) if name == "unknown"));
    }

    #[tokio::test]
    async fn test_dispatch_missing_parameter() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);

        let call = ToolCall::new("c1", "echo", json!({}));
        let err = registry.dispatch(&call).await.unwrap_err();
        assert!(matches!(err, AgentError::InvalidArguments { .. }));

        let call = ToolCall::new("c2", "echo", json!("not an object"));
        let err = registry.dispatch(&call).await.unwrap_err();
        assert!(matches!(err, AgentError::InvalidArguments { .. }));
    }

    #[test]
    fn test_raw_arguments() {
        let call = ToolCall::from_raw_arguments("c1", "echo", "").unwrap();
        assert_eq!(call.arguments, json!({}));

        let call = ToolCall::from_raw_arguments("c1", "echo", r#"{"text":"a"}"#).unwrap();
        assert_eq!(call.arguments["text"], "a");

        let err = ToolCall::from_raw_arguments("c1", "echo", r#"{"text":"#).unwrap_err();
        assert!(matches!(err, AgentError::InvalidArguments { tool, .. } if tool == "echo"));
    }

    #[test]
    fn test_decode_type_mismatch() {
        let call = ToolCall::new("c1", "echo", json!({"text": 42}));
        let err = call.decode::<EchoArgs>().unwrap_err();
        assert!(matches!(err, AgentError::InvalidArguments { .. }));
    }
}
