//! Tool-bridge helpers for argument validation and tool dispatch.

use std::sync::Arc;

use jsonschema::validator_for;
use serde_json::{json, Value};
use tanpopo_ai::{ToolCall, ToolDefinition};

use crate::{AgentTool, ToolArgumentError, ToolExecutionResult};

/// Validates `arguments` against the tool's declared JSON schema.
pub fn validate_tool_arguments(
    definition: &ToolDefinition,
    arguments: &Value,
) -> Result<(), ToolArgumentError> {
    let validator =
        validator_for(&definition.parameters).map_err(|error| ToolArgumentError::Schema {
            tool: definition.name.clone(),
            message: error.to_string(),
        })?;

    if let Some(first) = validator.iter_errors(arguments).next() {
        return Err(ToolArgumentError::Invalid {
            tool: definition.name.clone(),
            message: first.to_string(),
        });
    }

    Ok(())
}

/// Validates and runs one tool call. Validation failures are returned before
/// the tool gets a chance to spawn anything; an unknown tool is answered with
/// an error payload so the model can recover.
pub(crate) async fn execute_tool_call(
    call: &ToolCall,
    registered: Option<Arc<dyn AgentTool>>,
) -> Result<ToolExecutionResult, ToolArgumentError> {
    let Some(tool) = registered else {
        return Ok(ToolExecutionResult::error(json!({
            "error": format!("Tool '{}' is not registered", call.name)
        })));
    };

    tool.validate(&call.arguments)?;
    Ok(tool.execute(call.arguments.clone()).await)
}
