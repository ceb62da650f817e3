//! Argument and tool-shape validation.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use super::{ParameterSchema, Tool, ToolArgs, ToolError};

static TOOL_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("tool name pattern is valid"));

/// Checks arguments against a parameter schema, stopping at the first violation.
///
/// Parameters the schema does not declare are passed through untouched. An
/// explicit `null` counts as absent.
pub fn validate_arguments(schema: &ParameterSchema, args: &ToolArgs) -> Result<(), ToolError> {
    for name in &schema.required {
        if args.get(name).is_none_or(Value::is_null) {
            return Err(ToolError::Validation(format!(
                "missing required parameter: {}",
                name
            )));
        }
    }

    for (name, spec) in &schema.properties {
        let Some(value) = args.get(name) else {
            continue;
        };
        if value.is_null() {
            continue;
        }

        if !spec.param_type.matches(value) {
            return Err(ToolError::Validation(format!(
                "parameter {} must be a {}",
                name, spec.param_type
            )));
        }

        if let Some(allowed) = &spec.enum_values {
            if !allowed.contains(value) {
                let list = allowed
                    .iter()
                    .map(|v| match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(ToolError::Validation(format!(
                    "parameter {} must be one of: {}",
                    name, list
                )));
            }
        }
    }

    Ok(())
}

/// Checks the structural shape of a tool before it is registered.
pub fn validate_tool(tool: &Tool) -> Result<(), ToolError> {
    let blank = |field: &str| ToolError::Validation(format!("tool {} must not be empty", field));

    if tool.id.trim().is_empty() {
        return Err(blank("id"));
    }
    if tool.name.trim().is_empty() {
        return Err(blank("name"));
    }
    if tool.description.trim().is_empty() {
        return Err(blank("description"));
    }
    if tool.provider_id.trim().is_empty() {
        return Err(blank("provider id"));
    }
    if !TOOL_NAME.is_match(&tool.name) {
        return Err(ToolError::Validation(format!(
            "tool name {} must match [A-Za-z0-9_-]{{1,64}}",
            tool.name
        )));
    }
    if let Some(undeclared) = tool
        .parameters
        .required
        .iter()
        .find(|name| !tool.parameters.properties.contains_key(*name))
    {
        return Err(ToolError::Validation(format!(
            "required parameter {} is not declared",
            undeclared
        )));
    }
    Ok(())
}
