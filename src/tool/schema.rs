//! Translation between registry parameter schemas and model-facing JSON Schema.

use std::collections::BTreeMap;
use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::ToolError;

/// The value types a tool parameter may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Boolean,
    Array,
    Object,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Array => "array",
            ParamType::Object => "object",
        }
    }

    /// Maps a JSON Schema type name onto a parameter type.
    pub fn from_schema_type(name: &str) -> Option<Self> {
        match name {
            "string" => Some(ParamType::String),
            "number" | "integer" => Some(ParamType::Number),
            "boolean" => Some(ParamType::Boolean),
            "array" => Some(ParamType::Array),
            "object" => Some(ParamType::Object),
            _ => None,
        }
    }

    /// Returns whether a run-time value has this type.
    pub fn matches(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (ParamType::String, Value::String(_))
                | (ParamType::Number, Value::Number(_))
                | (ParamType::Boolean, Value::Bool(_))
                | (ParamType::Array, Value::Array(_))
                | (ParamType::Object, Value::Object(_))
        )
    }

    fn of_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(_) => Some(ParamType::String),
            Value::Number(_) => Some(ParamType::Number),
            Value::Bool(_) => Some(ParamType::Boolean),
            Value::Array(_) => Some(ParamType::Array),
            Value::Object(_) => Some(ParamType::Object),
            Value::Null => None,
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declaration of a single parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    #[serde(rename = "type")]
    pub param_type: ParamType,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
}

impl ParameterSpec {
    pub fn new(param_type: ParamType, description: impl Into<String>) -> Self {
        Self {
            param_type,
            description: description.into(),
            enum_values: None,
        }
    }
}

/// An object schema: named parameters plus the names that must be present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    #[serde(default)]
    pub properties: BTreeMap<String, ParameterSpec>,
    /// Required names, in declaration order
    #[serde(default)]
    pub required: Vec<String>,
}

impl ParameterSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a parameter that must be present.
    pub fn required(
        mut self,
        name: impl Into<String>,
        param_type: ParamType,
        description: impl Into<String>,
    ) -> Self {
        let name = name.into();
        self.properties
            .insert(name.clone(), ParameterSpec::new(param_type, description));
        if !self.required.contains(&name) {
            self.required.push(name);
        }
        self
    }

    /// Declares a parameter that may be omitted.
    pub fn optional(
        mut self,
        name: impl Into<String>,
        param_type: ParamType,
        description: impl Into<String>,
    ) -> Self {
        self.properties
            .insert(name.into(), ParameterSpec::new(param_type, description));
        self
    }

    /// Restricts an already-declared parameter to a fixed set of values.
    pub fn with_enum<I, V>(mut self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        if let Some(spec) = self.properties.get_mut(name) {
            spec.enum_values = Some(values.into_iter().map(Into::into).collect());
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Derives a schema from a Rust argument type.
    pub fn for_type<T: JsonSchema>() -> Result<Self, ToolError> {
        let root = schemars::schema_for!(T);
        let value = serde_json::to_value(root)
            .map_err(|e| ToolError::Validation(format!("unrepresentable schema: {}", e)))?;
        Self::from_json_schema(&value)
    }

    /// Renders the model-facing JSON Schema.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        for (name, spec) in &self.properties {
            let mut prop = Map::new();
            prop.insert(
                "type".to_string(),
                Value::String(spec.param_type.as_str().to_string()),
            );
            if !spec.description.is_empty() {
                prop.insert(
                    "description".to_string(),
                    Value::String(spec.description.clone()),
                );
            }
            if let Some(values) = &spec.enum_values {
                prop.insert("enum".to_string(), Value::Array(values.clone()));
            }
            properties.insert(name.clone(), Value::Object(prop));
        }

        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": self.required,
        })
    }

    /// Parses a model-facing JSON Schema.
    ///
    /// Accepts the shapes produced by common generators: nullable type arrays,
    /// `anyOf`/`oneOf` with a null branch, single-element `allOf`, and `$ref`
    /// into root `definitions` or `$defs`.
    pub fn from_json_schema(schema: &Value) -> Result<Self, ToolError> {
        let root = schema.as_object().ok_or_else(|| {
            ToolError::Validation("parameter schema must be a JSON object".to_string())
        })?;

        match root.get("type") {
            Some(Value::String(t)) if t == "object" => {}
            None => {}
            _ => {
                return Err(ToolError::Validation(
                    "parameter schema must have type object".to_string(),
                ));
            }
        }

        let definitions = root
            .get("definitions")
            .or_else(|| root.get("$defs"))
            .and_then(Value::as_object);

        let mut properties = BTreeMap::new();
        if let Some(props) = root.get("properties") {
            let props = props.as_object().ok_or_else(|| {
                ToolError::Validation("schema properties must be an object".to_string())
            })?;
            for (name, prop) in props {
                properties.insert(name.clone(), parse_property(name, prop, definitions)?);
            }
        }

        let required = match root.get("required") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(names)) => names
                .iter()
                .map(|n| {
                    n.as_str().map(str::to_string).ok_or_else(|| {
                        ToolError::Validation("required names must be strings".to_string())
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => {
                return Err(ToolError::Validation(
                    "schema required must be an array".to_string(),
                ));
            }
        };

        Ok(Self {
            properties,
            required,
        })
    }
}

/// Model-facing description of one tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelToolSchema {
    pub description: String,
    pub parameters: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
}

impl ModelToolSchema {
    pub fn from_tool(tool: &super::Tool) -> Self {
        Self {
            description: tool.description.clone(),
            parameters: tool.parameters.to_json_schema(),
            output_schema: tool.output_schema.clone(),
        }
    }
}

fn parse_property(
    name: &str,
    prop: &Value,
    definitions: Option<&Map<String, Value>>,
) -> Result<ParameterSpec, ToolError> {
    let resolved = resolve(prop, definitions, 0);
    let unsupported = || ToolError::Validation(format!("parameter {} has an unsupported schema", name));

    let enum_values = resolved
        .get("enum")
        .and_then(Value::as_array)
        .map(|values| values.iter().filter(|v| !v.is_null()).cloned().collect::<Vec<_>>());

    let param_type = match resolved.get("type") {
        Some(Value::String(t)) => ParamType::from_schema_type(t),
        Some(Value::Array(types)) => types
            .iter()
            .filter_map(Value::as_str)
            .find(|t| *t != "null")
            .and_then(ParamType::from_schema_type),
        _ => enum_values
            .as_ref()
            .and_then(|values| values.first())
            .and_then(ParamType::of_value),
    }
    .ok_or_else(unsupported)?;

    let description = resolved
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Ok(ParameterSpec {
        param_type,
        description,
        enum_values,
    })
}

/// Flattens references and nullable wrappers into a single property map.
/// Keys already present on the outer schema win over referenced ones.
fn resolve(
    prop: &Value,
    definitions: Option<&Map<String, Value>>,
    depth: usize,
) -> Map<String, Value> {
    let mut merged = prop.as_object().cloned().unwrap_or_default();
    if depth > 8 {
        return merged;
    }

    let mut inner: Option<Value> = None;
    if let Some(reference) = merged.get("$ref").and_then(Value::as_str) {
        let key = reference.rsplit('/').next().unwrap_or(reference);
        inner = definitions.and_then(|defs| defs.get(key)).cloned();
    } else if let Some(Value::Array(all)) = merged.get("allOf") {
        if all.len() == 1 {
            inner = all.first().cloned();
        }
    } else if let Some(Value::Array(any)) = merged.get("anyOf").or_else(|| merged.get("oneOf")) {
        inner = any
            .iter()
            .find(|branch| branch.get("type").and_then(Value::as_str) != Some("null"))
            .cloned();
    }

    if let Some(inner) = inner {
        for (key, value) in resolve(&inner, definitions, depth + 1) {
            merged.entry(key).or_insert(value);
        }
    }
    merged
}
