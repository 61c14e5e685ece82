//! Tool definitions and parameter schemas
//!
//! A `ToolSpec` is the static description of a tool: its name, description
//! and ordered parameter list. It renders to JSON Schema for the wire and
//! validates argument maps before a handler runs.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::{DiskmonError, Result};

/// JSON type of a tool parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
}

impl ParamType {
    /// Parse from a JSON Schema type name
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "string" => Some(Self::String),
            "integer" => Some(Self::Integer),
            "number" => Some(Self::Number),
            "boolean" | "bool" => Some(Self::Boolean),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
        }
    }

    /// Check if a JSON value has this type
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
        }
    }
}

/// One named parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ParamSpec {
    /// A parameter the caller must supply
    pub fn required(name: impl Into<String>, param_type: ParamType, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: description.into(),
            required: true,
            default: None,
        }
    }

    /// A parameter the caller may omit
    pub fn optional(name: impl Into<String>, param_type: ParamType, description: impl Into<String>) -> Self {
        Self {
            required: false,
            ..Self::required(name, param_type, description)
        }
    }

    /// Value used when the caller omits the parameter
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }
}

/// Static description of a tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub params: Vec<ParamSpec>,
}

impl ToolSpec {
    /// Create a tool spec without parameters
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            params: Vec::new(),
        }
    }

    /// Append a parameter
    pub fn with_param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }

    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// JSON Schema of the argument object
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        for param in &self.params {
            let mut prop = Map::new();
            prop.insert("type".to_string(), Value::String(param.param_type.as_str().to_string()));
            if !param.description.is_empty() {
                prop.insert("description".to_string(), Value::String(param.description.clone()));
            }
            if let Some(default) = &param.default {
                prop.insert("default".to_string(), default.clone());
            }
            properties.insert(param.name.clone(), Value::Object(prop));
        }

        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required
        })
    }

    /// Check `args` against the parameter list and fill in defaults.
    ///
    /// Unknown names, missing required parameters and type mismatches are
    /// rejected with `InvalidArguments`. A `null` value counts as omitted.
    pub fn validate_args(&self, args: &Map<String, Value>) -> Result<Map<String, Value>> {
        if let Some(unknown) = args.keys().find(|k| self.param(k).is_none()) {
            return Err(DiskmonError::InvalidArguments(format!(
                "{}: unknown parameter '{}'",
                self.name, unknown
            )));
        }

        let mut validated = Map::new();
        for param in &self.params {
            match args.get(&param.name).filter(|v| !v.is_null()) {
                Some(value) if param.param_type.matches(value) => {
                    validated.insert(param.name.clone(), value.clone());
                }
                Some(value) => {
                    return Err(DiskmonError::InvalidArguments(format!(
                        "{}: parameter '{}' must be {}, got {}",
                        self.name,
                        param.name,
                        param.param_type.as_str(),
                        json_type_name(value)
                    )));
                }
                None => {
                    if let Some(default) = &param.default {
                        validated.insert(param.name.clone(), default.clone());
                    } else if param.required {
                        return Err(DiskmonError::InvalidArguments(format!(
                            "{}: missing required parameter '{}'",
                            self.name, param.name
                        )));
                    }
                }
            }
        }
        Ok(validated)
    }

    /// Wire form for `tools/list`
    pub fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: self.input_schema(),
        }
    }

    /// Rebuild a spec from a discovered descriptor
    pub fn from_descriptor(descriptor: &ToolDescriptor) -> Result<Self> {
        let schema = &descriptor.input_schema;
        let required: Vec<&str> = schema
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let mut spec = Self::new(descriptor.name.clone(), descriptor.description.clone());
        if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
            for (name, prop) in properties {
                let type_name = prop.get("type").and_then(Value::as_str).unwrap_or("string");
                let param_type = ParamType::from_str(type_name).ok_or_else(|| {
                    DiskmonError::Protocol {
                        code: -32602,
                        message: format!(
                            "tool '{}' parameter '{}' has unsupported type '{}'",
                            descriptor.name, name, type_name
                        ),
                    }
                })?;
                spec.params.push(ParamSpec {
                    name: name.clone(),
                    param_type,
                    description: prop
                        .get("description")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    required: required.contains(&name.as_str()),
                    default: prop.get("default").cloned(),
                });
            }
        }
        Ok(spec)
    }
}

/// Tool as advertised by `tools/list`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
