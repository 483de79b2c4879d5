//! Function descriptors advertised to the model.

use super::ToolError;
use crate::model::Arguments;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Primitive parameter types a function may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Boolean,
    Number,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Number => "number",
        }
    }
}

/// One declared parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub kind: ParamType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, kind: ParamType) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            kind,
            required: false,
            enum_values: None,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Restrict the value to a fixed set.
    pub fn one_of<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enum_values = Some(values.into_iter().map(Into::into).collect());
        self
    }
}

/// Name, purpose and parameters of a callable function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDescriptor {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
}

impl FunctionDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
        }
    }

    pub fn param(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// JSON Schema object describing the parameters.
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for param in &self.parameters {
            let mut property = Map::new();
            property.insert("type".into(), json!(param.kind.as_str()));
            if !param.description.is_empty() {
                property.insert("description".into(), json!(param.description));
            }
            if let Some(values) = &param.enum_values {
                property.insert("enum".into(), json!(values));
            }
            if param.required {
                required.push(param.name.clone());
            }
            properties.insert(param.name.clone(), Value::Object(property));
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Check that required parameters are present and enum-restricted
    /// string values are allowed.
    pub fn check_arguments(&self, args: &Arguments) -> Result<(), ToolError> {
        for param in &self.parameters {
            match args.get(&param.name) {
                None | Some(Value::Null) if param.required => {
                    return Err(ToolError::InvalidArguments(format!(
                        "missing required parameter '{}'",
                        param.name
                    )));
                }
                Some(Value::String(value)) => {
                    if let Some(allowed) = &param.enum_values
                        && !allowed.contains(value)
                    {
                        return Err(ToolError::InvalidArguments(format!(
                            "'{}' must be one of {allowed:?}, got '{value}'",
                            param.name
                        )));
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weather() -> FunctionDescriptor {
        FunctionDescriptor::new("get_weather", "Current temperature for a city")
            .param(
                Parameter::new("city", ParamType::String)
                    .describe("City name")
                    .required(),
            )
            .param(Parameter::new("unit", ParamType::String).one_of(["celsius", "fahrenheit"]))
    }

    #[test]
    fn schema_lists_properties_and_required() {
        let schema = weather().input_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["city"]["type"], "string");
        assert_eq!(schema["properties"]["city"]["description"], "City name");
        assert_eq!(
            schema["properties"]["unit"]["enum"],
            json!(["celsius", "fahrenheit"])
        );
        assert_eq!(schema["required"], json!(["city"]));
    }

    #[test]
    fn missing_required_argument_is_rejected() {
        let err = weather().check_arguments(&Arguments::new()).unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(msg) if msg.contains("city")));
    }

    #[test]
    fn enum_membership_is_checked() {
        let mut args = Arguments::new();
        args.insert("city".into(), json!("Paris"));
        args.insert("unit".into(), json!("kelvin"));
        assert!(weather().check_arguments(&args).is_err());

        args.insert("unit".into(), json!("celsius"));
        assert!(weather().check_arguments(&args).is_ok());
    }
}
