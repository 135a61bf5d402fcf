//! Response schemas for structured generation
//!
//! A [`Schema`] is sent to the model as its `responseSchema` and is then used
//! to validate what comes back. Anything that does not match is rejected.

use serde_json::{Map, Value, json};

/// Expected shape of a structured response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schema {
    /// Any string
    String,
    /// Whole number
    Integer,
    /// Any number
    Number,
    /// `true` or `false`
    Boolean,
    /// Homogeneous array
    Array(Box<Schema>),
    /// Object with named properties
    Object {
        /// Property name and schema, in declaration order
        properties: Vec<(String, Schema)>,
        /// Names that must be present
        required: Vec<String>,
    },
}

impl Schema {
    /// Object schema where every listed property is required
    #[must_use]
    pub fn object<I, S>(properties: I) -> Self
    where
        I: IntoIterator<Item = (S, Self)>,
        S: Into<String>,
    {
        let properties: Vec<(String, Self)> = properties
            .into_iter()
            .map(|(name, schema)| (name.into(), schema))
            .collect();
        let required = properties.iter().map(|(name, _)| name.clone()).collect();
        Self::Object {
            properties,
            required,
        }
    }

    /// Array of `items`
    #[must_use]
    pub fn array(items: Self) -> Self {
        Self::Array(Box::new(items))
    }

    /// Mark a property optional (no-op for non-objects)
    #[must_use]
    pub fn optional(mut self, name: &str) -> Self {
        if let Self::Object { required, .. } = &mut self {
            required.retain(|r| r != name);
        }
        self
    }

    /// Render in the OpenAPI subset accepted by the generative API
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::String => json!({ "type": "STRING" }),
            Self::Integer => json!({ "type": "INTEGER" }),
            Self::Number => json!({ "type": "NUMBER" }),
            Self::Boolean => json!({ "type": "BOOLEAN" }),
            Self::Array(items) => json!({ "type": "ARRAY", "items": items.to_json() }),
            Self::Object {
                properties,
                required,
            } => {
                let props: Map<String, Value> = properties
                    .iter()
                    .map(|(name, schema)| (name.clone(), schema.to_json()))
                    .collect();
                let order: Vec<&str> = properties.iter().map(|(n, _)| n.as_str()).collect();
                json!({
                    "type": "OBJECT",
                    "properties": props,
                    "required": required,
                    "propertyOrdering": order,
                })
            }
        }
    }

    /// Check `value` against this schema
    ///
    /// # Errors
    ///
    /// Returns a description of the first violation, prefixed with its JSON path
    pub fn validate(&self, value: &Value) -> Result<(), String> {
        self.validate_at("$", value)
    }

    fn validate_at(&self, path: &str, value: &Value) -> Result<(), String> {
        match (self, value) {
            (Self::String, Value::String(_)) | (Self::Boolean, Value::Bool(_)) => Ok(()),
            (Self::Number, Value::Number(_)) => Ok(()),
            (Self::Integer, Value::Number(n)) if n.is_i64() || n.is_u64() => Ok(()),
            (Self::Array(items), Value::Array(values)) => {
                for (i, v) in values.iter().enumerate() {
                    items.validate_at(&format!("{path}[{i}]"), v)?;
                }
                Ok(())
            }
            (
                Self::Object {
                    properties,
                    required,
                },
                Value::Object(map),
            ) => {
                for name in required {
                    if map.get(name).is_none_or(Value::is_null) {
                        return Err(format!("{path}.{name}: required field missing"));
                    }
                }
                for (name, schema) in properties {
                    match map.get(name) {
                        Some(Value::Null) | None => {}
                        Some(v) => schema.validate_at(&format!("{path}.{name}"), v)?,
                    }
                }
                Ok(())
            }
            (expected, found) => Err(format!(
                "{path}: expected {}, found {}",
                expected.type_name(),
                json_type_name(found)
            )),
        }
    }

    const fn type_name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array(_) => "array",
            Self::Object { .. } => "object",
        }
    }
}

const fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evaluation() -> Schema {
        Schema::object([
            ("score", Schema::Integer),
            ("feedback", Schema::String),
            ("mistakes", Schema::array(Schema::String)),
        ])
    }

    #[test]
    fn test_accepts_matching_value() {
        let v = json!({ "score": 80, "feedback": "good", "mistakes": ["ser"] });
        assert!(evaluation().validate(&v).is_ok());
    }

    #[test]
    fn test_rejects_missing_required() {
        let v = json!({ "score": 80, "mistakes": [] });
        let err = evaluation().validate(&v).unwrap_err();
        assert!(err.contains("$.feedback"), "{err}");
    }

    #[test]
    fn test_rejects_wrong_array_item_type() {
        let v = json!({ "score": 80, "feedback": "ok", "mistakes": ["a", 3] });
        let err = evaluation().validate(&v).unwrap_err();
        assert!(err.contains("$.mistakes[1]"), "{err}");
    }

    #[test]
    fn test_integer_rejects_fraction() {
        assert!(Schema::Integer.validate(&json!(3.5)).is_err());
        assert!(Schema::Number.validate(&json!(3.5)).is_ok());
    }

    #[test]
    fn test_optional_field_may_be_absent() {
        let schema = evaluation().optional("mistakes");
        assert!(schema.validate(&json!({ "score": 1, "feedback": "x" })).is_ok());
    }

    #[test]
    fn test_to_json_shape() {
        let v = evaluation().to_json();
        assert_eq!(v["type"], "OBJECT");
        assert_eq!(v["properties"]["mistakes"]["items"]["type"], "STRING");
        assert_eq!(v["required"].as_array().map(Vec::len), Some(3));
    }
}
