//! Structural descriptor for the JSON shape a formatting call must produce.
//!
//! The same descriptor is sent to the provider as a response schema and used
//! afterwards to validate what came back.

use serde_json::{json, Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum Schema {
    String {
        description: Option<String>,
        choices: Option<Vec<String>>,
    },
    Number {
        description: Option<String>,
    },
    Boolean {
        description: Option<String>,
    },
    Array {
        items: Box<Schema>,
        description: Option<String>,
    },
    Object {
        properties: Vec<(String, Schema)>,
        required: Vec<String>,
        description: Option<String>,
    },
}

/// A value that does not fit its schema. `path` is JSONPath-like (`$.news[2].headline`).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{path}: {message}")]
pub struct SchemaViolation {
    pub path: String,
    pub message: String,
}

impl Schema {
    pub fn string() -> Self {
        Schema::String {
            description: None,
            choices: None,
        }
    }

    pub fn one_of(choices: &[&str]) -> Self {
        Schema::String {
            description: None,
            choices: Some(choices.iter().map(|c| c.to_string()).collect()),
        }
    }

    pub fn number() -> Self {
        Schema::Number { description: None }
    }

    pub fn boolean() -> Self {
        Schema::Boolean { description: None }
    }

    pub fn array(items: Schema) -> Self {
        Schema::Array {
            items: Box::new(items),
            description: None,
        }
    }

    /// Object whose properties are all required; relax with [`Schema::optional`].
    pub fn object(properties: Vec<(&str, Schema)>) -> Self {
        let required = properties.iter().map(|(name, _)| name.to_string()).collect();
        Schema::Object {
            properties: properties
                .into_iter()
                .map(|(name, schema)| (name.to_string(), schema))
                .collect(),
            required,
            description: None,
        }
    }

    pub fn optional(mut self, names: &[&str]) -> Self {
        if let Schema::Object { required, .. } = &mut self {
            required.retain(|r| !names.contains(&r.as_str()));
        }
        self
    }

    pub fn describe(mut self, text: &str) -> Self {
        let slot = match &mut self {
            Schema::String { description, .. }
            | Schema::Number { description }
            | Schema::Boolean { description }
            | Schema::Array { description, .. }
            | Schema::Object { description, .. } => description,
        };
        *slot = Some(text.to_string());
        self
    }

    /// Look up a property of an object schema.
    pub fn property(&self, name: &str) -> Option<&Schema> {
        match self {
            Schema::Object { properties, .. } => properties
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, s)| s),
            _ => None,
        }
    }

    /// Render as the provider's OpenAPI-subset response schema.
    pub fn to_json(&self) -> Value {
        let mut out = Map::new();
        let description = match self {
            Schema::String {
                description,
                choices,
            } => {
                out.insert("type".into(), json!("STRING"));
                if let Some(choices) = choices {
                    out.insert("enum".into(), json!(choices));
                }
                description
            }
            Schema::Number { description } => {
                out.insert("type".into(), json!("NUMBER"));
                description
            }
            Schema::Boolean { description } => {
                out.insert("type".into(), json!("BOOLEAN"));
                description
            }
            Schema::Array { items, description } => {
                out.insert("type".into(), json!("ARRAY"));
                out.insert("items".into(), items.to_json());
                description
            }
            Schema::Object {
                properties,
                required,
                description,
            } => {
                out.insert("type".into(), json!("OBJECT"));
                let props: Map<String, Value> = properties
                    .iter()
                    .map(|(name, schema)| (name.clone(), schema.to_json()))
                    .collect();
                out.insert("properties".into(), Value::Object(props));
                out.insert(
                    "propertyOrdering".into(),
                    json!(properties.iter().map(|(n, _)| n).collect::<Vec<_>>()),
                );
                if !required.is_empty() {
                    out.insert("required".into(), json!(required));
                }
                description
            }
        };
        if let Some(text) = description {
            out.insert("description".into(), json!(text));
        }
        Value::Object(out)
    }

    pub fn validate(&self, value: &Value) -> Result<(), SchemaViolation> {
        self.validate_at(value, "$")
    }

    fn validate_at(&self, value: &Value, path: &str) -> Result<(), SchemaViolation> {
        let fail = |message: String| {
            Err(SchemaViolation {
                path: path.to_string(),
                message,
            })
        };

        match self {
            Schema::String { choices, .. } => {
                let Some(s) = value.as_str() else {
                    return fail(format!("expected string, found {}", kind(value)));
                };
                if let Some(choices) = choices {
                    if !choices.iter().any(|c| c == s) {
                        return fail(format!("'{}' is not one of {:?}", s, choices));
                    }
                }
                Ok(())
            }
            Schema::Number { .. } => {
                if value.is_number() {
                    Ok(())
                } else {
                    fail(format!("expected number, found {}", kind(value)))
                }
            }
            Schema::Boolean { .. } => {
                if value.is_boolean() {
                    Ok(())
                } else {
                    fail(format!("expected boolean, found {}", kind(value)))
                }
            }
            Schema::Array { items, .. } => {
                let Some(elements) = value.as_array() else {
                    return fail(format!("expected array, found {}", kind(value)));
                };
                for (i, element) in elements.iter().enumerate() {
                    items.validate_at(element, &format!("{}[{}]", path, i))?;
                }
                Ok(())
            }
            Schema::Object {
                properties,
                required,
                ..
            } => {
                let Some(map) = value.as_object() else {
                    return fail(format!("expected object, found {}", kind(value)));
                };
                for name in required {
                    if map.get(name).map_or(true, Value::is_null) {
                        return fail(format!("missing required property '{}'", name));
                    }
                }
                for (name, schema) in properties {
                    match map.get(name) {
                        Some(Value::Null) | None => {}
                        Some(v) => schema.validate_at(v, &format!("{}.{}", path, name))?,
                    }
                }
                Ok(())
            }
        }
    }
}

fn kind(value: &Value) -> &'static str {
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

    fn news_schema() -> Schema {
        Schema::object(vec![(
            "news",
            Schema::array(Schema::object(vec![
                ("headline", Schema::string()),
                ("category", Schema::one_of(&["Mercados", "Cripto"])),
                ("score", Schema::number()),
                ("time", Schema::string()),
            ]).optional(&["time"])),
        )])
    }

    #[test]
    fn test_valid_payload_passes() {
        let value = json!({
            "news": [
                { "headline": "Fed raises rates", "category": "Mercados", "score": 1.5 },
                { "headline": "BTC rallies", "category": "Cripto", "score": 2, "time": "10:00" }
            ]
        });
        assert!(news_schema().validate(&value).is_ok());
    }

    #[test]
    fn test_missing_required_property_reports_path() {
        let value = json!({ "news": [ { "headline": "x", "category": "Mercados" } ] });
        let err = news_schema().validate(&value).unwrap_err();
        assert_eq!(err.path, "$.news[0]");
        assert!(err.message.contains("score"));
    }

    #[test]
    fn test_wrong_type_and_enum_rejected() {
        let wrong_type = json!({ "news": [ { "headline": 3, "category": "Mercados", "score": 1 } ] });
        let err = news_schema().validate(&wrong_type).unwrap_err();
        assert_eq!(err.path, "$.news[0].headline");

        let bad_enum = json!({ "news": [ { "headline": "x", "category": "Sports", "score": 1 } ] });
        assert!(news_schema().validate(&bad_enum).is_err());
    }

    #[test]
    fn test_null_required_counts_as_missing() {
        let value = json!({ "news": null });
        assert!(news_schema().validate(&value).is_err());
    }

    #[test]
    fn test_to_json_uses_provider_type_names() {
        let rendered = news_schema().to_json();
        assert_eq!(rendered["type"], "OBJECT");
        assert_eq!(rendered["properties"]["news"]["type"], "ARRAY");
        let item = &rendered["properties"]["news"]["items"];
        assert_eq!(item["properties"]["category"]["enum"], json!(["Mercados", "Cripto"]));
        assert_eq!(item["required"], json!(["headline", "category", "score"]));
    }

    #[test]
    fn test_describe_and_property_lookup() {
        let schema = Schema::object(vec![("videoId", Schema::string().describe("YouTube id"))]);
        let prop = schema.property("videoId").unwrap();
        assert_eq!(prop.to_json()["description"], "YouTube id");
        assert!(schema.property("missing").is_none());
    }
}
