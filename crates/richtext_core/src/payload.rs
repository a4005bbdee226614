//! Event payloads and the standard style-change notification

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Event name of the generic follow-up emitted after a successful format command
pub const STYLE_CHANGED: &str = "STYLE_CHANGED";

/// Untyped bag of fields passed with `emit`
///
/// The bus enforces no schema. Every accessor returns `None` when the field is
/// missing or has the wrong type, so handlers can treat bad shapes as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventPayload(Map<String, Value>);

impl EventPayload {
    /// Create an empty payload
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Build from any JSON value; anything but an object yields an empty payload
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self::new(),
        }
    }

    /// Builder-style field insertion
    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.0.insert(field.to_string(), value.into());
        self
    }

    pub fn insert(&mut self, field: &str, value: impl Into<Value>) {
        self.0.insert(field.to_string(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// String field, `None` if absent or not a string
    pub fn str_field(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(Value::as_str)
    }

    /// Boolean field, `None` if absent or not a boolean
    pub fn bool_field(&self, field: &str) -> Option<bool> {
        self.0.get(field).and_then(Value::as_bool)
    }

    /// Numeric field, `None` if absent or not a number
    pub fn number_field(&self, field: &str) -> Option<f64> {
        self.0.get(field).and_then(Value::as_f64)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Value> for EventPayload {
    fn from(value: Value) -> Self {
        Self::from_value(value)
    }
}

impl From<Map<String, Value>> for EventPayload {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Payload of [`STYLE_CHANGED`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleChange {
    pub style: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl StyleChange {
    pub fn new(style: impl Into<String>, value: Option<Value>) -> Self {
        Self { style: style.into(), value }
    }

    pub fn to_payload(&self) -> EventPayload {
        let mut payload = EventPayload::new().with("style", self.style.clone());
        if let Some(value) = &self.value {
            payload.insert("value", value.clone());
        }
        payload
    }

    /// Read a style change back out of a payload; `None` if `style` is missing
    pub fn from_payload(payload: &EventPayload) -> Option<Self> {
        let style = payload.str_field("style")?;
        Some(Self {
            style: style.to_string(),
            value: payload.get("value").filter(|v| !v.is_null()).cloned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wrong_types_read_as_absent() {
        let payload = EventPayload::from_value(json!({ "color": 123, "bold": "yes", "size": "3" }));
        assert_eq!(payload.str_field("color"), None);
        assert_eq!(payload.bool_field("bold"), None);
        assert_eq!(payload.number_field("size"), None);
        assert_eq!(payload.number_field("color"), Some(123.0));
        assert_eq!(payload.str_field("missing"), None);
    }

    #[test]
    fn test_non_object_values_become_empty() {
        assert!(EventPayload::from_value(json!("red")).is_empty());
        assert!(EventPayload::from_value(json!([1, 2])).is_empty());
        assert!(EventPayload::from_value(Value::Null).is_empty());
    }

    #[test]
    fn test_style_change_payload_shape() {
        let change = StyleChange::new("backgroundColor", Some(json!("#FFFF00")));
        let payload = change.to_payload();
        assert_eq!(payload.into_value(), json!({ "style": "backgroundColor", "value": "#FFFF00" }));

        let bare = StyleChange::new("bold", None).to_payload();
        assert_eq!(bare.len(), 1);
        assert_eq!(StyleChange::from_payload(&bare), Some(StyleChange::new("bold", None)));
        assert_eq!(StyleChange::from_payload(&EventPayload::new()), None);
    }
}
