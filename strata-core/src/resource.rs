//! Resource - Attribute values handed to backends and schemas

use std::collections::HashMap;

/// Attribute value of a configuration block
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Int(i64),
    Bool(bool),
    List(Vec<Value>),
    Map(HashMap<String, Value>),
}

impl Value {
    /// Convert a JSON value into an attribute value.
    ///
    /// Returns `Ok(None)` for `null`, which callers treat as "attribute not set".
    /// Nulls nested inside objects are dropped; nulls inside arrays are rejected.
    pub fn from_json(json: serde_json::Value) -> Result<Option<Value>, String> {
        let value = match json {
            serde_json::Value::Null => return Ok(None),
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => return Err(format!("number {} is not an integer", n)),
            },
            serde_json::Value::Array(items) => {
                let mut values = Vec::with_capacity(items.len());
                for (i, item) in items.into_iter().enumerate() {
                    match Value::from_json(item)? {
                        Some(v) => values.push(v),
                        None => return Err(format!("list item at index {} is null", i)),
                    }
                }
                Value::List(values)
            }
            serde_json::Value::Object(fields) => {
                let mut map = HashMap::with_capacity(fields.len());
                for (k, v) in fields {
                    if let Some(v) = Value::from_json(v).map_err(|e| format!("{}: {}", k, e))? {
                        map.insert(k, v);
                    }
                }
                Value::Map(map)
            }
        };
        Ok(Some(value))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&HashMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Name of the value's type, used in type errors
    pub fn type_name(&self) -> String {
        match self {
            Value::String(_) => "String".to_string(),
            Value::Int(_) => "Int".to_string(),
            Value::Bool(_) => "Bool".to_string(),
            Value::List(_) => "List".to_string(),
            Value::Map(_) => "Map".to_string(),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_json_scalars() {
        assert_eq!(Value::from_json(json!(null)).unwrap(), None);
        assert_eq!(
            Value::from_json(json!("a")).unwrap(),
            Some(Value::String("a".to_string()))
        );
        assert_eq!(Value::from_json(json!(5)).unwrap(), Some(Value::Int(5)));
        assert_eq!(
            Value::from_json(json!(true)).unwrap(),
            Some(Value::Bool(true))
        );
    }

    #[test]
    fn from_json_rejects_fractions() {
        let err = Value::from_json(json!(1.5)).unwrap_err();
        assert!(err.contains("not an integer"));
    }

    #[test]
    fn from_json_drops_null_fields() {
        let value = Value::from_json(json!({"a": "x", "b": null}))
            .unwrap()
            .unwrap();
        let map = value.as_map().unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("a").and_then(Value::as_str), Some("x"));
    }

    #[test]
    fn from_json_rejects_null_list_items() {
        let err = Value::from_json(json!({"ids": ["1", null]})).unwrap_err();
        assert_eq!(err, "ids: list item at index 1 is null");
    }
}
