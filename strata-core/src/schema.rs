//! Schema - Define type schemas for configuration blocks
//!
//! Backends describe the attributes they accept with a [`BlockSchema`],
//! enabling type validation before any backend-specific checks run.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::diagnostics::{AttributePath, Diagnostic, Diagnostics};
use crate::resource::Value;

/// Attribute type
#[derive(Debug, Clone)]
pub enum AttributeType {
    /// String
    String,
    /// Integer
    Int,
    /// Boolean
    Bool,
    /// Custom type (with validation function)
    Custom {
        name: String,
        base: Box<AttributeType>,
        validate: fn(&Value) -> Result<(), String>,
    },
    /// List
    List(Box<AttributeType>),
    /// Set of elements; duplicates collapse into one element
    Set(Box<AttributeType>),
    /// Map with string keys
    Map(Box<AttributeType>),
    /// Nested object with its own attributes
    Object(Box<BlockSchema>),
}

impl AttributeType {
    /// Check if a value conforms to this type
    pub fn validate(&self, value: &Value) -> Result<(), TypeError> {
        match (self, value) {
            (AttributeType::String, Value::String(_)) => Ok(()),
            (AttributeType::Int, Value::Int(_)) => Ok(()),
            (AttributeType::Bool, Value::Bool(_)) => Ok(()),

            (AttributeType::Custom { validate, base, .. }, v) => {
                base.validate(v)?;
                validate(v).map_err(|msg| TypeError::ValidationFailed { message: msg })
            }

            (AttributeType::List(inner) | AttributeType::Set(inner), Value::List(items)) => {
                validate_items(inner, items)
            }

            (AttributeType::Map(inner), Value::Map(map)) => {
                for (k, v) in map {
                    inner.validate(v).map_err(|e| TypeError::MapValueError {
                        key: k.clone(),
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            (AttributeType::Object(schema), Value::Map(map)) => match schema.validate(map) {
                Ok(()) => Ok(()),
                Err(mut errors) => Err(errors.remove(0)),
            },

            _ => Err(TypeError::TypeMismatch {
                expected: self.type_name(),
                got: value.type_name(),
            }),
        }
    }

    fn type_name(&self) -> String {
        match self {
            AttributeType::String => "String".to_string(),
            AttributeType::Int => "Int".to_string(),
            AttributeType::Bool => "Bool".to_string(),
            AttributeType::Custom { name, .. } => name.clone(),
            AttributeType::List(inner) => format!("List<{}>", inner.type_name()),
            AttributeType::Set(inner) => format!("Set<{}>", inner.type_name()),
            AttributeType::Map(inner) => format!("Map<{}>", inner.type_name()),
            AttributeType::Object(_) => "Object".to_string(),
        }
    }
}

fn validate_items(inner: &AttributeType, items: &[Value]) -> Result<(), TypeError> {
    for (i, item) in items.iter().enumerate() {
        inner.validate(item).map_err(|e| TypeError::ListItemError {
            index: i,
            inner: Box::new(e),
        })?;
    }
    Ok(())
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// Type error
#[derive(Debug, Clone, thiserror::Error)]
pub enum TypeError {
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Required attribute '{name}' is missing")]
    MissingRequired { name: String },

    #[error("Unknown attribute '{name}'")]
    UnknownAttribute { name: String },

    #[error("List item at index {index}: {inner}")]
    ListItemError { index: usize, inner: Box<TypeError> },

    #[error("Map value for key '{key}': {inner}")]
    MapValueError { key: String, inner: Box<TypeError> },

    #[error("{name}: {inner}")]
    InAttribute { name: String, inner: Box<TypeError> },
}

impl TypeError {
    fn in_attribute(name: &str, inner: TypeError) -> Self {
        TypeError::InAttribute {
            name: name.to_string(),
            inner: Box::new(inner),
        }
    }

    /// Attribute path the error refers to
    pub fn path(&self) -> AttributePath {
        let mut path = AttributePath::root();
        let mut current = self;
        loop {
            match current {
                TypeError::InAttribute { name, inner } => {
                    path = path.child(name);
                    current = inner;
                }
                TypeError::MissingRequired { name } | TypeError::UnknownAttribute { name } => {
                    return path.child(name);
                }
                _ => return path,
            }
        }
    }

    /// The innermost error, without attribute wrapping
    pub fn root_cause(&self) -> &TypeError {
        match self {
            TypeError::InAttribute { inner, .. } => inner.root_cause(),
            other => other,
        }
    }

    /// Convert into a user-facing diagnostic
    pub fn to_diagnostic(&self) -> Diagnostic {
        let cause = self.root_cause();
        let summary = match cause {
            TypeError::MissingRequired { .. } => "Missing required argument",
            TypeError::UnknownAttribute { .. } => "Unsupported argument",
            _ => "Incorrect attribute value type",
        };
        Diagnostic::attribute_error(self.path(), summary, cause.to_string())
    }
}

/// Attribute schema
#[derive(Debug, Clone)]
pub struct AttributeSchema {
    pub name: String,
    pub attr_type: AttributeType,
    pub required: bool,
    /// Still accepted, but superseded by another attribute
    pub deprecated: bool,
    /// Value must never be printed or logged
    pub sensitive: bool,
    pub description: Option<String>,
}

impl AttributeSchema {
    pub fn new(name: impl Into<String>, attr_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attr_type,
            required: false,
            deprecated: false,
            sensitive: false,
            description: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn deprecated(mut self) -> Self {
        self.deprecated = true;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }
}

/// Schema of a configuration block (attributes keyed by name)
#[derive(Debug, Clone, Default)]
pub struct BlockSchema {
    pub attributes: BTreeMap<String, AttributeSchema>,
    pub description: Option<String>,
}

impl BlockSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attribute(mut self, schema: AttributeSchema) -> Self {
        self.attributes.insert(schema.name.clone(), schema);
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&AttributeSchema> {
        self.attributes.get(name)
    }

    /// Validate block attributes
    pub fn validate(&self, attributes: &HashMap<String, Value>) -> Result<(), Vec<TypeError>> {
        let mut errors = Vec::new();

        // Check required attributes
        for (name, schema) in &self.attributes {
            if schema.required && !attributes.contains_key(name) {
                errors.push(TypeError::MissingRequired { name: name.clone() });
            }
        }

        // Type check each attribute, in a stable order
        let mut names: Vec<&String> = attributes.keys().collect();
        names.sort();
        for name in names {
            let attr_type = self.attributes.get(name).map(|schema| &schema.attr_type);
            match (attr_type, &attributes[name]) {
                // Every problem inside a nested block is reported, not just the first
                (Some(AttributeType::Object(block)), Value::Map(nested)) => {
                    if let Err(nested_errors) = block.validate(nested) {
                        errors.extend(
                            nested_errors
                                .into_iter()
                                .map(|e| TypeError::in_attribute(name, e)),
                        );
                    }
                }
                (Some(attr_type), value) => {
                    if let Err(e) = attr_type.validate(value) {
                        errors.push(TypeError::in_attribute(name, e));
                    }
                }
                (None, _) => errors.push(TypeError::UnknownAttribute { name: name.clone() }),
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate block attributes and report every problem as a diagnostic
    pub fn check(&self, attributes: &HashMap<String, Value>) -> Diagnostics {
        match self.validate(attributes) {
            Ok(()) => Diagnostics::new(),
            Err(errors) => errors.iter().map(TypeError::to_diagnostic).collect(),
        }
    }
}

/// Helper functions for common types
pub mod types {
    use super::*;

    /// Positive integer type
    pub fn positive_int() -> AttributeType {
        AttributeType::Custom {
            name: "PositiveInt".to_string(),
            base: Box::new(AttributeType::Int),
            validate: |value| {
                if let Value::Int(n) = value {
                    if *n > 0 {
                        Ok(())
                    } else {
                        Err("Value must be positive".to_string())
                    }
                } else {
                    Err("Expected integer".to_string())
                }
            },
        }
    }

    /// Non-negative integer type
    pub fn non_negative_int() -> AttributeType {
        AttributeType::Custom {
            name: "NonNegativeInt".to_string(),
            base: Box::new(AttributeType::Int),
            validate: |value| match value {
                Value::Int(n) if *n >= 0 => Ok(()),
                Value::Int(_) => Err("Value must not be negative".to_string()),
                _ => Err("Expected integer".to_string()),
            },
        }
    }

    /// Set of strings
    pub fn string_set() -> AttributeType {
        AttributeType::Set(Box::new(AttributeType::String))
    }

    /// Map of strings
    pub fn string_map() -> AttributeType {
        AttributeType::Map(Box::new(AttributeType::String))
    }
}
