//! Brick input/output contracts and the structural validator.
//!
//! A [`Schema`] is a tagged recursive description of an acceptable value.
//! [`validate`] walks a value against it and reports every [`Violation`] in
//! deterministic order. Validation is purely structural and never mutates the
//! value it inspects.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tag key marking a tagged expression object in config values.
pub const EXPRESSION_TYPE_KEY: &str = "__type__";
/// Payload key of a tagged expression object.
pub const EXPRESSION_VALUE_KEY: &str = "__value__";

/// Declarative contract describing an acceptable value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Schema {
    /// Anything is valid. Used when a brick declares no constraints.
    #[default]
    Any,
    Null,
    Boolean,
    #[serde(rename_all = "camelCase")]
    Integer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        minimum: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        maximum: Option<i64>,
    },
    #[serde(rename_all = "camelCase")]
    Number {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        minimum: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        maximum: Option<f64>,
    },
    #[serde(rename_all = "camelCase")]
    String {
        #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
        enum_values: Option<Vec<String>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_length: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_length: Option<usize>,
    },
    #[serde(rename_all = "camelCase")]
    Array {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        items: Option<Box<Schema>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_items: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_items: Option<usize>,
    },
    #[serde(rename_all = "camelCase")]
    Object {
        #[serde(default)]
        properties: BTreeMap<String, Schema>,
        #[serde(default)]
        required: Vec<String>,
        #[serde(default = "default_additional")]
        additional_properties: bool,
    },
    #[serde(rename_all = "camelCase")]
    OneOf { variants: Vec<Schema> },
    /// A deferred sub-pipeline handed to the brick unevaluated.
    Pipeline,
    /// Template source. A plain string authored for this property is parsed
    /// as a template; the brick receives the rendered text.
    Template,
}

fn default_additional() -> bool {
    true
}

impl Schema {
    pub fn string() -> Self {
        Schema::String {
            enum_values: None,
            min_length: None,
            max_length: None,
        }
    }

    pub fn string_enum<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Schema::String {
            enum_values: Some(values.into_iter().map(Into::into).collect()),
            min_length: None,
            max_length: None,
        }
    }

    pub fn integer() -> Self {
        Schema::Integer {
            minimum: None,
            maximum: None,
        }
    }

    pub fn number() -> Self {
        Schema::Number {
            minimum: None,
            maximum: None,
        }
    }

    pub fn array_of(items: Schema) -> Self {
        Schema::Array {
            items: Some(Box::new(items)),
            min_items: None,
            max_items: None,
        }
    }

    /// An object schema with the given properties, none of them required.
    pub fn object<I, K>(properties: I) -> Self
    where
        I: IntoIterator<Item = (K, Schema)>,
        K: Into<String>,
    {
        Schema::Object {
            properties: properties.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            required: Vec::new(),
            additional_properties: true,
        }
    }

    /// Mark properties as required. No-op on non-object schemas.
    pub fn require<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Schema::Object { required, .. } = &mut self {
            required.extend(names.into_iter().map(Into::into));
        }
        self
    }

    /// Names of the properties this schema declares as deferred pipelines.
    pub fn pipeline_properties(&self) -> Vec<&str> {
        self.properties_matching(|s| matches!(s, Schema::Pipeline))
    }

    /// Names of the properties whose plain strings are template source.
    pub fn template_properties(&self) -> Vec<&str> {
        self.properties_matching(|s| matches!(s, Schema::Template))
    }

    fn properties_matching(&self, pred: impl Fn(&Schema) -> bool) -> Vec<&str> {
        match self {
            Schema::Object { properties, .. } => properties
                .iter()
                .filter(|(_, s)| pred(s))
                .map(|(k, _)| k.as_str())
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// A single contract violation at a path inside the validated value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub path: String,
    pub reason: String,
}

impl Violation {
    pub fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = if self.path.is_empty() { "/" } else { &self.path };
        write!(f, "{}: {}", path, self.reason)
    }
}

/// Outcome of validating a value: success or a non-empty list of violations.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationResult {
    Valid,
    Invalid(Vec<Violation>),
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }

    pub fn violations(&self) -> &[Violation] {
        match self {
            ValidationResult::Valid => &[],
            ValidationResult::Invalid(v) => v,
        }
    }
}

/// Validate `value` against `schema`.
pub fn validate(value: &Value, schema: &Schema) -> ValidationResult {
    let mut violations = Vec::new();
    check(value, schema, "", &mut violations);
    if violations.is_empty() {
        ValidationResult::Valid
    } else {
        ValidationResult::Invalid(violations)
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn mismatch(path: &str, expected: &str, value: &Value, out: &mut Vec<Violation>) {
    out.push(Violation::new(
        path,
        format!("expected {expected}, found {}", type_name(value)),
    ));
}

fn is_tagged_pipeline(value: &Value) -> bool {
    value
        .as_object()
        .and_then(|o| o.get(EXPRESSION_TYPE_KEY))
        .and_then(Value::as_str)
        == Some("pipeline")
}

fn check(value: &Value, schema: &Schema, path: &str, out: &mut Vec<Violation>) {
    match schema {
        Schema::Any => {}
        Schema::Null => {
            if !value.is_null() {
                mismatch(path, "null", value, out);
            }
        }
        Schema::Boolean => {
            if !value.is_boolean() {
                mismatch(path, "boolean", value, out);
            }
        }
        Schema::Integer { minimum, maximum } => match value.as_i64() {
            Some(n) => {
                if let Some(min) = minimum {
                    if n < *min {
                        out.push(Violation::new(path, format!("must be >= {min}")));
                    }
                }
                if let Some(max) = maximum {
                    if n > *max {
                        out.push(Violation::new(path, format!("must be <= {max}")));
                    }
                }
            }
            None => mismatch(path, "integer", value, out),
        },
        Schema::Number { minimum, maximum } => match value.as_f64() {
            Some(n) => {
                if let Some(min) = minimum {
                    if n < *min {
                        out.push(Violation::new(path, format!("must be >= {min}")));
                    }
                }
                if let Some(max) = maximum {
                    if n > *max {
                        out.push(Violation::new(path, format!("must be <= {max}")));
                    }
                }
            }
            None => mismatch(path, "number", value, out),
        },
        Schema::String {
            enum_values,
            min_length,
            max_length,
        } => match value.as_str() {
            Some(s) => {
                if let Some(allowed) = enum_values {
                    if !allowed.iter().any(|a| a == s) {
                        out.push(Violation::new(
                            path,
                            format!("must be one of: {}", allowed.join(", ")),
                        ));
                    }
                }
                let len = s.chars().count();
                if let Some(min) = min_length {
                    if len < *min {
                        out.push(Violation::new(
                            path,
                            format!("must be at least {min} characters"),
                        ));
                    }
                }
                if let Some(max) = max_length {
                    if len > *max {
                        out.push(Violation::new(
                            path,
                            format!("must be at most {max} characters"),
                        ));
                    }
                }
            }
            None => mismatch(path, "string", value, out),
        },
        Schema::Array {
            items,
            min_items,
            max_items,
        } => match value.as_array() {
            Some(arr) => {
                if let Some(min) = min_items {
                    if arr.len() < *min {
                        out.push(Violation::new(
                            path,
                            format!("must contain at least {min} items"),
                        ));
                    }
                }
                if let Some(max) = max_items {
                    if arr.len() > *max {
                        out.push(Violation::new(
                            path,
                            format!("must contain at most {max} items"),
                        ));
                    }
                }
                if let Some(item_schema) = items {
                    for (i, item) in arr.iter().enumerate() {
                        check(item, item_schema, &format!("{path}/{i}"), out);
                    }
                }
            }
            None => mismatch(path, "array", value, out),
        },
        Schema::Object {
            properties,
            required,
            additional_properties,
        } => match value.as_object() {
            Some(obj) => {
                let mut missing: Vec<&String> = required
                    .iter()
                    .filter(|name| obj.get(name.as_str()).map_or(true, Value::is_null))
                    .collect();
                missing.sort();
                missing.dedup();
                for name in missing {
                    out.push(Violation::new(format!("{path}/{name}"), "is required"));
                }
                for (name, prop_schema) in properties {
                    match obj.get(name) {
                        Some(Value::Null) | None => {}
                        Some(v) => check(v, prop_schema, &format!("{path}/{name}"), out),
                    }
                }
                if !additional_properties {
                    let mut extra: Vec<&String> = obj
                        .keys()
                        .filter(|k| !properties.contains_key(k.as_str()))
                        .collect();
                    extra.sort();
                    for name in extra {
                        out.push(Violation::new(
                            format!("{path}/{name}"),
                            "is not an allowed property",
                        ));
                    }
                }
            }
            None => mismatch(path, "object", value, out),
        },
        Schema::OneOf { variants } => {
            let matched = variants.iter().any(|variant| {
                let mut scratch = Vec::new();
                check(value, variant, path, &mut scratch);
                scratch.is_empty()
            });
            if !matched {
                out.push(Violation::new(
                    path,
                    format!("does not match any of {} alternatives", variants.len()),
                ));
            }
        }
        Schema::Pipeline => {
            if !is_tagged_pipeline(value) {
                out.push(Violation::new(path, "expected a pipeline expression"));
            }
        }
        Schema::Template => {
            if !value.is_string() {
                mismatch(path, "string", value, out);
            }
        }
    }
}
