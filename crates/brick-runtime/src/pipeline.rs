//! Pipeline definitions: ordered brick invocations and their authored form.
//!
//! A pipeline file holds either a list of invocations or an object with a
//! `pipeline` key. YAML and JSON share one serde model, so a definition loads
//! and saves through either format without loss.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use brick_types::{BrickError, Result};

use crate::expression::Expression;

/// One step of a pipeline.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Invocation {
    pub id: String,
    #[serde(default)]
    pub config: BTreeMap<String, Expression>,
    #[serde(default)]
    pub label: Option<String>,
    /// Selector for the invocation's target scope.
    #[serde(default)]
    pub root: Option<String>,
    #[serde(default)]
    pub is_root_aware: bool,
    /// Bind the output to `@<key>` instead of replacing the current data.
    #[serde(default)]
    pub output_key: Option<String>,
    /// Skip the invocation when this resolves falsy.
    #[serde(default, rename = "if")]
    pub condition: Option<Expression>,
}

impl Invocation {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            config: BTreeMap::new(),
            label: None,
            root: None,
            is_root_aware: false,
            output_key: None,
            condition: None,
        }
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<Expression>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    pub fn with_root(mut self, selector: impl Into<String>) -> Self {
        self.root = Some(selector.into());
        self
    }

    pub fn root_aware(mut self) -> Self {
        self.is_root_aware = true;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_output_key(mut self, key: impl Into<String>) -> Self {
        self.output_key = Some(key.into());
        self
    }

    pub fn with_condition(mut self, condition: impl Into<Expression>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    /// Label when present, otherwise the brick id.
    pub fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.id)
    }

    pub fn to_value(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("id".into(), Value::String(self.id.clone()));
        if !self.config.is_empty() {
            let config = self
                .config
                .iter()
                .map(|(k, e)| (k.clone(), e.to_value()))
                .collect();
            obj.insert("config".into(), Value::Object(config));
        }
        if let Some(label) = &self.label {
            obj.insert("label".into(), Value::String(label.clone()));
        }
        if let Some(root) = &self.root {
            obj.insert("root".into(), Value::String(root.clone()));
        }
        if self.is_root_aware {
            obj.insert("isRootAware".into(), Value::Bool(true));
        }
        if let Some(key) = &self.output_key {
            obj.insert("outputKey".into(), Value::String(key.clone()));
        }
        if let Some(condition) = &self.condition {
            obj.insert("if".into(), condition.to_value());
        }
        Value::Object(obj)
    }
}

impl Serialize for Invocation {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

/// An ordered sequence of invocations. A value: it holds no run state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipeline {
    invocations: Vec<Invocation>,
}

impl Pipeline {
    pub fn new(invocations: Vec<Invocation>) -> Self {
        Self { invocations }
    }

    /// Build a pipeline from its authored form.
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Array(items) => {
                let mut invocations = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    let invocation = Invocation::deserialize(item).map_err(|e| {
                        let id = item.get("id").and_then(Value::as_str).unwrap_or("?");
                        BrickError::Definition(format!("step {index} ({id}): {e}"))
                    })?;
                    invocations.push(invocation);
                }
                Ok(Self { invocations })
            }
            Value::Object(obj) if obj.len() == 1 && obj.contains_key("pipeline") => {
                Self::from_value(&obj["pipeline"])
            }
            other => Err(BrickError::Definition(format!(
                "expected a list of invocations, found {other}"
            ))),
        }
    }

    pub fn from_yaml_str(source: &str) -> Result<Self> {
        let value: Value = serde_yaml::from_str(source)
            .map_err(|e| BrickError::Definition(format!("invalid YAML: {e}")))?;
        Self::from_value(&value)
    }

    pub fn from_json_str(source: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(source)
            .map_err(|e| BrickError::Definition(format!("invalid JSON: {e}")))?;
        Self::from_value(&value)
    }

    /// Load a definition file: `.yaml`/`.yml` as YAML, anything else as JSON.
    pub fn load(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&source),
            _ => Self::from_json_str(&source),
        }
    }

    pub fn to_value(&self) -> Value {
        Value::Array(self.invocations.iter().map(Invocation::to_value).collect())
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.to_value())?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_value())?)
    }

    pub fn invocations(&self) -> &[Invocation] {
        &self.invocations
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Invocation> {
        self.invocations.iter()
    }

    pub fn len(&self) -> usize {
        self.invocations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.invocations.is_empty()
    }
}

impl From<Vec<Invocation>> for Pipeline {
    fn from(invocations: Vec<Invocation>) -> Self {
        Self::new(invocations)
    }
}

impl<'a> IntoIterator for &'a Pipeline {
    type Item = &'a Invocation;
    type IntoIter = std::slice::Iter<'a, Invocation>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl Serialize for Pipeline {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(&self.invocations)
    }
}

impl<'de> Deserialize<'de> for Pipeline {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Pipeline::from_value(&value).map_err(serde::de::Error::custom)
    }
}
