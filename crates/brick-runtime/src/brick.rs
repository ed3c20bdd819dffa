//! Brick trait, resolved arguments, and the brick registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use brick_types::{BrickError, Result, Schema};

use crate::executor::BrickOptions;
use crate::expression::Expression;
use crate::pipeline::Pipeline;

// ---------------------------------------------------------------------------
// Brick trait
// ---------------------------------------------------------------------------

/// How the executor threads a brick's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrickKind {
    /// Performs a side effect. Its output is threaded like a transformer's, so
    /// pass-through effects return their current input.
    Effect,
    /// Produces the next current data.
    Transformer,
    /// Produces presentational output and ends its branch.
    Renderer,
}

impl fmt::Display for BrickKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BrickKind::Effect => "effect",
            BrickKind::Transformer => "transformer",
            BrickKind::Renderer => "renderer",
        };
        f.write_str(s)
    }
}

#[async_trait]
pub trait Brick: Send + Sync {
    /// Stable registry identifier, e.g. `@brick/map`.
    fn id(&self) -> &str;

    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    fn kind(&self) -> BrickKind;

    /// Contract the resolved config must satisfy before [`Brick::run`] is called.
    fn input_schema(&self) -> Schema {
        Schema::Any
    }

    /// Contract the output is checked against. Mismatches are only logged.
    fn output_schema(&self) -> Option<Schema> {
        None
    }

    /// Whether the brick acts on document elements and so needs a resolved
    /// target scope.
    fn requires_target(&self) -> bool {
        false
    }

    async fn run(&self, args: BrickArgs, options: &BrickOptions<'_>) -> Result<Value>;
}

// ---------------------------------------------------------------------------
// BrickArgs
// ---------------------------------------------------------------------------

/// The resolved and validated config handed to a brick.
#[derive(Debug, Clone, PartialEq)]
pub struct BrickArgs {
    brick_id: String,
    config: Map<String, Value>,
}

impl BrickArgs {
    pub fn new(brick_id: &str, config: Value) -> Self {
        let config = match config {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            brick_id: brick_id.to_string(),
            config,
        }
    }

    fn invalid(&self, property: &str, message: impl Into<String>) -> BrickError {
        BrickError::Configuration {
            brick_id: self.brick_id.clone(),
            property: property.to_string(),
            message: message.into(),
        }
    }

    /// A property value. `null` counts as absent.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.config.get(key).filter(|v| !v.is_null())
    }

    pub fn str(&self, key: &str) -> Result<&str> {
        match self.get(key) {
            Some(Value::String(s)) => Ok(s),
            Some(_) => Err(self.invalid(key, "expected a string")),
            None => Err(self.invalid(key, "is required")),
        }
    }

    pub fn opt_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// A deferred sub-pipeline property.
    pub fn pipeline(&self, key: &str) -> Result<Pipeline> {
        let value = self.get(key).ok_or_else(|| self.invalid(key, "is required"))?;
        match Expression::from_value(value)? {
            Expression::Pipeline(p) => Ok(p),
            _ => Err(self.invalid(key, "expected a sub-pipeline")),
        }
    }

    pub fn opt_pipeline(&self, key: &str) -> Result<Option<Pipeline>> {
        match self.get(key) {
            Some(_) => self.pipeline(key).map(Some),
            None => Ok(None),
        }
    }

    /// Deserialize the whole config into a typed struct.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(Value::Object(self.config.clone()))?)
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.config)
    }
}

// ---------------------------------------------------------------------------
// BrickRegistry
// ---------------------------------------------------------------------------

/// Catalogue of bricks by id. Holds no execution state.
#[derive(Clone, Default)]
pub struct BrickRegistry {
    bricks: HashMap<String, Arc<dyn Brick>>,
}

impl fmt::Debug for BrickRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrickRegistry")
            .field("bricks", &self.ids())
            .finish()
    }
}

impl BrickRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a brick. A brick with the same id replaces the earlier one.
    pub fn register(&mut self, brick: impl Brick + 'static) {
        self.register_arc(Arc::new(brick));
    }

    pub fn register_arc(&mut self, brick: Arc<dyn Brick>) {
        let id = brick.id().to_string();
        if self.bricks.insert(id.clone(), brick).is_some() {
            tracing::debug!(brick = %id, "Replaced registered brick");
        }
    }

    pub fn register_all<I>(&mut self, bricks: I)
    where
        I: IntoIterator<Item = Arc<dyn Brick>>,
    {
        for brick in bricks {
            self.register_arc(brick);
        }
    }

    pub fn lookup(&self, id: &str) -> Result<Arc<dyn Brick>> {
        self.bricks
            .get(id)
            .cloned()
            .ok_or_else(|| BrickError::NotFound {
                brick_id: id.to_string(),
            })
    }

    pub fn get(&self, id: &str) -> Option<&Arc<dyn Brick>> {
        self.bricks.get(id)
    }

    pub fn has(&self, id: &str) -> bool {
        self.bricks.contains_key(id)
    }

    /// Remove every brick.
    pub fn clear(&mut self) {
        self.bricks.clear();
    }

    pub fn len(&self) -> usize {
        self.bricks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bricks.is_empty()
    }

    /// Registered ids in sorted order.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.bricks.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Registered bricks in id order.
    pub fn bricks(&self) -> Vec<&Arc<dyn Brick>> {
        let mut bricks: Vec<_> = self.bricks.values().collect();
        bricks.sort_by(|a, b| a.id().cmp(b.id()));
        bricks
    }
}
