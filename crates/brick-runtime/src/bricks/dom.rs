//! Document bricks. All of them act on the invocation's resolved targets.

use async_trait::async_trait;
use serde_json::Value;

use brick_types::{Result, Schema};

use crate::brick::{Brick, BrickArgs, BrickKind};
use crate::executor::BrickOptions;

fn non_empty_string() -> Schema {
    Schema::String {
        enum_values: None,
        min_length: Some(1),
        max_length: None,
    }
}

// ---------------------------------------------------------------------------
// AddClassBrick
// ---------------------------------------------------------------------------

pub struct AddClassBrick;

#[async_trait]
impl Brick for AddClassBrick {
    fn id(&self) -> &str {
        "@brick/dom/add-class"
    }

    fn name(&self) -> &str {
        "Add CSS class"
    }

    fn description(&self) -> &str {
        "Add a class to every targeted element"
    }

    fn kind(&self) -> BrickKind {
        BrickKind::Effect
    }

    fn input_schema(&self) -> Schema {
        Schema::object([("className", non_empty_string())]).require(["className"])
    }

    fn requires_target(&self) -> bool {
        true
    }

    async fn run(&self, args: BrickArgs, options: &BrickOptions<'_>) -> Result<Value> {
        let class = args.str("className")?;
        let mut doc = options.page.write().await;
        for target in &options.targets {
            let id = doc.element_for(*target);
            doc.add_class(id, class);
        }
        options
            .logger
            .debug(&format!("Added class '{class}' to {} element(s)", options.targets.len()));
        Ok(options.ctx.input().clone())
    }
}

// ---------------------------------------------------------------------------
// SetAttributeBrick
// ---------------------------------------------------------------------------

pub struct SetAttributeBrick;

#[async_trait]
impl Brick for SetAttributeBrick {
    fn id(&self) -> &str {
        "@brick/dom/set-attribute"
    }

    fn name(&self) -> &str {
        "Set attribute"
    }

    fn description(&self) -> &str {
        "Set an attribute on every targeted element"
    }

    fn kind(&self) -> BrickKind {
        BrickKind::Effect
    }

    fn input_schema(&self) -> Schema {
        Schema::object([("name", non_empty_string()), ("value", Schema::string())])
            .require(["name", "value"])
    }

    fn requires_target(&self) -> bool {
        true
    }

    async fn run(&self, args: BrickArgs, options: &BrickOptions<'_>) -> Result<Value> {
        let name = args.str("name")?;
        let value = args.str("value")?;
        let mut doc = options.page.write().await;
        for target in &options.targets {
            let id = doc.element_for(*target);
            doc.set_attribute(id, name, value);
        }
        Ok(options.ctx.input().clone())
    }
}

// ---------------------------------------------------------------------------
// ReadTextBrick
// ---------------------------------------------------------------------------

pub struct ReadTextBrick;

#[async_trait]
impl Brick for ReadTextBrick {
    fn id(&self) -> &str {
        "@brick/dom/read-text"
    }

    fn name(&self) -> &str {
        "Read text"
    }

    fn description(&self) -> &str {
        "Return the text content of every targeted element"
    }

    fn kind(&self) -> BrickKind {
        BrickKind::Transformer
    }

    fn output_schema(&self) -> Option<Schema> {
        Some(Schema::array_of(Schema::string()))
    }

    fn requires_target(&self) -> bool {
        true
    }

    async fn run(&self, _args: BrickArgs, options: &BrickOptions<'_>) -> Result<Value> {
        let doc = options.page.read().await;
        let texts = options
            .targets
            .iter()
            .map(|target| Value::String(doc.text_content(doc.element_for(*target))))
            .collect();
        Ok(Value::Array(texts))
    }
}
