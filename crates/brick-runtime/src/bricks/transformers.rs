//! Data transformers and the text renderer.

use async_trait::async_trait;
use serde_json::Value;

use brick_types::{BrickError, Result, Schema};

use crate::brick::{Brick, BrickArgs, BrickKind};
use crate::executor::BrickOptions;

// ---------------------------------------------------------------------------
// IdentityBrick
// ---------------------------------------------------------------------------

/// Returns its resolved config. Handy for reshaping data with expressions.
pub struct IdentityBrick;

#[async_trait]
impl Brick for IdentityBrick {
    fn id(&self) -> &str {
        "@brick/identity"
    }

    fn name(&self) -> &str {
        "Identity"
    }

    fn description(&self) -> &str {
        "Return the resolved config as data"
    }

    fn kind(&self) -> BrickKind {
        BrickKind::Transformer
    }

    async fn run(&self, args: BrickArgs, _options: &BrickOptions<'_>) -> Result<Value> {
        Ok(args.into_value())
    }
}

// ---------------------------------------------------------------------------
// JsonParseBrick
// ---------------------------------------------------------------------------

pub struct JsonParseBrick;

#[async_trait]
impl Brick for JsonParseBrick {
    fn id(&self) -> &str {
        "@brick/json/parse"
    }

    fn name(&self) -> &str {
        "Parse JSON"
    }

    fn description(&self) -> &str {
        "Parse a JSON document from text"
    }

    fn kind(&self) -> BrickKind {
        BrickKind::Transformer
    }

    fn input_schema(&self) -> Schema {
        Schema::object([("content", Schema::string())]).require(["content"])
    }

    async fn run(&self, args: BrickArgs, _options: &BrickOptions<'_>) -> Result<Value> {
        let content = args.str("content")?;
        serde_json::from_str(content)
            .map_err(|e| BrickError::business(format!("Content is not valid JSON: {e}")))
    }
}

// ---------------------------------------------------------------------------
// TemplateBrick
// ---------------------------------------------------------------------------

/// Produces the rendered `template` text. A plain string is template
/// source; the executor renders it once against the current variables.
pub struct TemplateBrick;

#[async_trait]
impl Brick for TemplateBrick {
    fn id(&self) -> &str {
        "@brick/template"
    }

    fn name(&self) -> &str {
        "Render template"
    }

    fn description(&self) -> &str {
        "Render a template string against the current data"
    }

    fn kind(&self) -> BrickKind {
        BrickKind::Transformer
    }

    fn input_schema(&self) -> Schema {
        Schema::object([("template", Schema::Template)]).require(["template"])
    }

    fn output_schema(&self) -> Option<Schema> {
        Some(Schema::string())
    }

    async fn run(&self, args: BrickArgs, _options: &BrickOptions<'_>) -> Result<Value> {
        Ok(Value::String(args.str("template")?.to_string()))
    }
}

// ---------------------------------------------------------------------------
// RenderTextBrick
// ---------------------------------------------------------------------------

pub struct RenderTextBrick;

#[async_trait]
impl Brick for RenderTextBrick {
    fn id(&self) -> &str {
        "@brick/render/text"
    }

    fn name(&self) -> &str {
        "Render text"
    }

    fn description(&self) -> &str {
        "Display text; ends the pipeline"
    }

    fn kind(&self) -> BrickKind {
        BrickKind::Renderer
    }

    fn input_schema(&self) -> Schema {
        Schema::object([("text", Schema::string())]).require(["text"])
    }

    async fn run(&self, args: BrickArgs, _options: &BrickOptions<'_>) -> Result<Value> {
        Ok(Value::String(args.str("text")?.to_string()))
    }
}
