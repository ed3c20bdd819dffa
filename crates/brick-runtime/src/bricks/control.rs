//! Control-flow bricks. Each one re-enters the executor for its sub-pipelines.
//!
//! Iterations run strictly one after another: a sub-pipeline finishes before
//! the next starts, and the first failure aborts the rest.

use async_trait::async_trait;
use serde_json::Value;

use brick_types::{Result, Schema};

use crate::brick::{Brick, BrickArgs, BrickKind};
use crate::executor::BrickOptions;
use crate::expression::is_truthy;

/// Variable bound to the current element when `elementKey` is not given.
pub const DEFAULT_ELEMENT_KEY: &str = "element";
/// Variable bound to the zero-based iteration index.
pub const INDEX_KEY: &str = "index";

// ---------------------------------------------------------------------------
// MapBrick
// ---------------------------------------------------------------------------

/// Runs `body` once per element and collects the outputs in input order.
pub struct MapBrick;

#[async_trait]
impl Brick for MapBrick {
    fn id(&self) -> &str {
        "@brick/map"
    }

    fn name(&self) -> &str {
        "For each"
    }

    fn description(&self) -> &str {
        "Run a pipeline for every element of a list and collect the results"
    }

    fn kind(&self) -> BrickKind {
        BrickKind::Transformer
    }

    fn input_schema(&self) -> Schema {
        Schema::object([
            ("elements", Schema::array_of(Schema::Any)),
            ("body", Schema::Pipeline),
            ("elementKey", Schema::string()),
        ])
        .require(["elements", "body"])
    }

    fn output_schema(&self) -> Option<Schema> {
        Some(Schema::array_of(Schema::Any))
    }

    async fn run(&self, args: BrickArgs, options: &BrickOptions<'_>) -> Result<Value> {
        let body = args.pipeline("body")?;
        let key = args.opt_str("elementKey").unwrap_or(DEFAULT_ELEMENT_KEY);
        let elements = args
            .get("elements")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut results = Vec::with_capacity(elements.len());
        for (index, element) in elements.into_iter().enumerate() {
            options.logger.debug(&format!("Iteration {index}"));
            let ctx = options
                .ctx
                .clone()
                .with_var(key, element)
                .with_var(INDEX_KEY, Value::from(index));
            results.push(options.run_pipeline(&body, ctx).await?);
        }
        Ok(Value::Array(results))
    }
}

// ---------------------------------------------------------------------------
// IfElseBrick
// ---------------------------------------------------------------------------

pub struct IfElseBrick;

#[async_trait]
impl Brick for IfElseBrick {
    fn id(&self) -> &str {
        "@brick/if-else"
    }

    fn name(&self) -> &str {
        "If-else"
    }

    fn description(&self) -> &str {
        "Run one of two pipelines depending on a condition"
    }

    fn kind(&self) -> BrickKind {
        BrickKind::Transformer
    }

    fn input_schema(&self) -> Schema {
        Schema::object([
            ("condition", Schema::Any),
            ("if", Schema::Pipeline),
            ("else", Schema::Pipeline),
        ])
        .require(["if"])
    }

    async fn run(&self, args: BrickArgs, options: &BrickOptions<'_>) -> Result<Value> {
        let condition = args.get("condition").is_some_and(is_truthy);
        let branch = if condition {
            Some(args.pipeline("if")?)
        } else {
            args.opt_pipeline("else")?
        };
        match branch {
            Some(pipeline) => {
                options
                    .run_pipeline(&pipeline, options.ctx.clone().with_root(options.root()))
                    .await
            }
            None => Ok(Value::Null),
        }
    }
}

// ---------------------------------------------------------------------------
// ForEachElementBrick
// ---------------------------------------------------------------------------

/// Runs `body` once per targeted element, scoped to that element.
pub struct ForEachElementBrick;

#[async_trait]
impl Brick for ForEachElementBrick {
    fn id(&self) -> &str {
        "@brick/for-each-element"
    }

    fn name(&self) -> &str {
        "For each element"
    }

    fn description(&self) -> &str {
        "Run a pipeline once for every matched element, rooted at that element"
    }

    fn kind(&self) -> BrickKind {
        BrickKind::Effect
    }

    fn input_schema(&self) -> Schema {
        Schema::object([("body", Schema::Pipeline)]).require(["body"])
    }

    fn requires_target(&self) -> bool {
        true
    }

    async fn run(&self, args: BrickArgs, options: &BrickOptions<'_>) -> Result<Value> {
        let body = args.pipeline("body")?;
        for (index, target) in options.targets.iter().enumerate() {
            let ctx = options
                .ctx
                .clone()
                .with_root(*target)
                .with_var(INDEX_KEY, Value::from(index));
            options.run_pipeline(&body, ctx).await?;
        }
        Ok(options.ctx.input().clone())
    }
}
