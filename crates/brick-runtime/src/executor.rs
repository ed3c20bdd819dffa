//! Pipeline executor: drives invocations in order and owns error propagation.
//!
//! Per invocation:
//! 1. evaluate the `if` condition, skipping the step when it is falsy
//! 2. look up the brick
//! 3. resolve the target scope
//! 4. evaluate the config (running embedded sub-pipelines, rendering
//!    plain strings of template-typed properties)
//! 5. validate the config against the brick's input contract
//! 6. run the brick and thread its output forward
//!
//! Sub-pipelines re-enter the executor through [`BrickOptions::run_pipeline`],
//! each with its own derived context.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value};

use brick_types::{validate, BrickError, ErrorKind, Result, ValidationResult};

use crate::brick::{Brick, BrickArgs, BrickKind, BrickRegistry};
use crate::bricks::builtin_registry;
use crate::context::Context;
use crate::document::{Page, Root};
use crate::events::{EventEmitter, PipelineEvent};
use crate::expression::{is_truthy, Expression};
use crate::logger::Logger;
use crate::pipeline::{Invocation, Pipeline};
use crate::root::{resolve_root, RootRequest};
use crate::template::Template;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Nesting limit for sub-pipelines unless configured otherwise.
pub const DEFAULT_MAX_DEPTH: usize = 32;

// ---------------------------------------------------------------------------
// RunOptions
// ---------------------------------------------------------------------------

/// Services and limits for one run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Document the run operates on; seeds root resolution.
    pub page: Page,
    pub logger: Logger,
    pub events: Option<EventEmitter>,
    pub max_depth: usize,
    /// Check outputs against declared output contracts (warnings only).
    pub validate_output: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            page: Page::default(),
            logger: Logger::new(),
            events: None,
            max_depth: DEFAULT_MAX_DEPTH,
            validate_output: true,
        }
    }
}

impl RunOptions {
    pub fn with_page(mut self, page: Page) -> Self {
        self.page = page;
        self
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_events(mut self, events: EventEmitter) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_validate_output(mut self, validate_output: bool) -> Self {
        self.validate_output = validate_output;
        self
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(events) = &self.events {
            events.emit(event);
        }
    }
}

// ---------------------------------------------------------------------------
// BrickOptions
// ---------------------------------------------------------------------------

/// Everything a brick receives besides its config.
pub struct BrickOptions<'a> {
    pub ctx: &'a Context,
    /// Resolved target scopes. For bricks that need no target and name no
    /// selector this is the current scope alone.
    pub targets: Vec<Root>,
    pub page: &'a Page,
    pub logger: Logger,
    executor: &'a PipelineExecutor,
    run_options: &'a RunOptions,
    depth: usize,
}

impl BrickOptions<'_> {
    /// The first resolved target, falling back to the current scope.
    pub fn root(&self) -> Root {
        self.targets.first().copied().unwrap_or_else(|| self.ctx.root())
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Run a sub-pipeline one level deeper, against a context derived from
    /// the current one.
    pub async fn run_pipeline(&self, pipeline: &Pipeline, ctx: Context) -> Result<Value> {
        self.executor
            .run_nested(pipeline, ctx, self.run_options, self.depth + 1)
            .await
    }
}

// ---------------------------------------------------------------------------
// PipelineExecutor
// ---------------------------------------------------------------------------

/// Runs pipelines against an explicitly supplied registry.
#[derive(Debug, Clone)]
pub struct PipelineExecutor {
    registry: Arc<BrickRegistry>,
}

impl PipelineExecutor {
    pub fn new(registry: impl Into<Arc<BrickRegistry>>) -> Self {
        Self {
            registry: registry.into(),
        }
    }

    /// Create an executor pre-loaded with the built-in bricks.
    pub fn with_builtin_registry() -> Self {
        Self::new(builtin_registry())
    }

    pub fn registry(&self) -> &BrickRegistry {
        &self.registry
    }

    /// Run a pipeline to completion and return its output.
    ///
    /// A cancellation is returned as an error like any other failure;
    /// callers that treat it as "stopped" check [`BrickError::is_cancel`].
    pub async fn run(&self, pipeline: &Pipeline, ctx: Context, options: &RunOptions) -> Result<Value> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let options = RunOptions {
            logger: options.logger.child("run", &run_id),
            ..options.clone()
        };

        tracing::info!(run = %run_id, steps = pipeline.len(), "Pipeline run started");
        options.emit(PipelineEvent::RunStarted {
            run_id: run_id.clone(),
            step_count: pipeline.len(),
        });
        let started = Instant::now();

        let result = self.run_nested(pipeline, ctx, &options, 0).await;

        match &result {
            Ok(_) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                tracing::info!(run = %run_id, duration_ms, "Pipeline run completed");
                options.emit(PipelineEvent::RunCompleted { run_id, duration_ms });
            }
            Err(err) if err.is_cancel() => {
                options.logger.info(&err.to_string());
                options.emit(PipelineEvent::RunCancelled {
                    run_id,
                    message: err.to_string(),
                });
            }
            Err(err) => {
                match err.kind() {
                    ErrorKind::Unexpected => options.logger.error(&format!("{err}: {err:?}")),
                    _ => options.logger.warn(&err.to_string()),
                }
                options.emit(PipelineEvent::RunFailed {
                    run_id,
                    kind: format!("{:?}", err.kind()),
                    error: err.to_string(),
                });
            }
        }
        result
    }

    pub(crate) fn run_nested<'a>(
        &'a self,
        pipeline: &'a Pipeline,
        ctx: Context,
        options: &'a RunOptions,
        depth: usize,
    ) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            if depth > options.max_depth {
                return Err(BrickError::DepthExceeded {
                    limit: options.max_depth,
                });
            }

            let steps = pipeline.invocations();
            let mut ctx = ctx;
            let mut output = Value::Null;

            for (index, invocation) in steps.iter().enumerate() {
                let Some((kind, value)) = self.run_invocation(invocation, &ctx, options, depth).await?
                else {
                    continue;
                };

                match kind {
                    BrickKind::Renderer => {
                        let remaining = steps.len() - index - 1;
                        if remaining > 0 {
                            tracing::warn!(
                                brick = %invocation.id,
                                remaining,
                                "Renderer ends the pipeline; remaining steps are ignored"
                            );
                        }
                        return Ok(value);
                    }
                    BrickKind::Effect | BrickKind::Transformer => {
                        ctx = match &invocation.output_key {
                            Some(key) => ctx.with_var(key, value.clone()),
                            None => ctx.with_input(value.clone()),
                        };
                        output = value;
                    }
                }
            }

            Ok(output)
        })
    }

    /// Run one invocation. Returns `None` when its condition skipped it.
    async fn run_invocation(
        &self,
        invocation: &Invocation,
        ctx: &Context,
        options: &RunOptions,
        depth: usize,
    ) -> Result<Option<(BrickKind, Value)>> {
        if let Some(condition) = &invocation.condition {
            let value = self.resolve_expression(condition, ctx, options, depth).await?;
            if !is_truthy(&value) {
                tracing::debug!(brick = %invocation.id, depth, "Condition is falsy, skipping");
                options.emit(PipelineEvent::BrickSkipped {
                    brick_id: invocation.id.clone(),
                    depth,
                });
                return Ok(None);
            }
        }

        let brick = self.registry.lookup(&invocation.id)?;
        tracing::debug!(brick = %invocation.id, name = invocation.display_name(), depth, "Running brick");
        options.emit(PipelineEvent::BrickStarted {
            brick_id: invocation.id.clone(),
            label: invocation.label.clone(),
            depth,
        });
        let started = Instant::now();

        match self.dispatch(brick.as_ref(), invocation, ctx, options, depth).await {
            Ok(value) => {
                options.emit(PipelineEvent::BrickCompleted {
                    brick_id: invocation.id.clone(),
                    depth,
                    duration_ms: started.elapsed().as_millis() as u64,
                });
                Ok(Some((brick.kind(), value)))
            }
            Err(err) => {
                options.emit(PipelineEvent::BrickFailed {
                    brick_id: invocation.id.clone(),
                    depth,
                    error: err.to_string(),
                });
                Err(err)
            }
        }
    }

    async fn dispatch(
        &self,
        brick: &dyn Brick,
        invocation: &Invocation,
        ctx: &Context,
        options: &RunOptions,
        depth: usize,
    ) -> Result<Value> {
        let targets = self.resolve_targets(brick, invocation, ctx, options).await?;

        let schema = brick.input_schema();
        let deferred = schema.pipeline_properties();
        let templated = schema.template_properties();
        let mut config = Map::new();
        for (key, expr) in &invocation.config {
            let value = match expr {
                Expression::Pipeline(_) if deferred.contains(&key.as_str()) => expr.to_value(),
                // Rendered here and only here; the brick never re-parses its text.
                Expression::Literal(Value::String(source)) if templated.contains(&key.as_str()) => {
                    Value::String(Template::parse(source)?.render(ctx.vars()))
                }
                _ => self.resolve_expression(expr, ctx, options, depth).await?,
            };
            config.insert(key.clone(), value);
        }
        let config = Value::Object(config);

        if let ValidationResult::Invalid(violations) = validate(&config, &schema) {
            return Err(BrickError::InputValidation {
                brick_id: invocation.id.clone(),
                violations,
                config,
                schema: Box::new(schema),
            });
        }

        let logger = options
            .logger
            .child("brick", &invocation.id)
            .child("depth", depth);
        let brick_options = BrickOptions {
            ctx,
            targets,
            page: &options.page,
            logger,
            executor: self,
            run_options: options,
            depth,
        };
        let output = brick
            .run(BrickArgs::new(&invocation.id, config), &brick_options)
            .await
            .map_err(|e| e.with_brick(&invocation.id))?;

        if options.validate_output {
            if let Some(output_schema) = brick.output_schema() {
                if let ValidationResult::Invalid(violations) = validate(&output, &output_schema) {
                    for violation in violations {
                        brick_options
                            .logger
                            .warn(&format!("Output does not match contract: {violation}"));
                    }
                }
            }
        }
        Ok(output)
    }

    async fn resolve_targets(
        &self,
        brick: &dyn Brick,
        invocation: &Invocation,
        ctx: &Context,
        options: &RunOptions,
    ) -> Result<Vec<Root>> {
        let has_selector = invocation
            .root
            .as_deref()
            .is_some_and(|s| !s.trim().is_empty());
        if !brick.requires_target() && !has_selector {
            return Ok(vec![ctx.root()]);
        }

        let request = RootRequest {
            brick_id: &invocation.id,
            selector: invocation.root.as_deref(),
            is_root_aware: invocation.is_root_aware,
            default_root: ctx.root(),
        };
        let document = options.page.read().await;
        resolve_root(&request, &document)
    }

    /// Evaluate an expression, running any sub-pipelines it embeds with the
    /// current context.
    fn resolve_expression<'a>(
        &'a self,
        expr: &'a Expression,
        ctx: &'a Context,
        options: &'a RunOptions,
        depth: usize,
    ) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            match expr {
                _ if !expr.contains_pipeline() => Ok(expr.evaluate_value(ctx)),
                Expression::Pipeline(p) => self.run_nested(p, ctx.clone(), options, depth + 1).await,
                Expression::Object(members) => {
                    let mut out = Map::new();
                    for (key, member) in members {
                        let value = self.resolve_expression(member, ctx, options, depth).await?;
                        out.insert(key.clone(), value);
                    }
                    Ok(Value::Object(out))
                }
                Expression::Array(members) => {
                    let mut out = Vec::with_capacity(members.len());
                    for member in members {
                        out.push(self.resolve_expression(member, ctx, options, depth).await?);
                    }
                    Ok(Value::Array(out))
                }
                other => Ok(other.evaluate_value(ctx)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use brick_types::Schema;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts calls and returns its config.
    struct Counter {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Brick for Counter {
        fn id(&self) -> &str {
            "@test/count"
        }
        fn name(&self) -> &str {
            "Counter"
        }
        fn kind(&self) -> BrickKind {
            BrickKind::Transformer
        }
        fn input_schema(&self) -> Schema {
            Schema::object([("value", Schema::integer())]).require(["value"])
        }
        async fn run(&self, args: BrickArgs, _options: &BrickOptions<'_>) -> Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(args.into_value())
        }
    }

    fn counting_executor() -> (PipelineExecutor, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = builtin_registry();
        registry.register(Counter {
            calls: calls.clone(),
        });
        (PipelineExecutor::new(registry), calls)
    }

    async fn run_json(executor: &PipelineExecutor, pipeline: &str, input: Value) -> Result<Value> {
        let pipeline = Pipeline::from_json_str(pipeline).unwrap();
        executor
            .run(&pipeline, Context::new(input), &RunOptions::default())
            .await
    }

    #[tokio::test]
    async fn empty_pipeline_returns_null() {
        let executor = PipelineExecutor::with_builtin_registry();
        let out = run_json(&executor, "[]", json!(5)).await.unwrap();
        assert_eq!(out, Value::Null);
    }

    #[tokio::test]
    async fn transformer_output_threads_into_next_step() {
        let executor = PipelineExecutor::with_builtin_registry();
        let out = run_json(
            &executor,
            r#"[
                {"id": "@brick/identity", "config": {"n": {"__type__": "var", "__value__": "@input.n"}}},
                {"id": "@brick/template", "config": {"template": {"__type__": "template", "__value__": "n={{ @input.n }}"}}}
            ]"#,
            json!({"n": 4}),
        )
        .await
        .unwrap();
        assert_eq!(out, json!("n=4"));
    }

    /// Effect that answers with a fixed receipt instead of its input.
    struct Receipt;

    #[async_trait]
    impl Brick for Receipt {
        fn id(&self) -> &str {
            "@test/receipt"
        }
        fn name(&self) -> &str {
            "Receipt"
        }
        fn kind(&self) -> BrickKind {
            BrickKind::Effect
        }
        async fn run(&self, _args: BrickArgs, _options: &BrickOptions<'_>) -> Result<Value> {
            Ok(json!({"sent": true}))
        }
    }

    #[tokio::test]
    async fn log_returns_current_data_unchanged() {
        let executor = PipelineExecutor::with_builtin_registry();
        let out = run_json(
            &executor,
            r#"[
                {"id": "@brick/identity", "config": {"x": 1}},
                {"id": "@brick/log", "config": {"message": "hello"}}
            ]"#,
            json!(null),
        )
        .await
        .unwrap();
        assert_eq!(out, json!({"x": 1}));
    }

    #[tokio::test]
    async fn effect_output_is_threaded_like_any_other() {
        let mut registry = builtin_registry();
        registry.register(Receipt);
        let executor = PipelineExecutor::new(registry);

        let last = run_json(
            &executor,
            r#"[
                {"id": "@brick/identity", "config": {"x": 1}},
                {"id": "@test/receipt"}
            ]"#,
            json!(null),
        )
        .await
        .unwrap();
        assert_eq!(last, json!({"sent": true}));

        let next = run_json(
            &executor,
            r#"[
                {"id": "@test/receipt"},
                {"id": "@brick/template", "config": {"template": "sent={{ @input.sent }}"}}
            ]"#,
            json!(null),
        )
        .await
        .unwrap();
        assert_eq!(next, json!("sent=true"));
    }

    #[tokio::test]
    async fn output_key_binds_without_replacing_input() {
        let executor = PipelineExecutor::with_builtin_registry();
        let out = run_json(
            &executor,
            r#"[
                {"id": "@brick/identity", "outputKey": "saved", "config": {"v": "kept"}},
                {"id": "@brick/template", "config": {"template": {"__type__": "template", "__value__": "{{ @saved.v }}/{{ @input }}"}}}
            ]"#,
            json!("original"),
        )
        .await
        .unwrap();
        assert_eq!(out, json!("kept/original"));
    }

    #[tokio::test]
    async fn falsy_condition_skips_step() {
        let executor = PipelineExecutor::with_builtin_registry();
        let out = run_json(
            &executor,
            r#"[
                {"id": "@brick/identity", "config": {"v": 1}},
                {"id": "@brick/error", "if": {"__type__": "var", "__value__": "@input.missing"}, "config": {"message": "never"}},
                {"id": "@brick/identity", "if": true, "config": {"v": 2}}
            ]"#,
            json!(null),
        )
        .await
        .unwrap();
        assert_eq!(out, json!({"v": 2}));
    }

    #[tokio::test]
    async fn renderer_ends_the_pipeline() {
        let executor = PipelineExecutor::with_builtin_registry();
        let out = run_json(
            &executor,
            r#"[
                {"id": "@brick/render/text", "config": {"text": "done"}},
                {"id": "@brick/error", "config": {"message": "unreachable"}}
            ]"#,
            json!(null),
        )
        .await
        .unwrap();
        assert_eq!(out, json!("done"));
    }

    #[tokio::test]
    async fn invalid_config_never_reaches_the_brick() {
        let (executor, calls) = counting_executor();
        let err = run_json(&executor, r#"[{"id": "@test/count", "config": {"value": "nope"}}]"#, json!(null))
            .await
            .unwrap_err();
        match err {
            BrickError::InputValidation {
                brick_id,
                violations,
                config,
                schema,
            } => {
                assert_eq!(brick_id, "@test/count");
                assert_eq!(violations.len(), 1);
                assert_eq!(violations[0].path, "/value");
                assert_eq!(config, json!({"value": "nope"}));
                assert_eq!(*schema, Schema::object([("value", Schema::integer())]).require(["value"]));
            }
            other => panic!("expected InputValidation, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn valid_config_reaches_the_brick_once() {
        let (executor, calls) = counting_executor();
        let out = run_json(
            &executor,
            r#"[{"id": "@test/count", "config": {"value": {"__type__": "var", "__value__": "@input"}}}]"#,
            json!(9),
        )
        .await
        .unwrap();
        assert_eq!(out, json!({"value": 9}));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_brick_is_not_found() {
        let executor = PipelineExecutor::new(BrickRegistry::new());
        let err = run_json(&executor, r#"[{"id": "@acme/missing"}]"#, json!(null))
            .await
            .unwrap_err();
        assert!(matches!(err, BrickError::NotFound { .. }));
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn embedded_sub_pipeline_runs_eagerly() {
        let executor = PipelineExecutor::with_builtin_registry();
        let out = run_json(
            &executor,
            r#"[{"id": "@brick/identity", "config": {"greeting": {"__type__": "pipeline", "__value__": [
                {"id": "@brick/template", "config": {"template": {"__type__": "template", "__value__": "hi {{ @input.name }}"}}}
            ]}}}]"#,
            json!({"name": "Ada"}),
        )
        .await
        .unwrap();
        assert_eq!(out, json!({"greeting": "hi Ada"}));
    }

    #[tokio::test]
    async fn nesting_beyond_limit_is_rejected() {
        let executor = PipelineExecutor::with_builtin_registry();
        let pipeline = Pipeline::from_json_str(
            r#"[{"id": "@brick/identity", "config": {"a": {"__type__": "pipeline", "__value__": [
                {"id": "@brick/identity", "config": {"b": {"__type__": "pipeline", "__value__": [
                    {"id": "@brick/identity"}
                ]}}}
            ]}}}]"#,
        )
        .unwrap();

        let err = executor
            .run(&pipeline, Context::default(), &RunOptions::default().with_max_depth(1))
            .await
            .unwrap_err();
        assert!(matches!(err, BrickError::DepthExceeded { limit: 1 }));

        let ok = executor
            .run(&pipeline, Context::default(), &RunOptions::default().with_max_depth(2))
            .await;
        assert!(ok.is_ok());
    }

    #[tokio::test]
    async fn events_follow_the_run() {
        let executor = PipelineExecutor::with_builtin_registry();
        let events = EventEmitter::new(32);
        let mut rx = events.subscribe();
        let pipeline = Pipeline::from_json_str(
            r#"[{"id": "@brick/identity"}, {"id": "@brick/cancel", "if": false}]"#,
        )
        .unwrap();
        executor
            .run(&pipeline, Context::default(), &RunOptions::default().with_events(events))
            .await
            .unwrap();

        let mut seen = Vec::new();
        while let Ok(event) = rx.try_recv() {
            seen.push(event);
        }
        assert!(matches!(seen[0], PipelineEvent::RunStarted { step_count: 2, .. }));
        assert!(matches!(seen[1], PipelineEvent::BrickStarted { ref brick_id, .. } if brick_id == "@brick/identity"));
        assert!(matches!(seen[2], PipelineEvent::BrickCompleted { .. }));
        assert!(matches!(seen[3], PipelineEvent::BrickSkipped { ref brick_id, .. } if brick_id == "@brick/cancel"));
        assert!(matches!(seen[4], PipelineEvent::RunCompleted { .. }));
        assert_eq!(seen.len(), 5);
    }

    #[tokio::test]
    async fn cancellation_is_reported_as_cancel() {
        let executor = PipelineExecutor::with_builtin_registry();
        let events = EventEmitter::new(32);
        let mut rx = events.subscribe();
        let pipeline = Pipeline::from_json_str(r#"[{"id": "@brick/cancel"}]"#).unwrap();
        let err = executor
            .run(&pipeline, Context::default(), &RunOptions::default().with_events(events))
            .await
            .unwrap_err();
        assert!(err.is_cancel());
        assert_eq!(err.brick_id(), Some("@brick/cancel"));

        let mut last = None;
        while let Ok(event) = rx.try_recv() {
            last = Some(event);
        }
        assert!(matches!(last, Some(PipelineEvent::RunCancelled { .. })));
    }
}
