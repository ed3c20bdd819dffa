//! Static pipeline lint: rules and diagnostics.
//!
//! Checks a [`Pipeline`] against a [`BrickRegistry`] without running anything.
//! Call [`lint`] for advisory diagnostics or [`lint_or_raise`] to fail on the
//! first `Error`-severity issue. Every rule also inspects sub-pipelines.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;
use serde_json::Value;

use brick_types::{validate, BrickError, Result};

use crate::brick::{BrickKind, BrickRegistry};
use crate::bricks::control::{DEFAULT_ELEMENT_KEY, INDEX_KEY};
use crate::context::INPUT_VAR;
use crate::expression::Expression;
use crate::pipeline::{Invocation, Pipeline};
use crate::template::Template;

// ---------------------------------------------------------------------------
// Diagnostic types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub rule: String,
    pub severity: Severity,
    pub message: String,
    /// Location inside the definition, e.g. `/0/config/body/1/root`.
    pub path: String,
    pub brick_id: Option<String>,
    pub fix: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        };
        f.write_str(s)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] {}: {}", self.severity, self.rule, self.path, self.message)?;
        if let Some(fix) = &self.fix {
            write!(f, " (fix: {fix})")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// LintRule trait
// ---------------------------------------------------------------------------

pub trait LintRule: Send + Sync {
    fn name(&self) -> &str;
    fn apply(&self, pipeline: &Pipeline, registry: &BrickRegistry) -> Vec<Diagnostic>;
}

// ---------------------------------------------------------------------------
// Traversal helpers
// ---------------------------------------------------------------------------

/// A pipeline reached during traversal, with its location and the variables
/// bound around it.
struct Site<'a> {
    pipeline: &'a Pipeline,
    path: String,
    scope: HashSet<String>,
}

fn sub_pipelines(invocation: &Invocation) -> Vec<(String, &Pipeline)> {
    let mut out = Vec::new();
    if let Some(condition) = &invocation.condition {
        for p in condition.sub_pipelines() {
            out.push(("if".to_string(), p));
        }
    }
    for (key, expr) in &invocation.config {
        for p in expr.sub_pipelines() {
            out.push((format!("config/{key}"), p));
        }
    }
    out
}

/// Variables a control-flow brick binds for its sub-pipelines.
fn iteration_vars(invocation: &Invocation) -> Vec<String> {
    let element = invocation
        .config
        .get("elementKey")
        .and_then(Expression::as_literal)
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_ELEMENT_KEY);
    vec![format!("@{element}"), format!("@{INDEX_KEY}")]
}

/// Every pipeline in the tree, outermost first.
fn sites(pipeline: &Pipeline) -> Vec<Site<'_>> {
    let mut out = Vec::new();
    let scope = HashSet::from([INPUT_VAR.to_string()]);
    collect_sites(pipeline, String::new(), scope, &mut out);
    out
}

fn collect_sites<'a>(pipeline: &'a Pipeline, path: String, scope: HashSet<String>, out: &mut Vec<Site<'a>>) {
    let mut bound = scope.clone();
    let mut nested = Vec::new();
    for (index, invocation) in pipeline.iter().enumerate() {
        for (key, sub) in sub_pipelines(invocation) {
            let mut inner = bound.clone();
            inner.extend(iteration_vars(invocation));
            nested.push((sub, format!("{path}/{index}/{key}"), inner));
        }
        if let Some(key) = &invocation.output_key {
            bound.insert(format!("@{}", key.trim_start_matches('@')));
        }
    }
    out.push(Site {
        pipeline,
        path,
        scope,
    });
    for (sub, sub_path, inner) in nested {
        collect_sites(sub, sub_path, inner, out);
    }
}

/// Plain strings authored for template-typed properties, parsed.
fn literal_templates(invocation: &Invocation, registry: &BrickRegistry) -> Vec<(String, Result<Template>)> {
    let Some(brick) = registry.get(&invocation.id) else {
        return Vec::new();
    };
    let schema = brick.input_schema();
    let parsed: Vec<_> = schema
        .template_properties()
        .into_iter()
        .filter_map(|key| {
            let source = invocation.config.get(key)?.as_literal()?.as_str()?;
            Some((key.to_string(), Template::parse(source)))
        })
        .collect();
    parsed
}

fn diagnostic(rule: &str, severity: Severity, path: String, message: String) -> Diagnostic {
    Diagnostic {
        rule: rule.into(),
        severity,
        message,
        path,
        brick_id: None,
        fix: None,
    }
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

struct UnknownBrickRule;
impl LintRule for UnknownBrickRule {
    fn name(&self) -> &str {
        "unknown_brick"
    }
    fn apply(&self, pipeline: &Pipeline, registry: &BrickRegistry) -> Vec<Diagnostic> {
        let mut out = Vec::new();
        for site in sites(pipeline) {
            for (index, inv) in site.pipeline.iter().enumerate() {
                if !registry.has(&inv.id) {
                    out.push(Diagnostic {
                        brick_id: Some(inv.id.clone()),
                        fix: Some("Register the brick or correct the id".into()),
                        ..diagnostic(
                            self.name(),
                            Severity::Error,
                            format!("{}/{index}/id", site.path),
                            format!("Brick '{}' is not registered", inv.id),
                        )
                    });
                }
            }
        }
        out
    }
}

struct EmptyPipelineRule;
impl LintRule for EmptyPipelineRule {
    fn name(&self) -> &str {
        "empty_pipeline"
    }
    fn apply(&self, pipeline: &Pipeline, _registry: &BrickRegistry) -> Vec<Diagnostic> {
        sites(pipeline)
            .into_iter()
            .filter(|site| site.pipeline.is_empty())
            .map(|site| {
                let path = if site.path.is_empty() { "/".to_string() } else { site.path };
                diagnostic(self.name(), Severity::Warning, path, "Pipeline has no steps".into())
            })
            .collect()
    }
}

struct RendererNotLastRule;
impl LintRule for RendererNotLastRule {
    fn name(&self) -> &str {
        "renderer_not_last"
    }
    fn apply(&self, pipeline: &Pipeline, registry: &BrickRegistry) -> Vec<Diagnostic> {
        let mut out = Vec::new();
        for site in sites(pipeline) {
            let last = site.pipeline.len().saturating_sub(1);
            for (index, inv) in site.pipeline.iter().enumerate() {
                let is_renderer = registry
                    .get(&inv.id)
                    .is_some_and(|b| b.kind() == BrickKind::Renderer);
                if is_renderer && index < last {
                    out.push(Diagnostic {
                        brick_id: Some(inv.id.clone()),
                        fix: Some("Move the renderer to the end of the pipeline".into()),
                        ..diagnostic(
                            self.name(),
                            Severity::Warning,
                            format!("{}/{index}", site.path),
                            format!(
                                "Renderer '{}' ends the pipeline; {} later step(s) never run",
                                inv.id,
                                last - index
                            ),
                        )
                    });
                }
            }
        }
        out
    }
}

struct MissingRootRule;
impl LintRule for MissingRootRule {
    fn name(&self) -> &str {
        "missing_root"
    }
    fn apply(&self, pipeline: &Pipeline, registry: &BrickRegistry) -> Vec<Diagnostic> {
        let mut out = Vec::new();
        for site in sites(pipeline) {
            for (index, inv) in site.pipeline.iter().enumerate() {
                let requires_target = registry.get(&inv.id).is_some_and(|b| b.requires_target());
                let has_selector = inv.root.as_deref().is_some_and(|s| !s.trim().is_empty());
                if requires_target && !inv.is_root_aware && !has_selector {
                    out.push(Diagnostic {
                        brick_id: Some(inv.id.clone()),
                        fix: Some("Add a `root` selector or set `isRootAware: true`".into()),
                        ..diagnostic(
                            self.name(),
                            Severity::Error,
                            format!("{}/{index}/root", site.path),
                            format!(
                                "Brick '{}' needs a target: it is not root-aware and has no selector",
                                inv.id
                            ),
                        )
                    });
                }
            }
        }
        out
    }
}

struct UnknownVariableRule;
impl LintRule for UnknownVariableRule {
    fn name(&self) -> &str {
        "unknown_variable"
    }
    fn apply(&self, pipeline: &Pipeline, registry: &BrickRegistry) -> Vec<Diagnostic> {
        let mut out = Vec::new();
        for site in sites(pipeline) {
            let mut bound = site.scope.clone();
            for (index, inv) in site.pipeline.iter().enumerate() {
                let templates: Vec<Template> = literal_templates(inv, registry)
                    .into_iter()
                    .filter_map(|(_, parsed)| parsed.ok())
                    .collect();
                let exprs = inv.condition.iter().chain(inv.config.values());
                let paths = exprs
                    .flat_map(Expression::variables)
                    .chain(templates.iter().flat_map(Template::variables));
                for path in paths {
                    if !bound.contains(path.variable()) {
                        out.push(Diagnostic {
                            brick_id: Some(inv.id.clone()),
                            ..diagnostic(
                                self.name(),
                                Severity::Warning,
                                format!("{}/{index}", site.path),
                                format!(
                                    "Variable '{}' is not bound at this point and resolves to nothing",
                                    path.variable()
                                ),
                            )
                        });
                    }
                }
                if let Some(key) = &inv.output_key {
                    bound.insert(format!("@{}", key.trim_start_matches('@')));
                }
            }
        }
        out
    }
}

struct TemplateSyntaxRule;
impl LintRule for TemplateSyntaxRule {
    fn name(&self) -> &str {
        "template_syntax"
    }
    fn apply(&self, pipeline: &Pipeline, registry: &BrickRegistry) -> Vec<Diagnostic> {
        let mut out = Vec::new();
        for site in sites(pipeline) {
            for (index, inv) in site.pipeline.iter().enumerate() {
                for (key, parsed) in literal_templates(inv, registry) {
                    if let Err(err) = parsed {
                        out.push(Diagnostic {
                            brick_id: Some(inv.id.clone()),
                            ..diagnostic(
                                self.name(),
                                Severity::Error,
                                format!("{}/{index}/config/{key}", site.path),
                                err.to_string(),
                            )
                        });
                    }
                }
            }
        }
        out
    }
}

struct StaticConfigRule;
impl LintRule for StaticConfigRule {
    fn name(&self) -> &str {
        "static_config"
    }
    fn apply(&self, pipeline: &Pipeline, registry: &BrickRegistry) -> Vec<Diagnostic> {
        let mut out = Vec::new();
        for site in sites(pipeline) {
            for (index, inv) in site.pipeline.iter().enumerate() {
                let Some(brick) = registry.get(&inv.id) else {
                    continue;
                };
                if !inv.config.values().all(Expression::is_literal) {
                    continue;
                }
                let config: serde_json::Map<String, Value> = inv
                    .config
                    .iter()
                    .filter_map(|(k, e)| e.as_literal().map(|v| (k.clone(), v.clone())))
                    .collect();
                let result = validate(&Value::Object(config), &brick.input_schema());
                for violation in result.violations() {
                    out.push(Diagnostic {
                        brick_id: Some(inv.id.clone()),
                        ..diagnostic(
                            self.name(),
                            Severity::Error,
                            format!("{}/{index}/config{}", site.path, violation.path),
                            format!("Config for '{}' is invalid: {}", inv.id, violation.reason),
                        )
                    });
                }
            }
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run all lint rules and return every diagnostic.
pub fn lint(pipeline: &Pipeline, registry: &BrickRegistry) -> Vec<Diagnostic> {
    let rules: Vec<Box<dyn LintRule>> = vec![
        Box::new(UnknownBrickRule),
        Box::new(EmptyPipelineRule),
        Box::new(RendererNotLastRule),
        Box::new(MissingRootRule),
        Box::new(UnknownVariableRule),
        Box::new(TemplateSyntaxRule),
        Box::new(StaticConfigRule),
    ];

    let mut diagnostics = Vec::new();
    for rule in &rules {
        diagnostics.extend(rule.apply(pipeline, registry));
    }
    diagnostics
}

/// Run all lint rules; return `Err` for the first `Error`-severity diagnostic.
pub fn lint_or_raise(pipeline: &Pipeline, registry: &BrickRegistry) -> Result<Vec<Diagnostic>> {
    let diagnostics = lint(pipeline, registry);
    if let Some(error) = diagnostics.iter().find(|d| d.severity == Severity::Error) {
        return Err(BrickError::Configuration {
            brick_id: error.brick_id.clone().unwrap_or_default(),
            property: error.path.clone(),
            message: error.message.clone(),
        });
    }
    Ok(diagnostics)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bricks::builtin_registry;

    fn lint_yaml(source: &str) -> Vec<Diagnostic> {
        let pipeline = Pipeline::from_yaml_str(source).unwrap();
        lint(&pipeline, &builtin_registry())
    }

    fn rules(diags: &[Diagnostic]) -> Vec<&str> {
        diags.iter().map(|d| d.rule.as_str()).collect()
    }

    #[test]
    fn clean_pipeline_has_no_diagnostics() {
        let diags = lint_yaml(
            r#"
- id: "@brick/identity"
  outputKey: saved
  config:
    name: { __type__: var, __value__: "@input.name" }
- id: "@brick/map"
  config:
    elements: [1, 2]
    body:
      __type__: pipeline
      __value__:
        - id: "@brick/template"
          config:
            template: { __type__: template, __value__: "{{ @saved.name }} {{ @element }} {{ @index }}" }
        - id: "@brick/dom/add-class"
          isRootAware: true
          config:
            className: done
- id: "@brick/render/text"
  config:
    text: ok
"#,
        );
        assert!(diags.is_empty(), "unexpected diagnostics: {diags:?}");
    }

    #[test]
    fn unknown_brick_is_an_error() {
        let diags = lint_yaml(r#"[{ id: "@acme/nope" }]"#);
        assert_eq!(rules(&diags), vec!["unknown_brick"]);
        assert_eq!(diags[0].severity, Severity::Error);
        assert_eq!(diags[0].path, "/0/id");
    }

    #[test]
    fn empty_pipelines_warn_at_every_level() {
        let diags = lint_yaml(
            r#"
- id: "@brick/map"
  config:
    elements: []
    body: { __type__: pipeline, __value__: [] }
"#,
        );
        assert_eq!(rules(&diags), vec!["empty_pipeline"]);
        assert_eq!(diags[0].path, "/0/config/body");
        assert_eq!(lint_yaml("[]")[0].path, "/");
    }

    #[test]
    fn renderer_followed_by_steps_warns() {
        let diags = lint_yaml(
            r#"
- id: "@brick/render/text"
  config: { text: hi }
- id: "@brick/identity"
"#,
        );
        assert_eq!(rules(&diags), vec!["renderer_not_last"]);
        assert_eq!(diags[0].severity, Severity::Warning);
    }

    #[test]
    fn missing_root_is_reported_inside_sub_pipelines() {
        let diags = lint_yaml(
            r#"
- id: "@brick/if-else"
  config:
    condition: true
    if:
      __type__: pipeline
      __value__:
        - id: "@brick/dom/add-class"
          config: { className: x }
"#,
        );
        assert_eq!(rules(&diags), vec!["missing_root"]);
        assert_eq!(diags[0].path, "/0/config/if/0/root");
        assert_eq!(diags[0].brick_id.as_deref(), Some("@brick/dom/add-class"));
    }

    #[test]
    fn unbound_variables_warn() {
        let diags = lint_yaml(
            r#"
- id: "@brick/template"
  config:
    template: { __type__: template, __value__: "{{ @later }}" }
- id: "@brick/identity"
  outputKey: later
"#,
        );
        assert_eq!(rules(&diags), vec!["unknown_variable"]);
        assert!(diags[0].message.contains("@later"));
    }

    #[test]
    fn custom_element_key_is_in_scope() {
        let diags = lint_yaml(
            r#"
- id: "@brick/map"
  config:
    elements: [1]
    elementKey: row
    body:
      __type__: pipeline
      __value__:
        - id: "@brick/identity"
          config: { v: { __type__: var, __value__: "@row" } }
"#,
        );
        assert!(diags.is_empty(), "{diags:?}");
    }

    #[test]
    fn plain_template_strings_are_checked() {
        let diags = lint_yaml(
            r#"
- id: "@brick/template"
  config:
    template: "{{ @input | shout }}"
- id: "@brick/template"
  config:
    template: "{{ @nowhere }}"
"#,
        );
        assert_eq!(rules(&diags), vec!["unknown_variable", "template_syntax"]);
        assert_eq!(diags[1].path, "/0/config/template");
        assert_eq!(diags[1].severity, Severity::Error);
        assert!(diags[0].message.contains("@nowhere"));
    }

    #[test]
    fn literal_config_violating_contract_is_an_error() {
        let diags = lint_yaml(
            r#"
- id: "@brick/log"
  config: { message: hi, level: loud }
"#,
        );
        assert_eq!(rules(&diags), vec!["static_config"]);
        assert_eq!(diags[0].path, "/0/config/level");
    }

    #[test]
    fn lint_or_raise_fails_on_first_error() {
        let pipeline = Pipeline::from_yaml_str(
            r#"
- id: "@brick/dom/read-text"
"#,
        )
        .unwrap();
        match lint_or_raise(&pipeline, &builtin_registry()) {
            Err(BrickError::Configuration {
                brick_id, property, ..
            }) => {
                assert_eq!(brick_id, "@brick/dom/read-text");
                assert_eq!(property, "/0/root");
            }
            other => panic!("expected Configuration error, got {other:?}"),
        }
    }

    #[test]
    fn lint_or_raise_passes_warnings_through() {
        let pipeline = Pipeline::from_yaml_str("[]").unwrap();
        let diags = lint_or_raise(&pipeline, &builtin_registry()).unwrap();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].severity, Severity::Warning);
    }

    #[test]
    fn diagnostic_display_includes_fix() {
        let diags = lint_yaml(r#"[{ id: "@acme/nope" }]"#);
        assert_eq!(
            diags[0].to_string(),
            "error [unknown_brick] /0/id: Brick '@acme/nope' is not registered (fix: Register the brick or correct the id)"
        );
    }
}
