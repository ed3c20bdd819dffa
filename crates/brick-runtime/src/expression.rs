//! Config expressions and their pure evaluation.
//!
//! A config value is either a plain JSON value or a tagged object
//! `{"__type__": ..., "__value__": ...}`. Parsing happens once, when the
//! pipeline is loaded, so evaluation itself cannot fail.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use brick_types::schema::{EXPRESSION_TYPE_KEY, EXPRESSION_VALUE_KEY};
use brick_types::{BrickError, Result};

use crate::context::Context;
use crate::path::VarPath;
use crate::pipeline::Pipeline;
use crate::template::Template;

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Value),
    Var(VarPath),
    Template(Template),
    Pipeline(Pipeline),
    /// An untagged object with at least one non-literal member.
    Object(BTreeMap<String, Expression>),
    /// An untagged array with at least one non-literal member.
    Array(Vec<Expression>),
}

/// Outcome of evaluating an expression without the executor.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    Value(Value),
    /// A sub-pipeline that must be run by the executor.
    Deferred(Pipeline),
}

fn expression_error(expression: &Value, message: impl Into<String>) -> BrickError {
    BrickError::Expression {
        expression: expression.to_string(),
        message: message.into(),
    }
}

/// Splits a tagged expression object into its tag and payload.
pub fn as_tagged(value: &Value) -> Option<(&str, &Value)> {
    let obj = value.as_object()?;
    if obj.len() != 2 {
        return None;
    }
    let tag = obj.get(EXPRESSION_TYPE_KEY)?.as_str()?;
    let payload = obj.get(EXPRESSION_VALUE_KEY)?;
    Some((tag, payload))
}

fn tagged(tag: &str, payload: Value) -> Value {
    let mut obj = Map::new();
    obj.insert(EXPRESSION_TYPE_KEY.to_string(), Value::String(tag.to_string()));
    obj.insert(EXPRESSION_VALUE_KEY.to_string(), payload);
    Value::Object(obj)
}

fn looks_tagged(value: &Value) -> bool {
    match value {
        Value::Object(obj) => as_tagged(value).is_some() || obj.values().any(looks_tagged),
        Value::Array(items) => items.iter().any(looks_tagged),
        _ => false,
    }
}

fn expect_str<'a>(value: &'a Value, payload: &'a Value, tag: &str) -> Result<&'a str> {
    payload
        .as_str()
        .ok_or_else(|| expression_error(value, format!("'{tag}' expects a string value")))
}

impl Expression {
    pub fn literal(value: impl Into<Value>) -> Self {
        Expression::Literal(value.into())
    }

    pub fn var(path: &str) -> Result<Self> {
        VarPath::parse(path).map(Expression::Var)
    }

    pub fn template(source: &str) -> Result<Self> {
        Template::parse(source).map(Expression::Template)
    }

    /// Parse a config value, recognising tagged expressions at any depth.
    pub fn from_value(value: &Value) -> Result<Self> {
        if let Some((tag, payload)) = as_tagged(value) {
            return match tag {
                "literal" => Ok(Expression::Literal(payload.clone())),
                "var" => Expression::var(expect_str(value, payload, tag)?),
                "template" | "mustache" | "nunjucks" => {
                    Expression::template(expect_str(value, payload, tag)?)
                }
                "pipeline" => Pipeline::from_value(payload).map(Expression::Pipeline),
                other => Err(expression_error(value, format!("unknown expression type '{other}'"))),
            };
        }

        match value {
            Value::Object(obj) => {
                let mut members = BTreeMap::new();
                for (key, member) in obj {
                    members.insert(key.clone(), Expression::from_value(member)?);
                }
                if members.values().all(Expression::is_literal) {
                    let literal = members
                        .into_iter()
                        .filter_map(|(k, e)| e.into_literal().map(|v| (k, v)))
                        .collect();
                    Ok(Expression::Literal(Value::Object(literal)))
                } else {
                    Ok(Expression::Object(members))
                }
            }
            Value::Array(items) => {
                let members = items
                    .iter()
                    .map(Expression::from_value)
                    .collect::<Result<Vec<_>>>()?;
                if members.iter().all(Expression::is_literal) {
                    let literal = members.into_iter().filter_map(Expression::into_literal).collect();
                    Ok(Expression::Literal(Value::Array(literal)))
                } else {
                    Ok(Expression::Array(members))
                }
            }
            other => Ok(Expression::Literal(other.clone())),
        }
    }

    /// The authored form. Literals that would be mistaken for tagged
    /// expressions are wrapped in an explicit `literal` tag.
    pub fn to_value(&self) -> Value {
        match self {
            Expression::Literal(v) if looks_tagged(v) => tagged("literal", v.clone()),
            Expression::Literal(v) => v.clone(),
            Expression::Var(path) => tagged("var", Value::String(path.as_str().to_string())),
            Expression::Template(t) => tagged("template", Value::String(t.as_str().to_string())),
            Expression::Pipeline(p) => tagged("pipeline", p.to_value()),
            Expression::Object(members) => Value::Object(
                members
                    .iter()
                    .map(|(k, e)| (k.clone(), e.to_value()))
                    .collect(),
            ),
            Expression::Array(members) => {
                Value::Array(members.iter().map(Expression::to_value).collect())
            }
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Expression::Literal(_))
    }

    pub fn as_literal(&self) -> Option<&Value> {
        match self {
            Expression::Literal(v) => Some(v),
            _ => None,
        }
    }

    fn into_literal(self) -> Option<Value> {
        match self {
            Expression::Literal(v) => Some(v),
            _ => None,
        }
    }

    /// Returns `true` if a sub-pipeline appears anywhere in the expression.
    pub fn contains_pipeline(&self) -> bool {
        match self {
            Expression::Pipeline(_) => true,
            Expression::Object(members) => members.values().any(Expression::contains_pipeline),
            Expression::Array(members) => members.iter().any(Expression::contains_pipeline),
            _ => false,
        }
    }

    /// Sub-pipelines embedded in this expression, outermost first.
    pub fn sub_pipelines(&self) -> Vec<&Pipeline> {
        let mut out = Vec::new();
        self.collect_pipelines(&mut out);
        out
    }

    fn collect_pipelines<'a>(&'a self, out: &mut Vec<&'a Pipeline>) {
        match self {
            Expression::Pipeline(p) => out.push(p),
            Expression::Object(members) => members.values().for_each(|e| e.collect_pipelines(out)),
            Expression::Array(members) => members.iter().for_each(|e| e.collect_pipelines(out)),
            _ => {}
        }
    }

    /// Variable paths read by this expression. Sub-pipelines are not entered.
    pub fn variables(&self) -> Vec<&VarPath> {
        match self {
            Expression::Var(path) => vec![path],
            Expression::Template(t) => t.variables().collect(),
            Expression::Object(members) => members.values().flat_map(Expression::variables).collect(),
            Expression::Array(members) => members.iter().flat_map(Expression::variables).collect(),
            Expression::Literal(_) | Expression::Pipeline(_) => Vec::new(),
        }
    }

    /// Evaluate against a context.
    ///
    /// A top-level sub-pipeline is returned as [`Resolved::Deferred`]. Inside
    /// composites, sub-pipelines keep their tagged form; the executor walks
    /// composites itself when it needs them run.
    pub fn evaluate(&self, ctx: &Context) -> Resolved {
        match self {
            Expression::Pipeline(p) => Resolved::Deferred(p.clone()),
            other => Resolved::Value(other.evaluate_value(ctx)),
        }
    }

    pub(crate) fn evaluate_value(&self, ctx: &Context) -> Value {
        match self {
            Expression::Literal(v) => v.clone(),
            Expression::Var(path) => ctx.lookup(path).cloned().unwrap_or(Value::Null),
            Expression::Template(t) => Value::String(t.render(ctx.vars())),
            Expression::Pipeline(_) => self.to_value(),
            Expression::Object(members) => Value::Object(
                members
                    .iter()
                    .map(|(k, e)| (k.clone(), e.evaluate_value(ctx)))
                    .collect(),
            ),
            Expression::Array(members) => {
                Value::Array(members.iter().map(|e| e.evaluate_value(ctx)).collect())
            }
        }
    }
}

impl From<Value> for Expression {
    fn from(value: Value) -> Self {
        Expression::Literal(value)
    }
}

impl Serialize for Expression {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Expression {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Expression::from_value(&value).map_err(serde::de::Error::custom)
    }
}

/// Truthiness used by conditions: `null`, `false`, `0`, `""`, `"false"` and
/// `"0"` are falsy. Everything else, including empty collections, is truthy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !(s.is_empty() || s == "false" || s == "0"),
        Value::Array(_) | Value::Object(_) => true,
    }
}
